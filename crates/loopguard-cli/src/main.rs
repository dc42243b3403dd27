//! # loopguard CLI Entry Point
//!
//! Dispatches the two SABnzbd script roles. Both subcommands read the
//! same configuration document and share the on-disk history store.

use std::path::PathBuf;

use clap::Parser;

use loopguard_cli::hostenv::SabEnvironment;
use loopguard_core::{Config, Timestamp};

/// Download loop prevention for SABnzbd with Radarr/Sonarr integration.
///
/// Tracks recent download attempts in a shared history file, refuses
/// resubmissions of releases that are already pending or completed, and
/// reconciles completion reports back into the history.
#[derive(Parser, Debug)]
#[command(name = "loopguard", version, about)]
struct Cli {
    /// Path to the JSON configuration file.
    #[arg(long, default_value = "loopguard.json")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Duplicate check before a job enters the queue (pre-queue script).
    Prequeue,
    /// Status reconciliation after a job completes (post-processing script).
    Postprocess,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::load_or_default(&cli.config);
    loopguard_cli::logging::init(&config);

    let env = SabEnvironment::from_env();
    let now = Timestamp::now();

    match cli.command {
        Commands::Prequeue => {
            loopguard_cli::prequeue::run(&config, &env, now).await;
        }
        Commands::Postprocess => {
            loopguard_cli::postprocess::run(&config, &env, now).await;
        }
    }

    // Both handlers fail open internally; the host only ever sees a
    // normal exit.
    Ok(())
}
