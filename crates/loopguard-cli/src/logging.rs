//! # File Logging
//!
//! Installs the tracing subscriber writing to the configured log file,
//! after applying size-based rotation. `RUST_LOG` overrides the
//! configured level when set; `log_level = "NONE"` skips installation
//! entirely.
//!
//! Logging failures are reported on stderr and never block the
//! invocation; the queue decision matters more than its audit trail.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing_subscriber::EnvFilter;

use loopguard_core::{Config, LogLevel};

/// Install the file-backed subscriber for this invocation.
pub fn init(config: &Config) {
    if config.log_level == LogLevel::None {
        return;
    }

    if let Some(parent) = config.log_file.parent() {
        if !parent.as_os_str().is_empty() {
            let _ = std::fs::create_dir_all(parent);
        }
    }

    if let Err(err) = rotate_if_needed(
        &config.log_file,
        config.max_log_size_mb,
        config.max_log_backups,
    ) {
        eprintln!("log rotation failed: {err}");
    }

    let file = match OpenOptions::new()
        .create(true)
        .append(true)
        .open(&config.log_file)
    {
        Ok(file) => file,
        Err(err) => {
            eprintln!("could not open log file {}: {err}", config.log_file.display());
            return;
        }
    };

    let default_directive = match config.log_level {
        LogLevel::All => "trace",
        LogLevel::Info => "info",
        LogLevel::Error => "error",
        LogLevel::None => unreachable!("handled above"),
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .try_init();
}

/// Rotate the log file once it exceeds `max_size_mb`.
///
/// Backups shift `log.1 -> log.2 -> ...` up to `max_backups`; the oldest
/// is dropped. With zero backups the file is simply truncated.
pub fn rotate_if_needed(path: &Path, max_size_mb: u64, max_backups: u32) -> std::io::Result<()> {
    let Ok(metadata) = std::fs::metadata(path) else {
        return Ok(());
    };
    if metadata.len() < max_size_mb * 1024 * 1024 {
        return Ok(());
    }

    if max_backups == 0 {
        return std::fs::write(path, b"");
    }

    let oldest = numbered(path, max_backups);
    if oldest.exists() {
        std::fs::remove_file(&oldest)?;
    }
    for i in (1..max_backups).rev() {
        let from = numbered(path, i);
        if from.exists() {
            std::fs::rename(&from, numbered(path, i + 1))?;
        }
    }
    std::fs::rename(path, numbered(path, 1))
}

fn numbered(path: &Path, index: u32) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(format!(".{index}"));
    path.with_file_name(name)
}
