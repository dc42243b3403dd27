//! # Pre-Queue Handler
//!
//! Runs the duplicate check before SABnzbd accepts a job into its queue.
//! The decision and the history write happen under one store lock;
//! everything after the lock is released (blocklisting, notification) is
//! best-effort.
//!
//! Any internal failure fails open: the download is allowed and the
//! problem is logged, because erroneously blocking normal queue
//! processing is worse than occasionally missing a duplicate.

use loopguard_arr::{BlockedInstance, BlocklistGateway};
use loopguard_core::{Config, Timestamp};
use loopguard_history::{DownloadStatus, HistoryStore, DEFAULT_LOCK_TIMEOUT};
use loopguard_match::{decide_submission, AllowReason, BlockedDuplicate, Candidate, Decision};
use loopguard_notify::{NotificationEvent, Notifier};

use crate::hostenv::SabEnvironment;

/// Run the pre-queue check and emit the host response. Returns the
/// decision for inspection.
pub async fn run(config: &Config, env: &SabEnvironment, now: Timestamp) -> Decision {
    let candidate = Candidate {
        display_name: env.final_name.clone(),
        duplicate_key: env.duplicate_key.clone(),
        category: env.category.clone(),
        job_id: env.job_id.clone(),
    };
    tracing::info!(
        name = %candidate.display_name,
        category = candidate.category.as_deref().unwrap_or("<none>"),
        "pre-queue check"
    );

    let store = HistoryStore::open(
        &config.history_file,
        config.time_window_secs(),
        DEFAULT_LOCK_TIMEOUT,
    );
    let decision = match store.lock() {
        Ok(mut guard) => {
            let decision = decide_submission(config, &candidate, &guard, now);
            if let Decision::Allow {
                tracked: Some(entry),
                ..
            } = &decision
            {
                guard.upsert(entry.clone());
            }
            if let Err(err) = guard.commit(now) {
                tracing::error!(error = %err, "could not persist history");
            }
            decision
        }
        Err(err) => {
            // Fail open: tracking problems must never hold up the queue.
            tracing::error!(error = %err, "history unavailable, allowing download");
            Decision::Allow {
                reason: AllowReason::StoreUnavailable,
                tracked: None,
            }
        }
    };

    match &decision {
        Decision::Allow { reason, .. } => {
            respond(true);
            tracing::info!(?reason, "accepted");
        }
        Decision::Block(blocked) => {
            respond(false);

            // Only a completed duplicate justifies pulling the queue
            // record in the *arr instance; a pending one is the first
            // attempt still running.
            let blocked_instance = if blocked.entry.status == DownloadStatus::Success {
                match env.category.as_deref() {
                    Some(category) => {
                        BlocklistGateway::from_config(config)
                            .block(category, &env.final_name)
                            .await
                    }
                    None => None,
                }
            } else {
                tracing::info!(
                    status = %blocked.entry.status,
                    "duplicate not yet complete, skipping queue removal"
                );
                None
            };

            notify_blocked(config, env, blocked, blocked_instance.as_ref(), now).await;
        }
    }
    decision
}

/// SABnzbd pre-queue response protocol: the first stdout line accepts
/// (empty) or refuses (`0`) the job; six pass-through lines follow.
fn respond(accept: bool) {
    if accept {
        println!();
    } else {
        println!("0");
    }
    for _ in 0..6 {
        println!();
    }
}

async fn notify_blocked(
    config: &Config,
    env: &SabEnvironment,
    blocked: &BlockedDuplicate,
    instance: Option<&BlockedInstance>,
    now: Timestamp,
) {
    let Some(notifier) = Notifier::from_config(&config.notifier) else {
        return;
    };

    let age_minutes = blocked.age_secs / 60;
    let title = "Download Loop Prevented";

    let mut lines = vec![
        format!("**Download:** `{}`", env.final_name),
        format!(
            "**Category:** `{}`",
            env.category.as_deref().unwrap_or("None")
        ),
    ];
    if let Some(key) = &blocked.entry.duplicate_key {
        lines.push(format!("**Duplicate Key:** `{key}`"));
    }
    lines.push(format!(
        "**First Seen:** {} ({} min ago)",
        blocked.entry.first_seen_at, age_minutes
    ));
    lines.push(format!("**Status:** {}", blocked.entry.status));
    match instance {
        Some(instance) => lines.push(format!("**Blocked In:** {instance}")),
        None => lines.push("**Action:** Download refused at SABnzbd".to_string()),
    }
    lines.push(format!("**Window:** {} minutes", config.time_window_minutes));
    let message = lines.join("  \n");

    if config.wants_raw_data {
        let event = NotificationEvent {
            title: title.to_string(),
            message,
            script_type: "pre-queue".to_string(),
            action: "blocked".to_string(),
            nzb_name: env.final_name.clone(),
            category: env.category.clone(),
            duplicate_key: blocked.entry.duplicate_key.clone(),
            duplicate_status: Some(blocked.entry.status.to_string()),
            duplicate_timestamp: Some(blocked.entry.first_seen_at.epoch_secs()),
            duplicate_age_minutes: Some(age_minutes),
            blocked_instance: instance.map(ToString::to_string),
            time_window_minutes: Some(config.time_window_minutes),
            timestamp: now.epoch_secs(),
            env: env.all.clone(),
            ..NotificationEvent::default()
        };
        notifier.send_raw(&event).await;
    } else {
        notifier.send(title, &message).await;
    }
}
