//! # Post-Process Handler
//!
//! Reconciles SABnzbd's completion report with the pending entry created
//! at pre-queue time and finalizes its status. A completion event that
//! matches nothing leaves history untouched; the pending entry expires
//! on its own, which re-arms detection for a retry.
//!
//! The handler never fails the download: every internal problem is
//! logged and the invocation completes normally.

use loopguard_core::{Config, Timestamp};
use loopguard_history::{DownloadStatus, HistoryStore, DEFAULT_LOCK_TIMEOUT};
use loopguard_match::{reconcile, CompletionEvent, MatchMethod};
use loopguard_notify::{NotificationEvent, Notifier};

use crate::hostenv::SabEnvironment;

/// What the post-process invocation did, for logging and tests.
#[derive(Debug, Clone)]
pub struct PostProcessOutcome {
    /// Whether a history entry was transitioned.
    pub updated: bool,
    /// Which reconciliation method matched, when one did.
    pub match_method: Option<MatchMethod>,
    /// The status the download ended in.
    pub final_status: DownloadStatus,
}

/// Run completion reconciliation.
pub async fn run(config: &Config, env: &SabEnvironment, now: Timestamp) -> PostProcessOutcome {
    let final_status = if env.completed_ok() {
        DownloadStatus::Success
    } else {
        DownloadStatus::Failed
    };
    tracing::info!(
        name = %env.best_name(),
        status = %final_status,
        code = env.pp_status.as_deref().unwrap_or("0"),
        "post-process reconciliation"
    );

    let mut outcome = PostProcessOutcome {
        updated: false,
        match_method: None,
        final_status,
    };

    // Same exemptions as pre-queue: an untracked category has no entry
    // to reconcile.
    if config.is_ignored_category(env.category.as_deref()) {
        tracing::info!(
            category = env.category.as_deref().unwrap_or("<none>"),
            "category exempt, skipping status update"
        );
        return outcome;
    }

    let event = CompletionEvent {
        display_name: env.best_name().to_string(),
        duplicate_key: env.duplicate_key.clone(),
        category: env.category.clone(),
        job_id: env.job_id.clone(),
        completed_at: now,
    };

    let store = HistoryStore::open(
        &config.history_file,
        config.time_window_secs(),
        DEFAULT_LOCK_TIMEOUT,
    );
    match store.lock() {
        Ok(mut guard) => {
            if let Some(matched) = reconcile(&event, &guard, now) {
                match guard.update_status(&matched.key, final_status, now) {
                    Ok(_) => {
                        outcome.updated = true;
                        outcome.match_method = Some(matched.method);
                    }
                    Err(err) => {
                        tracing::error!(key = %matched.key, error = %err, "status update failed");
                    }
                }
            } else {
                tracing::error!(
                    name = %event.display_name,
                    "no matching pending entry; history left unchanged"
                );
            }
            if let Err(err) = guard.commit(now) {
                tracing::error!(error = %err, "could not persist history");
            }
        }
        Err(err) => {
            tracing::error!(error = %err, "history unavailable, completion not recorded");
        }
    }

    if config.notify_on_completion {
        notify_completion(config, env, &outcome, now).await;
    }

    tracing::info!(updated = outcome.updated, "post-process done");
    outcome
}

async fn notify_completion(
    config: &Config,
    env: &SabEnvironment,
    outcome: &PostProcessOutcome,
    now: Timestamp,
) {
    let Some(notifier) = Notifier::from_config(&config.notifier) else {
        return;
    };

    let title = match outcome.final_status {
        DownloadStatus::Success => "Download Completed",
        _ => "Download Failed",
    };

    let mut lines = vec![
        format!("**Download:** `{}`", env.best_name()),
        format!(
            "**Category:** `{}`",
            env.category.as_deref().unwrap_or("None")
        ),
    ];
    if let Some(key) = &env.duplicate_key {
        lines.push(format!("**Duplicate Key:** `{key}`"));
    }
    lines.push(format!(
        "**Status:** {} (code: {})",
        outcome.final_status,
        env.pp_status.as_deref().unwrap_or("0")
    ));
    if let Some(method) = outcome.match_method {
        lines.push(format!("**Match Method:** {method}"));
    }
    if !outcome.updated {
        lines.push("**Warning:** History entry not found (may not be tracked)".to_string());
    }
    let message = lines.join("  \n");

    if config.wants_raw_data {
        let event = NotificationEvent {
            title: title.to_string(),
            message,
            script_type: "post-process".to_string(),
            action: "updated".to_string(),
            nzb_name: env.best_name().to_string(),
            category: env.category.clone(),
            duplicate_key: env.duplicate_key.clone(),
            status: Some(outcome.final_status.to_string()),
            pp_status_code: env.pp_status.clone(),
            match_method: outcome.match_method.map(|m| m.to_string()),
            history_updated: Some(outcome.updated),
            timestamp: now.epoch_secs(),
            env: env.all.clone(),
            ..NotificationEvent::default()
        };
        notifier.send_raw(&event).await;
    } else {
        notifier.send(title, &message).await;
    }
}
