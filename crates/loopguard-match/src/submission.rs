//! # Pre-Submission Decision
//!
//! Decides whether a candidate submission is a duplicate of a recent
//! attempt. Evaluated under the store's exclusive lock so the lookup and
//! the subsequent upsert form one atomic read-modify-write against
//! concurrent invocations.
//!
//! ## Decision rules
//!
//! 1. Ignored category (or no category with `ignore_no_category`) →
//!    ALLOW without touching history.
//! 2. No active entry for the identity → ALLOW, track a new `Pending`
//!    entry.
//! 3. Most recent active entry `Pending` or `Success` → BLOCK.
//! 4. Most recent active entry `Failed` → ALLOW as a fresh attempt; the
//!    new `Pending` entry supersedes the failed one.

use loopguard_core::{Config, Identity, Timestamp};
use loopguard_history::{DownloadStatus, HistoryEntry, StoreGuard};

/// A submission about to enter the queue.
#[derive(Debug, Clone)]
pub struct Candidate {
    /// Release name as reported by the host.
    pub display_name: String,
    /// Host-supplied duplicate key, when available.
    pub duplicate_key: Option<String>,
    /// Download category, when available.
    pub category: Option<String>,
    /// Host-supplied job id, when available.
    pub job_id: Option<String>,
}

impl Candidate {
    /// The identity under which this candidate is tracked.
    pub fn identity(&self, use_duplicate_key: bool) -> Identity {
        Identity::derive(
            &self.display_name,
            self.duplicate_key.as_deref(),
            use_duplicate_key,
        )
    }
}

/// Why a submission was allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllowReason {
    /// The category is exempt from duplicate detection.
    IgnoredCategory,
    /// No active history entry matched the identity.
    FirstSeen,
    /// The matching entry had failed; this is an explicit retry.
    RetryAfterFailure,
    /// The history store could not be used; fail open rather than hold
    /// up the queue.
    StoreUnavailable,
}

/// A blocked duplicate, with the context the caller needs for
/// blocklisting and notification.
#[derive(Debug, Clone)]
pub struct BlockedDuplicate {
    /// The active entry that triggered the block.
    pub entry: HistoryEntry,
    /// Seconds since the duplicate was first accepted.
    pub age_secs: i64,
}

/// The outcome of a pre-submission check.
#[derive(Debug, Clone)]
pub enum Decision {
    /// Accept the submission. When `tracked` is set, the caller must
    /// upsert it before releasing the store lock.
    Allow {
        reason: AllowReason,
        tracked: Option<HistoryEntry>,
    },
    /// Refuse the submission as a duplicate.
    Block(BlockedDuplicate),
}

impl Decision {
    /// Whether the submission should be accepted.
    pub fn is_allow(&self) -> bool {
        matches!(self, Self::Allow { .. })
    }
}

/// Run the pre-submission decision against the locked store.
pub fn decide_submission(
    config: &Config,
    candidate: &Candidate,
    guard: &StoreGuard<'_>,
    now: Timestamp,
) -> Decision {
    if config.is_ignored_category(candidate.category.as_deref()) {
        tracing::info!(
            name = %candidate.display_name,
            category = candidate.category.as_deref().unwrap_or("<none>"),
            "category exempt from duplicate detection"
        );
        return Decision::Allow {
            reason: AllowReason::IgnoredCategory,
            tracked: None,
        };
    }

    let identity = candidate.identity(config.use_duplicate_key);
    let key = identity.as_key();
    let matches = guard.find_active(now, |e| e.key == key);

    // The keyed store should make multiple active matches impossible;
    // tolerate it anyway and take the most recent.
    if matches.len() > 1 {
        tracing::info!(
            %identity,
            count = matches.len(),
            "multiple active entries for one identity, using most recent"
        );
    }

    let tracked = HistoryEntry::new_pending(
        &identity,
        candidate.display_name.clone(),
        candidate.duplicate_key.clone(),
        candidate.category.clone(),
        candidate.job_id.clone(),
        now,
    );

    match matches.first() {
        None => Decision::Allow {
            reason: AllowReason::FirstSeen,
            tracked: Some(tracked),
        },
        Some(existing) if existing.status == DownloadStatus::Failed => {
            tracing::info!(%identity, "previous attempt failed, allowing retry");
            Decision::Allow {
                reason: AllowReason::RetryAfterFailure,
                tracked: Some(tracked),
            }
        }
        Some(existing) => {
            let age_secs = existing.age_secs(now);
            tracing::info!(
                %identity,
                status = %existing.status,
                age_minutes = age_secs / 60,
                "duplicate submission blocked"
            );
            Decision::Block(BlockedDuplicate {
                entry: (*existing).clone(),
                age_secs,
            })
        }
    }
}
