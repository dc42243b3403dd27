//! # Download Status Lifecycle
//!
//! Models the lifecycle of a tracked download attempt.
//!
//! ## States
//!
//! ```text
//! Pending ──▶ Success (terminal)
//!    │
//!    └──▶ Failed (terminal, superseded by a new Pending entry on retry)
//! ```
//!
//! There is no transition out of a terminal state for the *same* entry: a
//! retry after a failure always creates a distinct new `Pending` entry
//! for the identity, which supersedes the failed one in the keyed store.
//!
//! Expiry is not a state. An entry is inactive once its last update is
//! older than the configured window; the predicate lives here so the
//! matching paths and store pruning evaluate it identically.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use loopguard_core::{normalize_release_name, Identity, Timestamp};

// ─── Status ──────────────────────────────────────────────────────────

/// The lifecycle state of a download attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DownloadStatus {
    /// Accepted into the queue, outcome not yet known.
    Pending,
    /// Completed successfully (terminal).
    Success,
    /// Failed or was aborted (terminal, retry allowed via a new entry).
    Failed,
}

impl DownloadStatus {
    /// Whether this state is terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failed)
    }
}

impl std::fmt::Display for DownloadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "PENDING",
            Self::Success => "SUCCESS",
            Self::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

// ─── Errors ──────────────────────────────────────────────────────────

/// Errors raised by lifecycle transitions.
#[derive(Error, Debug)]
pub enum TransitionError {
    /// The entry is already in a terminal state.
    #[error("entry is in terminal state {state}")]
    Terminal {
        /// The terminal state.
        state: DownloadStatus,
    },

    /// The target state is not reachable from the current state.
    #[error("invalid transition {from} -> {to}")]
    Invalid {
        /// Current state.
        from: DownloadStatus,
        /// Attempted target state.
        to: DownloadStatus,
    },
}

// ─── History entry ───────────────────────────────────────────────────

/// One tracked download attempt.
///
/// Entries are created on the ALLOW path of a pre-queue decision and
/// finalized by post-process reconciliation. The store keys entries by
/// [`HistoryEntry::key`], so at most one entry exists per identity at a
/// time; a retry after failure replaces the failed entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Namespaced identity key (see [`Identity::as_key`]).
    pub key: String,
    /// Release name as reported at submission time.
    pub display_name: String,
    /// Host-supplied duplicate key, when available.
    pub duplicate_key: Option<String>,
    /// Download category, when available.
    pub category: Option<String>,
    pub status: DownloadStatus,
    /// When the attempt was first accepted.
    pub first_seen_at: Timestamp,
    /// When the entry was last created or transitioned.
    pub last_updated_at: Timestamp,
    /// Host-supplied job id (SABnzbd `SAB_NZO_ID`), when available.
    pub job_id: Option<String>,
}

impl HistoryEntry {
    /// Create a fresh `Pending` entry for an accepted submission.
    pub fn new_pending(
        identity: &Identity,
        display_name: impl Into<String>,
        duplicate_key: Option<String>,
        category: Option<String>,
        job_id: Option<String>,
        now: Timestamp,
    ) -> Self {
        Self {
            key: identity.as_key(),
            display_name: display_name.into(),
            duplicate_key,
            category,
            status: DownloadStatus::Pending,
            first_seen_at: now,
            last_updated_at: now,
            job_id,
        }
    }

    /// Transition the entry to a terminal state.
    ///
    /// The only legal transitions are `Pending -> Success` and
    /// `Pending -> Failed`.
    ///
    /// # Errors
    ///
    /// Returns `TransitionError` if the entry is already terminal or the
    /// target state is `Pending`.
    pub fn transition(&mut self, to: DownloadStatus, now: Timestamp) -> Result<(), TransitionError> {
        if self.status.is_terminal() {
            return Err(TransitionError::Terminal { state: self.status });
        }
        if !to.is_terminal() {
            return Err(TransitionError::Invalid {
                from: self.status,
                to,
            });
        }
        self.status = to;
        self.last_updated_at = now;
        Ok(())
    }

    /// Whether the entry has aged out of the detection window.
    ///
    /// Pure function of time; evaluated identically by matching lookups
    /// and by store pruning.
    pub fn is_expired(&self, now: Timestamp, window_secs: i64) -> bool {
        self.last_updated_at.age_secs(now) > window_secs
    }

    /// Seconds since the attempt was first accepted.
    pub fn age_secs(&self, now: Timestamp) -> i64 {
        self.first_seen_at.age_secs(now)
    }

    /// The entry's display name, normalized for matching.
    pub fn normalized_name(&self) -> String {
        normalize_release_name(&self.display_name)
    }
}

// ─── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(secs: i64) -> Timestamp {
        Timestamp::from_epoch_secs(secs).unwrap()
    }

    fn pending_entry(at: i64) -> HistoryEntry {
        let identity = Identity::derive("Some.Show.S01E02", Some("tv-1234"), true);
        HistoryEntry::new_pending(
            &identity,
            "Some.Show.S01E02",
            Some("tv-1234".to_string()),
            Some("tv".to_string()),
            Some("SABnzbd_nzo_abc".to_string()),
            ts(at),
        )
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    #[test]
    fn test_new_entry_is_pending() {
        let entry = pending_entry(0);
        assert_eq!(entry.status, DownloadStatus::Pending);
        assert_eq!(entry.key, "dup:tv-1234");
        assert_eq!(entry.first_seen_at, entry.last_updated_at);
    }

    #[test]
    fn test_pending_to_success() {
        let mut entry = pending_entry(0);
        entry.transition(DownloadStatus::Success, ts(600)).unwrap();
        assert_eq!(entry.status, DownloadStatus::Success);
        assert_eq!(entry.last_updated_at, ts(600));
        assert_eq!(entry.first_seen_at, ts(0));
    }

    #[test]
    fn test_pending_to_failed() {
        let mut entry = pending_entry(0);
        entry.transition(DownloadStatus::Failed, ts(600)).unwrap();
        assert_eq!(entry.status, DownloadStatus::Failed);
    }

    #[test]
    fn test_no_transition_out_of_success() {
        let mut entry = pending_entry(0);
        entry.transition(DownloadStatus::Success, ts(10)).unwrap();
        let err = entry.transition(DownloadStatus::Failed, ts(20)).unwrap_err();
        assert!(matches!(
            err,
            TransitionError::Terminal {
                state: DownloadStatus::Success
            }
        ));
    }

    #[test]
    fn test_no_transition_out_of_failed() {
        let mut entry = pending_entry(0);
        entry.transition(DownloadStatus::Failed, ts(10)).unwrap();
        assert!(entry.transition(DownloadStatus::Success, ts(20)).is_err());
    }

    #[test]
    fn test_pending_to_pending_rejected() {
        let mut entry = pending_entry(0);
        let err = entry.transition(DownloadStatus::Pending, ts(10)).unwrap_err();
        assert!(matches!(err, TransitionError::Invalid { .. }));
        assert_eq!(entry.status, DownloadStatus::Pending);
    }

    // ── Expiry ───────────────────────────────────────────────────────

    #[test]
    fn test_expiry_is_a_function_of_last_update() {
        let entry = pending_entry(0);
        let window = 3600;
        assert!(!entry.is_expired(ts(3600), window));
        assert!(entry.is_expired(ts(3601), window));
    }

    #[test]
    fn test_transition_refreshes_expiry() {
        let mut entry = pending_entry(0);
        entry.transition(DownloadStatus::Failed, ts(3000)).unwrap();
        // Window counts from the transition, not from first_seen_at.
        assert!(!entry.is_expired(ts(6000), 3600));
    }

    // ── Serialization ────────────────────────────────────────────────

    #[test]
    fn test_status_serializes_uppercase() {
        assert_eq!(
            serde_json::to_string(&DownloadStatus::Pending).unwrap(),
            "\"PENDING\""
        );
        assert_eq!(
            serde_json::to_string(&DownloadStatus::Success).unwrap(),
            "\"SUCCESS\""
        );
        assert_eq!(
            serde_json::to_string(&DownloadStatus::Failed).unwrap(),
            "\"FAILED\""
        );
    }

    #[test]
    fn test_unknown_status_fails_parsing() {
        assert!(serde_json::from_str::<DownloadStatus>("\"RUNNING\"").is_err());
    }

    #[test]
    fn test_entry_roundtrip() {
        let entry = pending_entry(1_000);
        let json = serde_json::to_string(&entry).unwrap();
        let parsed: HistoryEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, entry);
    }
}
