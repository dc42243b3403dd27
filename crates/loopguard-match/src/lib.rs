//! # loopguard-match — Duplicate-Detection Decisions
//!
//! The two decision paths of the engine:
//!
//! - **Submission** (`submission.rs`): pre-queue ALLOW/BLOCK against the
//!   active history.
//! - **Reconcile** (`reconcile.rs`): ordered fallback chain matching a
//!   completion event back to its pending entry.
//!
//! Both paths are pure over a locked store view; the handlers own the
//! resulting mutations so lookup and write happen under one lock.

pub mod reconcile;
pub mod submission;

pub use reconcile::{reconcile, CompletionEvent, MatchMethod, ReconciledMatch};
pub use submission::{decide_submission, AllowReason, BlockedDuplicate, Candidate, Decision};
