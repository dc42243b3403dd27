//! # loopguard-history — Persisted Download History
//!
//! The keyed record of recent download attempts shared by every handler
//! invocation:
//!
//! - **Entry** (`entry.rs`): `HistoryEntry` and the
//!   `Pending → Success | Failed` lifecycle state machine.
//! - **Store** (`store.rs`): file-backed collection behind an exclusive
//!   process-external lock, with expiry-aware lookups and pruning.

pub mod entry;
pub mod store;

pub use entry::{DownloadStatus, HistoryEntry, TransitionError};
pub use store::{HistoryStore, StoreError, StoreGuard, DEFAULT_LOCK_TIMEOUT};
