//! # History Store
//!
//! File-backed keyed store of download attempts, shared by independent
//! short-lived process invocations.
//!
//! ## Locking
//!
//! The store is the only shared mutable resource in the system. Every
//! read-modify-write cycle holds an exclusive advisory lock (`fs2` flock
//! on a sidecar `.lock` file) for its whole duration, acquired with
//! bounded exponential backoff. The lock is released on every exit path:
//! [`StoreGuard`] unlocks on drop, whether the invocation commits,
//! returns an error, or unwinds.
//!
//! A lock timeout or a corrupt history file surfaces as the recoverable
//! [`StoreError::Unavailable`] condition, and callers fail open rather than
//! blocking the host's queue processing.
//!
//! ## Persistence
//!
//! Entries are stored as a pretty-printed JSON map keyed by identity, so
//! the file stays human-inspectable. Saves go through a temp file in the
//! same directory followed by a rename. Expired entries are pruned on
//! commit; lookups exclude them regardless of whether pruning has
//! physically happened yet.

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::ErrorKind;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use fs2::FileExt;
use thiserror::Error;

use loopguard_core::Timestamp;

use crate::entry::{DownloadStatus, HistoryEntry, TransitionError};

/// Default bound on exclusive-lock acquisition.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors raised by the history store.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The store cannot currently be used (lock timeout, corrupt file).
    /// Recoverable: callers apply the fail-open policy.
    #[error("history store unavailable: {reason}")]
    Unavailable {
        /// What made the store unavailable.
        reason: String,
    },

    /// Filesystem error while reading or writing the store.
    #[error("history store io error: {0}")]
    Io(#[from] std::io::Error),

    /// The in-memory collection could not be serialized.
    #[error("history store encode error: {0}")]
    Encode(#[from] serde_json::Error),

    /// A status update violated the lifecycle state machine.
    #[error(transparent)]
    Transition(#[from] TransitionError),

    /// A status update referenced a key with no entry.
    #[error("no history entry for key {key}")]
    MissingEntry {
        /// The missing identity key.
        key: String,
    },
}

/// Handle on the persisted history file.
///
/// Cheap to construct; all access happens through [`HistoryStore::lock`].
#[derive(Debug, Clone)]
pub struct HistoryStore {
    path: PathBuf,
    lock_path: PathBuf,
    window_secs: i64,
    lock_timeout: Duration,
}

impl HistoryStore {
    /// Create a store handle for `path` with the given detection window.
    pub fn open(path: impl Into<PathBuf>, window_secs: i64, lock_timeout: Duration) -> Self {
        let path = path.into();
        let mut lock_name = path.file_name().unwrap_or_default().to_os_string();
        lock_name.push(".lock");
        let lock_path = path.with_file_name(lock_name);
        Self {
            path,
            lock_path,
            window_secs,
            lock_timeout,
        }
    }

    /// The detection window in seconds.
    pub fn window_secs(&self) -> i64 {
        self.window_secs
    }

    /// Acquire the exclusive lock and load the collection.
    ///
    /// Retries with exponential backoff until the configured timeout.
    ///
    /// # Errors
    ///
    /// `StoreError::Unavailable` on lock timeout or a corrupt history
    /// file; `StoreError::Io` on other filesystem failures.
    pub fn lock(&self) -> Result<StoreGuard<'_>, StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let lock_file = OpenOptions::new()
            .create(true)
            .write(true)
            .open(&self.lock_path)?;

        let deadline = Instant::now() + self.lock_timeout;
        let mut retry_delay = Duration::from_millis(25);
        loop {
            match lock_file.try_lock_exclusive() {
                Ok(()) => break,
                Err(_) if Instant::now() >= deadline => {
                    return Err(StoreError::Unavailable {
                        reason: format!(
                            "lock not acquired within {:?} ({})",
                            self.lock_timeout,
                            self.lock_path.display()
                        ),
                    });
                }
                Err(_) => {
                    std::thread::sleep(retry_delay);
                    retry_delay = (retry_delay * 2).min(Duration::from_millis(250));
                }
            }
        }

        let entries = match self.load() {
            Ok(entries) => entries,
            Err(err) => {
                let _ = fs2::FileExt::unlock(&lock_file);
                return Err(err);
            }
        };

        Ok(StoreGuard {
            store: self,
            lock_file,
            entries,
        })
    }

    /// Read and parse the history file without taking the lock.
    ///
    /// A missing file is an empty collection; an unparseable file is the
    /// recoverable `Unavailable` condition.
    pub fn load(&self) -> Result<BTreeMap<String, HistoryEntry>, StoreError> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(err) => return Err(err.into()),
        };
        serde_json::from_str(&raw).map_err(|err| StoreError::Unavailable {
            reason: format!("corrupt history file {}: {err}", self.path.display()),
        })
    }

    fn save(&self, entries: &BTreeMap<String, HistoryEntry>) -> Result<(), StoreError> {
        let rendered = serde_json::to_string_pretty(entries)?;
        let tmp_path = self.path.with_extension("json.tmp");
        std::fs::write(&tmp_path, rendered)?;
        std::fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}

/// Exclusive view of the history collection.
///
/// Holds the process-external lock for its lifetime; dropping the guard
/// releases the lock on every exit path. Mutations stay in memory until
/// [`StoreGuard::commit`].
pub struct StoreGuard<'a> {
    store: &'a HistoryStore,
    lock_file: File,
    entries: BTreeMap<String, HistoryEntry>,
}

impl StoreGuard<'_> {
    /// The detection window of the underlying store, in seconds.
    pub fn window_secs(&self) -> i64 {
        self.store.window_secs
    }

    /// Number of entries currently loaded (including expired ones that
    /// have not been pruned yet).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the collection is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up an entry by identity key, ignoring expiry.
    pub fn get(&self, key: &str) -> Option<&HistoryEntry> {
        self.entries.get(key)
    }

    /// Active (non-expired) entries satisfying `predicate`, most recently
    /// updated first.
    pub fn find_active<P>(&self, now: Timestamp, predicate: P) -> Vec<&HistoryEntry>
    where
        P: Fn(&HistoryEntry) -> bool,
    {
        let mut matches: Vec<&HistoryEntry> = self
            .entries
            .values()
            .filter(|e| !e.is_expired(now, self.store.window_secs))
            .filter(|e| predicate(e))
            .collect();
        matches.sort_by(|a, b| b.last_updated_at.cmp(&a.last_updated_at));
        matches
    }

    /// Insert or replace the entry stored under `entry.key`.
    ///
    /// Replacing is how a retry supersedes a failed attempt: the new
    /// `Pending` entry takes the identity's slot.
    pub fn upsert(&mut self, entry: HistoryEntry) {
        self.entries.insert(entry.key.clone(), entry);
    }

    /// Transition the entry under `key` to a terminal status.
    ///
    /// # Errors
    ///
    /// `MissingEntry` if no entry exists for `key`; `Transition` if the
    /// entry is already terminal.
    pub fn update_status(
        &mut self,
        key: &str,
        to: DownloadStatus,
        now: Timestamp,
    ) -> Result<&HistoryEntry, StoreError> {
        let entry = self
            .entries
            .get_mut(key)
            .ok_or_else(|| StoreError::MissingEntry {
                key: key.to_string(),
            })?;
        entry.transition(to, now)?;
        Ok(entry)
    }

    /// Remove expired entries from the collection. Returns how many were
    /// removed.
    pub fn prune(&mut self, now: Timestamp) -> usize {
        let window = self.store.window_secs;
        let before = self.entries.len();
        self.entries.retain(|_, e| !e.is_expired(now, window));
        before - self.entries.len()
    }

    /// Prune expired entries and persist the collection, then release the
    /// lock.
    ///
    /// # Errors
    ///
    /// Filesystem or serialization failures; the lock is still released.
    pub fn commit(mut self, now: Timestamp) -> Result<(), StoreError> {
        let pruned = self.prune(now);
        if pruned > 0 {
            tracing::debug!(pruned, "removed expired history entries");
        }
        self.store.save(&self.entries)
    }
}

impl Drop for StoreGuard<'_> {
    fn drop(&mut self) {
        let _ = fs2::FileExt::unlock(&self.lock_file);
    }
}

impl std::fmt::Debug for StoreGuard<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreGuard")
            .field("path", &self.store.path.display())
            .field("entries", &self.entries.len())
            .finish()
    }
}

// ─── Tests ───────────────────────────────────────────────────────────
