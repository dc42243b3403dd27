//! # Download Identity
//!
//! Derives the dedup identity under which a download is tracked in the
//! history store. Two identity spaces exist:
//!
//! - **Duplicate key**: the stable series/movie key supplied by the host
//!   (SABnzbd's `SAB_DUPLICATE_KEY`). Preferred when duplicate-key
//!   matching is enabled and the key is present.
//! - **Normalized name**: the release name with case and separator noise
//!   stripped. Fallback when no duplicate key is available, and the basis
//!   of the name-based reconciliation methods.
//!
//! Identity keys are namespaced (`dup:` / `name:`) so a release name can
//! never collide with a duplicate key in the keyed store.

use serde::{Deserialize, Serialize};

/// The identity under which a download is tracked.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Identity {
    /// Host-supplied duplicate key (stable across retries of the same release).
    DuplicateKey(String),
    /// Normalized release name.
    NormalizedName(String),
}

impl Identity {
    /// Derive the identity for a submission.
    ///
    /// The duplicate key wins when `use_duplicate_key` is enabled and the
    /// host supplied a non-empty key; otherwise the normalized display
    /// name is used.
    pub fn derive(display_name: &str, duplicate_key: Option<&str>, use_duplicate_key: bool) -> Self {
        match duplicate_key {
            Some(key) if use_duplicate_key && !key.is_empty() => {
                Self::DuplicateKey(key.to_string())
            }
            _ => Self::NormalizedName(normalize_release_name(display_name)),
        }
    }

    /// Stable, namespaced key string for the history store.
    pub fn as_key(&self) -> String {
        match self {
            Self::DuplicateKey(key) => format!("dup:{key}"),
            Self::NormalizedName(name) => format!("name:{name}"),
        }
    }
}

impl std::fmt::Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.as_key())
    }
}

/// Normalize a release name for matching.
///
/// Case-folds and maps the common release separators (`.`, `_`, `-`) to
/// spaces, then collapses whitespace runs. The pre-queue and post-process
/// invocation points can disagree on separators and casing for the same
/// release; everything else (resolution tags, group names) is kept, since
/// stripping it would merge genuinely different releases.
pub fn normalize_release_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut last_was_space = true;
    for ch in name.trim().chars() {
        let ch = match ch {
            '.' | '_' | '-' => ' ',
            other => other,
        };
        if ch == ' ' {
            if !last_was_space {
                out.push(' ');
            }
            last_was_space = true;
        } else {
            for lower in ch.to_lowercase() {
                out.push(lower);
            }
            last_was_space = false;
        }
    }
    if out.ends_with(' ') {
        out.pop();
    }
    out
}
