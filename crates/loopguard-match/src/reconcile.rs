//! # Post-Completion Reconciliation
//!
//! Matches a completion event back to the `Pending` entry created at
//! submission time. The two invocation points can disagree on the
//! release name, and any of the identifying fields may be missing, so
//! reconciliation is an ordered fallback chain:
//!
//! 1. Exact duplicate-key match.
//! 2. Exact job-id match.
//! 3. Exact normalized-name match.
//! 4. Fuzzy normalized-name match (bounded edit distance or common
//!    prefix), optionally constrained by category.
//! 5. Category + nearest-timestamp proximity.
//!
//! Each method is a pure function over the pending entries; the first
//! method that yields any candidates wins, with a most-recently-updated
//! tie-break when it yields more than one. No match is a legitimate
//! outcome (the pre-queue write may not have happened, or may already
//! have expired); history is left untouched and expiry reclaims the
//! entry.

use loopguard_core::{normalize_release_name, Timestamp};
use loopguard_history::{DownloadStatus, HistoryEntry, StoreGuard};

/// A completion event as reported by the host.
#[derive(Debug, Clone)]
pub struct CompletionEvent {
    /// Release name at completion time (may differ from submission).
    pub display_name: String,
    pub duplicate_key: Option<String>,
    pub category: Option<String>,
    pub job_id: Option<String>,
    /// When the download finished.
    pub completed_at: Timestamp,
}

/// Which reconciliation method produced the match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMethod {
    DuplicateKey,
    JobId,
    NameExact,
    NameFuzzy,
    CategoryProximity,
}

impl std::fmt::Display for MatchMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::DuplicateKey => "duplicate_key",
            Self::JobId => "job_id",
            Self::NameExact => "name_exact",
            Self::NameFuzzy => "name_fuzzy",
            Self::CategoryProximity => "category_proximity",
        };
        f.write_str(s)
    }
}

/// A successful reconciliation.
#[derive(Debug, Clone)]
pub struct ReconciledMatch {
    /// Identity key of the matched entry.
    pub key: String,
    pub method: MatchMethod,
}

/// Reconcile a completion event against the pending entries in the
/// locked store. Returns `None` when no method matches.
pub fn reconcile(
    event: &CompletionEvent,
    guard: &StoreGuard<'_>,
    now: Timestamp,
) -> Option<ReconciledMatch> {
    let pending = guard.find_active(now, |e| e.status == DownloadStatus::Pending);
    if pending.is_empty() {
        tracing::info!(name = %event.display_name, "no pending entries to reconcile");
        return None;
    }

    let window_secs = guard.window_secs();
    if let Some(m) = resolve(MatchMethod::DuplicateKey, by_duplicate_key(event, &pending)) {
        return Some(m);
    }
    if let Some(m) = resolve(MatchMethod::JobId, by_job_id(event, &pending)) {
        return Some(m);
    }
    if let Some(m) = resolve(MatchMethod::NameExact, by_exact_name(event, &pending)) {
        return Some(m);
    }
    if let Some(m) = resolve(MatchMethod::NameFuzzy, by_fuzzy_name(event, &pending)) {
        return Some(m);
    }
    if let Some(m) = resolve(
        MatchMethod::CategoryProximity,
        by_category_proximity(event, &pending, window_secs),
    ) {
        return Some(m);
    }

    tracing::info!(name = %event.display_name, "completion event matched no pending entry");
    None
}

/// Collapse a method's candidates into a single match, tie-breaking on
/// recency. Ambiguity is logged, never raised.
fn resolve(method: MatchMethod, candidates: Vec<&HistoryEntry>) -> Option<ReconciledMatch> {
    let chosen = match candidates.as_slice() {
        [] => return None,
        [only] => only,
        multiple => {
            tracing::info!(
                %method,
                count = multiple.len(),
                "multiple candidates for reconciliation method, using most recent"
            );
            multiple
                .iter()
                .max_by_key(|e| e.last_updated_at)
                .expect("non-empty candidate list")
        }
    };
    tracing::info!(%method, key = %chosen.key, "reconciled completion event");
    Some(ReconciledMatch {
        key: chosen.key.clone(),
        method,
    })
}

// ─── Chain methods ───────────────────────────────────────────────────

fn by_duplicate_key<'a>(
    event: &CompletionEvent,
    pending: &[&'a HistoryEntry],
) -> Vec<&'a HistoryEntry> {
    let Some(key) = event.duplicate_key.as_deref().filter(|k| !k.is_empty()) else {
        return Vec::new();
    };
    pending
        .iter()
        .copied()
        .filter(|e| e.duplicate_key.as_deref() == Some(key))
        .collect()
}

fn by_job_id<'a>(event: &CompletionEvent, pending: &[&'a HistoryEntry]) -> Vec<&'a HistoryEntry> {
    let Some(job_id) = event.job_id.as_deref().filter(|j| !j.is_empty()) else {
        return Vec::new();
    };
    pending
        .iter()
        .copied()
        .filter(|e| e.job_id.as_deref() == Some(job_id))
        .collect()
}

fn by_exact_name<'a>(
    event: &CompletionEvent,
    pending: &[&'a HistoryEntry],
) -> Vec<&'a HistoryEntry> {
    let name = normalize_release_name(&event.display_name);
    if name.is_empty() {
        return Vec::new();
    }
    pending
        .iter()
        .copied()
        .filter(|e| e.normalized_name() == name)
        .collect()
}

fn by_fuzzy_name<'a>(
    event: &CompletionEvent,
    pending: &[&'a HistoryEntry],
) -> Vec<&'a HistoryEntry> {
    let name = normalize_release_name(&event.display_name);
    if name.is_empty() {
        return Vec::new();
    }
    pending
        .iter()
        .copied()
        .filter(|e| category_compatible(event.category.as_deref(), e.category.as_deref()))
        .filter(|e| names_roughly_equal(&name, &e.normalized_name()))
        .collect()
}

fn by_category_proximity<'a>(
    event: &CompletionEvent,
    pending: &[&'a HistoryEntry],
    window_secs: i64,
) -> Vec<&'a HistoryEntry> {
    let Some(category) = event.category.as_deref().filter(|c| !c.is_empty()) else {
        return Vec::new();
    };
    pending
        .iter()
        .copied()
        .filter(|e| e.category.as_deref() == Some(category))
        .filter(|e| e.first_seen_at.abs_diff_secs(event.completed_at) <= window_secs)
        .min_by_key(|e| e.first_seen_at.abs_diff_secs(event.completed_at))
        .into_iter()
        .collect()
}

/// When both sides carry a category, they must agree; a missing category
/// on either side does not disqualify a fuzzy name match.
fn category_compatible(event: Option<&str>, entry: Option<&str>) -> bool {
    match (event, entry) {
        (Some(a), Some(b)) => a == b,
        _ => true,
    }
}

// ─── Fuzzy comparison ────────────────────────────────────────────────

/// Minimum normalized length before prefix matching applies; below this,
/// a shared prefix says nothing.
const PREFIX_MIN_LEN: usize = 10;
/// Shared-prefix fraction (percent of the shorter name) that counts as a
/// match.
const PREFIX_THRESHOLD_PCT: usize = 85;

/// Whether two normalized names are close enough to be the same release.
///
/// Either a bounded edit distance (2 for short names, 10% of the longer
/// length for long ones) or a dominant common prefix qualifies.
fn names_roughly_equal(a: &str, b: &str) -> bool {
    if a == b {
        return true;
    }
    let a_len = a.chars().count();
    let b_len = b.chars().count();
    let longer = a_len.max(b_len);
    let shorter = a_len.min(b_len);

    if shorter >= PREFIX_MIN_LEN {
        let prefix = common_prefix_len(a, b);
        if prefix * 100 >= shorter * PREFIX_THRESHOLD_PCT {
            return true;
        }
    }

    let cap = if longer <= 20 { 2 } else { longer / 10 };
    bounded_edit_distance(a, b, cap).is_some()
}

fn common_prefix_len(a: &str, b: &str) -> usize {
    a.chars().zip(b.chars()).take_while(|(x, y)| x == y).count()
}

/// Levenshtein distance with an early-exit cap. Returns `None` when the
/// distance exceeds `cap`.
fn bounded_edit_distance(a: &str, b: &str, cap: usize) -> Option<usize> {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.len().abs_diff(b.len()) > cap {
        return None;
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0usize; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        let mut row_min = curr[0];
        for (j, cb) in b.iter().enumerate() {
            let substitution = prev[j] + usize::from(ca != cb);
            curr[j + 1] = substitution.min(prev[j + 1] + 1).min(curr[j] + 1);
            row_min = row_min.min(curr[j + 1]);
        }
        if row_min > cap {
            return None;
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    (prev[b.len()] <= cap).then_some(prev[b.len()])
}

// ─── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use loopguard_core::Identity;
    use loopguard_history::HistoryStore;
    use std::time::Duration;

    fn ts(secs: i64) -> Timestamp {
        Timestamp::from_epoch_secs(secs).unwrap()
    }

    fn pending(
        name: &str,
        dup_key: Option<&str>,
        category: Option<&str>,
        job_id: Option<&str>,
        at: i64,
    ) -> HistoryEntry {
        let identity = Identity::derive(name, dup_key, true);
        HistoryEntry::new_pending(
            &identity,
            name,
            dup_key.map(str::to_string),
            category.map(str::to_string),
            job_id.map(str::to_string),
            ts(at),
        )
    }

    fn event(name: &str, dup_key: Option<&str>, category: Option<&str>, job_id: Option<&str>, at: i64) -> CompletionEvent {
        CompletionEvent {
            display_name: name.to_string(),
            duplicate_key: dup_key.map(str::to_string),
            category: category.map(str::to_string),
            job_id: job_id.map(str::to_string),
            completed_at: ts(at),
        }
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        store: HistoryStore,
    }

    fn fixture_with(entries: Vec<HistoryEntry>, window_secs: i64) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::open(
            dir.path().join("history.json"),
            window_secs,
            Duration::from_secs(2),
        );
        let mut guard = store.lock().unwrap();
        for entry in entries {
            guard.upsert(entry);
        }
        guard.commit(ts(0)).unwrap();
        Fixture { _dir: dir, store }
    }

    // ── Individual methods ───────────────────────────────────────────

    #[test]
    fn test_duplicate_key_match_wins_over_name() {
        let fx = fixture_with(
            vec![
                pending("Totally.Different.Name", Some("k1"), Some("tv"), None, 100),
                pending("Same.Show.S01E01", None, Some("tv"), None, 200),
            ],
            86_400,
        );
        let guard = fx.store.lock().unwrap();

        let m = reconcile(
            &event("Same.Show.S01E01", Some("k1"), Some("tv"), None, 300),
            &guard,
            ts(300),
        )
        .unwrap();
        assert_eq!(m.method, MatchMethod::DuplicateKey);
        assert_eq!(m.key, "dup:k1");
    }

    #[test]
    fn test_job_id_match() {
        let fx = fixture_with(
            vec![pending(
                "Renamed.By.Postprocessing",
                None,
                Some("tv"),
                Some("SABnzbd_nzo_x1"),
                100,
            )],
            86_400,
        );
        let guard = fx.store.lock().unwrap();

        let m = reconcile(
            &event("Entirely.Other.Title", None, None, Some("SABnzbd_nzo_x1"), 200),
            &guard,
            ts(200),
        )
        .unwrap();
        assert_eq!(m.method, MatchMethod::JobId);
    }

    #[test]
    fn test_exact_normalized_name_match() {
        let fx = fixture_with(
            vec![pending("Some.Show.S01E02.1080p", None, Some("tv"), None, 100)],
            86_400,
        );
        let guard = fx.store.lock().unwrap();

        let m = reconcile(
            &event("some show s01e02 1080p", None, None, None, 200),
            &guard,
            ts(200),
        )
        .unwrap();
        assert_eq!(m.method, MatchMethod::NameExact);
    }

    #[test]
    fn test_fuzzy_name_match_tolerates_small_edits() {
        let fx = fixture_with(
            vec![pending(
                "Some.Show.S01E02.1080p.WEB.x264",
                None,
                Some("tv"),
                None,
                100,
            )],
            86_400,
        );
        let guard = fx.store.lock().unwrap();

        // One token renamed at the tail: common prefix carries it.
        let m = reconcile(
            &event("Some.Show.S01E02.1080p.WEB.x265", None, Some("tv"), None, 200),
            &guard,
            ts(200),
        )
        .unwrap();
        assert_eq!(m.method, MatchMethod::NameFuzzy);
    }

    #[test]
    fn test_fuzzy_match_respects_category_constraint() {
        let fx = fixture_with(
            vec![pending(
                "Some.Show.S01E02.1080p.WEB.x264",
                None,
                Some("tv"),
                None,
                100,
            )],
            86_400,
        );
        let guard = fx.store.lock().unwrap();

        // Same near-name but contradicting category: method 4 must not
        // match, and method 5 needs a category of "tv" too, so the event
        // reconciles to nothing.
        let result = reconcile(
            &event("Some.Show.S01E02.1080p.WEB.x265", None, Some("movies"), None, 200),
            &guard,
            ts(200),
        );
        assert!(result.is_none());
    }

    #[test]
    fn test_category_proximity_picks_nearest() {
        let fx = fixture_with(
            vec![
                pending("First.Release", None, Some("tv"), None, 1_000),
                pending("Second.Release", None, Some("tv"), None, 5_000),
            ],
            86_400,
        );
        let guard = fx.store.lock().unwrap();

        let m = reconcile(
            // Name shares nothing with either entry; only method 5 applies.
            &event("Zebra.Quux.Omega", None, Some("tv"), None, 4_200),
            &guard,
            ts(4_200),
        )
        .unwrap();
        assert_eq!(m.method, MatchMethod::CategoryProximity);
        assert_eq!(m.key, "name:second release");
    }

    #[test]
    fn test_proximity_requires_category() {
        let fx = fixture_with(
            vec![pending("First.Release", None, Some("tv"), None, 1_000)],
            86_400,
        );
        let guard = fx.store.lock().unwrap();

        let result = reconcile(&event("Zebra.Quux.Omega", None, None, None, 1_100), &guard, ts(1_100));
        assert!(result.is_none());
    }

    // ── Chain behavior ───────────────────────────────────────────────

    #[test]
    fn test_no_pending_entries_is_a_non_match() {
        let fx = fixture_with(Vec::new(), 86_400);
        let guard = fx.store.lock().unwrap();
        assert!(reconcile(&event("X", Some("k1"), None, None, 0), &guard, ts(0)).is_none());
    }

    #[test]
    fn test_terminal_entries_are_not_candidates() {
        let mut entry = pending("Some.Show.S01E02", Some("k1"), Some("tv"), None, 100);
        entry.transition(DownloadStatus::Success, ts(200)).unwrap();
        let fx = fixture_with(vec![entry], 86_400);
        let guard = fx.store.lock().unwrap();

        let result = reconcile(
            &event("Some.Show.S01E02", Some("k1"), Some("tv"), None, 300),
            &guard,
            ts(300),
        );
        assert!(result.is_none());
    }

    #[test]
    fn test_expired_pending_entry_is_not_a_candidate() {
        let fx = fixture_with(
            vec![pending("Some.Show.S01E02", Some("k1"), None, None, 0)],
            3_600,
        );
        let guard = fx.store.lock().unwrap();

        let result = reconcile(
            &event("Some.Show.S01E02", Some("k1"), None, None, 4_000),
            &guard,
            ts(4_000),
        );
        assert!(result.is_none());
    }

    #[test]
    fn test_ambiguous_candidates_pick_most_recent() {
        // Two pending entries with the same category; the event's name
        // matches neither, so proximity applies and both are within the
        // window at equal-ish distance; most recent update wins ties at
        // the resolve step when a method returns several.
        let fx = fixture_with(
            vec![
                pending("Alpha.Release", None, Some("tv"), Some("job-1"), 1_000),
                pending("Beta.Release", None, Some("tv"), Some("job-1"), 2_000),
            ],
            86_400,
        );
        let guard = fx.store.lock().unwrap();

        // Both entries share the job id (defensive case), so method 2
        // yields two candidates.
        let m = reconcile(
            &event("Gamma.Release", None, None, Some("job-1"), 3_000),
            &guard,
            ts(3_000),
        )
        .unwrap();
        assert_eq!(m.method, MatchMethod::JobId);
        assert_eq!(m.key, "name:beta release");
    }

    // ── Fuzzy comparison internals ───────────────────────────────────

    #[test]
    fn test_bounded_edit_distance() {
        assert_eq!(bounded_edit_distance("", "", 2), Some(0));
        assert_eq!(bounded_edit_distance("abc", "abc", 0), Some(0));
        assert_eq!(bounded_edit_distance("abc", "abd", 2), Some(1));
        assert_eq!(bounded_edit_distance("kitten", "sitting", 3), Some(3));
        assert_eq!(bounded_edit_distance("kitten", "sitting", 2), None);
        // Length-difference shortcut.
        assert_eq!(bounded_edit_distance("abc", "abcdefgh", 2), None);
    }

    #[test]
    fn test_names_roughly_equal() {
        assert!(names_roughly_equal("some show s01e02", "some show s01e02"));
        assert!(names_roughly_equal(
            "some show s01e02 1080p web x264",
            "some show s01e02 1080p web x265"
        ));
        assert!(!names_roughly_equal("some show s01e02", "other thing entirely"));
        // Short names do not prefix-match, and three edits exceed the cap.
        assert!(!names_roughly_equal("abcd", "azzz"));
    }
}
