//! # Temporal Types — UTC-Only Timestamps
//!
//! Defines `Timestamp`, a UTC-only timestamp truncated to seconds
//! precision. Every age and window comparison in the duplicate-detection
//! engine goes through this type so that expiry is computed the same way
//! by the matching paths and by store pruning.
//!
//! Sub-second precision is deliberately discarded: history entries are
//! written by one process invocation and read by another, and the file
//! format stores RFC 3339 strings at seconds granularity.

use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};

/// A UTC timestamp, truncated to seconds precision.
///
/// Serializes as an RFC 3339 string (e.g. `2026-08-04T12:00:00Z`), which
/// keeps the persisted history file human-inspectable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Current UTC time, truncated to seconds.
    pub fn now() -> Self {
        Self(truncate_to_seconds(Utc::now()))
    }

    /// From a `chrono::DateTime<Utc>`, truncating sub-seconds.
    pub fn from_utc(dt: DateTime<Utc>) -> Self {
        Self(truncate_to_seconds(dt))
    }

    /// From a Unix epoch timestamp in seconds.
    ///
    /// Returns `None` for values outside chrono's representable range.
    pub fn from_epoch_secs(secs: i64) -> Option<Self> {
        DateTime::from_timestamp(secs, 0).map(Self)
    }

    /// Unix epoch timestamp in seconds.
    pub fn epoch_secs(&self) -> i64 {
        self.0.timestamp()
    }

    /// Seconds elapsed from `self` to `now`. Negative if `now` is earlier
    /// than `self` (clock skew between invocations is tolerated, not
    /// corrected).
    pub fn age_secs(&self, now: Timestamp) -> i64 {
        now.epoch_secs() - self.epoch_secs()
    }

    /// Absolute distance in seconds between two timestamps. Used by the
    /// nearest-timestamp reconciliation method.
    pub fn abs_diff_secs(&self, other: Timestamp) -> i64 {
        (self.epoch_secs() - other.epoch_secs()).abs()
    }

    /// Render as RFC 3339 with Z suffix (e.g. `2026-08-04T12:00:00Z`).
    pub fn to_rfc3339(&self) -> String {
        self.0.format("%Y-%m-%dT%H:%M:%SZ").to_string()
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_rfc3339())
    }
}

/// Truncate a `DateTime<Utc>` to seconds precision.
fn truncate_to_seconds(dt: DateTime<Utc>) -> DateTime<Utc> {
    dt.with_nanosecond(0).unwrap_or(dt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_now_has_no_subseconds() {
        let ts = Timestamp::now();
        // Seconds precision renders as exactly YYYY-MM-DDTHH:MM:SSZ.
        assert_eq!(ts.to_rfc3339().len(), 20);
        assert_eq!(Timestamp::from_epoch_secs(ts.epoch_secs()).unwrap(), ts);
    }

    #[test]
    fn test_from_utc_truncates() {
        let dt = Utc.with_ymd_and_hms(2026, 8, 4, 12, 30, 45).unwrap();
        let dt_with_nanos = dt.with_nanosecond(123_456_789).unwrap();
        let ts = Timestamp::from_utc(dt_with_nanos);
        assert_eq!(ts.to_rfc3339(), "2026-08-04T12:30:45Z");
    }

    #[test]
    fn test_epoch_roundtrip() {
        let ts = Timestamp::from_epoch_secs(1_754_300_000).unwrap();
        assert_eq!(Timestamp::from_epoch_secs(ts.epoch_secs()).unwrap(), ts);
    }

    #[test]
    fn test_age_secs() {
        let t0 = Timestamp::from_epoch_secs(1_000).unwrap();
        let t1 = Timestamp::from_epoch_secs(1_600).unwrap();
        assert_eq!(t0.age_secs(t1), 600);
        assert_eq!(t1.age_secs(t0), -600);
    }

    #[test]
    fn test_abs_diff_secs_is_symmetric() {
        let t0 = Timestamp::from_epoch_secs(500).unwrap();
        let t1 = Timestamp::from_epoch_secs(1_700).unwrap();
        assert_eq!(t0.abs_diff_secs(t1), 1_200);
        assert_eq!(t1.abs_diff_secs(t0), 1_200);
    }

    #[test]
    fn test_ordering() {
        let earlier = Timestamp::from_epoch_secs(10).unwrap();
        let later = Timestamp::from_epoch_secs(11).unwrap();
        assert!(earlier < later);
    }

    #[test]
    fn test_serde_roundtrip() {
        let ts = Timestamp::from_epoch_secs(1_754_300_000).unwrap();
        let json = serde_json::to_string(&ts).unwrap();
        let parsed: Timestamp = serde_json::from_str(&json).unwrap();
        assert_eq!(ts, parsed);
    }

    #[test]
    fn test_display_is_rfc3339() {
        let dt = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let ts = Timestamp::from_utc(dt);
        assert_eq!(format!("{ts}"), "2026-01-01T00:00:00Z");
    }
}
