//! Structured notification payload.
//!
//! When `wants_raw_data` is enabled, notifiers receive the full event
//! instead of just a rendered title/body, so custom receivers can apply
//! their own formatting or routing.

use std::collections::BTreeMap;

use serde::Serialize;

/// Everything known about the event being notified.
///
/// `title` and `message` are always populated; they are the fallback
/// for notifiers without raw-data support. The remaining fields are
/// populated per invocation point; absent values are omitted from the
/// serialized payload.
#[derive(Debug, Clone, Default, Serialize)]
pub struct NotificationEvent {
    pub title: String,
    /// Rendered markdown body.
    pub message: String,
    /// Which invocation point produced the event (`pre-queue` or
    /// `post-process`).
    pub script_type: String,
    /// What happened (`blocked`, `updated`).
    pub action: String,
    pub nzb_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duplicate_key: Option<String>,
    /// Final status of the download (post-process).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Status of the blocking duplicate (pre-queue).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duplicate_status: Option<String>,
    /// Epoch seconds when the duplicate was first seen (pre-queue).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duplicate_timestamp: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duplicate_age_minutes: Option<i64>,
    /// Where the duplicate was blocklisted, when removal succeeded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocked_instance: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_window_minutes: Option<u64>,
    /// Raw host status code (post-process).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pp_status_code: Option<String>,
    /// Which reconciliation method matched (post-process).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub match_method: Option<String>,
    /// Whether a history entry was updated (post-process).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub history_updated: Option<bool>,
    /// Epoch seconds when the event was produced.
    pub timestamp: i64,
    /// Captured `SAB_*` environment of the invocation.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
}
