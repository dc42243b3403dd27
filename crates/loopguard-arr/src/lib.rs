//! # loopguard-arr — Radarr/Sonarr Blocklist Gateway
//!
//! Typed client for the *arr v3 queue API, used when a duplicate
//! submission is refused: the corresponding queue item is removed from
//! the instance responsible for the category and added to its blocklist,
//! so the automation does not immediately grab the same release again.
//!
//! Gateway failures never propagate to the caller: an unreachable
//! instance is logged and the queue decision stands on its own. Every
//! call carries the shared 10 s timeout.

use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use url::Url;

use loopguard_core::{ArrInstance, Config};

/// Per-call timeout for outbound gateway requests.
pub const GATEWAY_TIMEOUT: Duration = Duration::from_secs(10);

/// Page size for queue pagination.
const QUEUE_PAGE_SIZE: usize = 1000;
/// Hard cap on pages fetched per instance.
const QUEUE_PAGE_CAP: u32 = 50;

/// Which *arr application an instance runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrKind {
    Radarr,
    Sonarr,
}

impl std::fmt::Display for ArrKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Radarr => "Radarr",
            Self::Sonarr => "Sonarr",
        };
        f.write_str(s)
    }
}

/// Errors from *arr API calls.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Transport-level failure (unreachable host, timeout, TLS).
    #[error("http error calling {endpoint}: {source}")]
    Http {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    /// Non-success HTTP status from the instance.
    #[error("{endpoint} returned status {status}")]
    Api { endpoint: String, status: u16 },

    /// The response body did not match the expected schema.
    #[error("could not decode response from {endpoint}: {source}")]
    Decode {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },
}

/// One item of an *arr download queue.
///
/// Only the fields needed for lookup are modeled; the live API returns
/// many more.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueRecord {
    pub id: i64,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub download_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueuePage {
    #[serde(default)]
    records: Vec<QueueRecord>,
}

/// Client for one configured *arr instance.
#[derive(Debug, Clone)]
pub struct ArrClient {
    kind: ArrKind,
    http: reqwest::Client,
    base_url: Url,
    api_key: String,
}

impl ArrClient {
    /// Build a client for an instance.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::Http` if the underlying HTTP client cannot
    /// be constructed.
    pub fn new(kind: ArrKind, instance: &ArrInstance, verify_ssl: bool) -> Result<Self, GatewayError> {
        let http = reqwest::Client::builder()
            .timeout(GATEWAY_TIMEOUT)
            .danger_accept_invalid_certs(!verify_ssl)
            .build()
            .map_err(|e| GatewayError::Http {
                endpoint: "client_init".into(),
                source: e,
            })?;
        Ok(Self {
            kind,
            http,
            base_url: instance.url.clone(),
            api_key: instance.api_key.clone(),
        })
    }

    fn base(&self) -> &str {
        self.base_url.as_str().trim_end_matches('/')
    }

    /// Fetch the full download queue, following pagination.
    ///
    /// Calls `GET {base_url}/api/v3/queue?page={n}&pageSize=1000` until a
    /// short or empty page, capped at 50 pages.
    pub async fn fetch_queue(&self) -> Result<Vec<QueueRecord>, GatewayError> {
        let mut all = Vec::new();
        for page in 1..=QUEUE_PAGE_CAP {
            let endpoint = format!("GET /api/v3/queue page {page}");
            let url = format!(
                "{}/api/v3/queue?page={page}&pageSize={QUEUE_PAGE_SIZE}",
                self.base()
            );

            let resp = self
                .http
                .get(&url)
                .header("X-Api-Key", &self.api_key)
                .send()
                .await
                .map_err(|e| GatewayError::Http {
                    endpoint: endpoint.clone(),
                    source: e,
                })?;

            if !resp.status().is_success() {
                return Err(GatewayError::Api {
                    endpoint,
                    status: resp.status().as_u16(),
                });
            }

            let page_data: QueuePage = resp
                .json()
                .await
                .map_err(|e| GatewayError::Decode {
                    endpoint,
                    source: e,
                })?;

            let fetched = page_data.records.len();
            if fetched == 0 {
                break;
            }
            all.extend(page_data.records);
            if fetched < QUEUE_PAGE_SIZE {
                break;
            }
        }
        Ok(all)
    }

    /// Remove a queue item from the client and add it to the blocklist.
    ///
    /// Calls `DELETE {base_url}/api/v3/queue/{id}` with
    /// `removeFromClient=true&blocklist=true`.
    pub async fn remove_and_blocklist(&self, queue_id: i64) -> Result<(), GatewayError> {
        let endpoint = format!("DELETE /api/v3/queue/{queue_id}");
        let url = format!(
            "{}/api/v3/queue/{queue_id}?removeFromClient=true&blocklist=true",
            self.base()
        );

        let resp = self
            .http
            .delete(&url)
            .header("X-Api-Key", &self.api_key)
            .send()
            .await
            .map_err(|e| GatewayError::Http {
                endpoint: endpoint.clone(),
                source: e,
            })?;

        if !resp.status().is_success() {
            return Err(GatewayError::Api {
                endpoint,
                status: resp.status().as_u16(),
            });
        }
        Ok(())
    }

    /// Look up the release in the queue and blocklist it if present.
    ///
    /// Returns the removed queue id, or `None` when the release is not
    /// queued on this instance.
    pub async fn block_release(&self, title: &str) -> Result<Option<i64>, GatewayError> {
        let queue = self.fetch_queue().await?;
        if queue.is_empty() {
            tracing::info!(kind = %self.kind, "queue is empty");
            return Ok(None);
        }
        let Some(queue_id) = find_queue_item(&queue, title) else {
            tracing::info!(kind = %self.kind, %title, "release not found in queue");
            return Ok(None);
        };
        self.remove_and_blocklist(queue_id).await?;
        tracing::info!(kind = %self.kind, queue_id, "removed from queue and blocklisted");
        Ok(Some(queue_id))
    }
}

/// Find a queue item by release title.
///
/// Exact title or download-id match first; the pre-queue and queue
/// titles can differ in decoration, so substring containment in either
/// direction is the fallback.
pub fn find_queue_item(records: &[QueueRecord], title: &str) -> Option<i64> {
    if title.is_empty() {
        return None;
    }
    for record in records {
        if record.title.as_deref() == Some(title) || record.download_id.as_deref() == Some(title) {
            return Some(record.id);
        }
    }
    for record in records {
        if let Some(item_title) = record.title.as_deref() {
            if !item_title.is_empty() && (item_title.contains(title) || title.contains(item_title))
            {
                return Some(record.id);
            }
        }
    }
    None
}

/// Where a duplicate was blocklisted.
#[derive(Debug, Clone)]
pub struct BlockedInstance {
    pub kind: ArrKind,
    pub category: String,
    pub url: Url,
}

impl std::fmt::Display for BlockedInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} - {} ({})", self.kind, self.category, self.url)
    }
}

/// The blocklist gateway consumed by the pre-queue handler.
///
/// Holds the configured instance lists and tries them in order (Radarr
/// first, then Sonarr), selecting by exact category match. All errors
/// are logged and swallowed; the gateway reports only whether some
/// instance accepted the removal.
#[derive(Debug, Clone)]
pub struct BlocklistGateway {
    radarr: Vec<ArrInstance>,
    sonarr: Vec<ArrInstance>,
    verify_ssl: bool,
}

impl BlocklistGateway {
    pub fn from_config(config: &Config) -> Self {
        Self {
            radarr: config.radarr_instances.clone(),
            sonarr: config.sonarr_instances.clone(),
            verify_ssl: config.verify_ssl,
        }
    }

    /// Remove `title` from the queue of the instance configured for
    /// `category` and blocklist it there.
    pub async fn block(&self, category: &str, title: &str) -> Option<BlockedInstance> {
        for (kind, instances) in [
            (ArrKind::Radarr, &self.radarr),
            (ArrKind::Sonarr, &self.sonarr),
        ] {
            let Some(instance) = instances.iter().find(|i| i.category == category) else {
                continue;
            };

            let client = match ArrClient::new(kind, instance, self.verify_ssl) {
                Ok(client) => client,
                Err(err) => {
                    tracing::error!(%kind, error = %err, "could not build gateway client");
                    continue;
                }
            };

            match client.block_release(title).await {
                Ok(Some(_)) => {
                    return Some(BlockedInstance {
                        kind,
                        category: instance.category.clone(),
                        url: instance.url.clone(),
                    });
                }
                Ok(None) => {}
                Err(err) => {
                    tracing::error!(%kind, url = %instance.url, error = %err, "blocklist call failed");
                }
            }
        }
        None
    }
}

// ─── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: i64, title: Option<&str>, download_id: Option<&str>) -> QueueRecord {
        QueueRecord {
            id,
            title: title.map(str::to_string),
            download_id: download_id.map(str::to_string),
        }
    }

    #[test]
    fn test_find_queue_item_exact_title() {
        let records = vec![
            record(1, Some("Other.Release"), None),
            record(2, Some("Some.Show.S01E02"), None),
        ];
        assert_eq!(find_queue_item(&records, "Some.Show.S01E02"), Some(2));
    }

    #[test]
    fn test_find_queue_item_download_id() {
        let records = vec![record(7, Some("Renamed.Title"), Some("abc123"))];
        assert_eq!(find_queue_item(&records, "abc123"), Some(7));
    }

    #[test]
    fn test_find_queue_item_partial_either_direction() {
        let records = vec![record(3, Some("Some.Show.S01E02.1080p-GROUP"), None)];
        assert_eq!(find_queue_item(&records, "Some.Show.S01E02"), Some(3));

        let records = vec![record(4, Some("Some.Show.S01E02"), None)];
        assert_eq!(
            find_queue_item(&records, "Some.Show.S01E02.1080p-GROUP"),
            Some(4)
        );
    }

    #[test]
    fn test_find_queue_item_exact_beats_partial() {
        let records = vec![
            record(1, Some("Some.Show.S01E02.1080p"), None),
            record(2, Some("Some.Show.S01E02"), None),
        ];
        assert_eq!(find_queue_item(&records, "Some.Show.S01E02"), Some(2));
    }

    #[test]
    fn test_find_queue_item_empty_title_matches_nothing() {
        let records = vec![record(1, Some("Anything"), None)];
        assert_eq!(find_queue_item(&records, ""), None);
    }

    #[test]
    fn test_find_queue_item_no_match() {
        let records = vec![record(1, Some("Entirely.Different"), None)];
        assert_eq!(find_queue_item(&records, "Some.Show.S01E02"), None);
    }

    #[test]
    fn test_queue_page_deserializes_live_shape() {
        let page: QueuePage = serde_json::from_str(
            r#"{
                "page": 1,
                "pageSize": 1000,
                "totalRecords": 1,
                "records": [
                    {"id": 42, "title": "Some.Show.S01E02", "downloadId": "SABnzbd_nzo_x1",
                     "status": "downloading", "size": 1234567}
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(page.records.len(), 1);
        assert_eq!(page.records[0].id, 42);
        assert_eq!(page.records[0].download_id.as_deref(), Some("SABnzbd_nzo_x1"));
    }

    #[test]
    fn test_queue_page_tolerates_missing_records() {
        let page: QueuePage = serde_json::from_str(r#"{"page": 3}"#).unwrap();
        assert!(page.records.is_empty());
    }
}
