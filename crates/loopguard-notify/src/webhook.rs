//! Generic webhook notifier.
//!
//! Posts JSON to a configured endpoint: `{title, message}` for plain
//! sends, the full [`NotificationEvent`] for raw sends. Useful for
//! receivers that want to do their own formatting.

use std::time::Duration;

use serde_json::json;
use url::Url;

use loopguard_core::NotifierConfig;

use crate::event::NotificationEvent;

/// Client for a JSON webhook endpoint.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    http: reqwest::Client,
    url: Url,
}

impl WebhookNotifier {
    /// Build from the notifier configuration; `None` when the URL is
    /// missing or the HTTP client cannot be built.
    pub fn from_config(config: &NotifierConfig) -> Option<Self> {
        let Some(url) = config.url.clone() else {
            tracing::error!("Webhook: missing url, notifications disabled");
            return None;
        };
        let http = match reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
        {
            Ok(http) => http,
            Err(err) => {
                tracing::error!(error = %err, "Webhook: could not build http client");
                return None;
            }
        };
        Some(Self { http, url })
    }

    /// Post a plain title/body payload.
    pub async fn send(&self, title: &str, message: &str) -> bool {
        self.post(&json!({ "title": title, "message": message })).await
    }

    /// Post the full structured event.
    pub async fn send_raw(&self, event: &NotificationEvent) -> bool {
        match serde_json::to_value(event) {
            Ok(payload) => self.post(&payload).await,
            Err(err) => {
                tracing::error!(error = %err, "Webhook: could not serialize event");
                false
            }
        }
    }

    async fn post(&self, payload: &serde_json::Value) -> bool {
        match self.http.post(self.url.clone()).json(payload).send().await {
            Ok(resp) if resp.status().is_success() => {
                tracing::info!("Webhook: notification sent");
                true
            }
            Ok(resp) => {
                tracing::error!(status = resp.status().as_u16(), "Webhook: unexpected response");
                false
            }
            Err(err) => {
                tracing::error!(error = %err, "Webhook: send failed");
                false
            }
        }
    }
}
