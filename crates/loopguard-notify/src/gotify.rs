//! Gotify notifier.
//!
//! Posts markdown messages to a Gotify server:
//! `POST {url}/message?token={token}`. Success is HTTP 200; anything
//! else is logged and reported as a failed send, never raised.

use std::time::Duration;

use serde_json::json;
use url::Url;

use loopguard_core::NotifierConfig;

const DEFAULT_PRIORITY: i64 = 10;

/// Client for one Gotify server.
#[derive(Debug, Clone)]
pub struct GotifyNotifier {
    http: reqwest::Client,
    url: Url,
    token: String,
    priority: i64,
}

impl GotifyNotifier {
    /// Build from the notifier configuration.
    ///
    /// Returns `None` (notifier disabled) when the URL or token is
    /// missing or the HTTP client cannot be built.
    pub fn from_config(config: &NotifierConfig) -> Option<Self> {
        let Some(url) = config.url.clone() else {
            tracing::error!("Gotify: missing url, notifications disabled");
            return None;
        };
        let Some(token) = config.token.clone().filter(|t| !t.is_empty()) else {
            tracing::error!("Gotify: missing token, notifications disabled");
            return None;
        };
        let http = match reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
        {
            Ok(http) => http,
            Err(err) => {
                tracing::error!(error = %err, "Gotify: could not build http client");
                return None;
            }
        };
        Some(Self {
            http,
            url,
            token,
            priority: config.priority.unwrap_or(DEFAULT_PRIORITY),
        })
    }

    /// Send a markdown notification. Returns whether the server accepted
    /// it.
    pub async fn send(&self, title: &str, message: &str) -> bool {
        let payload = json!({
            "title": title,
            "message": message,
            "priority": self.priority,
            "extras": {
                "client::display": { "contentType": "text/markdown" }
            }
        });
        let endpoint = format!(
            "{}/message?token={}",
            self.url.as_str().trim_end_matches('/'),
            self.token
        );

        match self.http.post(&endpoint).json(&payload).send().await {
            Ok(resp) if resp.status().is_success() => {
                tracing::info!("Gotify: notification sent");
                true
            }
            Ok(resp) => {
                tracing::error!(status = resp.status().as_u16(), "Gotify: unexpected response");
                false
            }
            Err(err) => {
                tracing::error!(error = %err, "Gotify: send failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(url: Option<&str>, token: Option<&str>) -> NotifierConfig {
        NotifierConfig {
            enabled: true,
            name: "Gotify".to_string(),
            url: url.map(|u| Url::parse(u).unwrap()),
            token: token.map(str::to_string),
            priority: None,
        }
    }

    #[test]
    fn test_missing_url_disables() {
        assert!(GotifyNotifier::from_config(&config(None, Some("tok"))).is_none());
    }

    #[test]
    fn test_missing_token_disables() {
        assert!(GotifyNotifier::from_config(&config(Some("http://gotify.local"), None)).is_none());
        assert!(
            GotifyNotifier::from_config(&config(Some("http://gotify.local"), Some(""))).is_none()
        );
    }

    #[test]
    fn test_complete_config_builds() {
        let notifier =
            GotifyNotifier::from_config(&config(Some("http://gotify.local"), Some("tok"))).unwrap();
        assert_eq!(notifier.priority, DEFAULT_PRIORITY);
    }
}
