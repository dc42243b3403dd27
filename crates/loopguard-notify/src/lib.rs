//! # loopguard-notify — Notification Gateway
//!
//! Notifier variants are a named registry resolved from configuration:
//! the `notifier.name` option selects an implementation, and anything
//! unknown or misconfigured fails closed to "notifier disabled". A
//! notification failure is logged by the gateway itself and never aborts
//! the handler that triggered it.
//!
//! Two capabilities per variant:
//!
//! - `send(title, body)`: rendered markdown notification.
//! - `send_raw(event)`: the full structured [`NotificationEvent`], used
//!   when `wants_raw_data` is enabled. Variants without raw support fall
//!   back to `send` with the event's title and body.

pub mod event;
pub mod gotify;
pub mod webhook;

pub use event::NotificationEvent;
pub use gotify::GotifyNotifier;
pub use webhook::WebhookNotifier;

use loopguard_core::NotifierConfig;

/// A configured notifier, resolved by name.
#[derive(Debug, Clone)]
pub enum Notifier {
    Gotify(GotifyNotifier),
    Webhook(WebhookNotifier),
}

impl Notifier {
    /// Resolve the configured notifier.
    ///
    /// Returns `None` when notification is disabled, the name is
    /// unknown, or the selected variant is missing required settings,
    /// never an error.
    pub fn from_config(config: &NotifierConfig) -> Option<Self> {
        if !config.enabled {
            return None;
        }
        if config.name.eq_ignore_ascii_case("gotify") {
            GotifyNotifier::from_config(config).map(Self::Gotify)
        } else if config.name.eq_ignore_ascii_case("webhook") {
            WebhookNotifier::from_config(config).map(Self::Webhook)
        } else {
            tracing::error!(name = %config.name, "unknown notifier, notifications disabled");
            None
        }
    }

    /// Send a rendered notification. Returns whether it was delivered.
    pub async fn send(&self, title: &str, message: &str) -> bool {
        match self {
            Self::Gotify(n) => n.send(title, message).await,
            Self::Webhook(n) => n.send(title, message).await,
        }
    }

    /// Send the structured event. Variants without raw support fall back
    /// to the rendered title/body.
    pub async fn send_raw(&self, event: &NotificationEvent) -> bool {
        match self {
            Self::Gotify(n) => n.send(&event.title, &event.message).await,
            Self::Webhook(n) => n.send_raw(event).await,
        }
    }
}
