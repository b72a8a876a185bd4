//! Notification dispatch to the external messaging channel.
//!
//! Delivery is best-effort: one outbound call per message, failures are
//! logged and discarded. There is no retry and no queue.

use std::sync::Arc;
use std::time::Duration;

use crate::db::{Endpoint, Host, Store};
use crate::probe::CheckOutcome;

const SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// Best-effort message sender for the configured channel.
#[derive(Clone)]
pub struct Notifier {
    store: Arc<Store>,
}

impl Notifier {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Spawn a send without waiting for it, so a slow channel can never
    /// block the scheduler trigger that produced the message.
    pub fn dispatch(&self, text: String) {
        let notifier = self.clone();
        tokio::spawn(async move {
            notifier.send(&text).await;
        });
    }

    /// Send one message. A disabled or unconfigured channel is a no-op;
    /// any delivery failure is swallowed after logging.
    pub async fn send(&self, text: &str) {
        let cfg = match self.store.get_channel() {
            Ok(Some(cfg)) => cfg,
            Ok(None) => {
                tracing::debug!("No notification channel configured, dropping message");
                return;
            }
            Err(e) => {
                tracing::warn!("Failed to load channel config: {}", e);
                return;
            }
        };

        if !cfg.enabled || cfg.bot_token.is_empty() || cfg.chat_id.is_empty() {
            tracing::debug!("Notification channel disabled, dropping message");
            return;
        }

        let client = match reqwest::Client::builder().timeout(SEND_TIMEOUT).build() {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!("Failed to build notification client: {}", e);
                return;
            }
        };

        let url = format!("https://api.telegram.org/bot{}/sendMessage", cfg.bot_token);
        let body = serde_json::json!({ "chat_id": cfg.chat_id, "text": text });

        match client.post(&url).json(&body).send().await {
            Ok(resp) if resp.status().is_success() => {
                tracing::debug!("Notification delivered ({} chars)", text.len());
            }
            Ok(resp) => {
                tracing::warn!("Notification channel returned {}", resp.status());
            }
            Err(e) => {
                tracing::warn!("Notification send failed: {}", e);
            }
        }
    }
}

// --- Message formatting ---

pub fn endpoint_down_message(endpoint: &Endpoint, outcome: &CheckOutcome) -> String {
    match outcome.status_code {
        Some(code) => format!(
            "[DOWN] {} ({}) responded with {} ({})",
            endpoint.name, endpoint.url, code, outcome.status
        ),
        None => format!(
            "[DOWN] {} ({}) is unreachable ({})",
            endpoint.name, endpoint.url, outcome.status
        ),
    }
}

pub fn endpoint_recovered_message(endpoint: &Endpoint) -> String {
    format!("[RECOVERED] {} ({}) is back up", endpoint.name, endpoint.url)
}

pub fn host_down_message(host: &Host) -> String {
    format!("[DOWN] Host {} has stopped reporting metrics", host.name)
}

pub fn host_recovered_message(host: &Host) -> String {
    format!("[RECOVERED] Host {} is reporting metrics again", host.name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::CheckStatus;
    use chrono::Utc;

    fn sample_endpoint() -> Endpoint {
        Endpoint {
            id: "ep-1".to_string(),
            name: "Example".to_string(),
            url: "https://example.com".to_string(),
            created_at: Utc::now(),
            last_checked_at: None,
            last_status: CheckStatus::Pending,
            last_status_code: None,
            last_response_time_ms: None,
            last_notified_down_at: None,
        }
    }

    #[test]
    fn test_down_message_with_code() {
        let outcome = CheckOutcome {
            status: CheckStatus::Down,
            status_code: Some(503),
            response_time_ms: 12,
        };
        let msg = endpoint_down_message(&sample_endpoint(), &outcome);
        assert!(msg.contains("503"));
        assert!(msg.contains("DOWN"));
        assert!(msg.contains("https://example.com"));
    }

    #[test]
    fn test_down_message_without_code() {
        let outcome = CheckOutcome {
            status: CheckStatus::Timeout,
            status_code: None,
            response_time_ms: 15000,
        };
        let msg = endpoint_down_message(&sample_endpoint(), &outcome);
        assert!(msg.contains("unreachable"));
        assert!(msg.contains("TIMEOUT"));
    }

    #[test]
    fn test_recovered_message() {
        let msg = endpoint_recovered_message(&sample_endpoint());
        assert!(msg.contains("RECOVERED"));
    }
}
