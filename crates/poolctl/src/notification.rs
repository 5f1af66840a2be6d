//! Human-readable notifications.
//!
//! Notifications are fire-and-forget: a failed delivery is logged and never
//! reaches the control loop.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use reqwest::header::HeaderMap;
use serde_json::json;
use tracing::{debug, info, warn};

/// Maximum number of retries for rate-limited webhook requests.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Discord caps message content at 2000 characters.
const DISCORD_MAX_CONTENT: usize = 2000;

pub trait Notifier: Send + Sync {
    /// Queues `message` for delivery and returns immediately.
    fn notify(&self, message: String);
}

/// Writes notifications to the log only.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, message: String) {
        info!(target: "poolctl::notification", "{message}");
    }
}

/// Discord webhook configuration.
#[derive(Debug, Clone)]
pub struct DiscordConfig {
    pub webhook_url: String,
    /// Optional username for the webhook.
    pub username: Option<String>,
}

/// Posts notifications to a Discord webhook and mirrors them to the log.
pub struct DiscordNotifier {
    inner: Arc<DiscordChannel>,
}

struct DiscordChannel {
    config: DiscordConfig,
    client: Client,
}

impl DiscordNotifier {
    /// `client` should come from [`crate::client::build_client`] so a stalled
    /// webhook is bounded by the request timeout.
    pub fn new(client: Client, config: DiscordConfig) -> Self {
        Self {
            inner: Arc::new(DiscordChannel { config, client }),
        }
    }
}

impl Notifier for DiscordNotifier {
    fn notify(&self, message: String) {
        info!(target: "poolctl::notification", "{message}");
        let channel = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let payload = channel.build_payload(&message);
            if let Err(e) = channel.send_with_retry(&payload).await {
                warn!(error = %e, "Discord notification failed");
            }
        });
    }
}

impl DiscordChannel {
    fn build_payload(&self, message: &str) -> serde_json::Value {
        let content: String = message.chars().take(DISCORD_MAX_CONTENT).collect();
        let mut payload = json!({ "content": content });
        if let Some(username) = &self.config.username {
            payload["username"] = json!(username);
        }
        payload
    }

    /// Retries on 429 responses respecting the Retry-After header.
    async fn send_with_retry(&self, payload: &serde_json::Value) -> crate::Result<()> {
        let mut attempts = 0;

        loop {
            attempts += 1;

            let response = self
                .client
                .post(&self.config.webhook_url)
                .json(payload)
                .send()
                .await?;

            let status = response.status();
            if status.is_success() {
                return Ok(());
            }

            if status.as_u16() == 429 && attempts < MAX_RATE_LIMIT_RETRIES {
                let wait = parse_retry_after(response.headers()).unwrap_or(Duration::from_secs(1));
                debug!(
                    "Discord rate limited (429), waiting {:?} before retry (attempt {}/{})",
                    wait, attempts, MAX_RATE_LIMIT_RETRIES
                );
                tokio::time::sleep(wait).await;
                continue;
            }

            let body = response.text().await.unwrap_or_default();
            return Err(crate::PoolError::http_status(
                status,
                self.config.webhook_url.clone(),
                body,
            ));
        }
    }
}

fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    ["Retry-After", "X-RateLimit-Reset-After"]
        .iter()
        .filter_map(|name| headers.get(*name))
        .filter_map(|value| value.to_str().ok()?.parse::<f64>().ok())
        .find_map(|secs| Duration::try_from_secs_f64(secs).ok())
}

#[cfg(test)]
mod tests {
    use reqwest::header::HeaderValue;
    use wiremock::matchers::path;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::config::HttpClientConfig;
    use crate::test_support::{base_url, request_targets, respond, test_client};

    fn notifier(server: &MockServer, client: Client) -> DiscordNotifier {
        DiscordNotifier::new(
            client,
            DiscordConfig {
                webhook_url: base_url(server).join("webhook").unwrap().to_string(),
                username: None,
            },
        )
    }

    #[test]
    fn payload_carries_username_and_truncates() {
        let notifier = DiscordNotifier::new(
            test_client(),
            DiscordConfig {
                webhook_url: "https://example.com/webhook".to_owned(),
                username: Some("poolctl".to_owned()),
            },
        );
        let payload = notifier.inner.build_payload(&"x".repeat(3000));
        assert_eq!(payload["username"], "poolctl");
        assert_eq!(payload["content"].as_str().unwrap().len(), DISCORD_MAX_CONTENT);
    }

    #[test]
    fn retry_after_ignores_unrepresentable_values() {
        let mut headers = HeaderMap::new();
        headers.insert("Retry-After", HeaderValue::from_static("1e30"));
        headers.insert("X-RateLimit-Reset-After", HeaderValue::from_static("0.5"));
        assert_eq!(parse_retry_after(&headers), Some(Duration::from_millis(500)));

        headers.remove("X-RateLimit-Reset-After");
        assert_eq!(parse_retry_after(&headers), None);

        headers.insert("Retry-After", HeaderValue::from_static("-3"));
        assert_eq!(parse_retry_after(&headers), None);
    }

    #[tokio::test]
    async fn webhook_error_is_reported_not_raised() {
        let server = MockServer::start().await;
        respond(&server, "/webhook", 400, "bad request").await;

        let notifier = notifier(&server, test_client());
        let err = notifier
            .inner
            .send_with_retry(&json!({ "content": "hi" }))
            .await
            .unwrap_err();
        assert!(matches!(err, crate::PoolError::HttpStatus { .. }));

        // Fire-and-forget path does not panic or block.
        notifier.notify("Started **1** streams".to_owned());
        for _ in 0..50 {
            if request_targets(&server).await.len() >= 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(request_targets(&server).await.len(), 2);
    }

    #[tokio::test]
    async fn rate_limited_webhook_is_retried_a_bounded_number_of_times() {
        let server = MockServer::start().await;
        Mock::given(path("/webhook"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "0"))
            .mount(&server)
            .await;

        let err = notifier(&server, test_client())
            .inner
            .send_with_retry(&json!({ "content": "hi" }))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            crate::PoolError::HttpStatus { status, .. } if status.as_u16() == 429
        ));
        assert_eq!(request_targets(&server).await.len(), MAX_RATE_LIMIT_RETRIES as usize);
    }

    #[tokio::test]
    async fn stalled_webhook_is_bounded_by_client_timeout() {
        let server = MockServer::start().await;
        Mock::given(path("/webhook"))
            .respond_with(ResponseTemplate::new(204).set_delay(Duration::from_secs(30)))
            .mount(&server)
            .await;

        let client = crate::client::build_client(&HttpClientConfig {
            timeout: Duration::from_millis(200),
            ..Default::default()
        })
        .unwrap();
        let sent = tokio::time::timeout(
            Duration::from_secs(5),
            notifier(&server, client)
                .inner
                .send_with_retry(&json!({ "content": "hi" })),
        )
        .await
        .expect("send should give up at the client timeout");
        assert!(matches!(sent, Err(crate::PoolError::Network { .. })));
    }
}
