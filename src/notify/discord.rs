// src/notify/discord.rs
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;

use crate::error::TransportError;
use crate::stream::transport::Publisher;

/// Posts alerts to a Discord-compatible webhook as a single embed.
#[derive(Clone)]
pub struct WebhookPublisher {
    webhook: String,
    client: Client,
    timeout: Duration,
    max_retries: u8,
    base_backoff: Duration,
}

impl std::fmt::Debug for WebhookPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // the webhook URL carries a secret token
        f.debug_struct("WebhookPublisher")
            .field("timeout", &self.timeout)
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

impl WebhookPublisher {
    pub fn new(webhook: String) -> Self {
        Self {
            webhook,
            client: Client::new(),
            timeout: Duration::from_secs(5),
            max_retries: 3,
            base_backoff: Duration::from_millis(500),
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    pub fn with_retries(mut self, retries: u8) -> Self {
        self.max_retries = retries.max(1);
        self
    }

    pub fn with_backoff(mut self, base: Duration) -> Self {
        self.base_backoff = base;
        self
    }

    pub async fn send_alert(&self, alert: &Value) -> Result<()> {
        let payload = WebhookPayload::from_alert(alert);

        let mut attempt: u8 = 0;
        loop {
            attempt += 1;
            let res = self
                .client
                .post(&self.webhook)
                .timeout(self.timeout)
                .json(&payload)
                .send()
                .await;

            let err = match res {
                Ok(rsp) => match rsp.error_for_status_ref() {
                    Ok(_) => return Ok(()),
                    Err(e) => anyhow!("webhook HTTP error: {e}"),
                },
                Err(e) => anyhow!("webhook request failed: {e}"),
            };

            if attempt >= self.max_retries {
                return Err(err);
            }
            tracing::debug!(target: "notify", attempt, error = %err, "webhook attempt failed; retrying");
            tokio::time::sleep(self.base_backoff * (1u32 << (attempt - 1))).await;
        }
    }
}

#[async_trait]
impl Publisher for WebhookPublisher {
    async fn publish(
        &self,
        _topic: &str,
        _key: Option<&str>,
        value: &Value,
    ) -> Result<(), TransportError> {
        self.send_alert(value)
            .await
            .map_err(|e| TransportError::Transient(format!("{e:#}")))
    }

    fn name(&self) -> &'static str {
        "webhook"
    }
}

#[derive(Debug, Serialize)]
struct WebhookEmbed {
    title: String,
    description: String,
}

#[derive(Debug, Serialize)]
struct WebhookPayload {
    content: Option<String>,
    embeds: Vec<WebhookEmbed>,
}

impl WebhookPayload {
    fn from_alert(alert: &Value) -> Self {
        let text = |k: &str| alert.get(k).and_then(Value::as_str).unwrap_or("");
        let num = |k: &str| alert.get(k).and_then(Value::as_f64).unwrap_or(0.0);

        let (title, description) = match text("type") {
            "viral" => (
                "Viral post detected".to_string(),
                format!(
                    "**{}**\n**Viral score:** {:.3}\n**Score:** {}\n**Source:** {}\n{}",
                    text("title"),
                    num("viral_score"),
                    alert.get("score").and_then(Value::as_i64).unwrap_or(0),
                    text("source"),
                    text("url"),
                ),
            ),
            "sentiment_spike" => (
                format!("Sentiment spike ({})", text("label")),
                format!(
                    "**{}**\n**Sentiment:** {:+.3}\n**Source:** {}",
                    text("title"),
                    num("sentiment"),
                    text("source"),
                ),
            ),
            other => (format!("Alert: {other}"), alert.to_string()),
        };

        Self {
            content: None,
            embeds: vec![WebhookEmbed {
                title,
                description: format!("{description}\n**Time (UTC):** {}", text("timestamp")),
            }],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn viral_alert_renders_one_embed() {
        let p = WebhookPayload::from_alert(&json!({
            "type": "viral",
            "title": "Rust 2.0 announced",
            "viral_score": 0.8512,
            "score": 3100,
            "source": "reddit",
            "url": "https://example.com/x",
            "timestamp": "2025-01-01T00:00:00Z"
        }));
        assert!(p.content.is_none());
        assert_eq!(p.embeds.len(), 1);
        assert_eq!(p.embeds[0].title, "Viral post detected");
        let d = &p.embeds[0].description;
        assert!(d.contains("0.851"));
        assert!(d.contains("3100"));
        assert!(d.contains("2025-01-01T00:00:00Z"));
    }

    #[test]
    fn spike_alert_shows_signed_sentiment() {
        let p = WebhookPayload::from_alert(&json!({
            "type": "sentiment_spike",
            "title": "Outage",
            "sentiment": -0.91,
            "label": "negative",
            "source": "hackernews",
            "timestamp": "t"
        }));
        assert_eq!(p.embeds[0].title, "Sentiment spike (negative)");
        assert!(p.embeds[0].description.contains("-0.910"));
    }

    #[test]
    fn debug_hides_webhook_url() {
        let w = WebhookPublisher::new("https://discord.test/api/webhooks/secret".into());
        assert!(!format!("{w:?}").contains("secret"));
    }
}
