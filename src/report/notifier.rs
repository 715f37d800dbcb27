use crate::config::NotifyConfig;
use crate::models::OutcomeStatus;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const SUCCESS_COLOR: &str = "#2eb886";
const ERROR_COLOR: &str = "#ff0000";

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, text: &str, status: OutcomeStatus) -> Result<()>;
}

// ── Slack incoming webhook ────────────────────────────────────────────────────

pub struct SlackWebhookNotifier {
    client: reqwest::Client,
    webhook_url: String,
    title: String,
}

impl SlackWebhookNotifier {
    pub fn new(webhook_url: impl Into<String>, title: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("Failed to build webhook client")?;
        Ok(Self {
            client,
            webhook_url: webhook_url.into(),
            title: title.into(),
        })
    }

    pub fn payload(&self, text: &str, status: OutcomeStatus) -> serde_json::Value {
        let color = match status {
            OutcomeStatus::Error => ERROR_COLOR,
            OutcomeStatus::Success | OutcomeStatus::Skip => SUCCESS_COLOR,
        };
        json!({
            "attachments": [{
                "fallback": text,
                "color": color,
                "fields": [{
                    "title": self.title,
                    "value": text,
                    "short": false,
                }],
            }]
        })
    }
}

#[async_trait]
impl Notifier for SlackWebhookNotifier {
    async fn send(&self, text: &str, status: OutcomeStatus) -> Result<()> {
        self.client
            .post(&self.webhook_url)
            .json(&self.payload(text, status))
            .send()
            .await
            .context("Slack webhook request failed")?
            .error_for_status()
            .context("Slack webhook rejected the message")?;

        debug!("Slack notification sent");
        Ok(())
    }
}

/// Used when no webhook is configured.
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn send(&self, text: &str, _status: OutcomeStatus) -> Result<()> {
        debug!("No webhook configured, dropping notification: {}", text);
        Ok(())
    }
}

pub fn notifier_from_config(config: &NotifyConfig) -> Result<Arc<dyn Notifier>> {
    match config.webhook_url.as_deref().filter(|u| !u.trim().is_empty()) {
        Some(url) => Ok(Arc::new(SlackWebhookNotifier::new(url, &config.title)?)),
        None => {
            warn!("notify.webhook_url is not set; run outcomes will only be logged");
            Ok(Arc::new(NoopNotifier))
        }
    }
}
