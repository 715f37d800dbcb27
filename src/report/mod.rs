//! Terminal outcome of a run: persisted as JSON to the bucket, then pushed to
//! the notification channel. Neither step can fail the run.

pub mod notifier;

use crate::models::{OutcomePayload, OutcomeStatus};
use crate::storage::{log_object_path, ObjectStore, JSON_CONTENT_TYPE};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{error, info};

pub use notifier::{notifier_from_config, NoopNotifier, Notifier, SlackWebhookNotifier};

pub struct OutcomeReporter {
    store: Arc<dyn ObjectStore>,
    notifier: Arc<dyn Notifier>,
}

impl OutcomeReporter {
    pub fn new(store: Arc<dyn ObjectStore>, notifier: Arc<dyn Notifier>) -> Self {
        Self { store, notifier }
    }

    pub async fn report(&self, payload: &OutcomePayload) {
        match self.persist(payload) {
            Ok(path) => info!("Run log saved to {}", self.store.uri(&path)),
            Err(e) => error!("Failed to save run log: {:#}", e),
        }

        let text = format_message(payload);
        if let Err(e) = self.notifier.send(&text, payload.status).await {
            error!("Failed to send notification: {:#}", e);
        }
    }

    /// Writes `logs/<YYYY-MM-DD_HHMMSS>_<status>.json` stamped with the
    /// payload's own timestamp.
    pub fn persist(&self, payload: &OutcomePayload) -> Result<String> {
        let at = DateTime::parse_from_rfc3339(&payload.timestamp)
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());
        let path = log_object_path(at, payload.status.as_str());
        let body = serde_json::to_vec_pretty(payload).context("serialising outcome")?;
        self.store.put(&path, &body, JSON_CONTENT_TYPE)?;
        Ok(path)
    }
}

pub fn format_message(payload: &OutcomePayload) -> String {
    let icon = match payload.status {
        OutcomeStatus::Success => "✅",
        OutcomeStatus::Skip => "⏭️",
        OutcomeStatus::Error => "❌",
    };

    let mut lines = vec![
        format!("{} {}", icon, payload.message.as_deref().unwrap_or("(no message)")),
        format!("mode: {}", payload.mode),
        format!("timestamp: {}", payload.timestamp),
    ];
    if payload.status == OutcomeStatus::Error {
        lines.push(format!(
            "error: {}",
            payload.error_message.as_deref().unwrap_or("(no details)")
        ));
    }
    lines.join("\n")
}
