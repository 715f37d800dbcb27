use crate::models::FormattedRecord;
use crate::storage::{fact_object_path, ObjectStore, NDJSON_CONTENT_TYPE};
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{debug, info};

/// Writes one date's formatted records to `fact/stock_prices_<date>.ndjson`.
pub struct StagingWriter {
    store: Arc<dyn ObjectStore>,
}

impl StagingWriter {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// Returns the object path for `date`. Nothing is written when `records` is
    /// empty; an existing object for the same date is overwritten.
    pub fn write(&self, date: &str, records: &[FormattedRecord]) -> Result<String> {
        let path = fact_object_path(date);
        if records.is_empty() {
            debug!("[{}] nothing to stage", date);
            return Ok(path);
        }

        let body = to_ndjson(records)?;
        self.store
            .put(&path, body.as_bytes(), NDJSON_CONTENT_TYPE)
            .with_context(|| format!("staging {} failed", self.store.uri(&path)))?;

        info!("[{}] staged {} records to {}", date, records.len(), self.store.uri(&path));
        Ok(path)
    }
}

/// One JSON object per line, no trailing newline.
pub fn to_ndjson(records: &[FormattedRecord]) -> Result<String> {
    let lines = records
        .iter()
        .map(serde_json::to_string)
        .collect::<serde_json::Result<Vec<_>>>()
        .context("serialising records")?;
    Ok(lines.join("\n"))
}
