use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ── Raw price record ──────────────────────────────────────────────────────────

/// One daily bar as the price provider reports it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RawPriceRecord {
    pub ticker: String,
    /// ISO-8601 date-time in the exchange's local offset, e.g. "2025-08-01T09:30:00-04:00".
    pub date: String,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: i64,
}

// ── Formatted record (fact table row) ─────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FormattedRecord {
    pub ticker_id: String,
    pub date: String,
    pub open_price: f64,
    pub high_price: f64,
    pub low_price: f64,
    pub close_price: f64,
    pub volume: i64,
    pub created_at: String, // "YYYY-MM-DD HH:MM:SS", UTC+9
}

// ── Dated batch ───────────────────────────────────────────────────────────────

/// Formatted records grouped by date, iterating in first-seen key order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DatedBatch {
    groups: Vec<(String, Vec<FormattedRecord>)>,
    index: HashMap<String, usize>,
}

impl DatedBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record under its own `date` key.
    pub fn push(&mut self, record: FormattedRecord) {
        match self.index.get(&record.date) {
            Some(&i) => self.groups[i].1.push(record),
            None => {
                self.index.insert(record.date.clone(), self.groups.len());
                self.groups.push((record.date.clone(), vec![record]));
            }
        }
    }

    pub fn get(&self, date: &str) -> Option<&[FormattedRecord]> {
        self.index.get(date).map(|&i| self.groups[i].1.as_slice())
    }

    pub fn dates(&self) -> impl Iterator<Item = &str> {
        self.groups.iter().map(|(d, _)| d.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[FormattedRecord])> {
        self.groups.iter().map(|(d, r)| (d.as_str(), r.as_slice()))
    }

    /// Number of distinct dates.
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn record_count(&self) -> usize {
        self.groups.iter().map(|(_, r)| r.len()).sum()
    }
}

// ── Outcome payload ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    Success,
    Skip,
    Error,
}

impl OutcomeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeStatus::Success => "success",
            OutcomeStatus::Skip => "skip",
            OutcomeStatus::Error => "error",
        }
    }
}

/// Terminal outcome of one pipeline run, persisted and notified once.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutcomePayload {
    pub status: OutcomeStatus,
    pub mode: String,
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub traceback: Option<String>,
}

impl OutcomePayload {
    pub fn success(mode: &str, timestamp: &str, message: impl Into<String>) -> Self {
        Self {
            status: OutcomeStatus::Success,
            mode: mode.to_string(),
            timestamp: timestamp.to_string(),
            message: Some(message.into()),
            error_message: None,
            traceback: None,
        }
    }

    pub fn skip(mode: &str, timestamp: &str, reason: impl Into<String>) -> Self {
        Self {
            status: OutcomeStatus::Skip,
            mode: mode.to_string(),
            timestamp: timestamp.to_string(),
            message: Some(reason.into()),
            error_message: None,
            traceback: None,
        }
    }

    pub fn error(mode: &str, timestamp: &str, err: &anyhow::Error) -> Self {
        Self {
            status: OutcomeStatus::Error,
            mode: mode.to_string(),
            timestamp: timestamp.to_string(),
            message: Some(format!("ETL run (mode: {}) failed.", mode)),
            error_message: Some(format!("{:#}", err)),
            traceback: Some(format!("{:?}", err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(ticker: &str, date: &str) -> FormattedRecord {
        FormattedRecord {
            ticker_id: ticker.to_string(),
            date: date.to_string(),
            open_price: 1.0,
            high_price: 1.0,
            low_price: 1.0,
            close_price: 1.0,
            volume: 1,
            created_at: "2025-08-02 09:00:00".to_string(),
        }
    }

    #[test]
    fn test_dated_batch_keeps_first_seen_order() {
        let mut batch = DatedBatch::new();
        batch.push(record("AAPL", "2025-08-04"));
        batch.push(record("AAPL", "2025-08-01"));
        batch.push(record("MSFT", "2025-08-04"));

        assert_eq!(batch.dates().collect::<Vec<_>>(), vec!["2025-08-04", "2025-08-01"]);
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.record_count(), 3);
        let tickers: Vec<_> = batch
            .get("2025-08-04")
            .unwrap()
            .iter()
            .map(|r| r.ticker_id.as_str())
            .collect();
        assert_eq!(tickers, vec!["AAPL", "MSFT"]);
    }

    #[test]
    fn test_outcome_payload_serialises_status_lowercase() {
        let payload = OutcomePayload::skip("etl", "2025-08-02T00:00:00Z", "holiday");
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["status"], "skip");
        assert!(json.get("error_message").is_none());
    }
}
