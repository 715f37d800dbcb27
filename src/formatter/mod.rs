//! Raw provider records → fact-table rows.

use crate::models::{DatedBatch, FormattedRecord, RawPriceRecord};
use chrono::{DateTime, TimeDelta, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tracing::{debug, info};

const JST_OFFSET_HOURS: i64 = 9;

// ── Field helpers ─────────────────────────────────────────────────────────────

/// `created_at` stamp: `now` rendered in UTC+9 as "YYYY-MM-DD HH:MM:SS".
pub fn created_at_stamp(now: DateTime<Utc>) -> String {
    (now.naive_utc() + TimeDelta::hours(JST_OFFSET_HOURS))
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}

/// First 10 characters of the provider's date field. Time of day is discarded.
pub fn date_prefix(s: &str) -> String {
    s.chars().take(10).collect()
}

fn price(d: Decimal) -> f64 {
    d.to_f64().unwrap_or(f64::NAN)
}

pub fn format_record(raw: &RawPriceRecord, created_at: &str) -> FormattedRecord {
    FormattedRecord {
        ticker_id: raw.ticker.clone(),
        date: date_prefix(&raw.date),
        open_price: price(raw.open),
        high_price: price(raw.high),
        low_price: price(raw.low),
        close_price: price(raw.close),
        volume: raw.volume,
        created_at: created_at.to_string(),
    }
}

// ── Batch formatting ──────────────────────────────────────────────────────────

/// Format a single-day fetch. The returned date is the first record's date as-is;
/// it is not checked against the other records.
pub fn format_flat(raw: &[RawPriceRecord], now: DateTime<Utc>) -> (Vec<FormattedRecord>, Option<String>) {
    info!("Formatting {} records", raw.len());
    let created_at = created_at_stamp(now);

    let records: Vec<FormattedRecord> = raw
        .iter()
        .map(|r| {
            let f = format_record(r, &created_at);
            debug!("[{}] formatted {}", f.ticker_id, f.date);
            f
        })
        .collect();
    let first_date = records.first().map(|r| r.date.clone());

    (records, first_date)
}

/// Format a range fetch, grouping by each record's own date in first-seen order.
pub fn format_grouped(raw: &[RawPriceRecord], now: DateTime<Utc>) -> DatedBatch {
    let created_at = created_at_stamp(now);
    let mut batch = DatedBatch::new();

    for r in raw {
        batch.push(format_record(r, &created_at));
    }

    for (date, records) in batch.iter() {
        info!("[{}] formatted {} records", date, records.len());
    }
    batch
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal::prelude::FromPrimitive;

    fn raw(ticker: &str, date: &str, close: f64, volume: i64) -> RawPriceRecord {
        RawPriceRecord {
            ticker: ticker.to_string(),
            date: date.to_string(),
            open: Decimal::from_f64(100.0).unwrap(),
            high: Decimal::from_f64(110.5).unwrap(),
            low: Decimal::from_f64(90.25).unwrap(),
            close: Decimal::from_f64(close).unwrap(),
            volume,
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 8, 1, 23, 30, 5).unwrap()
    }

    #[test]
    fn test_created_at_is_rendered_in_jst() {
        assert_eq!(created_at_stamp(now()), "2025-08-02 08:30:05");
    }

    #[test]
    fn test_format_flat_one_row_per_input() {
        let input = vec![
            raw("AAPL", "2025-08-01T09:30:00-04:00", 105.0, 100_000),
            raw("7203.T", "2025-08-01T09:00:00+09:00", 2500.5, 7),
        ];
        let (records, first) = format_flat(&input, now());

        assert_eq!(records.len(), 2);
        assert_eq!(first.as_deref(), Some("2025-08-01"));
        let r = &records[0];
        assert_eq!(r.ticker_id, "AAPL");
        assert_eq!(r.date, "2025-08-01");
        assert_eq!(r.open_price, 100.0);
        assert_eq!(r.high_price, 110.5);
        assert_eq!(r.low_price, 90.25);
        assert_eq!(r.close_price, 105.0);
        assert_eq!(r.volume, 100_000);
        assert_eq!(r.created_at, "2025-08-02 08:30:05");
        assert_eq!(records[1].close_price, 2500.5);
    }

    #[test]
    fn test_format_flat_first_date_is_not_sorted() {
        let input = vec![
            raw("AAPL", "2025-08-04", 1.0, 1),
            raw("AAPL", "2025-08-01", 1.0, 1),
        ];
        let (_, first) = format_flat(&input, now());
        assert_eq!(first.as_deref(), Some("2025-08-04"));

        let (records, first) = format_flat(&[], now());
        assert!(records.is_empty());
        assert!(first.is_none());
    }

    #[test]
    fn test_format_grouped_groups_by_date_prefix() {
        let input = vec![
            raw("AAPL", "2025-08-04T09:30:00-04:00", 1.0, 1),
            raw("AAPL", "2025-08-01T09:30:00-04:00", 2.0, 1),
            raw("MSFT", "2025-08-04T16:00:00-04:00", 3.0, 1),
            raw("MSFT", "2025-08-01", 4.0, 1),
        ];
        let batch = format_grouped(&input, now());

        assert_eq!(batch.dates().collect::<Vec<_>>(), vec!["2025-08-04", "2025-08-01"]);
        assert_eq!(batch.record_count(), input.len());
        for (date, records) in batch.iter() {
            assert!(records.iter().all(|r| r.date == date));
        }
        let closes: Vec<f64> = batch
            .get("2025-08-01")
            .unwrap()
            .iter()
            .map(|r| r.close_price)
            .collect();
        assert_eq!(closes, vec![2.0, 4.0]);
    }
}
