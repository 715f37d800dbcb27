pub mod yahoo;

use crate::models::RawPriceRecord;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Days, NaiveDate, Utc};
use tracing::{error, info};

pub use self::yahoo::YahooChartSource;

// ── Source trait ──────────────────────────────────────────────────────────────

/// Swappable daily price provider.
#[async_trait]
pub trait PriceSource: Send + Sync {
    fn name(&self) -> &str;

    /// Daily bars for `ticker` with dates in `[start, end]`, both inclusive.
    /// An empty vec means the market was closed or the provider has nothing.
    async fn fetch_ticker(&self, ticker: &str, start: NaiveDate, end: NaiveDate)
        -> Result<Vec<RawPriceRecord>>;
}

// ── Window fetch ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct TickerFailure {
    pub ticker: String,
    pub message: String,
}

/// Records from every ticker that answered, plus the tickers that failed.
#[derive(Debug, Default)]
pub struct FetchOutcome {
    pub records: Vec<RawPriceRecord>,
    pub failures: Vec<TickerFailure>,
}

impl FetchOutcome {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// The calendar day before `now`, in UTC.
pub fn yesterday_utc(now: DateTime<Utc>) -> NaiveDate {
    let today = now.date_naive();
    today.checked_sub_days(Days::new(1)).unwrap_or(today)
}

fn date_label(start: NaiveDate, end: NaiveDate) -> String {
    if start == end {
        start.to_string()
    } else {
        format!("{} ~ {}", start, end)
    }
}

/// Query every ticker independently. A failing ticker is logged and recorded in
/// `failures`; it never aborts the others.
pub async fn fetch_window(
    source: &dyn PriceSource,
    tickers: &[String],
    start: NaiveDate,
    end: NaiveDate,
) -> FetchOutcome {
    let label = date_label(start, end);
    let mut outcome = FetchOutcome::default();

    for ticker in tickers {
        info!("[{}] fetching {} from {}", ticker, label, source.name());

        match source.fetch_ticker(ticker, start, end).await {
            Ok(records) if records.is_empty() => {
                info!("[{}] no data for {}", ticker, label);
            }
            Ok(records) => {
                info!("[{}] {} rows for {}", ticker, records.len(), label);
                outcome.records.extend(records);
            }
            Err(e) => {
                error!("[{}] fetch failed for {}: {:#}", ticker, label, e);
                outcome.failures.push(TickerFailure {
                    ticker: ticker.clone(),
                    message: format!("{:#}", e),
                });
            }
        }
    }

    outcome
}
