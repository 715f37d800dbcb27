//! Pipeline orchestrator: source → formatter → staging/load/merge → analytics → report.
//!
//! ## Run modes
//!
//! `run_latest()`, daily mode (cron use):
//!   fetches yesterday (UTC) for every ticker, runs one load-merge cycle for
//!   that date, rebuilds the analytics table once.
//!
//! `run_range()`, backfill:
//!   fetches an inclusive date window, runs one load-merge cycle per date in
//!   the order the dates first appear, then rebuilds the analytics table once.
//!
//! Both are idempotent: re-running a date updates rows in place (MERGE on
//! ticker_id + date). Every run ends in exactly one reported outcome. On
//! failure the error is reported and then returned; dates merged before the
//! failure stay merged.

use crate::error::EtlError;
use crate::formatter::{format_flat, format_grouped};
use crate::loader::WarehouseLoader;
use crate::models::{FormattedRecord, OutcomePayload};
use crate::report::OutcomeReporter;
use crate::source::{fetch_window, yesterday_utc, FetchOutcome, PriceSource};
use crate::transform::AnalyticsTransformer;
use anyhow::Result;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use std::sync::Arc;
use tracing::{error, info, info_span, warn, Instrument};

pub const MODE_LATEST: &str = "etl";
pub const MODE_RANGE: &str = "etl_range";

pub const SKIP_REASON: &str = "No stock data fetched (possibly holiday). ETL skipped.";

pub struct Pipeline {
    source: Arc<dyn PriceSource>,
    loader: WarehouseLoader,
    transformer: AnalyticsTransformer,
    reporter: OutcomeReporter,
    clock: fn() -> DateTime<Utc>,
}

impl Pipeline {
    pub fn new(
        source: Arc<dyn PriceSource>,
        loader: WarehouseLoader,
        transformer: AnalyticsTransformer,
        reporter: OutcomeReporter,
    ) -> Self {
        Self {
            source,
            loader,
            transformer,
            reporter,
            clock: Utc::now,
        }
    }

    /// Replace the wall clock, e.g. to pin "yesterday" in tests.
    pub fn with_clock(mut self, clock: fn() -> DateTime<Utc>) -> Self {
        self.clock = clock;
        self
    }

    pub async fn run_latest(&self, tickers: &[String]) -> Result<()> {
        let now = (self.clock)();
        let span = info_span!("run", mode = MODE_LATEST);
        self.finish(MODE_LATEST, now, self.latest(tickers, now).instrument(span).await)
            .await
    }

    pub async fn run_range(&self, tickers: &[String], start: NaiveDate, end: NaiveDate) -> Result<()> {
        let now = (self.clock)();
        let span = info_span!("run", mode = MODE_RANGE, %start, %end);
        self.finish(MODE_RANGE, now, self.range(tickers, start, end, now).instrument(span).await)
            .await
    }

    /// Report whatever the run produced; errors are reported, then returned.
    /// `started` is read once per run and stamps every payload, errors included.
    async fn finish(&self, mode: &str, started: DateTime<Utc>, outcome: Result<OutcomePayload>) -> Result<()> {
        match outcome {
            Ok(payload) => {
                self.reporter.report(&payload).await;
                Ok(())
            }
            Err(e) => {
                error!("ETL run (mode: {}) failed: {:#}", mode, e);
                let payload = OutcomePayload::error(mode, &run_timestamp(started), &e);
                self.reporter.report(&payload).await;
                Err(e)
            }
        }
    }

    // ── Modes ─────────────────────────────────────────────────────────────────

    async fn latest(&self, tickers: &[String], now: DateTime<Utc>) -> Result<OutcomePayload> {
        let ts = &run_timestamp(now);
        let day = yesterday_utc(now);
        info!("=== Fetching {} tickers for {} ===", tickers.len(), day);

        let fetched = fetch_window(self.source.as_ref(), tickers, day, day).await;
        log_failures(&fetched, tickers.len());
        if fetched.is_empty() {
            info!("{}", SKIP_REASON);
            return Ok(OutcomePayload::skip(MODE_LATEST, ts, SKIP_REASON));
        }

        let (records, first_date) = format_flat(&fetched.records, now);
        let Some(date) = first_date else {
            return Ok(OutcomePayload::skip(MODE_LATEST, ts, SKIP_REASON));
        };
        ensure_single_date(&records)?;

        info!("=== Loading {} records for {} ===", records.len(), date);
        self.loader.load_merge_cleanup(&date, &records)?;

        info!("=== Rebuilding analytics ===");
        self.transformer.rebuild()?;

        Ok(OutcomePayload::success(
            MODE_LATEST,
            ts,
            format!("ETL run (mode: {}) completed successfully.", MODE_LATEST),
        ))
    }

    async fn range(
        &self,
        tickers: &[String],
        start: NaiveDate,
        end: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<OutcomePayload> {
        if start > end {
            return Err(EtlError::InvalidDateRange {
                start: start.to_string(),
                end: end.to_string(),
            }
            .into());
        }
        let ts = &run_timestamp(now);
        info!("=== Fetching {} tickers for {} ~ {} ===", tickers.len(), start, end);

        let fetched = fetch_window(self.source.as_ref(), tickers, start, end).await;
        log_failures(&fetched, tickers.len());
        if fetched.is_empty() {
            info!("{}", SKIP_REASON);
            return Ok(OutcomePayload::skip(MODE_RANGE, ts, SKIP_REASON));
        }

        let batch = format_grouped(&fetched.records, now);
        info!("=== Loading {} records across {} dates ===", batch.record_count(), batch.len());

        for (i, (date, records)) in batch.iter().enumerate() {
            info!("[{}/{}] {}: {} records", i + 1, batch.len(), date, records.len());
            self.loader.load_merge_cleanup(date, records)?;
        }

        info!("=== Rebuilding analytics ===");
        self.transformer.rebuild()?;

        Ok(OutcomePayload::success(
            MODE_RANGE,
            ts,
            format!("ETL completed for {} date(s).", batch.len()),
        ))
    }
}

fn run_timestamp(now: DateTime<Utc>) -> String {
    now.to_rfc3339_opts(SecondsFormat::Secs, false)
}

fn log_failures(fetched: &FetchOutcome, requested: usize) {
    if fetched.failures.is_empty() {
        return;
    }
    let names: Vec<&str> = fetched.failures.iter().map(|f| f.ticker.as_str()).collect();
    warn!(
        "{} of {} tickers failed to fetch: {}",
        fetched.failures.len(),
        requested,
        names.join(", ")
    );
}

/// A single-day run stages everything under one date; refuse to do that when
/// the provider handed back bars for more than one day.
fn ensure_single_date(records: &[FormattedRecord]) -> Result<(), EtlError> {
    let mut dates: Vec<String> = Vec::new();
    for r in records {
        if !dates.contains(&r.date) {
            dates.push(r.date.clone());
        }
    }
    if dates.len() > 1 {
        return Err(EtlError::MixedDates(dates));
    }
    Ok(())
}
