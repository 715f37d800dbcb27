use super::PriceSource;
use crate::config::SourceConfig;
use crate::error::EtlError;
use crate::models::RawPriceRecord;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Days, FixedOffset, NaiveDate, NaiveTime};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;
use url::Url;

// ── Chart API response ────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ChartEnvelope {
    chart: ChartBody,
}

#[derive(Debug, Deserialize)]
struct ChartBody {
    #[serde(default)]
    result: Option<Vec<ChartResult>>,
    #[serde(default)]
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    meta: ChartMeta,
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct ChartMeta {
    #[serde(default)]
    gmtoffset: i32,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    #[serde(default)]
    quote: Vec<Quote>,
}

#[derive(Debug, Default, Deserialize)]
struct Quote {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<f64>>,
}

// ── Client ────────────────────────────────────────────────────────────────────

/// Daily bars from the Yahoo Finance v8 chart endpoint.
pub struct YahooChartSource {
    client: reqwest::Client,
    base_url: Url,
}

impl YahooChartSource {
    pub fn new(config: &SourceConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_secs))
            .gzip(true)
            // Yahoo sets a consent cookie on first contact
            .cookie_store(true)
            .build()
            .context("Failed to build HTTP client")?;

        let base_url = Url::parse(&config.base_url)
            .with_context(|| format!("Invalid source base_url {}", config.base_url))?;

        Ok(Self { client, base_url })
    }

    /// `…/v8/finance/chart/<ticker>?period1=…&period2=…&interval=1d`.
    /// `period2` is exclusive upstream, so it is set to the day after `end`.
    pub fn chart_url(&self, ticker: &str, start: NaiveDate, end: NaiveDate) -> Result<Url> {
        let end_exclusive = end
            .checked_add_days(Days::new(1))
            .ok_or_else(|| anyhow!("end date {} out of range", end))?;
        let period1 = start.and_time(NaiveTime::MIN).and_utc().timestamp();
        let period2 = end_exclusive.and_time(NaiveTime::MIN).and_utc().timestamp();

        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow!("base_url cannot be a base: {}", self.base_url))?
            .pop_if_empty()
            .extend(["v8", "finance", "chart", ticker]);
        url.query_pairs_mut()
            .append_pair("period1", &period1.to_string())
            .append_pair("period2", &period2.to_string())
            .append_pair("interval", "1d")
            .append_pair("events", "history");
        Ok(url)
    }
}

#[async_trait]
impl PriceSource for YahooChartSource {
    fn name(&self) -> &str {
        "yahoo"
    }

    async fn fetch_ticker(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<RawPriceRecord>> {
        let url = self.chart_url(ticker, start, end)?;
        debug!("GET {}", url);

        let resp = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("Request failed for {}", ticker))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .context("Failed to read response body")?;

        if !status.is_success() {
            // 404 carries a chart.error body for unknown symbols
            let detail = serde_json::from_str::<ChartEnvelope>(&body)
                .ok()
                .and_then(|e| e.chart.error)
                .map(|e| format!("{}: {}", e.code, e.description))
                .unwrap_or_else(|| body.chars().take(200).collect());
            return Err(EtlError::Upstream {
                ticker: ticker.to_string(),
                message: format!("HTTP {} {}", status, detail),
            }
            .into());
        }

        let envelope: ChartEnvelope = serde_json::from_str(&body)
            .with_context(|| format!("Unexpected chart payload for {}", ticker))?;
        parse_chart(ticker, envelope, start, end)
    }
}

// ── Parsing ───────────────────────────────────────────────────────────────────

/// Turn a chart payload into records. Bars with a missing OHLCV cell and bars
/// whose exchange-local date falls outside `[start, end]` are dropped.
pub fn parse_chart(
    ticker: &str,
    envelope: ChartEnvelope,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<Vec<RawPriceRecord>> {
    if let Some(err) = envelope.chart.error {
        return Err(EtlError::Upstream {
            ticker: ticker.to_string(),
            message: format!("{}: {}", err.code, err.description),
        }
        .into());
    }

    let Some(result) = envelope.chart.result.and_then(|r| r.into_iter().next()) else {
        return Ok(vec![]);
    };

    let offset = FixedOffset::east_opt(result.meta.gmtoffset)
        .ok_or_else(|| anyhow!("{}: invalid gmtoffset {}", ticker, result.meta.gmtoffset))?;
    let quote = result.indicators.quote.into_iter().next().unwrap_or_default();
    let cell = |col: &[Option<f64>], i: usize| col.get(i).copied().flatten();

    let mut records = Vec::with_capacity(result.timestamp.len());
    for (i, &ts) in result.timestamp.iter().enumerate() {
        let Some(at) = DateTime::from_timestamp(ts, 0) else {
            debug!("[{}] bad timestamp {}", ticker, ts);
            continue;
        };
        let local = at.with_timezone(&offset);
        let day = local.date_naive();
        if day < start || day > end {
            debug!("[{}] dropping bar for {} outside window", ticker, day);
            continue;
        }

        let ohlcv = (
            cell(&quote.open, i).and_then(Decimal::from_f64),
            cell(&quote.high, i).and_then(Decimal::from_f64),
            cell(&quote.low, i).and_then(Decimal::from_f64),
            cell(&quote.close, i).and_then(Decimal::from_f64),
            cell(&quote.volume, i),
        );
        let (Some(open), Some(high), Some(low), Some(close), Some(volume)) = ohlcv else {
            debug!("[{}] incomplete bar for {}", ticker, day);
            continue;
        };

        records.push(RawPriceRecord {
            ticker: ticker.to_string(),
            date: local.to_rfc3339(),
            open,
            high,
            low,
            close,
            volume: volume.round() as i64,
        });
    }

    Ok(records)
}
