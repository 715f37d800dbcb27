//! Routes a request by mode to the latest run, the range run, or master
//! initialization.

use crate::config::WarehouseConfig;
use crate::error::EtlError;
use crate::master::{fetch_tickers, initialize_master_tables};
use crate::pipeline::{Pipeline, MODE_LATEST, MODE_RANGE};
use crate::storage::ObjectStore;
use crate::warehouse::Warehouse;
use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{error, info};

pub const MODE_INIT_MASTER: &str = "init_master";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Latest,
    Range,
    InitMaster,
}

impl FromStr for Mode {
    type Err = EtlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            MODE_LATEST => Ok(Mode::Latest),
            MODE_RANGE => Ok(Mode::Range),
            MODE_INIT_MASTER => Ok(Mode::InitMaster),
            other => Err(EtlError::UnknownMode(other.to_string())),
        }
    }
}

/// Request body, e.g. `{"mode": "etl_range", "start_date": "2025-08-01", "end_date": "2025-08-05"}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EtlRequest {
    pub mode: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
    /// Overrides the tickers master when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tickers: Option<Vec<String>>,
}

impl EtlRequest {
    pub fn from_json(payload: &str) -> Result<Self> {
        serde_json::from_str(payload).context("Invalid request payload")
    }
}

pub fn parse_date(s: &str) -> Result<NaiveDate, EtlError> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").map_err(|_| EtlError::InvalidDate(s.to_string()))
}

pub struct Dispatcher {
    pipeline: Pipeline,
    store: Arc<dyn ObjectStore>,
    warehouse: Arc<dyn Warehouse>,
    config: WarehouseConfig,
}

impl Dispatcher {
    pub fn new(
        pipeline: Pipeline,
        store: Arc<dyn ObjectStore>,
        warehouse: Arc<dyn Warehouse>,
        config: WarehouseConfig,
    ) -> Self {
        Self {
            pipeline,
            store,
            warehouse,
            config,
        }
    }

    pub async fn handle(&self, request: &EtlRequest) -> Result<()> {
        info!("Handling request mode={}", request.mode);
        let mode = request.mode.parse::<Mode>().inspect_err(|e| error!("{}", e))?;

        match mode {
            Mode::Latest => {
                let tickers = self.tickers(request)?;
                self.pipeline.run_latest(&tickers).await
            }
            Mode::Range => {
                let start = request
                    .start_date
                    .as_deref()
                    .ok_or(EtlError::MissingParameter("start_date"))?;
                let end = request
                    .end_date
                    .as_deref()
                    .ok_or(EtlError::MissingParameter("end_date"))?;
                let (start, end) = (parse_date(start)?, parse_date(end)?);

                let tickers = self.tickers(request)?;
                self.pipeline.run_range(&tickers, start, end).await
            }
            Mode::InitMaster => {
                initialize_master_tables(self.store.as_ref(), self.warehouse.as_ref(), &self.config)
            }
        }
    }

    fn tickers(&self, request: &EtlRequest) -> Result<Vec<String>> {
        match &request.tickers {
            Some(list) if !list.is_empty() => Ok(list.clone()),
            _ => fetch_tickers(self.warehouse.as_ref(), &self.config),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::WarehouseLoader;
    use crate::models::RawPriceRecord;
    use crate::report::{NoopNotifier, OutcomeReporter};
    use crate::source::PriceSource;
    use crate::storage::MemoryObjectStore;
    use crate::transform::AnalyticsTransformer;
    use crate::warehouse::DuckWarehouse;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct CountingSource {
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl PriceSource for CountingSource {
        fn name(&self) -> &str {
            "counting"
        }

        async fn fetch_ticker(&self, ticker: &str, _: NaiveDate, _: NaiveDate) -> Result<Vec<RawPriceRecord>> {
            self.calls.lock().unwrap().push(ticker.to_string());
            Ok(vec![])
        }
    }

    fn dispatcher() -> (Arc<CountingSource>, Arc<MemoryObjectStore>, Dispatcher) {
        let config = WarehouseConfig::default();
        let store = Arc::new(MemoryObjectStore::new());
        let wh = Arc::new(DuckWarehouse::open_in_memory(store.clone()).unwrap());
        wh.run_migrations(&config).unwrap();
        wh.execute("INSERT INTO yfinance_analytics.tickers VALUES ('7203.T', 'Toyota', NULL, NULL)")
            .unwrap();

        let source = Arc::new(CountingSource::default());
        let pipeline = Pipeline::new(
            source.clone(),
            WarehouseLoader::new(store.clone(), wh.clone(), config.clone()),
            AnalyticsTransformer::from_config(wh.clone(), &config),
            OutcomeReporter::new(store.clone(), Arc::new(NoopNotifier)),
        );
        (source, store.clone(), Dispatcher::new(pipeline, store, wh, config))
    }

    fn request(mode: &str) -> EtlRequest {
        EtlRequest {
            mode: mode.to_string(),
            ..EtlRequest::default()
        }
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("etl".parse::<Mode>().unwrap(), Mode::Latest);
        assert_eq!("etl_range".parse::<Mode>().unwrap(), Mode::Range);
        assert_eq!("init_master".parse::<Mode>().unwrap(), Mode::InitMaster);
        assert!(matches!("ETL".parse::<Mode>(), Err(EtlError::UnknownMode(m)) if m == "ETL"));
    }

    #[test]
    fn test_request_from_json() {
        let req = EtlRequest::from_json(r#"{"mode":"etl_range","start_date":"2025-08-01","end_date":"2025-08-05"}"#)
            .unwrap();
        assert_eq!(req.start_date.as_deref(), Some("2025-08-01"));
        assert!(req.tickers.is_none());
        assert!(EtlRequest::from_json(r#"{"start_date":"x"}"#).is_err());
    }

    #[tokio::test]
    async fn test_unknown_mode_touches_nothing() {
        let (source, store, d) = dispatcher();
        let err = d.handle(&request("refresh")).await.unwrap_err();
        assert_eq!(err.to_string(), "Invalid mode specified: refresh");
        assert!(source.calls.lock().unwrap().is_empty());
        assert!(store.paths().is_empty());
    }

    #[tokio::test]
    async fn test_range_requires_both_dates() {
        let (source, _, d) = dispatcher();
        let mut req = request("etl_range");
        req.start_date = Some("2025-08-01".to_string());

        let err = d.handle(&req).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<EtlError>(),
            Some(EtlError::MissingParameter("end_date"))
        ));

        req.end_date = Some("2025/08/05".to_string());
        let err = d.handle(&req).await.unwrap_err();
        assert!(matches!(err.downcast_ref::<EtlError>(), Some(EtlError::InvalidDate(_))));
        assert!(source.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_latest_reads_tickers_from_master_unless_overridden() {
        let (source, store, d) = dispatcher();

        d.handle(&request("etl")).await.unwrap();
        assert_eq!(*source.calls.lock().unwrap(), vec!["7203.T"]);
        assert!(store.paths().iter().any(|p| p.starts_with("logs/") && p.ends_with("_skip.json")));

        let mut req = request("etl");
        req.tickers = Some(vec!["AAPL".to_string(), "MSFT".to_string()]);
        d.handle(&req).await.unwrap();
        assert_eq!(*source.calls.lock().unwrap(), vec!["7203.T", "AAPL", "MSFT"]);
    }
}
