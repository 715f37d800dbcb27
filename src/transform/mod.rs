use crate::config::WarehouseConfig;
use crate::warehouse::{AnalyticsQuery, TableRef, Warehouse};
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

/// Rebuilds the analytics table from scratch after the fact table changes.
pub struct AnalyticsTransformer {
    warehouse: Arc<dyn Warehouse>,
    query: AnalyticsQuery,
}

impl AnalyticsTransformer {
    pub fn new(warehouse: Arc<dyn Warehouse>, query: AnalyticsQuery) -> Self {
        Self { warehouse, query }
    }

    pub fn from_config(warehouse: Arc<dyn Warehouse>, config: &WarehouseConfig) -> Self {
        let table = |name: &str| TableRef::new(&config.dataset, name);
        let query = AnalyticsQuery {
            target: table(&config.analytics_table),
            fact: table(&config.fact_table),
            tickers: table(&config.tickers_table),
            sectors: table(&config.sectors_table),
            currencies: table(&config.currencies_table),
            ma_windows: AnalyticsQuery::DEFAULT_MA_WINDOWS.to_vec(),
        };
        Self::new(warehouse, query)
    }

    pub fn target(&self) -> &TableRef {
        &self.query.target
    }

    pub fn rebuild(&self) -> Result<()> {
        let sql = self.query.to_sql()?;
        info!("Rebuilding {} from {}", self.query.target, self.query.fact);
        self.warehouse
            .execute(&sql)
            .with_context(|| format!("rebuilding {} failed", self.query.target))?;
        info!("{} rebuilt", self.query.target);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryObjectStore;
    use crate::warehouse::DuckWarehouse;

    fn setup() -> (Arc<DuckWarehouse>, AnalyticsTransformer) {
        let config = WarehouseConfig::default();
        let wh = Arc::new(DuckWarehouse::open_in_memory(Arc::new(MemoryObjectStore::new())).unwrap());
        wh.run_migrations(&config).unwrap();
        let transformer = AnalyticsTransformer::from_config(wh.clone(), &config);
        (wh, transformer)
    }

    #[test]
    fn test_rebuild_computes_indicators_per_ticker() {
        let (wh, transformer) = setup();
        wh.execute(
            "INSERT INTO yfinance_analytics.sectors VALUES ('TECH', 'Technology');
             INSERT INTO yfinance_analytics.currencies VALUES ('USD', 'US Dollar');
             INSERT INTO yfinance_analytics.tickers VALUES ('AAPL', 'Apple', 'TECH', 'USD');
             INSERT INTO yfinance_analytics.stock_prices (ticker_id, date, close_price, volume) VALUES
                 ('AAPL', DATE '2025-08-01', 100.0, 1),
                 ('AAPL', DATE '2025-08-04', 110.0, 1),
                 ('AAPL', DATE '2025-08-05', 99.0, 1),
                 ('MSFT', DATE '2025-08-01', 0.0, 1),
                 ('MSFT', DATE '2025-08-04', 5.0, 1);",
        )
        .unwrap();

        transformer.rebuild().unwrap();

        type Row = (String, Option<String>, Option<String>, f64, Option<f64>, i32);
        let rows: Vec<Row> = wh
            .with_connection(|c| {
                let mut stmt = c.prepare(
                    "SELECT ticker_id, company_name, sector_name, ma5, change_rate, is_win
                     FROM yfinance_analytics.stock_prices_analysis
                     ORDER BY ticker_id, date",
                )?;
                let rows = stmt
                    .query_map([], |r| {
                        Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?, r.get(4)?, r.get(5)?))
                    })?
                    .collect::<duckdb::Result<Vec<Row>>>()?;
                Ok(rows)
            })
            .unwrap();

        assert_eq!(rows.len(), 5);

        let (ticker, company, sector, ma5, change, win) = &rows[0];
        assert_eq!(ticker, "AAPL");
        assert_eq!(company.as_deref(), Some("Apple"));
        assert_eq!(sector.as_deref(), Some("Technology"));
        assert_eq!(*ma5, 100.0);
        assert_eq!(*change, None);
        assert_eq!(*win, 0);

        assert_eq!(rows[1].3, 105.0);
        assert_eq!(rows[1].4, Some(0.1));
        assert_eq!(rows[1].5, 1);

        assert_eq!(rows[2].3, 103.0);
        assert_eq!(rows[2].4, Some(-0.1));
        assert_eq!(rows[2].5, 0);

        // no master row; previous close of zero gives no rate
        assert_eq!(rows[3].1, None);
        assert_eq!(rows[4].4, None);
        assert_eq!(rows[4].5, 0);
    }

    #[test]
    fn test_rebuild_replaces_previous_table() {
        let (wh, transformer) = setup();
        transformer.rebuild().unwrap();
        wh.execute(
            "INSERT INTO yfinance_analytics.stock_prices (ticker_id, date, close_price) \
             VALUES ('AAPL', DATE '2025-08-01', 1.0)",
        )
        .unwrap();
        transformer.rebuild().unwrap();
        assert_eq!(wh.row_count(transformer.target()).unwrap(), 1);
    }
}
