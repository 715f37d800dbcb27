use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub warehouse: WarehouseConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
}

/// Price provider configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SourceConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

/// Object storage configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    /// Directory acting as the bucket root.
    #[serde(default = "default_bucket_root")]
    pub bucket_root: PathBuf,
}

/// Warehouse configuration: where the tables live and how the fact table is keyed.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WarehouseConfig {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    #[serde(default = "default_dataset")]
    pub dataset: String,

    #[serde(default = "default_fact_table")]
    pub fact_table: String,

    #[serde(default = "default_analytics_table")]
    pub analytics_table: String,

    #[serde(default = "default_tickers_table")]
    pub tickers_table: String,

    #[serde(default = "default_sectors_table")]
    pub sectors_table: String,

    #[serde(default = "default_currencies_table")]
    pub currencies_table: String,

    #[serde(default = "default_fact_schema_path")]
    pub fact_schema_path: String,

    #[serde(default = "default_key_columns")]
    pub key_columns: Vec<String>,

    #[serde(default = "default_value_columns")]
    pub value_columns: Vec<String>,

    #[serde(default = "default_true")]
    pub run_migrations: bool,
}

/// Chat notification configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NotifyConfig {
    #[serde(default)]
    pub webhook_url: Option<String>,

    #[serde(default = "default_notify_title")]
    pub title: String,
}

// ── Defaults ─────────────────────────────────────────────────────────────────

fn default_base_url() -> String {
    "https://query1.finance.yahoo.com".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_user_agent() -> String {
    "stock-etl/0.1 (daily equity price pipeline)".to_string()
}
fn default_bucket_root() -> PathBuf {
    PathBuf::from("data/bucket")
}
fn default_db_path() -> PathBuf {
    PathBuf::from("data/warehouse.duckdb")
}
fn default_dataset() -> String {
    "yfinance_analytics".to_string()
}
fn default_fact_table() -> String {
    "stock_prices".to_string()
}
fn default_analytics_table() -> String {
    "stock_prices_analysis".to_string()
}
fn default_tickers_table() -> String {
    "tickers".to_string()
}
fn default_sectors_table() -> String {
    "sectors".to_string()
}
fn default_currencies_table() -> String {
    "currencies".to_string()
}
fn default_fact_schema_path() -> String {
    "schema/stock_prices_schema.json".to_string()
}
fn default_key_columns() -> Vec<String> {
    ["ticker_id", "date"].iter().map(|s| s.to_string()).collect()
}
fn default_value_columns() -> Vec<String> {
    [
        "open_price",
        "high_price",
        "low_price",
        "close_price",
        "volume",
        "created_at",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}
fn default_notify_title() -> String {
    "yfinance-notifier".to_string()
}
fn default_true() -> bool {
    true
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            bucket_root: default_bucket_root(),
        }
    }
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            dataset: default_dataset(),
            fact_table: default_fact_table(),
            analytics_table: default_analytics_table(),
            tickers_table: default_tickers_table(),
            sectors_table: default_sectors_table(),
            currencies_table: default_currencies_table(),
            fact_schema_path: default_fact_schema_path(),
            key_columns: default_key_columns(),
            value_columns: default_value_columns(),
            run_migrations: true,
        }
    }
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            title: default_notify_title(),
        }
    }
}

// ── Loader ───────────────────────────────────────────────────────────────────

impl AppConfig {
    /// Load configuration from file + environment overrides
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();

        let cfg = config::Config::builder()
            .add_source(
                config::File::with_name("config/default")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(
                config::File::with_name("config/local")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(
                config::Environment::with_prefix("STOCK_ETL")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("warehouse.key_columns")
                    .with_list_parse_key("warehouse.value_columns")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to read configuration sources")?;

        let app_cfg: AppConfig = cfg
            .try_deserialize()
            .context("Invalid configuration")?;
        Ok(app_cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_fact_table_layout() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.warehouse.key_columns, vec!["ticker_id", "date"]);
        assert_eq!(cfg.warehouse.value_columns.len(), 6);
        assert_eq!(cfg.warehouse.fact_table, "stock_prices");
        assert!(cfg.notify.webhook_url.is_none());
    }

    #[test]
    fn test_partial_toml_falls_back_to_field_defaults() {
        let cfg: AppConfig = config::Config::builder()
            .add_source(config::File::from_str(
                "[warehouse]\ndataset = \"staging\"\n",
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(cfg.warehouse.dataset, "staging");
        assert_eq!(cfg.warehouse.fact_table, "stock_prices");
        assert_eq!(cfg.source.timeout_secs, 30);
    }
}
