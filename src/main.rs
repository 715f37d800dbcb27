use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use stock_etl::config::AppConfig;
use stock_etl::dispatch::{Dispatcher, EtlRequest, MODE_INIT_MASTER};
use stock_etl::loader::WarehouseLoader;
use stock_etl::master::{ensure_fact_schema, master_tables};
use stock_etl::pipeline::{Pipeline, MODE_LATEST, MODE_RANGE};
use stock_etl::report::{notifier_from_config, OutcomeReporter};
use stock_etl::source::YahooChartSource;
use stock_etl::storage::{LocalObjectStore, ObjectStore};
use stock_etl::transform::AnalyticsTransformer;
use stock_etl::utils::{self, Timer};
use stock_etl::warehouse::{DuckWarehouse, TableRef};

#[derive(Parser)]
#[command(name = "stock-etl", about = "Daily equity price ETL", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch yesterday's bars and merge them (daily cron mode)
    Etl {
        /// Comma-separated tickers; defaults to the tickers master table
        #[arg(long, value_delimiter = ',')]
        tickers: Vec<String>,
    },

    /// Backfill an inclusive date range
    EtlRange {
        /// First date, YYYY-MM-DD
        #[arg(long)]
        start: String,
        /// Last date (inclusive), YYYY-MM-DD
        #[arg(long)]
        end: String,
        #[arg(long, value_delimiter = ',')]
        tickers: Vec<String>,
    },

    /// Reload tickers/sectors/currencies from master/*.ndjson
    InitMaster,

    /// Run a raw JSON request, e.g. '{"mode":"etl"}'
    Request {
        #[arg(long)]
        payload: String,
    },

    /// Create the dataset and tables without loading data
    Migrate,

    /// Show warehouse statistics
    Stats,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "stock_etl=info,warn",
        1 => "stock_etl=debug,info",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(fmt::layer().compact().with_target(false))
        .with(EnvFilter::new(filter))
        .init();

    let config = AppConfig::load()?;

    let store: Arc<dyn ObjectStore> = Arc::new(LocalObjectStore::new(&config.storage.bucket_root)?);
    let warehouse = Arc::new(
        DuckWarehouse::open(&config.warehouse.db_path, store.clone())
            .context("Failed to open DuckDB")?,
    );
    if config.warehouse.run_migrations || matches!(cli.command, Command::Migrate) {
        warehouse.run_migrations(&config.warehouse)?;
        if ensure_fact_schema(store.as_ref(), &config.warehouse.fact_schema_path)? {
            info!("Seeded {}", store.uri(&config.warehouse.fact_schema_path));
        }
    }

    let request = match cli.command {
        Command::Etl { tickers } => build_request(MODE_LATEST, None, None, tickers),
        Command::EtlRange { start, end, tickers } => build_request(MODE_RANGE, Some(start), Some(end), tickers),
        Command::InitMaster => build_request(MODE_INIT_MASTER, None, None, vec![]),
        Command::Request { payload } => EtlRequest::from_json(&payload)?,

        Command::Migrate => {
            println!("Migrations applied.");
            return Ok(());
        }

        Command::Stats => {
            let wh = &config.warehouse;
            let fact = TableRef::new(&wh.dataset, &wh.fact_table);
            let analytics = TableRef::new(&wh.dataset, &wh.analytics_table);
            let (min, max) = warehouse.date_range(&fact)?;
            let count = |t: &TableRef| {
                warehouse
                    .row_count(t)
                    .map(utils::fmt_number)
                    .unwrap_or_else(|_| "—".to_string())
            };

            println!("─────────────────────────────────");
            println!("  stock-etl — Warehouse Stats");
            println!("─────────────────────────────────");
            println!("  Fact rows      : {}", count(&fact));
            println!("  Analytics rows : {}", count(&analytics));
            for master in master_tables(wh) {
                println!("  {:<15}: {}", master.name, count(&master.table));
            }
            println!("  From           : {}", utils::fmt_date(min));
            println!("  To             : {}", utils::fmt_date(max));
            println!("─────────────────────────────────");
            return Ok(());
        }
    };

    let _t = Timer::start("ETL request");

    let source = Arc::new(YahooChartSource::new(&config.source).context("Failed to build price source")?);
    let reporter = OutcomeReporter::new(store.clone(), notifier_from_config(&config.notify)?);
    let pipeline = Pipeline::new(
        source,
        WarehouseLoader::new(store.clone(), warehouse.clone(), config.warehouse.clone()),
        AnalyticsTransformer::from_config(warehouse.clone(), &config.warehouse),
        reporter,
    );
    let dispatcher = Dispatcher::new(pipeline, store, warehouse, config.warehouse);

    dispatcher.handle(&request).await?;
    info!("Request mode={} finished", request.mode);
    Ok(())
}

fn build_request(mode: &str, start: Option<String>, end: Option<String>, tickers: Vec<String>) -> EtlRequest {
    EtlRequest {
        mode: mode.to_string(),
        start_date: start,
        end_date: end,
        tickers: (!tickers.is_empty()).then_some(tickers),
    }
}
