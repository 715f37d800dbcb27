//! Master data (tickers, sectors, currencies) and the fact schema blob.

use crate::config::WarehouseConfig;
use crate::error::EtlError;
use crate::storage::{master_object_path, ObjectStore, JSON_CONTENT_TYPE};
use crate::warehouse::{default_fact_schema, quote_ident, FieldType, SchemaField, TableRef, Warehouse};
use anyhow::{Context, Result};
use tracing::info;

#[derive(Debug, Clone)]
pub struct MasterTable {
    /// Object name under `master/`, e.g. `tickers`.
    pub name: &'static str,
    pub table: TableRef,
    pub schema: Vec<SchemaField>,
}

pub fn master_tables(config: &WarehouseConfig) -> Vec<MasterTable> {
    const STR: FieldType = FieldType::String;
    vec![
        MasterTable {
            name: "tickers",
            table: TableRef::new(&config.dataset, &config.tickers_table),
            schema: vec![
                SchemaField::required("ticker_id", STR),
                SchemaField::required("company_name", STR),
                SchemaField::nullable("sector_id", STR),
                SchemaField::nullable("currency_id", STR),
            ],
        },
        MasterTable {
            name: "sectors",
            table: TableRef::new(&config.dataset, &config.sectors_table),
            schema: vec![
                SchemaField::required("sector_id", STR),
                SchemaField::required("sector_name", STR),
            ],
        },
        MasterTable {
            name: "currencies",
            table: TableRef::new(&config.dataset, &config.currencies_table),
            schema: vec![
                SchemaField::required("currency_id", STR),
                SchemaField::required("currency_name", STR),
            ],
        },
    ]
}

/// Every ticker id in the tickers master, sorted.
pub fn fetch_tickers(warehouse: &dyn Warehouse, config: &WarehouseConfig) -> Result<Vec<String>> {
    let table = TableRef::new(&config.dataset, &config.tickers_table);
    let sql = format!(
        "SELECT DISTINCT {col} FROM {table} ORDER BY {col}",
        col = quote_ident("ticker_id"),
        table = table.qualified()
    );
    let tickers = warehouse
        .query_column(&sql)
        .with_context(|| format!("reading tickers from {}", table))?;
    info!("{} tickers in {}", tickers.len(), table);
    Ok(tickers)
}

/// Recreate each master table from `master/<name>.ndjson`. Every file is
/// checked before any table is dropped.
pub fn initialize_master_tables(
    store: &dyn ObjectStore,
    warehouse: &dyn Warehouse,
    config: &WarehouseConfig,
) -> Result<()> {
    let masters = master_tables(config);
    for master in &masters {
        let path = master_object_path(master.name);
        if !store.exists(&path)? {
            return Err(EtlError::ObjectNotFound(store.uri(&path)).into());
        }
    }

    for master in masters {
        let path = master_object_path(master.name);
        warehouse.drop_table(&master.table)?;
        warehouse.create_table(&master.table, &master.schema)?;
        let rows = warehouse
            .load_ndjson(&path, &master.table, &master.schema)
            .with_context(|| format!("loading {} into {}", path, master.table))?;
        info!("Loaded {} rows into {}", rows, master.table);
    }
    Ok(())
}

/// Seed the fact schema blob with the built-in layout if nothing is there yet.
/// Returns whether it wrote.
pub fn ensure_fact_schema(store: &dyn ObjectStore, path: &str) -> Result<bool> {
    if store.exists(path)? {
        return Ok(false);
    }
    let body = serde_json::to_vec_pretty(&default_fact_schema()).context("serialising schema")?;
    store.put(path, &body, JSON_CONTENT_TYPE)?;
    info!("Wrote default fact schema to {}", store.uri(path));
    Ok(true)
}
