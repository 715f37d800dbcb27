use super::sql::create_table_sql;
use super::{default_fact_schema, quote_ident, SchemaField, TableRef, Warehouse};
use crate::config::WarehouseConfig;
use crate::master::master_tables;
use crate::storage::ObjectStore;
use anyhow::{anyhow, Context, Result};
use chrono::NaiveDate;
use duckdb::{params_from_iter, Connection};
use serde_json::Value;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

// ── DuckDB warehouse ──────────────────────────────────────────────────────────

/// DuckDB-backed warehouse. Datasets map to DuckDB schemas; staged objects are
/// read through the same object store the staging writer uses.
pub struct DuckWarehouse {
    conn: Mutex<Connection>,
    store: Arc<dyn ObjectStore>,
}

impl DuckWarehouse {
    pub fn open(path: &Path, store: Arc<dyn ObjectStore>) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Could not create dir {:?}", parent))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open DuckDB at {:?}", path))?;
        Ok(Self {
            conn: Mutex::new(conn),
            store,
        })
    }

    pub fn open_in_memory(store: Arc<dyn ObjectStore>) -> Result<Self> {
        Ok(Self {
            conn: Mutex::new(Connection::open_in_memory()?),
            store,
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("DuckDB connection mutex poisoned"))
    }

    /// Run `f` against the underlying connection.
    pub fn with_connection<T>(&self, f: impl FnOnce(&Connection) -> duckdb::Result<T>) -> Result<T> {
        let conn = self.conn()?;
        Ok(f(&conn)?)
    }

    /// Create the dataset, the fact table and empty master tables if missing.
    pub fn run_migrations(&self, config: &WarehouseConfig) -> Result<()> {
        info!("Running migrations…");
        let conn = self.conn()?;

        conn.execute_batch(&format!(
            "CREATE SCHEMA IF NOT EXISTS {}",
            quote_ident(&config.dataset)
        ))
        .context("CREATE SCHEMA failed")?;

        let fact = TableRef::new(&config.dataset, &config.fact_table);
        conn.execute_batch(&create_table_sql(&fact, &default_fact_schema(), true))
            .with_context(|| format!("Creating {} failed", fact))?;

        for master in master_tables(config) {
            conn.execute_batch(&create_table_sql(&master.table, &master.schema, true))
                .with_context(|| format!("Creating {} failed", master.table))?;
        }

        info!("Migrations done.");
        Ok(())
    }

    // ── Stats ─────────────────────────────────────────────────────────────────

    pub fn row_count(&self, table: &TableRef) -> Result<i64> {
        let sql = format!("SELECT COUNT(*) FROM {}", table.qualified());
        self.with_connection(|c| c.query_row(&sql, [], |r| r.get(0)))
            .with_context(|| format!("count rows of {}", table))
    }

    pub fn date_range(&self, table: &TableRef) -> Result<(Option<NaiveDate>, Option<NaiveDate>)> {
        let sql = format!(
            "SELECT MIN(\"date\"), MAX(\"date\") FROM {}",
            table.qualified()
        );
        self.with_connection(|c| c.query_row(&sql, [], |r| Ok((r.get(0)?, r.get(1)?))))
            .with_context(|| format!("date range of {}", table))
    }
}

impl Warehouse for DuckWarehouse {
    fn create_table(&self, table: &TableRef, schema: &[SchemaField]) -> Result<()> {
        let sql = create_table_sql(table, schema, false);
        debug!("{}", sql);
        self.conn()?
            .execute_batch(&sql)
            .with_context(|| format!("create table {}", table))
    }

    fn load_ndjson(
        &self,
        object_path: &str,
        table: &TableRef,
        schema: &[SchemaField],
    ) -> Result<usize> {
        let bytes = self
            .store
            .get(object_path)
            .with_context(|| format!("read staged object {}", self.store.uri(object_path)))?;
        let text = std::str::from_utf8(&bytes)
            .with_context(|| format!("{} is not UTF-8", object_path))?;

        let columns = schema
            .iter()
            .map(|f| quote_ident(&f.name))
            .collect::<Vec<_>>()
            .join(", ");
        let placeholders = schema
            .iter()
            .map(|f| format!("CAST(? AS {})", f.field_type.sql_type()))
            .collect::<Vec<_>>()
            .join(", ");
        let insert = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            table.qualified(),
            columns,
            placeholders
        );

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute_batch(&format!("DELETE FROM {}", table.qualified()))
            .with_context(|| format!("truncate {}", table))?;

        let mut loaded = 0usize;
        {
            let mut stmt = tx.prepare(&insert)?;
            for (i, line) in text.lines().enumerate() {
                if line.trim().is_empty() {
                    continue;
                }
                let row: serde_json::Map<String, Value> = serde_json::from_str(line)
                    .with_context(|| format!("{} line {}: invalid JSON", object_path, i + 1))?;
                let values: Vec<Option<String>> = schema
                    .iter()
                    .map(|f| cell_text(row.get(&f.name)))
                    .collect();
                stmt.execute(params_from_iter(values))
                    .with_context(|| format!("{} line {}: insert into {}", object_path, i + 1, table))?;
                loaded += 1;
            }
        }
        tx.commit()?;

        info!("Loaded {} rows from {} into {}", loaded, self.store.uri(object_path), table);
        Ok(loaded)
    }

    fn execute(&self, sql: &str) -> Result<()> {
        debug!("{}", sql);
        self.conn()?.execute_batch(sql)?;
        Ok(())
    }

    fn drop_table(&self, table: &TableRef) -> Result<()> {
        self.conn()?
            .execute_batch(&format!("DROP TABLE IF EXISTS {}", table.qualified()))
            .with_context(|| format!("drop table {}", table))
    }

    fn query_column(&self, sql: &str) -> Result<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(sql)?;
        let values = stmt
            .query_map([], |r| r.get::<_, String>(0))?
            .collect::<duckdb::Result<Vec<_>>>()?;
        Ok(values)
    }
}

/// JSON cell → text bound into `CAST(? AS <type>)`. Missing and null are NULL.
fn cell_text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        other => Some(other.to_string()),
    }
}
