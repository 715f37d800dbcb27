//! Stage → temporary table → MERGE → cleanup, one cycle per date.

pub mod staging;

use crate::config::WarehouseConfig;
use crate::models::FormattedRecord;
use crate::storage::ObjectStore;
use crate::warehouse::{parse_schema, MergeStatement, SchemaField, TableRef, Warehouse};
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub use staging::StagingWriter;

/// Handle to a short-lived table holding one date's staged rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TempTable {
    pub table: TableRef,
}

impl TempTable {
    /// `<target>_temp_<8 hex chars>` in the target's dataset.
    pub fn for_target(target: &TableRef) -> Self {
        let suffix: String = Uuid::new_v4().simple().to_string().chars().take(8).collect();
        Self {
            table: TableRef::new(&target.dataset, format!("{}_temp_{}", target.table, suffix)),
        }
    }
}

pub struct WarehouseLoader {
    store: Arc<dyn ObjectStore>,
    warehouse: Arc<dyn Warehouse>,
    staging: StagingWriter,
    config: WarehouseConfig,
}

impl WarehouseLoader {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        warehouse: Arc<dyn Warehouse>,
        config: WarehouseConfig,
    ) -> Self {
        Self {
            staging: StagingWriter::new(store.clone()),
            store,
            warehouse,
            config,
        }
    }

    pub fn fact_table(&self) -> TableRef {
        TableRef::new(&self.config.dataset, &self.config.fact_table)
    }

    /// Column schema of the fact table, read from the schema blob.
    pub fn fetch_schema(&self) -> Result<Vec<SchemaField>> {
        let path = &self.config.fact_schema_path;
        let bytes = self
            .store
            .get(path)
            .with_context(|| format!("fetching schema {}", self.store.uri(path)))?;
        Ok(parse_schema(path, &bytes)?)
    }

    /// Stage `records`, create a fresh temporary table and load the staged object
    /// into it, replacing anything already there. A failed load drops the table
    /// before returning the load error.
    pub fn stage_and_load(&self, date: &str, records: &[FormattedRecord]) -> Result<TempTable> {
        let object_path = self.staging.write(date, records)?;
        let schema = self.fetch_schema()?;

        let temp = TempTable::for_target(&self.fact_table());
        self.warehouse
            .create_table(&temp.table, &schema)
            .with_context(|| format!("creating temporary table {}", temp.table))?;
        info!("[{}] created temporary table {}", date, temp.table);

        let loaded = match self.warehouse.load_ndjson(&object_path, &temp.table, &schema) {
            Ok(n) => n,
            Err(e) => {
                let e = e.context(format!("loading {} into {}", object_path, temp.table));
                self.discard(temp, "load");
                return Err(e);
            }
        };
        info!("[{}] loaded {} rows into {}", date, loaded, temp.table);

        Ok(temp)
    }

    pub fn merge_sql(&self, temp: &TempTable) -> Result<String> {
        MergeStatement::new(self.fact_table(), temp.table.clone())
            .keys(self.config.key_columns.iter().cloned())
            .values(self.config.value_columns.iter().cloned())
            .to_sql()
    }

    pub fn merge(&self, temp: &TempTable) -> Result<()> {
        let sql = self.merge_sql(temp)?;
        debug!("{}", sql);
        self.warehouse
            .execute(&sql)
            .with_context(|| format!("MERGE from {} into {} failed", temp.table, self.fact_table()))?;
        info!("Merged {} into {}", temp.table, self.fact_table());
        Ok(())
    }

    /// Drops the temporary table. A table that is already gone is fine.
    pub fn cleanup(&self, temp: TempTable) -> Result<()> {
        self.warehouse
            .drop_table(&temp.table)
            .with_context(|| format!("dropping temporary table {}", temp.table))?;
        info!("Dropped temporary table {}", temp.table);
        Ok(())
    }

    /// Best-effort drop after a failed step; the step's error wins.
    fn discard(&self, temp: TempTable, step: &str) {
        let name = temp.table.clone();
        if let Err(cleanup_err) = self.cleanup(temp) {
            warn!("Could not drop {} after failed {}: {:#}", name, step, cleanup_err);
        }
    }

    /// One full cycle for a single date. The temporary table is dropped even
    /// when the load or merge fails; that failure is the error returned.
    pub fn load_merge_cleanup(&self, date: &str, records: &[FormattedRecord]) -> Result<()> {
        let temp = self.stage_and_load(date, records)?;

        if let Err(e) = self.merge(&temp) {
            self.discard(temp, "merge");
            return Err(e);
        }

        self.cleanup(temp)
    }
}
