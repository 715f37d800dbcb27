//! Warehouse abstraction: typed table identifiers, externally supplied column
//! schemas, SQL builders and the DuckDB backend.

pub mod duck;
pub mod sql;

use crate::error::EtlError;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fmt;

pub use duck::DuckWarehouse;
pub use sql::{AnalyticsQuery, MergeStatement};

// ── Warehouse trait ───────────────────────────────────────────────────────────

/// Operations the loader, transformer and master seeding need from a warehouse.
pub trait Warehouse: Send + Sync {
    /// Create `table` with the given column schema. Fails if it already exists.
    fn create_table(&self, table: &TableRef, schema: &[SchemaField]) -> Result<()>;

    /// Bulk-load an NDJSON object into `table`, replacing its previous contents.
    /// Returns the number of rows loaded.
    fn load_ndjson(&self, object_path: &str, table: &TableRef, schema: &[SchemaField])
        -> Result<usize>;

    /// Execute a statement that returns no rows (MERGE, CREATE OR REPLACE … AS SELECT).
    fn execute(&self, sql: &str) -> Result<()>;

    /// Drop `table`. A table that does not exist is not an error.
    fn drop_table(&self, table: &TableRef) -> Result<()>;

    /// Run a query and return its first column as strings.
    fn query_column(&self, sql: &str) -> Result<Vec<String>>;
}

// ── Table identifiers ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableRef {
    pub dataset: String,
    pub table: String,
}

impl TableRef {
    pub fn new(dataset: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            dataset: dataset.into(),
            table: table.into(),
        }
    }

    /// Quoted, dataset-qualified identifier for use inside SQL.
    pub fn qualified(&self) -> String {
        format!("{}.{}", quote_ident(&self.dataset), quote_ident(&self.table))
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.dataset, self.table)
    }
}

pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

// ── Column schema ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum FieldType {
    #[serde(rename = "STRING")]
    String,
    #[serde(rename = "DATE")]
    Date,
    #[serde(rename = "FLOAT", alias = "FLOAT64")]
    Float,
    #[serde(rename = "INTEGER", alias = "INT64")]
    Integer,
    #[serde(rename = "NUMERIC")]
    Numeric,
    #[serde(rename = "BOOLEAN", alias = "BOOL")]
    Boolean,
    #[serde(rename = "TIMESTAMP")]
    Timestamp,
    #[serde(rename = "DATETIME")]
    Datetime,
}

impl FieldType {
    pub fn sql_type(&self) -> &'static str {
        match self {
            FieldType::String => "VARCHAR",
            FieldType::Date => "DATE",
            FieldType::Float => "DOUBLE",
            FieldType::Integer => "BIGINT",
            FieldType::Numeric => "DECIMAL(38, 9)",
            FieldType::Boolean => "BOOLEAN",
            FieldType::Timestamp | FieldType::Datetime => "TIMESTAMP",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum FieldMode {
    #[default]
    Nullable,
    Required,
}

/// One column of a table schema, in the JSON layout stored under `schema/`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SchemaField {
    pub name: String,
    #[serde(alias = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub mode: FieldMode,
}

impl SchemaField {
    pub fn nullable(name: &str, field_type: FieldType) -> Self {
        Self {
            name: name.to_string(),
            field_type,
            mode: FieldMode::Nullable,
        }
    }

    pub fn required(name: &str, field_type: FieldType) -> Self {
        Self {
            name: name.to_string(),
            field_type,
            mode: FieldMode::Required,
        }
    }
}

/// Parse a schema blob: a non-empty JSON array of fields with unique names.
pub fn parse_schema(path: &str, bytes: &[u8]) -> Result<Vec<SchemaField>, EtlError> {
    let invalid = |reason: String| EtlError::InvalidSchema {
        path: path.to_string(),
        reason,
    };

    let fields: Vec<SchemaField> =
        serde_json::from_slice(bytes).map_err(|e| invalid(e.to_string()))?;

    if fields.is_empty() {
        return Err(invalid("schema has no fields".to_string()));
    }
    for (i, field) in fields.iter().enumerate() {
        if fields[..i].iter().any(|f| f.name == field.name) {
            return Err(invalid(format!("duplicate field `{}`", field.name)));
        }
    }
    Ok(fields)
}

/// Column layout of the fact table, used to seed the external schema blob and
/// to create the permanent table on first run.
pub fn default_fact_schema() -> Vec<SchemaField> {
    vec![
        SchemaField::required("ticker_id", FieldType::String),
        SchemaField::required("date", FieldType::Date),
        SchemaField::nullable("open_price", FieldType::Float),
        SchemaField::nullable("high_price", FieldType::Float),
        SchemaField::nullable("low_price", FieldType::Float),
        SchemaField::nullable("close_price", FieldType::Float),
        SchemaField::nullable("volume", FieldType::Integer),
        SchemaField::nullable("created_at", FieldType::Datetime),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_schema_accepts_bigquery_layout() {
        let json = br#"[
            {"name": "ticker_id", "field_type": "STRING", "mode": "REQUIRED"},
            {"name": "close_price", "type": "FLOAT64"},
            {"name": "volume", "field_type": "INT64", "mode": "NULLABLE"}
        ]"#;
        let fields = parse_schema("schema/x.json", json).unwrap();

        assert_eq!(fields.len(), 3);
        assert_eq!(fields[0].mode, FieldMode::Required);
        assert_eq!(fields[1].field_type, FieldType::Float);
        assert_eq!(fields[1].mode, FieldMode::Nullable);
        assert_eq!(fields[2].field_type.sql_type(), "BIGINT");
    }

    #[test]
    fn test_parse_schema_rejects_empty_and_duplicates() {
        assert!(matches!(
            parse_schema("s.json", b"[]"),
            Err(EtlError::InvalidSchema { .. })
        ));
        let dup = br#"[{"name":"a","field_type":"STRING"},{"name":"a","field_type":"DATE"}]"#;
        assert!(parse_schema("s.json", dup).is_err());
        assert!(parse_schema("s.json", br#"[{"name":"a","field_type":"GEOGRAPHY"}]"#).is_err());
    }

    #[test]
    fn test_default_fact_schema_round_trips_through_blob() {
        let bytes = serde_json::to_vec(&default_fact_schema()).unwrap();
        assert_eq!(parse_schema("p", &bytes).unwrap(), default_fact_schema());
    }

    #[test]
    fn test_table_ref_quoting() {
        let t = TableRef::new("yfinance_analytics", "stock_prices");
        assert_eq!(t.qualified(), "\"yfinance_analytics\".\"stock_prices\"");
        assert_eq!(t.to_string(), "yfinance_analytics.stock_prices");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }
}
