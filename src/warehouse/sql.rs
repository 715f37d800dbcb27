//! Typed builders for the statements the pipeline sends to the warehouse.

use super::{quote_ident, SchemaField, TableRef};
use anyhow::{bail, Result};

// ── CREATE TABLE ──────────────────────────────────────────────────────────────

pub fn create_table_sql(table: &TableRef, schema: &[SchemaField], if_not_exists: bool) -> String {
    let columns = schema
        .iter()
        .map(|f| {
            let not_null = match f.mode {
                super::FieldMode::Required => " NOT NULL",
                super::FieldMode::Nullable => "",
            };
            format!("{} {}{}", quote_ident(&f.name), f.field_type.sql_type(), not_null)
        })
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "CREATE TABLE {}{} ({})",
        if if_not_exists { "IF NOT EXISTS " } else { "" },
        table.qualified(),
        columns
    )
}

// ── MERGE ─────────────────────────────────────────────────────────────────────

/// `MERGE INTO target USING source` keyed on `key_columns`: matched rows get every
/// value column overwritten from the source, unmatched rows are inserted.
#[derive(Debug, Clone)]
pub struct MergeStatement {
    target: TableRef,
    source: TableRef,
    key_columns: Vec<String>,
    value_columns: Vec<String>,
}

impl MergeStatement {
    pub fn new(target: TableRef, source: TableRef) -> Self {
        Self {
            target,
            source,
            key_columns: Vec::new(),
            value_columns: Vec::new(),
        }
    }

    pub fn keys<I, S>(mut self, cols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.key_columns = cols.into_iter().map(Into::into).collect();
        self
    }

    pub fn values<I, S>(mut self, cols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.value_columns = cols.into_iter().map(Into::into).collect();
        self
    }

    pub fn on_clause(&self) -> String {
        self.key_columns
            .iter()
            .map(|c| format!("T.{0} = S.{0}", quote_ident(c)))
            .collect::<Vec<_>>()
            .join(" AND ")
    }

    pub fn update_clause(&self) -> String {
        self.value_columns
            .iter()
            .map(|c| format!("{0} = S.{0}", quote_ident(c)))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Keys first, then values.
    pub fn insert_columns(&self) -> Vec<&str> {
        self.key_columns
            .iter()
            .chain(self.value_columns.iter())
            .map(String::as_str)
            .collect()
    }

    pub fn to_sql(&self) -> Result<String> {
        if self.key_columns.is_empty() {
            bail!("MERGE into {} needs at least one key column", self.target);
        }
        if self.value_columns.is_empty() {
            bail!("MERGE into {} needs at least one value column", self.target);
        }
        if let Some(c) = self
            .value_columns
            .iter()
            .find(|c| self.key_columns.contains(c))
        {
            bail!("column `{}` is both a key and a value column", c);
        }

        let insert_cols = self.insert_columns();
        let cols = insert_cols
            .iter()
            .map(|c| quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ");
        let vals = insert_cols
            .iter()
            .map(|c| format!("S.{}", quote_ident(c)))
            .collect::<Vec<_>>()
            .join(", ");

        Ok(format!(
            "MERGE INTO {target} AS T\n\
             USING {source} AS S\n\
             ON ({on})\n\
             WHEN MATCHED THEN\n  UPDATE SET {update}\n\
             WHEN NOT MATCHED THEN\n  INSERT ({cols}) VALUES ({vals})",
            target = self.target.qualified(),
            source = self.source.qualified(),
            on = self.on_clause(),
            update = self.update_clause(),
        ))
    }
}

// ── Analytics rebuild ─────────────────────────────────────────────────────────

/// Full rebuild of the denormalized analytics table from the fact table and the
/// ticker/sector/currency masters.
#[derive(Debug, Clone)]
pub struct AnalyticsQuery {
    pub target: TableRef,
    pub fact: TableRef,
    pub tickers: TableRef,
    pub sectors: TableRef,
    pub currencies: TableRef,
    /// Trailing moving-average lengths, each emitted as `ma<N>`.
    pub ma_windows: Vec<u32>,
}

impl AnalyticsQuery {
    pub const DEFAULT_MA_WINDOWS: [u32; 3] = [5, 25, 75];

    pub fn to_sql(&self) -> Result<String> {
        if let Some(n) = self.ma_windows.iter().find(|&&n| n == 0) {
            bail!("moving-average window must be at least 1, got {}", n);
        }

        let by_ticker = format!(
            "PARTITION BY sp.{} ORDER BY sp.{}",
            quote_ident("ticker_id"),
            quote_ident("date")
        );

        let moving_averages: String = self
            .ma_windows
            .iter()
            .map(|n| {
                format!(
                    "        ROUND(AVG(sp.\"close_price\") OVER ({by_ticker} ROWS BETWEEN {} PRECEDING AND CURRENT ROW), 4) AS ma{n},\n",
                    n - 1
                )
            })
            .collect();

        let ma_select: String = self
            .ma_windows
            .iter()
            .map(|n| format!("    r.ma{n},\n"))
            .collect();

        Ok(format!(
            "CREATE OR REPLACE TABLE {target} AS\n\
             WITH windowed AS (\n\
             \x20   SELECT\n\
             \x20       sp.\"ticker_id\",\n\
             \x20       sp.\"date\",\n\
             \x20       sp.\"close_price\",\n\
             \x20       sp.\"volume\",\n\
             {moving_averages}\
             \x20       LAG(sp.\"close_price\") OVER ({by_ticker}) AS prev_close\n\
             \x20   FROM {fact} sp\n\
             ),\n\
             rated AS (\n\
             \x20   SELECT\n\
             \x20       *,\n\
             \x20       CASE WHEN prev_close IS NULL OR prev_close = 0 THEN NULL\n\
             \x20            ELSE (\"close_price\" - prev_close) / prev_close END AS raw_change\n\
             \x20   FROM windowed\n\
             )\n\
             SELECT\n\
             \x20   r.\"ticker_id\",\n\
             \x20   t.\"company_name\",\n\
             \x20   s.\"sector_name\",\n\
             \x20   c.\"currency_name\",\n\
             \x20   r.\"date\",\n\
             \x20   r.\"close_price\",\n\
             \x20   r.\"volume\",\n\
             {ma_select}\
             \x20   ROUND(r.raw_change, 4) AS change_rate,\n\
             \x20   CASE WHEN r.raw_change > 0 THEN 1 ELSE 0 END AS is_win\n\
             FROM rated r\n\
             LEFT JOIN {tickers} t ON r.\"ticker_id\" = t.\"ticker_id\"\n\
             LEFT JOIN {sectors} s ON t.\"sector_id\" = s.\"sector_id\"\n\
             LEFT JOIN {currencies} c ON t.\"currency_id\" = c.\"currency_id\"",
            target = self.target.qualified(),
            fact = self.fact.qualified(),
            tickers = self.tickers.qualified(),
            sectors = self.sectors.qualified(),
            currencies = self.currencies.qualified(),
        ))
    }
}
