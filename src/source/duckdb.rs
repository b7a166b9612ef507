//! [`QuerySource`] over an embedded DuckDB database.
//!
//! Table listing comes from `information_schema.tables`; primary and foreign
//! keys are parsed out of the `constraint_text` column of
//! `duckdb_constraints()`.
//!
//! Columns whose type has no direct [`Value`] counterpart (ENUM, INTERVAL,
//! nested types, time zone aware types, UUID, ...) are selected as
//! `CAST(col AS VARCHAR)`. DuckDB's text form of these types casts back on
//! insert, so emitted rows replay and point queries compare correctly.

use super::{ForeignKey, QuerySource, SourceError};
use crate::dialect::SqlDialect;
use crate::sample::{Row, Value};
use ::duckdb::types::{TimeUnit, ValueRef};
use ::duckdb::Connection;
use ahash::AHashMap;
use anyhow::Context;
use once_cell::sync::Lazy;
use regex::Regex;
use std::cell::RefCell;
use std::path::Path;

const SCHEMA: &str = "main";

/// DuckDB error classes raised by relations that cannot be read like a table
const IGNORABLE_ERRORS: &[&str] = &["Catalog Error", "Not implemented Error"];

/// Column types read natively; everything else is selected as VARCHAR
const NATIVE_TYPES: &[&str] = &[
    "BOOLEAN",
    "TINYINT",
    "SMALLINT",
    "INTEGER",
    "BIGINT",
    "HUGEINT",
    "UTINYINT",
    "USMALLINT",
    "UINTEGER",
    "UBIGINT",
    "FLOAT",
    "DOUBLE",
    "VARCHAR",
    "BLOB",
    "DATE",
    "TIME",
    "TIMESTAMP",
    "TIMESTAMP_S",
    "TIMESTAMP_MS",
    "TIMESTAMP_NS",
];

/// Regex for PRIMARY KEY constraint text, e.g. `PRIMARY KEY(id)`
static PRIMARY_KEY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)PRIMARY\s+KEY\s*\(([^)]+)\)").unwrap());

/// Regex for FOREIGN KEY constraint text, e.g. `FOREIGN KEY (user_id) REFERENCES users(id)`
/// The referenced column list is optional.
static FOREIGN_KEY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?i)FOREIGN\s+KEY\s*\(([^)]+)\)\s*REFERENCES\s+(?:[`"\w]+\s*\.\s*)*[`"]?([^`"\s(]+)[`"]?\s*(?:\(([^)]+)\))?"#,
    )
    .unwrap()
});

/// Read-side access to a DuckDB database
pub struct DuckDbSource {
    conn: Connection,
    select_lists: RefCell<AHashMap<String, String>>,
}

impl DuckDbSource {
    /// Open a database file
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open DuckDB database {}", path.display()))?;
        Ok(Self::from_connection(conn))
    }

    /// Wrap an existing connection
    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn,
            select_lists: RefCell::new(AHashMap::new()),
        }
    }

    /// Select list for a table, casting columns without a native mapping.
    ///
    /// Falls back to `*` when the table has no known columns so the query
    /// itself reports the problem.
    fn select_list(&self, table: &str) -> Result<String, SourceError> {
        if let Some(list) = self.select_lists.borrow().get(table) {
            return Ok(list.clone());
        }

        let sql = format!(
            "SELECT column_name, data_type FROM duckdb_columns() \
             WHERE schema_name = '{}' AND table_name = ? ORDER BY column_index",
            SCHEMA
        );
        let mut stmt = self.conn.prepare(&sql).map_err(|e| classify(table, e))?;
        let mut rows = stmt.query([table]).map_err(|e| classify(table, e))?;
        let dialect = SqlDialect::Postgres;
        let mut columns = Vec::new();
        while let Some(row) = rows.next().map_err(|e| classify(table, e))? {
            let name: String = row.get(0).map_err(|e| classify(table, e))?;
            let data_type: String = row.get(1).map_err(|e| classify(table, e))?;
            let quoted = dialect.quote_identifier(&name);
            if is_native_type(&data_type) {
                columns.push(quoted);
            } else {
                columns.push(format!("CAST({} AS VARCHAR) AS {}", quoted, quoted));
            }
        }

        let list = if columns.is_empty() {
            "*".to_string()
        } else {
            columns.join(", ")
        };
        self.select_lists
            .borrow_mut()
            .insert(table.to_string(), list.clone());
        Ok(list)
    }

    /// Run a query and convert every result row
    fn query_rows(&self, table: &str, sql: &str) -> Result<Vec<Row>, SourceError> {
        let mut stmt = self.conn.prepare(sql).map_err(|e| classify(table, e))?;
        let mut rows_result = stmt.query([]).map_err(|e| classify(table, e))?;

        let mut rows: Vec<Vec<Value>> = Vec::new();
        let mut column_count = 0;
        while let Some(row) = rows_result.next().map_err(|e| classify(table, e))? {
            if column_count == 0 {
                column_count = row.as_ref().column_count();
            }
            let mut values = Vec::with_capacity(column_count);
            for i in 0..column_count {
                let value = row.get_ref(i).map_err(|e| classify(table, e))?;
                values.push(to_value(value).map_err(|message| SourceError::fatal(table, message))?);
            }
            rows.push(values);
        }

        // Drop the rows iterator to release the mutable borrow
        drop(rows_result);

        let columns: Vec<String> = (0..stmt.column_count())
            .map(|i| {
                stmt.column_name(i)
                    .map(|s| s.to_string())
                    .unwrap_or_else(|_| format!("col{}", i))
            })
            .collect();

        Ok(rows
            .into_iter()
            .map(|values| Row::from_parts(&columns, values))
            .collect())
    }

    /// Run a query with one text parameter and return the first column as text
    fn query_strings(&self, table: &str, sql: &str) -> Result<Vec<String>, SourceError> {
        let mut stmt = self.conn.prepare(sql).map_err(|e| classify(table, e))?;
        let mut rows = stmt.query([table]).map_err(|e| classify(table, e))?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().map_err(|e| classify(table, e))? {
            let value: Option<String> = row.get(0).map_err(|e| classify(table, e))?;
            if let Some(value) = value {
                out.push(value);
            }
        }
        Ok(out)
    }

    fn constraint_texts(&self, table: &str, kind: &str) -> Result<Vec<String>, SourceError> {
        let sql = format!(
            "SELECT constraint_text FROM duckdb_constraints() \
             WHERE schema_name = '{}' AND table_name = ? AND constraint_type = '{}' \
             ORDER BY constraint_index",
            SCHEMA, kind
        );
        self.query_strings(table, &sql)
    }
}

impl QuerySource for DuckDbSource {
    fn list_tables(&self) -> Result<Vec<String>, SourceError> {
        let sql = format!(
            "SELECT table_name FROM information_schema.tables \
             WHERE table_schema = '{}' AND table_type = 'BASE TABLE' ORDER BY table_name",
            SCHEMA
        );
        let rows = self.query_rows("information_schema.tables", &sql)?;
        Ok(rows
            .iter()
            .filter_map(|r| r.get("table_name").map(Value::to_text))
            .collect())
    }

    fn is_samplable(&self, table: &str) -> Result<bool, SourceError> {
        let sql = format!(
            "SELECT table_type FROM information_schema.tables \
             WHERE table_schema = '{}' AND table_name = ?",
            SCHEMA
        );
        let kinds = self.query_strings(table, &sql)?;
        Ok(kinds.iter().any(|k| k == "BASE TABLE"))
    }

    fn select_bulk(
        &self,
        table: &str,
        limit: usize,
        order_by: &[String],
    ) -> Result<Vec<Row>, SourceError> {
        let dialect = SqlDialect::Postgres;
        let mut sql = format!(
            "SELECT {} FROM {}",
            self.select_list(table)?,
            dialect.quote_identifier(table)
        );
        if !order_by.is_empty() {
            let cols: Vec<String> = order_by
                .iter()
                .map(|c| format!("{} DESC", dialect.quote_identifier(c)))
                .collect();
            sql.push_str(&format!(" ORDER BY {}", cols.join(", ")));
        }
        sql.push_str(&format!(" LIMIT {}", limit));
        self.query_rows(table, &sql)
    }

    fn select_one(
        &self,
        table: &str,
        key: &[(String, Value)],
    ) -> Result<Option<Row>, SourceError> {
        let dialect = SqlDialect::Postgres;
        let conditions: Vec<String> = key
            .iter()
            .map(|(col, val)| format!("{} = {}", dialect.quote_identifier(col), literal(val)))
            .collect();
        let mut sql = format!(
            "SELECT {} FROM {}",
            self.select_list(table)?,
            dialect.quote_identifier(table)
        );
        if !conditions.is_empty() {
            sql.push_str(&format!(" WHERE {}", conditions.join(" AND ")));
        }
        sql.push_str(" LIMIT 1");
        Ok(self.query_rows(table, &sql)?.into_iter().next())
    }

    fn primary_key(&self, table: &str) -> Result<Vec<String>, SourceError> {
        Ok(self
            .constraint_texts(table, "PRIMARY KEY")?
            .iter()
            .find_map(|text| PRIMARY_KEY_RE.captures(text))
            .map(|caps| split_columns(&caps[1]))
            .unwrap_or_default())
    }

    fn foreign_keys(&self, table: &str) -> Result<Vec<ForeignKey>, SourceError> {
        let mut keys = Vec::new();
        for text in self.constraint_texts(table, "FOREIGN KEY")? {
            let Some(caps) = FOREIGN_KEY_RE.captures(&text) else {
                return Err(SourceError::fatal(
                    table,
                    format!("cannot parse foreign key '{}'", text),
                ));
            };
            let referenced = caps
                .get(3)
                .map(|m| split_columns(m.as_str()))
                .unwrap_or_default();
            keys.push(ForeignKey::new(split_columns(&caps[1]), &caps[2], referenced));
        }
        Ok(keys)
    }
}

/// Split a constraint column list and strip identifier quotes
fn split_columns(list: &str) -> Vec<String> {
    list.split(',')
        .map(|c| c.trim().trim_matches(|ch| ch == '"' || ch == '`').to_string())
        .filter(|c| !c.is_empty())
        .collect()
}

/// Literal for a point-query condition
fn literal(value: &Value) -> String {
    match value {
        Value::Bytes(b) => format!("from_hex('{}')", hex::encode(b)),
        other => SqlDialect::Postgres.quote_value(other),
    }
}

fn is_native_type(data_type: &str) -> bool {
    let data_type = data_type.trim().to_uppercase();
    NATIVE_TYPES.contains(&data_type.as_str()) || data_type.starts_with("DECIMAL(")
}

fn classify(table: &str, err: ::duckdb::Error) -> SourceError {
    let message = err.to_string();
    if IGNORABLE_ERRORS.iter().any(|kind| message.contains(kind)) {
        SourceError::ignorable(table, message)
    } else {
        SourceError::fatal(table, message)
    }
}

fn to_micros(unit: TimeUnit, value: i64) -> i64 {
    match unit {
        TimeUnit::Second => value.saturating_mul(1_000_000),
        TimeUnit::Millisecond => value.saturating_mul(1_000),
        TimeUnit::Microsecond => value,
        TimeUnit::Nanosecond => value / 1_000,
    }
}

/// Non-finite floats as the quoted spellings DuckDB and Postgres accept
fn float_value(f: f64) -> Value {
    if f.is_nan() {
        Value::Text("NaN".to_string())
    } else if f.is_infinite() {
        Value::Text(if f > 0.0 { "Infinity" } else { "-Infinity" }.to_string())
    } else {
        Value::Number(f.to_string())
    }
}

fn to_value(value: ValueRef<'_>) -> Result<Value, String> {
    let value = match value {
        ValueRef::Null => Value::Null,
        ValueRef::Boolean(b) => Value::Bool(b),
        ValueRef::TinyInt(n) => Value::Int(n as i64),
        ValueRef::SmallInt(n) => Value::Int(n as i64),
        ValueRef::Int(n) => Value::Int(n as i64),
        ValueRef::BigInt(n) => Value::Int(n),
        ValueRef::HugeInt(n) => match i64::try_from(n) {
            Ok(n) => Value::Int(n),
            Err(_) => Value::Number(n.to_string()),
        },
        ValueRef::UTinyInt(n) => Value::Int(n as i64),
        ValueRef::USmallInt(n) => Value::Int(n as i64),
        ValueRef::UInt(n) => Value::Int(n as i64),
        ValueRef::UBigInt(n) => match i64::try_from(n) {
            Ok(n) => Value::Int(n),
            Err(_) => Value::Number(n.to_string()),
        },
        ValueRef::Float(f) if f.is_finite() => Value::Number(f.to_string()),
        ValueRef::Float(f) => float_value(f as f64),
        ValueRef::Double(f) => float_value(f),
        ValueRef::Decimal(d) => Value::Number(d.to_string()),
        ValueRef::Text(s) => Value::Text(String::from_utf8_lossy(s).into_owned()),
        ValueRef::Blob(b) => Value::Bytes(b.to_vec()),
        ValueRef::Timestamp(unit, ts) => {
            let micros = to_micros(unit, ts);
            let secs = micros.div_euclid(1_000_000);
            let nanos = (micros.rem_euclid(1_000_000) * 1000) as u32;
            match chrono::DateTime::from_timestamp(secs, nanos) {
                Some(dt) => Value::Text(dt.format("%Y-%m-%d %H:%M:%S%.f").to_string()),
                None => return Err(format!("timestamp out of range: {}", ts)),
            }
        }
        ValueRef::Date32(days) => {
            // 719163 = days from 0001-01-01 to 1970-01-01
            match chrono::NaiveDate::from_num_days_from_ce_opt(719163 + days) {
                Some(date) => Value::Text(date.format("%Y-%m-%d").to_string()),
                None => return Err(format!("date out of range: {}", days)),
            }
        }
        ValueRef::Time64(unit, t) => {
            let micros = to_micros(unit, t);
            let secs = (micros / 1_000_000) as u32;
            let nanos = ((micros % 1_000_000) * 1000) as u32;
            match chrono::NaiveTime::from_num_seconds_from_midnight_opt(secs, nanos) {
                Some(time) => Value::Text(time.format("%H:%M:%S%.f").to_string()),
                None => return Err(format!("time out of range: {}", t)),
            }
        }
        other => {
            return Err(format!(
                "unsupported value {:?}; expected the column to be selected as VARCHAR",
                other
            ))
        }
    };
    Ok(value)
}
