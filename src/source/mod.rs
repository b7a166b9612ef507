//! Query-executor boundary.
//!
//! The sampler never talks to a database directly. Everything it needs
//! (bounded bulk selects, point lookups, primary and foreign key metadata)
//! goes through [`QuerySource`]. Failures are split into two kinds so the
//! caller can decide explicitly what to swallow:
//!
//! - [`SourceError::Ignorable`]: the relation cannot be queried the way a
//!   table can (views, virtual/search-engine tables, unsupported engines)
//! - [`SourceError::Fatal`]: anything else

pub mod duckdb;
pub mod memory;

pub use self::duckdb::DuckDbSource;
pub use memory::{MemorySource, MemoryTable};

use crate::sample::{Row, Value};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error raised at the query boundary.
#[derive(Debug, Clone, Error)]
pub enum SourceError {
    /// Relation exists but cannot be queried as a plain table
    #[error("relation '{table}' cannot be queried as a table: {message}")]
    Ignorable { table: String, message: String },

    /// Any other query failure
    #[error("query against '{table}' failed: {message}")]
    Fatal { table: String, message: String },
}

impl SourceError {
    pub fn ignorable(table: impl Into<String>, message: impl Into<String>) -> Self {
        SourceError::Ignorable {
            table: table.into(),
            message: message.into(),
        }
    }

    pub fn fatal(table: impl Into<String>, message: impl Into<String>) -> Self {
        SourceError::Fatal {
            table: table.into(),
            message: message.into(),
        }
    }

    pub fn is_ignorable(&self) -> bool {
        matches!(self, SourceError::Ignorable { .. })
    }
}

/// Column list given either as a single name or as a sequence.
///
/// Foreign key metadata shows up in both shapes (`user_id` vs.
/// `[org_id, user_id]`); [`KeyColumns::into_vec`] is the one place that
/// flattens it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KeyColumns {
    One(String),
    Many(Vec<String>),
}

impl KeyColumns {
    pub fn into_vec(self) -> Vec<String> {
        match self {
            KeyColumns::One(col) => vec![col],
            KeyColumns::Many(cols) => cols,
        }
    }
}

impl Default for KeyColumns {
    fn default() -> Self {
        KeyColumns::Many(Vec::new())
    }
}

impl From<&str> for KeyColumns {
    fn from(col: &str) -> Self {
        KeyColumns::One(col.to_string())
    }
}

impl From<String> for KeyColumns {
    fn from(col: String) -> Self {
        KeyColumns::One(col)
    }
}

impl From<Vec<String>> for KeyColumns {
    fn from(cols: Vec<String>) -> Self {
        KeyColumns::Many(cols)
    }
}

impl From<&[&str]> for KeyColumns {
    fn from(cols: &[&str]) -> Self {
        KeyColumns::Many(cols.iter().map(|c| c.to_string()).collect())
    }
}

impl<const N: usize> From<[&str; N]> for KeyColumns {
    fn from(cols: [&str; N]) -> Self {
        KeyColumns::Many(cols.iter().map(|c| c.to_string()).collect())
    }
}

/// Outgoing foreign key of a table.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ForeignKey {
    /// Columns in the referencing table
    pub columns: Vec<String>,
    /// Referenced table name
    pub referenced_table: String,
    /// Referenced columns; empty means the referenced table's primary key
    pub referenced_columns: Vec<String>,
}

impl ForeignKey {
    pub fn new(
        columns: impl Into<KeyColumns>,
        referenced_table: impl Into<String>,
        referenced_columns: impl Into<KeyColumns>,
    ) -> Self {
        Self {
            columns: columns.into().into_vec(),
            referenced_table: referenced_table.into(),
            referenced_columns: referenced_columns.into().into_vec(),
        }
    }
}

/// Capability the sampler needs from a database.
pub trait QuerySource {
    /// Base tables eligible for sampling (views excluded).
    fn list_tables(&self) -> Result<Vec<String>, SourceError>;

    /// Whether `table` is a real table rather than a view.
    fn is_samplable(&self, table: &str) -> Result<bool, SourceError>;

    /// Up to `limit` rows, ordered descending by `order_by` when non-empty.
    fn select_bulk(
        &self,
        table: &str,
        limit: usize,
        order_by: &[String],
    ) -> Result<Vec<Row>, SourceError>;

    /// At most one row whose columns equal every `key` entry.
    fn select_one(&self, table: &str, key: &[(String, Value)])
        -> Result<Option<Row>, SourceError>;

    /// Primary key columns in order; empty when the table has none.
    fn primary_key(&self, table: &str) -> Result<Vec<String>, SourceError>;

    /// Outgoing foreign keys of `table`.
    fn foreign_keys(&self, table: &str) -> Result<Vec<ForeignKey>, SourceError>;
}

impl<S: QuerySource + ?Sized> QuerySource for &S {
    fn list_tables(&self) -> Result<Vec<String>, SourceError> {
        (**self).list_tables()
    }

    fn is_samplable(&self, table: &str) -> Result<bool, SourceError> {
        (**self).is_samplable(table)
    }

    fn select_bulk(
        &self,
        table: &str,
        limit: usize,
        order_by: &[String],
    ) -> Result<Vec<Row>, SourceError> {
        (**self).select_bulk(table, limit, order_by)
    }

    fn select_one(
        &self,
        table: &str,
        key: &[(String, Value)],
    ) -> Result<Option<Row>, SourceError> {
        (**self).select_one(table, key)
    }

    fn primary_key(&self, table: &str) -> Result<Vec<String>, SourceError> {
        (**self).primary_key(table)
    }

    fn foreign_keys(&self, table: &str) -> Result<Vec<ForeignKey>, SourceError> {
        (**self).foreign_keys(table)
    }
}
