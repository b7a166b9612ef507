//! In-memory [`QuerySource`] for tests, benchmarks and hand-built fixtures.

use super::{ForeignKey, KeyColumns, QuerySource, SourceError};
use crate::sample::{Row, Value};
use ahash::AHashMap;
use std::cell::Cell;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Relation {
    Table,
    View,
    /// Listed as a table but rejects regular queries (e.g. a search index)
    Virtual,
}

/// A table definition with its rows.
#[derive(Debug, Clone)]
pub struct MemoryTable {
    name: String,
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
    primary_key: Vec<String>,
    foreign_keys: Vec<ForeignKey>,
    relation: Relation,
}

impl MemoryTable {
    pub fn new(name: &str, columns: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows: Vec::new(),
            primary_key: Vec::new(),
            foreign_keys: Vec::new(),
            relation: Relation::Table,
        }
    }

    pub fn primary_key(mut self, columns: impl Into<KeyColumns>) -> Self {
        self.primary_key = columns.into().into_vec();
        self
    }

    pub fn foreign_key(mut self, fk: ForeignKey) -> Self {
        self.foreign_keys.push(fk);
        self
    }

    /// Append a row; values follow the column order given to [`MemoryTable::new`].
    pub fn row(mut self, values: Vec<Value>) -> Self {
        assert_eq!(
            values.len(),
            self.columns.len(),
            "row width does not match columns of '{}'",
            self.name
        );
        self.rows.push(values);
        self
    }

    /// Mark as a view: excluded from listing, not samplable.
    pub fn view(mut self) -> Self {
        self.relation = Relation::View;
        self
    }

    /// Mark as a virtual table: listed, but every query is rejected as ignorable.
    pub fn virtual_table(mut self) -> Self {
        self.relation = Relation::Virtual;
        self
    }

    fn to_row(&self, values: &[Value]) -> Row {
        Row::from_parts(&self.columns, values.to_vec())
    }

    fn column_index(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }
}

/// Source backed by plain vectors. Counts the queries it serves.
#[derive(Debug, Default)]
pub struct MemorySource {
    tables: AHashMap<String, MemoryTable>,
    order: Vec<String>,
    point_queries: Cell<usize>,
    bulk_queries: Cell<usize>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(mut self, table: MemoryTable) -> Self {
        self.add_table(table);
        self
    }

    pub fn add_table(&mut self, table: MemoryTable) {
        if !self.tables.contains_key(&table.name) {
            self.order.push(table.name.clone());
        }
        self.tables.insert(table.name.clone(), table);
    }

    /// Number of `select_one` calls served so far.
    pub fn point_queries(&self) -> usize {
        self.point_queries.get()
    }

    /// Number of `select_bulk` calls served so far.
    pub fn bulk_queries(&self) -> usize {
        self.bulk_queries.get()
    }

    fn table(&self, name: &str) -> Result<&MemoryTable, SourceError> {
        let table = self
            .tables
            .get(name)
            .ok_or_else(|| SourceError::fatal(name, "no such table"))?;
        if table.relation == Relation::Virtual {
            return Err(SourceError::ignorable(name, "virtual table"));
        }
        Ok(table)
    }
}

impl QuerySource for MemorySource {
    fn list_tables(&self) -> Result<Vec<String>, SourceError> {
        Ok(self
            .order
            .iter()
            .filter(|name| {
                self.tables
                    .get(name.as_str())
                    .is_some_and(|t| t.relation != Relation::View)
            })
            .cloned()
            .collect())
    }

    fn is_samplable(&self, table: &str) -> Result<bool, SourceError> {
        Ok(self
            .tables
            .get(table)
            .map(|t| t.relation != Relation::View)
            .unwrap_or(false))
    }

    fn select_bulk(
        &self,
        table: &str,
        limit: usize,
        order_by: &[String],
    ) -> Result<Vec<Row>, SourceError> {
        self.bulk_queries.set(self.bulk_queries.get() + 1);
        let t = self.table(table)?;

        let mut indexes = Vec::with_capacity(order_by.len());
        for col in order_by {
            let idx = t
                .column_index(col)
                .ok_or_else(|| SourceError::fatal(table, format!("unknown column '{}'", col)))?;
            indexes.push(idx);
        }

        let mut rows: Vec<&Vec<Value>> = t.rows.iter().collect();
        if !indexes.is_empty() {
            rows.sort_by(|a, b| {
                let ka: Vec<&Value> = indexes.iter().map(|&i| &a[i]).collect();
                let kb: Vec<&Value> = indexes.iter().map(|&i| &b[i]).collect();
                kb.cmp(&ka)
            });
        }

        Ok(rows
            .into_iter()
            .take(limit)
            .map(|values| t.to_row(values))
            .collect())
    }

    fn select_one(
        &self,
        table: &str,
        key: &[(String, Value)],
    ) -> Result<Option<Row>, SourceError> {
        self.point_queries.set(self.point_queries.get() + 1);
        let t = self.table(table)?;

        let mut lookups = Vec::with_capacity(key.len());
        for (col, val) in key {
            let idx = t
                .column_index(col)
                .ok_or_else(|| SourceError::fatal(table, format!("unknown column '{}'", col)))?;
            lookups.push((idx, val));
        }

        Ok(t
            .rows
            .iter()
            .find(|values| lookups.iter().all(|(idx, val)| &values[*idx] == *val))
            .map(|values| t.to_row(values)))
    }

    fn primary_key(&self, table: &str) -> Result<Vec<String>, SourceError> {
        Ok(self.table(table)?.primary_key.clone())
    }

    fn foreign_keys(&self, table: &str) -> Result<Vec<ForeignKey>, SourceError> {
        Ok(self.table(table)?.foreign_keys.clone())
    }
}
