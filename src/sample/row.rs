//! Row and value model for sampled data.

use std::fmt;

/// A single column value as read from the source database.
///
/// Non-integer numerics keep their textual form so that rows stay hashable
/// and comparable by content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    /// Decimal, floating point or out-of-range integer, in its literal form
    Number(String),
    Text(String),
    Bytes(Vec<u8>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Render the value as plain text (no SQL quoting).
    pub fn to_text(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Int(n) => n.to_string(),
            Value::Number(s) | Value::Text(s) => s.clone(),
            Value::Bytes(b) => String::from_utf8_lossy(b).into_owned(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Text(s) => write!(f, "'{}'", s),
            Value::Bytes(b) => write!(f, "0x{}", hex::encode(b)),
            other => write!(f, "{}", other.to_text()),
        }
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(n as i64)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// An ordered mapping of column name to value, read from one table.
///
/// Equality and hashing cover every column, so two rows are duplicates only
/// when all of their values match.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Row {
    columns: Vec<(String, Value)>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a row from parallel column and value lists.
    pub fn from_parts(columns: &[String], values: Vec<Value>) -> Self {
        Self {
            columns: columns.iter().cloned().zip(values).collect(),
        }
    }

    /// Append a column, keeping insertion order.
    pub fn push(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        self.columns.push((column.into(), value.into()));
    }

    /// Builder-style variant of [`Row::push`].
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push(column, value);
        self
    }

    /// Look up a column by exact name.
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, v)| v)
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns.iter().map(|(name, v)| (name.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rows_equal_only_on_full_content() {
        let a = Row::new().with("id", 7).with("name", "Alice");
        let b = Row::new().with("id", 7).with("name", "Alice");
        let c = Row::new().with("id", 7).with("name", "Alicia");

        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_get_by_column() {
        let row = Row::new().with("id", 1).with("manager_id", None::<i64>);
        assert_eq!(row.get("id"), Some(&Value::Int(1)));
        assert!(row.get("manager_id").unwrap().is_null());
        assert_eq!(row.get("missing"), None);
    }

    #[test]
    fn test_value_to_text() {
        assert_eq!(Value::Int(42).to_text(), "42");
        assert_eq!(Value::Bool(true).to_text(), "true");
        assert_eq!(Value::Number("3.14".into()).to_text(), "3.14");
        assert_eq!(Value::Bytes(b"ab".to_vec()).to_text(), "ab");
    }
}
