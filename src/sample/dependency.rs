//! Pending foreign-key requirements.

use super::Value;
use std::fmt;
use std::hash::{Hash, Hasher};

/// "Table `table` needs one row matching `key`."
///
/// Two dependencies are equal when they target the same table with the same
/// key; `origin` is carried for diagnostics only.
#[derive(Debug, Clone)]
pub struct Dependency {
    /// Referenced table that must contain the row
    pub table: String,
    /// Referenced column → value, in foreign-key column order
    pub key: Vec<(String, Value)>,
    /// Table whose row produced this dependency
    pub origin: String,
}

impl Dependency {
    pub fn new(
        table: impl Into<String>,
        key: Vec<(String, Value)>,
        origin: impl Into<String>,
    ) -> Self {
        Self {
            table: table.into(),
            key,
            origin: origin.into(),
        }
    }

    /// The single key value when the key is exactly one column named `column`.
    pub fn single_key(&self, column: &str) -> Option<&Value> {
        match self.key.as_slice() {
            [(name, value)] if name == column => Some(value),
            _ => None,
        }
    }

    /// Human-readable key, e.g. `(id=7)` or `(org_id=1, user_id=2)`.
    pub fn key_display(&self) -> String {
        let parts: Vec<String> = self
            .key
            .iter()
            .map(|(col, val)| format!("{}={}", col, val))
            .collect();
        format!("({})", parts.join(", "))
    }
}

impl PartialEq for Dependency {
    fn eq(&self, other: &Self) -> bool {
        self.table == other.table && self.key == other.key
    }
}

impl Eq for Dependency {}

impl Hash for Dependency {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.table.hash(state);
        self.key.hash(state);
    }
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{} (referenced from {})",
            self.table,
            self.key_display(),
            self.origin
        )
    }
}
