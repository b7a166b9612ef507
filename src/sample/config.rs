//! YAML configuration for the sample command.
//!
//! Supports per-table sizes, seed tables, skipped tables and foreign keys
//! that the database itself does not declare.

use crate::source::{ForeignKey, KeyColumns};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Per-table sampling configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TableConfig {
    /// Seed row count for this table (overrides default)
    pub rows: Option<usize>,
    /// Seed this table
    pub seed: bool,
    /// Do not track this table at all
    pub skip: bool,
}

/// Default sampling settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultConfig {
    /// Default seed row count
    pub rows: Option<usize>,
}

/// Foreign key declared in configuration rather than in the schema
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeclaredForeignKey {
    /// Referencing table
    pub table: String,
    /// Referencing column(s)
    pub columns: KeyColumns,
    /// Referenced table
    pub references: String,
    /// Referenced column(s); defaults to the referenced table's primary key
    #[serde(default)]
    pub referenced_columns: KeyColumns,
}

/// Complete YAML configuration for sample command
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SampleYamlConfig {
    /// Default sampling settings
    pub default: DefaultConfig,
    /// Tables to seed from
    pub seed_tables: Vec<String>,
    /// Tables to leave untracked
    pub exclude: Vec<String>,
    /// Per-table settings
    pub tables: HashMap<String, TableConfig>,
    /// Extra foreign keys
    pub foreign_keys: Vec<DeclaredForeignKey>,
}

impl SampleYamlConfig {
    /// Load configuration from a YAML file
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: SampleYamlConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Get configuration for a specific table
    pub fn get_table_config(&self, table_name: &str) -> Option<&TableConfig> {
        self.tables.get(table_name).or_else(|| {
            // Try case-insensitive match
            let lower = table_name.to_lowercase();
            self.tables
                .iter()
                .find(|(k, _)| k.to_lowercase() == lower)
                .map(|(_, v)| v)
        })
    }

    /// Check if a table should be skipped
    pub fn should_skip(&self, table_name: &str) -> bool {
        if contains_ignore_case(&self.exclude, table_name) {
            return true;
        }
        self.get_table_config(table_name)
            .map(|c| c.skip)
            .unwrap_or(false)
    }

    /// Check if a table is listed as a seed
    pub fn is_seed(&self, table_name: &str) -> bool {
        contains_ignore_case(&self.seed_tables, table_name)
            || self
                .get_table_config(table_name)
                .map(|c| c.seed)
                .unwrap_or(false)
    }

    /// Get seed rows for a table (table-specific or default)
    pub fn get_rows(&self, table_name: &str) -> Option<usize> {
        if let Some(config) = self.get_table_config(table_name) {
            if config.rows.is_some() {
                return config.rows;
            }
        }
        self.default.rows
    }

    /// Declared foreign keys whose referencing table is `table_name`
    pub fn foreign_keys_for(&self, table_name: &str) -> Vec<ForeignKey> {
        self.foreign_keys
            .iter()
            .filter(|fk| fk.table.eq_ignore_ascii_case(table_name))
            .map(|fk| {
                ForeignKey::new(
                    fk.columns.clone(),
                    fk.references.clone(),
                    fk.referenced_columns.clone(),
                )
            })
            .collect()
    }
}

fn contains_ignore_case(list: &[String], name: &str) -> bool {
    list.iter().any(|t| t.eq_ignore_ascii_case(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_yaml_config() {
        let yaml = r#"
default:
  rows: 100

seed_tables:
  - orders

exclude:
  - schema_migrations

tables:
  users:
    rows: 500
  invoices:
    seed: true
  sessions:
    skip: true

foreign_keys:
  - table: orders
    columns: customer_ref
    references: customers
    referenced_columns: ref
  - table: line_items
    columns: [order_id, order_version]
    references: orders
"#;

        let config: SampleYamlConfig = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.default.rows, Some(100));
        assert_eq!(config.get_rows("users"), Some(500));
        assert_eq!(config.get_rows("unknown"), Some(100)); // Falls back to default

        assert!(config.should_skip("sessions"));
        assert!(config.should_skip("SCHEMA_MIGRATIONS"));
        assert!(!config.should_skip("users"));

        assert!(config.is_seed("orders"));
        assert!(config.is_seed("Invoices"));
        assert!(!config.is_seed("users"));

        let fks = config.foreign_keys_for("orders");
        assert_eq!(fks, vec![ForeignKey::new("customer_ref", "customers", "ref")]);

        let composite = config.foreign_keys_for("line_items");
        assert_eq!(composite[0].columns, vec!["order_id", "order_version"]);
        assert!(composite[0].referenced_columns.is_empty());
    }

    #[test]
    fn test_case_insensitive_table_lookup() {
        let yaml = r#"
tables:
  Users:
    rows: 5
"#;
        let config: SampleYamlConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.get_rows("users"), Some(5));
        assert_eq!(config.get_rows("orders"), None);
    }
}
