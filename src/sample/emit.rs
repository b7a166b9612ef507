//! Rendering a table sample as replayable INSERT statements.
//!
//! Output per table:
//!
//! ```text
//! -- users: 2 rows
//! INSERT INTO "users" ("id","password") VALUES (3,'*******'),(7,'******');
//! ```
//!
//! Columns named `password` (any case) are masked before quoting. This is a
//! literal column-name check, not PII detection.

use super::{Row, Value};
use crate::dialect::SqlDialect;
use ahash::AHashSet;

/// Rows per INSERT statement
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Replacement for every character of a redacted value
pub const MASK_CHAR: char = '*';

/// Whether values of this column are masked on output.
pub fn is_redacted_column(column: &str) -> bool {
    column.eq_ignore_ascii_case("password")
}

/// Length-preserving mask. Non-text values are rendered as text first;
/// NULL stays NULL.
pub fn mask_value(value: &Value) -> Value {
    match value {
        Value::Null => Value::Null,
        other => {
            let len = other.to_text().chars().count();
            Value::Text(MASK_CHAR.to_string().repeat(len))
        }
    }
}

/// Render one table: a row-count comment, then INSERT statements of at most
/// `batch_size` rows each. Rows are sorted so output is stable.
pub fn render_table(
    table: &str,
    rows: &AHashSet<Row>,
    dialect: SqlDialect,
    batch_size: usize,
) -> String {
    let mut out = format!("-- {}: {} rows\n", table, rows.len());

    let mut sorted: Vec<&Row> = rows.iter().collect();
    sorted.sort();

    let Some(first) = sorted.first() else {
        return out;
    };

    let columns: Vec<String> = first
        .column_names()
        .map(|c| dialect.quote_identifier(c))
        .collect();
    let header = format!(
        "INSERT INTO {} ({}) VALUES ",
        dialect.quote_identifier(table),
        columns.join(",")
    );

    for batch in sorted.chunks(batch_size.max(1)) {
        let values: Vec<String> = batch
            .iter()
            .map(|row| format!("({})", render_values(row, dialect)))
            .collect();
        out.push_str(&header);
        out.push_str(&values.join(","));
        out.push_str(";\n");
    }

    out
}

fn render_values(row: &Row, dialect: SqlDialect) -> String {
    row.iter()
        .map(|(column, value)| {
            if is_redacted_column(column) {
                dialect.quote_value(&mask_value(value))
            } else {
                dialect.quote_value(value)
            }
        })
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn users() -> AHashSet<Row> {
        let mut rows = AHashSet::new();
        rows.insert(Row::new().with("id", 7).with("Password", "secret"));
        rows.insert(Row::new().with("id", 3).with("Password", Value::Null));
        rows
    }

    #[test]
    fn test_render_masks_password() {
        let sql = render_table("users", &users(), SqlDialect::Postgres, 1000);
        assert_eq!(
            sql,
            "-- users: 2 rows\n\
             INSERT INTO \"users\" (\"id\",\"Password\") VALUES (3,NULL),(7,'******');\n"
        );
        assert!(!sql.contains("secret"));
    }

    #[test]
    fn test_render_batches() {
        let mut rows = AHashSet::new();
        for i in 0..5 {
            rows.insert(Row::new().with("id", i));
        }
        let sql = render_table("t", &rows, SqlDialect::MySql, 2);
        assert_eq!(sql.matches("INSERT INTO `t`").count(), 3);
        assert!(sql.starts_with("-- t: 5 rows\n"));
    }

    #[test]
    fn test_render_empty_table() {
        let sql = render_table("empty", &AHashSet::new(), SqlDialect::Postgres, 1000);
        assert_eq!(sql, "-- empty: 0 rows\n");
    }

    #[test]
    fn test_mask_non_text() {
        assert_eq!(mask_value(&Value::Int(12345)), Value::Text("*****".into()));
        assert_eq!(mask_value(&"pässwörd".into()), Value::Text("********".into()));
        assert!(is_redacted_column("PASSWORD"));
        assert!(!is_redacted_column("password_hash"));
    }
}
