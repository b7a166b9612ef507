//! SQL dialects and the quoting rules used when emitting INSERT statements.

use crate::sample::Value;
use std::fmt;
use std::str::FromStr;

/// Target dialect for identifier and literal quoting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SqlDialect {
    MySql,
    #[default]
    Postgres,
    Sqlite,
    Mssql,
}

impl FromStr for SqlDialect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mysql" | "mariadb" => Ok(SqlDialect::MySql),
            "postgres" | "postgresql" | "pg" | "duckdb" => Ok(SqlDialect::Postgres),
            "sqlite" | "sqlite3" => Ok(SqlDialect::Sqlite),
            "mssql" | "sqlserver" | "tsql" => Ok(SqlDialect::Mssql),
            _ => Err(format!(
                "Unknown dialect: {}. Valid options: mysql, postgres, sqlite, mssql",
                s
            )),
        }
    }
}

impl fmt::Display for SqlDialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlDialect::MySql => write!(f, "mysql"),
            SqlDialect::Postgres => write!(f, "postgres"),
            SqlDialect::Sqlite => write!(f, "sqlite"),
            SqlDialect::Mssql => write!(f, "mssql"),
        }
    }
}

impl SqlDialect {
    /// Quote an identifier, doubling any embedded closing quote
    pub fn quote_identifier(&self, name: &str) -> String {
        match self {
            SqlDialect::MySql => format!("`{}`", name.replace('`', "``")),
            SqlDialect::Postgres | SqlDialect::Sqlite => {
                format!("\"{}\"", name.replace('"', "\"\""))
            }
            SqlDialect::Mssql => format!("[{}]", name.replace(']', "]]")),
        }
    }

    /// Render a value as a SQL literal
    pub fn quote_value(&self, value: &Value) -> String {
        match value {
            Value::Null => "NULL".to_string(),
            Value::Bool(b) => match self {
                SqlDialect::Mssql => (if *b { "1" } else { "0" }).to_string(),
                _ => (if *b { "TRUE" } else { "FALSE" }).to_string(),
            },
            Value::Int(n) => n.to_string(),
            Value::Number(s) => s.clone(),
            Value::Text(s) => self.quote_string(s),
            Value::Bytes(b) => match self {
                SqlDialect::MySql | SqlDialect::Sqlite => format!("X'{}'", hex::encode(b)),
                SqlDialect::Postgres => format!("'\\x{}'", hex::encode(b)),
                SqlDialect::Mssql => format!("0x{}", hex::encode(b)),
            },
        }
    }

    /// Format a string literal with proper escaping for the dialect
    pub fn quote_string(&self, value: &str) -> String {
        match self {
            SqlDialect::MySql => {
                // MySQL uses backslash escaping
                let escaped = value
                    .replace('\\', "\\\\")
                    .replace('\'', "\\'")
                    .replace('\n', "\\n")
                    .replace('\r', "\\r")
                    .replace('\t', "\\t")
                    .replace('\0', "\\0");
                format!("'{}'", escaped)
            }
            SqlDialect::Postgres | SqlDialect::Sqlite => {
                format!("'{}'", value.replace('\'', "''"))
            }
            SqlDialect::Mssql => {
                let escaped = value.replace('\'', "''");
                if value.bytes().any(|b| b > 127) {
                    format!("N'{}'", escaped)
                } else {
                    format!("'{}'", escaped)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_dialect() {
        assert_eq!("MySQL".parse::<SqlDialect>().unwrap(), SqlDialect::MySql);
        assert_eq!("pg".parse::<SqlDialect>().unwrap(), SqlDialect::Postgres);
        assert_eq!("sqlite".parse::<SqlDialect>().unwrap(), SqlDialect::Sqlite);
        assert!("oracle".parse::<SqlDialect>().is_err());
    }

    #[test]
    fn test_quote_identifier() {
        assert_eq!(SqlDialect::MySql.quote_identifier("users"), "`users`");
        assert_eq!(SqlDialect::Postgres.quote_identifier("a\"b"), "\"a\"\"b\"");
        assert_eq!(SqlDialect::Mssql.quote_identifier("users"), "[users]");
    }

    #[test]
    fn test_quote_value() {
        let pg = SqlDialect::Postgres;
        assert_eq!(pg.quote_value(&Value::Null), "NULL");
        assert_eq!(pg.quote_value(&Value::Int(-4)), "-4");
        assert_eq!(pg.quote_value(&"O'Brien".into()), "'O''Brien'");
        assert_eq!(pg.quote_value(&Value::Bytes(vec![0xde, 0xad])), "'\\xdead'");
        assert_eq!(
            SqlDialect::MySql.quote_value(&"a'b\n".into()),
            "'a\\'b\\n'"
        );
        assert_eq!(SqlDialect::Mssql.quote_value(&Value::Bool(true)), "1");
        assert_eq!(SqlDialect::Mssql.quote_value(&"café".into()), "N'café'");
    }
}
