//! End-to-end sampling against real DuckDB databases and YAML configs.

use duckdb::Connection;
use sql_sampler::dialect::SqlDialect;
use sql_sampler::sample::{
    self, run_with_source, SampleConfig, Sampler, SamplerOptions, TableSample, Value,
    DEFAULT_BATCH_SIZE,
};
use sql_sampler::source::{
    DuckDbSource, ForeignKey, MemorySource, MemoryTable, QuerySource,
};
use std::fs;
use tempfile::TempDir;

const SHOP_SCHEMA: &str = r#"
CREATE TABLE companies (
    id INTEGER PRIMARY KEY,
    name VARCHAR
);

CREATE TABLE users (
    id INTEGER PRIMARY KEY,
    company_id INTEGER,
    email VARCHAR,
    password VARCHAR,
    FOREIGN KEY (company_id) REFERENCES companies(id)
);

CREATE TABLE orders (
    id INTEGER PRIMARY KEY,
    user_id INTEGER,
    amount DECIMAL(10,2),
    placed_at TIMESTAMP,
    FOREIGN KEY (user_id) REFERENCES users(id)
);

INSERT INTO companies VALUES (1, 'Acme Corp'), (2, 'Widgets Inc'), (3, 'Tech Co');
INSERT INTO users VALUES
    (1, 1, 'alice@example.com', 'alicepass'),
    (2, 1, 'bob@example.com', 'bobpass'),
    (3, 2, 'carol@example.com', 'carolpass'),
    (4, NULL, 'dave@example.com', NULL);
INSERT INTO orders VALUES
    (1, 1, 99.99, '2024-01-01 10:00:00'),
    (2, 3, 149.50, '2024-01-02 11:00:00'),
    (3, 2, 75.00, '2024-01-03 12:00:00');

CREATE VIEW big_orders AS SELECT * FROM orders WHERE amount > 100;
"#;

fn create_shop_db() -> (TempDir, std::path::PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("shop.duckdb");
    {
        let conn = Connection::open(&db_path).unwrap();
        conn.execute_batch(SHOP_SCHEMA).unwrap();
    }
    (temp_dir, db_path)
}

fn shop_source() -> DuckDbSource {
    let conn = Connection::open_in_memory().unwrap();
    conn.execute_batch(SHOP_SCHEMA).unwrap();
    DuckDbSource::from_connection(conn)
}

// =============================================================================
// DuckDbSource
// =============================================================================

#[test]
fn test_duckdb_lists_base_tables_only() {
    let source = shop_source();
    assert_eq!(
        source.list_tables().unwrap(),
        vec!["companies", "orders", "users"]
    );
    assert!(source.is_samplable("orders").unwrap());
    assert!(!source.is_samplable("big_orders").unwrap());
}

#[test]
fn test_duckdb_key_metadata() {
    let source = shop_source();
    assert_eq!(source.primary_key("users").unwrap(), vec!["id"]);
    assert_eq!(
        source.foreign_keys("orders").unwrap(),
        vec![ForeignKey::new("user_id", "users", "id")]
    );
    assert_eq!(
        source.foreign_keys("users").unwrap(),
        vec![ForeignKey::new("company_id", "companies", "id")]
    );
    assert!(source.foreign_keys("companies").unwrap().is_empty());
}

#[test]
fn test_duckdb_bulk_and_point_queries() {
    let source = shop_source();

    let rows = source
        .select_bulk("orders", 2, &["id".to_string()])
        .unwrap();
    let ids: Vec<String> = rows
        .iter()
        .map(|r| r.get("id").unwrap().to_text())
        .collect();
    assert_eq!(ids, vec!["3", "2"]);
    assert_eq!(
        rows[0].get("placed_at").unwrap().to_text(),
        "2024-01-03 12:00:00"
    );

    let key = vec![("id".to_string(), Value::Int(3))];
    let carol = source.select_one("users", &key).unwrap().unwrap();
    assert_eq!(carol.get("email").unwrap().to_text(), "carol@example.com");

    let missing = vec![("id".to_string(), Value::Int(99))];
    assert!(source.select_one("users", &missing).unwrap().is_none());
}

#[test]
fn test_duckdb_missing_table_is_ignorable() {
    let source = shop_source();
    let err = source.select_bulk("no_such_table", 10, &[]).unwrap_err();
    assert!(err.is_ignorable());
}

const TYPED_DDL: &str = r#"
CREATE TYPE mood AS ENUM ('happy', 'sad');

CREATE TABLE moods (
    id INTEGER PRIMARY KEY,
    name mood UNIQUE
);

CREATE TABLE entries (
    id INTEGER PRIMARY KEY,
    mood mood,
    span INTERVAL,
    tags INTEGER[],
    score DOUBLE,
    noted_at TIMESTAMPTZ
);
"#;

const TYPED_DATA: &str = r#"
INSERT INTO moods VALUES (1, 'happy'), (2, 'sad');
INSERT INTO entries VALUES
    (1, 'sad', INTERVAL 1 DAY, [1, 2], 'NaN', '2024-01-01 10:00:00+00');
"#;

fn typed_source() -> DuckDbSource {
    let conn = Connection::open_in_memory().unwrap();
    conn.execute_batch(TYPED_DDL).unwrap();
    conn.execute_batch(TYPED_DATA).unwrap();
    DuckDbSource::from_connection(conn)
}

#[test]
fn test_duckdb_non_native_types_read_as_text() {
    let source = typed_source();
    let rows = source.select_bulk("entries", 10, &[]).unwrap();
    assert_eq!(rows.len(), 1);
    let row = &rows[0];

    assert_eq!(row.get("mood"), Some(&Value::Text("sad".to_string())));
    assert_eq!(row.get("span").unwrap().to_text(), "1 day");
    assert_eq!(row.get("tags").unwrap().to_text(), "[1, 2]");
    assert_eq!(row.get("score"), Some(&Value::Text("NaN".to_string())));

    let noted_at = row.get("noted_at").unwrap().to_text();
    let offset = regex::Regex::new(r"[+-]\d{2}(:\d{2})?$").unwrap();
    assert!(offset.is_match(&noted_at), "no offset in {}", noted_at);
}

#[test]
fn test_duckdb_enum_key_point_query() {
    let source = typed_source();
    let key = vec![("name".to_string(), Value::Text("sad".to_string()))];
    let row = source.select_one("moods", &key).unwrap().unwrap();
    assert_eq!(row.get("id"), Some(&Value::Int(2)));
}

#[test]
fn test_duckdb_non_native_types_replay() {
    let source = typed_source();
    let mut sampler = Sampler::new(&source, SamplerOptions::default());
    sampler.track(TableSample::new("moods", 10));
    // Enum-typed reference, declared rather than introspected
    sampler.track(
        TableSample::new("entries", 1)
            .with_foreign_keys(vec![ForeignKey::new("mood", "moods", "name")]),
    );
    sampler.seed("entries").unwrap();
    sampler.close().unwrap();
    assert_eq!(sampler.tables().get("moods").unwrap().len(), 1);

    let tables = sampler.tables();
    let mut sql = tables
        .get("moods")
        .unwrap()
        .emit(SqlDialect::Postgres, DEFAULT_BATCH_SIZE);
    sql.push_str(
        &tables
            .get("entries")
            .unwrap()
            .emit(SqlDialect::Postgres, DEFAULT_BATCH_SIZE),
    );

    let replay = Connection::open_in_memory().unwrap();
    replay.execute_batch(TYPED_DDL).unwrap();
    replay.execute_batch(&sql).unwrap();

    let (mood, span, tags, score_is_nan): (String, String, String, bool) = replay
        .query_row(
            "SELECT mood::VARCHAR, span::VARCHAR, tags::VARCHAR, isnan(score) FROM entries",
            [],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
        )
        .unwrap();
    assert_eq!(mood, "sad");
    assert_eq!(span, "1 day");
    assert_eq!(tags, "[1, 2]");
    assert!(score_is_nan);
}

// =============================================================================
// sample::run
// =============================================================================

#[test]
fn test_run_closes_over_foreign_keys() {
    let (temp_dir, db_path) = create_shop_db();
    let output = temp_dir.path().join("sample.sql");

    let config = SampleConfig {
        input: db_path,
        output: Some(output.clone()),
        rows: 1,
        seed_tables: vec!["orders".to_string()],
        ..Default::default()
    };
    let stats = sample::run(config).unwrap();

    // Newest order (3) -> user 2 -> company 1
    assert_eq!(stats.tables_tracked, 3);
    assert_eq!(stats.tables_seeded, 1);
    assert_eq!(stats.total_rows, 3);

    let sql = fs::read_to_string(&output).unwrap();
    assert!(sql.contains("-- companies: 1 rows\n"));
    assert!(sql.contains("-- orders: 1 rows\n"));
    assert!(sql.contains("-- users: 1 rows\n"));
    assert!(sql.contains("'Acme Corp'"));
    assert!(sql.contains("(2,1,'bob@example.com','*******')"));
    assert!(!sql.contains("bobpass"));
    assert!(!sql.contains("big_orders"));
}

#[test]
fn test_run_seeds_all_tables_by_default() {
    let (temp_dir, db_path) = create_shop_db();
    let output = temp_dir.path().join("sample.sql");

    let config = SampleConfig {
        input: db_path,
        output: Some(output.clone()),
        dialect: SqlDialect::MySql,
        ..Default::default()
    };
    let stats = sample::run(config).unwrap();

    assert_eq!(stats.tables_seeded, 3);
    assert_eq!(stats.total_rows, 10);

    let sql = fs::read_to_string(&output).unwrap();
    assert!(sql.contains("INSERT INTO `users`"));
    assert!(sql.contains("(4,NULL,'dave@example.com',NULL)"));
}

#[test]
fn test_run_dry_run_writes_nothing() {
    let (temp_dir, db_path) = create_shop_db();
    let output = temp_dir.path().join("sample.sql");

    let config = SampleConfig {
        input: db_path,
        output: Some(output.clone()),
        dry_run: true,
        ..Default::default()
    };
    let stats = sample::run(config).unwrap();

    assert_eq!(stats.total_rows, 10);
    assert!(!output.exists());
}

#[test]
fn test_run_excluding_referenced_table_fails() {
    let (temp_dir, db_path) = create_shop_db();

    let config = SampleConfig {
        input: db_path,
        output: Some(temp_dir.path().join("sample.sql")),
        seed_tables: vec!["users".to_string()],
        exclude: vec!["companies".to_string()],
        ..Default::default()
    };
    let err = sample::run(config).unwrap_err();
    assert!(format!("{:#}", err).contains("companies"));
}

#[test]
fn test_run_unknown_seed_table_fails() {
    let (temp_dir, db_path) = create_shop_db();

    let config = SampleConfig {
        input: db_path,
        output: Some(temp_dir.path().join("sample.sql")),
        seed_tables: vec!["invoices".to_string()],
        ..Default::default()
    };
    let err = sample::run(config).unwrap_err();
    assert!(err.to_string().contains("invoices"));
}

// =============================================================================
// YAML config
// =============================================================================

#[test]
fn test_run_with_declared_foreign_keys() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("sample.yaml");
    let output = temp_dir.path().join("sample.sql");
    fs::write(
        &config_path,
        r#"
seed_tables: [events]
tables:
  events:
    rows: 1
  audit_log:
    skip: true
foreign_keys:
  - table: events
    columns: account_ref
    references: accounts
"#,
    )
    .unwrap();

    // No foreign keys declared in the schema itself
    let source = MemorySource::new()
        .with_table(
            MemoryTable::new("accounts", &["id", "password"])
                .primary_key("id")
                .row(vec![1.into(), "topsecret".into()])
                .row(vec![2.into(), "alsosecret".into()]),
        )
        .with_table(
            MemoryTable::new("events", &["id", "account_ref"])
                .primary_key("id")
                .row(vec![10.into(), 2.into()])
                .row(vec![11.into(), 1.into()]),
        )
        .with_table(MemoryTable::new("audit_log", &["id"]).row(vec![1.into()]));

    let config = SampleConfig {
        output: Some(output.clone()),
        config_file: Some(config_path),
        ..Default::default()
    };
    let stats = run_with_source(&config, &source).unwrap();

    assert_eq!(stats.tables_tracked, 2);
    assert_eq!(stats.tables_seeded, 1);

    let sql = fs::read_to_string(&output).unwrap();
    assert!(sql.contains("-- events: 1 rows\n"));
    assert!(sql.contains("(11,1)"));
    assert!(sql.contains("-- accounts: 1 rows\n"));
    assert!(sql.contains("(1,'*********')"));
    assert!(!sql.contains("audit_log"));
}
