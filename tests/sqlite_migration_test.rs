// ABOUTME: Integration tests running the orchestrator against real SQLite files
// ABOUTME: Covers SQLite as a source and as a target with tempfile databases

mod common;

use common::{numbered_rows, Journal, MockSource, MockTarget};
use datda::sqlite::{SqliteAdapter, SqliteSettings};
use datda::{Direction, FieldValue, MigrationOptions, Orchestrator, RunStatus, StoreKind};
use rusqlite::Connection;
use std::path::Path;

fn create_source_db(path: &Path) {
    let conn = Connection::open(path).unwrap();
    conn.execute_batch(
        "
        CREATE TABLE users (
            user_id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            balance REAL,
            avatar BLOB
        );
        CREATE TABLE events (kind TEXT, payload TEXT);
        CREATE TABLE empty_table (id INTEGER PRIMARY KEY, data TEXT);

        INSERT INTO users VALUES
            (1, 'Alice', 100.5, X'48656c6c6f'),
            (2, 'Bob', 200.75, NULL),
            (3, 'Charlie', NULL, NULL);
        INSERT INTO events VALUES ('login', '{}'), ('logout', NULL);
        ",
    )
    .unwrap();
}

fn options() -> MigrationOptions {
    let mut options = MigrationOptions::new(StoreKind::Sqlite, StoreKind::Mongodb);
    options.rows_per_batch = 2;
    options
}

#[tokio::test]
async fn test_sqlite_source_exports_rows_with_ids() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("source.db");
    create_source_db(&path);

    let source = SqliteAdapter::new(
        &SqliteSettings {
            source_path: Some(path.to_str().unwrap().to_string()),
            target_path: None,
        },
        Direction::Source,
    )
    .unwrap();
    let journal = Journal::default();
    let mut target = MockTarget::new(journal.clone());
    target.check_export_mapping = false;

    let log = Orchestrator::new(options(), Box::new(source), Box::new(target))
        .run()
        .await
        .unwrap();

    assert_eq!(log.status, RunStatus::Completed);

    let users = journal.inserted("users");
    assert_eq!(users.len(), 3);
    assert_eq!(users[0]["id"], FieldValue::from(1));
    assert_eq!(users[0]["user_id"], FieldValue::from(1));
    assert_eq!(users[2]["name"], FieldValue::from("Charlie"));
    assert_eq!(
        users[0]["avatar"],
        FieldValue::Structured(serde_json::json!({"_type": "blob", "data": "SGVsbG8="}))
    );

    // No declared key: rowid becomes the id and is not kept as a column
    let events = journal.inserted("events");
    assert_eq!(events.len(), 2);
    assert_eq!(events[0]["id"], FieldValue::from(1));
    assert!(!events[0].contains_key("rowid"));

    assert_eq!(log.table("users").unwrap().primary_key, "user_id");
    assert_eq!(log.table("events").unwrap().primary_key, "rowid");
    assert_eq!(log.table("empty_table").unwrap().batches, 0);
}

#[tokio::test]
async fn test_sqlite_target_upserts_rows() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("target.db");
    let settings = SqliteSettings {
        source_path: None,
        target_path: Some(path.to_str().unwrap().to_string()),
    };

    for _ in 0..2 {
        let journal = Journal::default();
        let source = MockSource::new(journal, vec![("users", numbered_rows(5))]);
        let target = SqliteAdapter::new(&settings, Direction::Target).unwrap();

        let mut options = MigrationOptions::new(StoreKind::Mongodb, StoreKind::Sqlite);
        options.rows_per_batch = 2;

        let log = Orchestrator::new(options, Box::new(source), Box::new(target))
            .run()
            .await
            .unwrap();
        assert_eq!(log.table("users").unwrap().rows_inserted, 5);
    }

    // Second run replaced rows by id instead of duplicating them
    let conn = Connection::open(&path).unwrap();
    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))
        .unwrap();
    assert_eq!(count, 5);

    let n: i64 = conn
        .query_row("SELECT n FROM users WHERE id = 'r3'", [], |row| row.get(0))
        .unwrap();
    assert_eq!(n, 3);

    let exported: i64 = conn
        .query_row("SELECT exported FROM users WHERE id = 'r0'", [], |row| row.get(0))
        .unwrap();
    assert_eq!(exported, 1);
}

#[tokio::test]
async fn test_missing_source_file_is_connection_error() {
    let source = SqliteAdapter::new(
        &SqliteSettings {
            source_path: Some("/nonexistent/source.db".to_string()),
            target_path: None,
        },
        Direction::Source,
    )
    .unwrap();
    let journal = Journal::default();
    let target = MockTarget::new(journal.clone());

    let failure = Orchestrator::new(options(), Box::new(source), Box::new(target))
        .run()
        .await
        .unwrap_err();

    assert!(matches!(
        failure.error,
        datda::MigrationError::Connection {
            store: StoreKind::Sqlite,
            ..
        }
    ));
    assert!(journal.closed(Direction::Target));
}
