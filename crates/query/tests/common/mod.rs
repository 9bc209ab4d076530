//! Shared helpers for executor tests.

use csvgate_core::config::DatabaseConfig;
use csvgate_query::DuckDbExecutor;
use duckdb::Connection;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Expected CSV export of the `test` table.
pub const TEST_TABLE_CSV: &str = "id,label\n1,alpha\n2,\"beta, gamma\"\n3,\n";

/// Create `local.db` in a temp dir with a table, a view and a second schema.
///
/// The file name makes the catalog name `local`.
pub fn seeded_database() -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().expect("Failed to create temp directory");
    let path = dir.path().join("local.db");
    let conn = Connection::open(&path).expect("Failed to create database");
    conn.execute_batch(
        "CREATE TABLE test (id INTEGER, label VARCHAR);
         INSERT INTO test VALUES (1, 'alpha'), (2, 'beta, gamma'), (3, NULL);
         CREATE VIEW test_view AS SELECT id FROM test WHERE id > 1;
         CREATE SCHEMA reporting;
         CREATE TABLE reporting.daily_totals (day VARCHAR, total INTEGER);
         INSERT INTO reporting.daily_totals VALUES ('2024-05-01', 10), ('2024-05-02', 12);",
    )
    .expect("Failed to seed database");
    drop(conn);
    (dir, path)
}

/// Executor reading the given local database file.
pub fn executor_for(path: &Path) -> DuckDbExecutor {
    DuckDbExecutor::new(&DatabaseConfig {
        path: path.to_path_buf(),
        ..DatabaseConfig::default()
    })
}
