//! Database migrations

use rusqlite::Connection;

use crate::error::{Error, Result};

/// Current schema version
const CURRENT_VERSION: i32 = 1;

/// Run all pending migrations
pub fn run(conn: &Connection) -> Result<()> {
    let version = get_version(conn)?;

    if version < 1 {
        migrate_v1(conn)?;
    }

    Ok(())
}

/// Get the current schema version
fn get_version(conn: &Connection) -> Result<i32> {
    let exists: bool = conn
        .query_row(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
            [],
            |row| row.get(0),
        )
        .map_err(|error| Error::StorageRead(error.to_string()))?;

    if !exists {
        return Ok(0);
    }

    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )
    .map_err(|error| Error::StorageRead(error.to_string()))
}

/// Migration to version 1: submission queue schema
fn migrate_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "BEGIN;
         CREATE TABLE IF NOT EXISTS schema_version (
             version INTEGER PRIMARY KEY
         );
         CREATE TABLE IF NOT EXISTS submissions (
             id TEXT PRIMARY KEY,
             category TEXT NOT NULL,
             payload TEXT NOT NULL,
             created_at INTEGER NOT NULL,
             sync_state TEXT NOT NULL DEFAULT 'pending',
             last_attempt_at INTEGER,
             attempt_count INTEGER NOT NULL DEFAULT 0
         );
         CREATE INDEX IF NOT EXISTS idx_submissions_state ON submissions(sync_state);
         CREATE INDEX IF NOT EXISTS idx_submissions_category_created
             ON submissions(category, created_at DESC);
         INSERT INTO schema_version (version) VALUES (1);
         COMMIT;",
    )
    .map_err(|error| Error::StorageWrite(error.to_string()))?;

    tracing::info!("Migrated database to version {CURRENT_VERSION}");
    Ok(())
}
