//! Server-side store for received submissions.
//!
//! Rows are deduplicated on the client-generated idempotency key, so a
//! client that resends after a lost acknowledgment gets the original row
//! back instead of creating a duplicate.

use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use asha_core::{Category, Payload};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;

use crate::error::AppError;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS received_submissions (
    id TEXT PRIMARY KEY,
    category TEXT NOT NULL,
    client_key TEXT,
    payload TEXT NOT NULL,
    received_at INTEGER NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_received_client_key
    ON received_submissions(category, client_key)
    WHERE client_key IS NOT NULL;
CREATE INDEX IF NOT EXISTS idx_received_category_time
    ON received_submissions(category, received_at DESC);
";

#[derive(Debug, Clone, Serialize)]
pub struct ReceivedSubmission {
    pub id: String,
    pub category: Category,
    pub payload: Payload,
    pub received_at: i64,
}

/// Per-category totals for the reporting endpoint
#[derive(Debug, Clone, Copy, Serialize)]
pub struct SummaryCounts {
    pub total: u64,
    pub health: u64,
    pub water: u64,
    pub last_received_at: Option<i64>,
}

pub struct ReceivedStore {
    conn: Mutex<Connection>,
}

impl ReceivedStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, AppError> {
        let conn = Connection::open(path)?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, AppError> {
        let conn = Connection::open_in_memory()?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self, AppError> {
        conn.pragma_update(None, "journal_mode", "WAL").ok();
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store one submission, deduplicating on the client key.
    ///
    /// Returns the stored row and whether it was newly created. When the
    /// key was seen before, the original row is returned unchanged.
    pub fn insert(
        &self,
        category: Category,
        client_key: Option<&str>,
        payload: &Payload,
    ) -> Result<(ReceivedSubmission, bool), AppError> {
        let conn = self.lock();

        if let Some(key) = client_key {
            let existing = conn
                .query_row(
                    "SELECT id, category, payload, received_at FROM received_submissions
                     WHERE category = ? AND client_key = ?",
                    params![category.as_str(), key],
                    parse_row,
                )
                .optional()?;
            if let Some(row) = existing {
                return Ok((row, false));
            }
        }

        let submission = ReceivedSubmission {
            id: uuid::Uuid::now_v7().to_string(),
            category,
            payload: payload.clone(),
            received_at: chrono::Utc::now().timestamp_millis(),
        };
        let payload_json = serde_json::to_string(&submission.payload)
            .map_err(|error| AppError::internal(error.to_string()))?;

        conn.execute(
            "INSERT INTO received_submissions (id, category, client_key, payload, received_at)
             VALUES (?, ?, ?, ?, ?)",
            params![
                submission.id,
                submission.category.as_str(),
                client_key,
                payload_json,
                submission.received_at,
            ],
        )?;

        Ok((submission, true))
    }

    /// Recent submissions, newest first, optionally filtered by category
    pub fn list(
        &self,
        category: Option<Category>,
        limit: usize,
    ) -> Result<Vec<ReceivedSubmission>, AppError> {
        let conn = self.lock();

        #[allow(clippy::cast_possible_wrap)] // SQLite uses i64 for LIMIT
        let limit = limit as i64;

        let rows = if let Some(category) = category {
            let mut stmt = conn.prepare(
                "SELECT id, category, payload, received_at FROM received_submissions
                 WHERE category = ?
                 ORDER BY received_at DESC, rowid DESC
                 LIMIT ?",
            )?;
            stmt.query_map(params![category.as_str(), limit], parse_row)
                .and_then(Iterator::collect::<rusqlite::Result<Vec<_>>>)?
        } else {
            let mut stmt = conn.prepare(
                "SELECT id, category, payload, received_at FROM received_submissions
                 ORDER BY received_at DESC, rowid DESC
                 LIMIT ?",
            )?;
            stmt.query_map(params![limit], parse_row)
                .and_then(Iterator::collect::<rusqlite::Result<Vec<_>>>)?
        };

        Ok(rows)
    }

    pub fn summary(&self) -> Result<SummaryCounts, AppError> {
        let conn = self.lock();
        let (total, health, water, last_received_at) = conn.query_row(
            "SELECT COUNT(*),
                    COUNT(*) FILTER (WHERE category = 'health'),
                    COUNT(*) FILTER (WHERE category = 'water'),
                    MAX(received_at)
             FROM received_submissions",
            [],
            |row| {
                Ok((
                    row.get::<_, u64>(0)?,
                    row.get::<_, u64>(1)?,
                    row.get::<_, u64>(2)?,
                    row.get::<_, Option<i64>>(3)?,
                ))
            },
        )?;

        Ok(SummaryCounts {
            total,
            health,
            water,
            last_received_at,
        })
    }
}

fn parse_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ReceivedSubmission> {
    let category: String = row.get(1)?;
    let payload_json: String = row.get(2)?;
    let payload: Payload = serde_json::from_str(&payload_json).map_err(|error| {
        rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(error))
    })?;

    Ok(ReceivedSubmission {
        id: row.get(0)?,
        category: category.parse().unwrap_or(Category::Health),
        payload,
        received_at: row.get(3)?,
    })
}
