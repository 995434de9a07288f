//! Database connection management

use std::path::Path;

use rusqlite::Connection;

use crate::error::{Error, Result};

use super::migrations;

/// Wrapper around the on-device `SQLite` database.
///
/// Opening configures pragmas and runs migrations; the connection is then
/// handed to a [`super::SqliteSubmissionStore`], which owns all further
/// access.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open the database at the given path, creating it if it doesn't exist.
    ///
    /// Runs migrations automatically.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref())
            .map_err(|error| Error::StorageWrite(error.to_string()))?;
        let database = Self { conn };
        database.configure()?;
        database.migrate()?;
        Ok(database)
    }

    /// Open an in-memory database (useful for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().map_err(|error| Error::StorageWrite(error.to_string()))?;
        let database = Self { conn };
        database.configure()?;
        database.migrate()?;
        Ok(database)
    }

    /// Configure `SQLite` for durability and concurrency
    fn configure(&self) -> Result<()> {
        // WAL is unavailable for in-memory databases; ignore that failure.
        self.conn
            .pragma_update(None, "journal_mode", "WAL")
            .ok();
        self.conn
            .pragma_update(None, "synchronous", "NORMAL")
            .ok();
        self.conn
            .pragma_update(None, "foreign_keys", "ON")
            .map_err(|error| Error::StorageWrite(error.to_string()))?;
        Ok(())
    }

    /// Run database migrations
    fn migrate(&self) -> Result<()> {
        migrations::run(&self.conn)
    }

    /// Consume the wrapper and return the configured connection
    #[must_use]
    pub fn into_connection(self) -> Connection {
        self.conn
    }

    /// Get a reference to the underlying connection
    #[must_use]
    pub const fn connection(&self) -> &Connection {
        &self.conn
    }
}
