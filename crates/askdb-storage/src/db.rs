//! Application database handle.
//!
//! Conversations and messages live in one SQLite file guarded by a single
//! mutex-protected connection. Multi-statement writes go through
//! [`Database::with_tx`] so they land atomically.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::Connection;
use tracing::info;

use askdb_core::error::AskError;

use crate::migrations;

const FILE_PRAGMAS: &str = "PRAGMA journal_mode = WAL;
     PRAGMA synchronous = NORMAL;
     PRAGMA foreign_keys = ON;";

/// Shared handle to the application database.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) the database file and bring its schema up to date.
    pub fn new(path: &Path) -> Result<Self, AskError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)
            .map_err(|e| AskError::Storage(format!("Failed to open database: {}", e)))?;
        let db = Self::prepare(conn, FILE_PRAGMAS)?;
        info!(path = %path.display(), "Application database ready");
        Ok(db)
    }

    /// In-memory database, used by tests.
    pub fn in_memory() -> Result<Self, AskError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| AskError::Storage(format!("Failed to open in-memory db: {}", e)))?;
        Self::prepare(conn, "PRAGMA foreign_keys = ON;")
    }

    fn prepare(conn: Connection, pragmas: &str) -> Result<Self, AskError> {
        conn.execute_batch(pragmas)
            .map_err(|e| AskError::Storage(format!("Failed to set pragmas: {}", e)))?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.with_conn(migrations::run_migrations)?;
        Ok(db)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, AskError> {
        self.conn
            .lock()
            .map_err(|e| AskError::Storage(format!("Database lock poisoned: {}", e)))
    }

    /// Run a closure against the connection while holding the lock.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, AskError>
    where
        F: FnOnce(&Connection) -> Result<T, AskError>,
    {
        let conn = self.lock()?;
        f(&conn)
    }

    /// Run a closure inside a transaction. An `Err` from the closure rolls
    /// every statement back.
    pub fn with_tx<F, T>(&self, f: F) -> Result<T, AskError>
    where
        F: FnOnce(&Connection) -> Result<T, AskError>,
    {
        let mut conn = self.lock()?;
        let tx = conn
            .transaction()
            .map_err(|e| AskError::Storage(format!("Failed to begin transaction: {}", e)))?;
        let value = f(&tx)?;
        tx.commit()
            .map_err(|e| AskError::Storage(format!("Failed to commit transaction: {}", e)))?;
        Ok(value)
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_memory_database() {
        let db = Database::in_memory().unwrap();
        db.with_conn(|conn| {
            let count: i64 = conn
                .query_row("SELECT COUNT(*) FROM sessions", [], |row| row.get(0))
                .map_err(|e| AskError::Storage(e.to_string()))?;
            assert_eq!(count, 0);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_file_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data").join("app.db");
        let db = Database::new(&path).unwrap();

        db.with_conn(|conn| {
            let count: i64 = conn
                .query_row("SELECT COUNT(*) FROM messages", [], |row| row.get(0))
                .map_err(|e| AskError::Storage(e.to_string()))?;
            assert_eq!(count, 0);
            Ok(())
        })
        .unwrap();

        assert!(path.exists());
    }

    #[test]
    fn test_with_tx_rolls_back_on_error() {
        let db = Database::in_memory().unwrap();
        let result: Result<(), AskError> = db.with_tx(|conn| {
            conn.execute(
                "INSERT INTO sessions (id, title, created_at, updated_at) VALUES ('a', 't', 0, 0)",
                [],
            )
            .map_err(|e| AskError::Storage(e.to_string()))?;
            Err(AskError::Storage("abort".to_string()))
        });
        assert!(result.is_err());

        let count: i64 = db
            .with_conn(|conn| {
                conn.query_row("SELECT COUNT(*) FROM sessions", [], |row| row.get(0))
                    .map_err(|e| AskError::Storage(e.to_string()))
            })
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_foreign_keys_enabled() {
        let db = Database::in_memory().unwrap();
        db.with_conn(|conn| {
            let on: i64 = conn
                .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
                .map_err(|e| AskError::Storage(e.to_string()))?;
            assert_eq!(on, 1);
            Ok(())
        })
        .unwrap();
    }
}
