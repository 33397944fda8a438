//! SQLite-based persistence layer
//!
//! This module provides:
//! - Database initialization and migrations
//! - Chat session and message queries
//! - Connection pooling

mod migrations;
mod queries;

pub use migrations::run_migrations;
pub use queries::*;

use crate::error::{Error, Result, StorageError};
use crate::orchestrator::ChatTranscript;
use crate::types::NewMessage;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use std::path::{Path, PathBuf};
use tracing::info;

/// Database connection pool type
pub type DbPool = Pool<SqliteConnectionManager>;

/// Storage manager for database operations
pub struct Storage {
    pool: DbPool,
    db_path: PathBuf,
}

impl Storage {
    /// Open (or create) the database file, creating its directory if needed
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref().to_path_buf();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                Error::Storage(StorageError::Database(format!(
                    "Failed to create data directory: {}",
                    e
                )))
            })?;
        }
        info!("Database path: {:?}", db_path);

        let manager = SqliteConnectionManager::file(&db_path)
            .with_init(|conn| conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA foreign_keys = ON;"));
        let pool = Pool::builder()
            .max_size(10)
            .build(manager)
            .map_err(|e| Error::Storage(StorageError::Pool(e.to_string())))?;

        let storage = Self { pool, db_path };
        storage.initialize()?;
        Ok(storage)
    }

    /// Create in-memory storage (for testing)
    pub fn in_memory() -> Result<Self> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(|e| Error::Storage(StorageError::Pool(e.to_string())))?;

        let storage = Self {
            pool,
            db_path: PathBuf::from(":memory:"),
        };
        storage.initialize()?;
        Ok(storage)
    }

    fn initialize(&self) -> Result<()> {
        let conn = self.connection()?;
        run_migrations(&conn)?;
        info!("Database initialized successfully");
        Ok(())
    }

    /// Get a connection from the pool
    pub fn connection(&self) -> Result<r2d2::PooledConnection<SqliteConnectionManager>> {
        self.pool
            .get()
            .map_err(|e| Error::Storage(StorageError::Pool(e.to_string())))
    }

    /// Liveness check for the health endpoint
    pub fn ping(&self) -> Result<()> {
        let conn = self.connection()?;
        conn.query_row("SELECT 1", [], |row| row.get::<_, i32>(0))?;
        Ok(())
    }

    pub fn db_path(&self) -> &PathBuf {
        &self.db_path
    }
}

impl ChatTranscript for Storage {
    fn save_message(&self, session_id: &str, message: NewMessage) -> Result<()> {
        let conn = self.connection()?;
        queries::save_message(&conn, session_id, &message)?;
        Ok(())
    }
}
