//! SQLite persistence for chat history and image galleries.
//!
//! [`Store`] owns the connection pool and applies the embedded schema on open.
//! The typed views [`HistoryStore`] and [`GalleryStore`] are cheap clones that
//! pipelines hold for the process lifetime.

use std::path::Path;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::info;

pub mod gallery;
pub mod history;

pub use gallery::{GalleryStore, InsertOutcome};
pub use history::{HistoryRecord, HistoryStore};

const SCHEMA: &str = include_str!("../../migrations/001_relay.sql");

/// Errors from the persistence layer.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Database operation failed.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The database directory could not be created.
    #[error("failed to prepare database directory: {0}")]
    Io(#[from] std::io::Error),

    /// A stored row could not be decoded.
    #[error("corrupt {field} value: {value:?}")]
    Corrupt {
        /// Column that failed to decode.
        field: &'static str,
        /// The stored value.
        value: String,
    },
}

/// Shared SQLite pool with the relay schema applied.
#[derive(Debug, Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Open (or create) the database file and apply the schema.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created, the database
    /// cannot be opened, or the schema fails to apply.
    pub async fn open(path: &Path) -> Result<Self, StorageError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .pragma("trusted_schema", "OFF");

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        let store = Self::with_pool(pool).await?;
        info!(path = %path.display(), "storage opened");
        Ok(store)
    }

    /// Private in-memory database, for tests and dry runs.
    ///
    /// # Errors
    ///
    /// Returns an error if the pool cannot be created or the schema fails.
    pub async fn in_memory() -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::new()
            .filename(":memory:")
            .create_if_missing(true);
        // Every connection to :memory: is a separate database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        Self::with_pool(pool).await
    }

    async fn with_pool(pool: SqlitePool) -> Result<Self, StorageError> {
        sqlx::raw_sql(SCHEMA).execute(&pool).await?;
        Ok(Self { pool })
    }

    /// Chat history view.
    pub fn history(&self) -> HistoryStore {
        HistoryStore::new(self.pool.clone())
    }

    /// Gallery view.
    pub fn gallery(&self) -> GalleryStore {
        GalleryStore::new(self.pool.clone())
    }

    /// The underlying pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}
