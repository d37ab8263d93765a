//! Per-chat image gallery with content deduplication.

use chrono::Utc;
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use tracing::debug;

use crate::message::ChatId;

use super::StorageError;

/// Result of [`GalleryStore::insert_image`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The image was new for this chat.
    Inserted,
    /// The same bytes were already stored for this chat.
    Duplicate,
}

/// Hex SHA-256 of image content.
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Gallery settings and images.
#[derive(Debug, Clone)]
pub struct GalleryStore {
    pool: SqlitePool,
}

impl GalleryStore {
    pub(super) fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Turn collection on or off for a chat.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Database`] if the upsert fails.
    pub async fn set_enabled(&self, chat: &ChatId, enabled: bool) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO gallery_settings (chat_id, enabled) VALUES (?1, ?2) \
             ON CONFLICT(chat_id) DO UPDATE SET enabled = ?2",
        )
        .bind(chat.as_str())
        .bind(enabled)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Whether collection is on for a chat. Off unless explicitly enabled.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Database`] if the query fails.
    pub async fn is_enabled(&self, chat: &ChatId) -> Result<bool, StorageError> {
        let row: Option<(bool,)> =
            sqlx::query_as("SELECT enabled FROM gallery_settings WHERE chat_id = ?1")
                .bind(chat.as_str())
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.is_some_and(|(enabled,)| enabled))
    }

    /// Store an image unless identical bytes are already stored for the chat.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Database`] if the insert fails.
    pub async fn insert_image(
        &self,
        chat: &ChatId,
        mime_type: &str,
        bytes: &[u8],
    ) -> Result<InsertOutcome, StorageError> {
        let hash = content_hash(bytes);
        let result = sqlx::query(
            "INSERT OR IGNORE INTO gallery_images (chat_id, sha256, mime_type, bytes, stored_at) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(chat.as_str())
        .bind(&hash)
        .bind(mime_type)
        .bind(bytes)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            debug!(%chat, %hash, "gallery image already stored");
            Ok(InsertOutcome::Duplicate)
        } else {
            Ok(InsertOutcome::Inserted)
        }
    }

    /// Number of images stored for a chat.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Database`] if the query fails.
    pub async fn count(&self, chat: &ChatId) -> Result<u64, StorageError> {
        let row: (i64,) = sqlx::query_as("SELECT count(*) FROM gallery_images WHERE chat_id = ?1")
            .bind(chat.as_str())
            .fetch_one(&self.pool)
            .await?;
        Ok(u64::try_from(row.0).unwrap_or(0))
    }
}
