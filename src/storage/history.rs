//! Per-chat message history.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::message::{CanonicalMessage, ChatId};

use super::StorageError;

/// One stored message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryRecord {
    /// Chat the message belongs to.
    pub chat_id: ChatId,
    /// Backend message handle.
    pub message_id: String,
    /// Sender display name.
    pub sender_name: String,
    /// Message text.
    pub text: String,
    /// Authored by the bot's own account.
    pub is_self: bool,
    /// When the message was received.
    pub received_at: DateTime<Utc>,
}

impl HistoryRecord {
    /// Record for a canonical message.
    pub fn from_message(message: &CanonicalMessage) -> Self {
        Self {
            chat_id: message.chat_id.clone(),
            message_id: message.message_id.clone(),
            sender_name: message.sender_name.clone(),
            text: message.text.clone(),
            is_self: message.is_self_authored,
            received_at: message.received_at,
        }
    }
}

type HistoryRow = (String, String, String, String, bool, String);

const COLUMNS: &str = "chat_id, message_id, sender_name, text, is_self, received_at";

fn decode(row: HistoryRow) -> Result<HistoryRecord, StorageError> {
    let (chat_id, message_id, sender_name, text, is_self, received_at) = row;
    let chat_id = chat_id.parse::<ChatId>().map_err(|_| StorageError::Corrupt {
        field: "chat_id",
        value: chat_id.clone(),
    })?;
    let received_at = DateTime::parse_from_rfc3339(&received_at)
        .map_err(|_| StorageError::Corrupt {
            field: "received_at",
            value: received_at.clone(),
        })?
        .with_timezone(&Utc);
    Ok(HistoryRecord {
        chat_id,
        message_id,
        sender_name,
        text,
        is_self,
        received_at,
    })
}

/// Append-mostly history table.
#[derive(Debug, Clone)]
pub struct HistoryStore {
    pool: SqlitePool,
}

impl HistoryStore {
    pub(super) fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Store one message.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Database`] if the insert fails.
    pub async fn append(&self, record: &HistoryRecord) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO history (chat_id, message_id, sender_name, text, is_self, received_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(record.chat_id.as_str())
        .bind(&record.message_id)
        .bind(&record.sender_name)
        .bind(&record.text)
        .bind(record.is_self)
        .bind(record.received_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// The latest `limit` messages of a chat, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or a row is corrupt.
    pub async fn recent(
        &self,
        chat: &ChatId,
        limit: usize,
    ) -> Result<Vec<HistoryRecord>, StorageError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows: Vec<HistoryRow> = sqlx::query_as(&format!(
            "SELECT {COLUMNS} FROM history WHERE chat_id = ?1 ORDER BY id DESC LIMIT ?2"
        ))
        .bind(chat.as_str())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let mut records = rows
            .into_iter()
            .map(decode)
            .collect::<Result<Vec<_>, _>>()?;
        records.reverse();
        Ok(records)
    }

    /// Most recent self-authored message stored before `before_message_id`.
    ///
    /// When `before_message_id` has not been stored, the latest self-authored
    /// message other than it is returned.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or the row is corrupt.
    pub async fn last_self_authored(
        &self,
        chat: &ChatId,
        before_message_id: &str,
    ) -> Result<Option<HistoryRecord>, StorageError> {
        let row: Option<HistoryRow> = sqlx::query_as(&format!(
            "SELECT {COLUMNS} FROM history \
             WHERE chat_id = ?1 AND is_self = 1 AND message_id != ?2 \
               AND id < COALESCE( \
                   (SELECT max(id) FROM history WHERE chat_id = ?1 AND message_id = ?2), \
                   9223372036854775807) \
             ORDER BY id DESC LIMIT 1"
        ))
        .bind(chat.as_str())
        .bind(before_message_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(decode).transpose()
    }

    /// Delete one message from a chat's history, returning whether it existed.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Database`] if the delete fails.
    pub async fn remove(&self, chat: &ChatId, message_id: &str) -> Result<bool, StorageError> {
        let result = sqlx::query("DELETE FROM history WHERE chat_id = ?1 AND message_id = ?2")
            .bind(chat.as_str())
            .bind(message_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete a chat's history, returning the number of removed rows.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Database`] if the delete fails.
    pub async fn clear(&self, chat: &ChatId) -> Result<u64, StorageError> {
        let result = sqlx::query("DELETE FROM history WHERE chat_id = ?1")
            .bind(chat.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
