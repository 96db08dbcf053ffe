//! Durable message store backed by SQLite.
//!
//! Every chat message is persisted here before any delivery attempt. The
//! store assigns both the id and the timestamp; clients never supply either.
//! Appends and reads run concurrently through the pool without serializing
//! unrelated connections.

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use thiserror::Error;
use tracing::{debug, info};

/// Store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The message failed validation and was never persisted.
    #[error("Invalid message: {0}")]
    InvalidMessage(&'static str),

    /// The durable medium is unreachable or the write failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// A persisted chat message.
///
/// `recipient` of `None` means broadcast. Records are never mutated or
/// deleted once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Message {
    /// Monotonically increasing id, assigned at persistence time.
    pub id: i64,
    pub sender: String,
    pub recipient: Option<String>,
    pub content: String,
    /// Server-assigned creation time (UTC, second precision). Monotonic with
    /// insertion order.
    pub sent_at: DateTime<Utc>,
}

impl Message {
    /// Whether this is a broadcast message.
    #[must_use]
    pub fn is_broadcast(&self) -> bool {
        self.recipient.is_none()
    }
}

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS messages (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        sender TEXT NOT NULL,
        recipient TEXT,
        content TEXT NOT NULL,
        sent_at TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_messages_sent_at ON messages (sent_at)",
    "CREATE INDEX IF NOT EXISTS idx_messages_recipient ON messages (recipient)",
];

/// Append-only log of chat messages with queryable history.
///
/// Cloning shares the underlying pool.
#[derive(Debug, Clone)]
pub struct MessageStore {
    pool: SqlitePool,
}

impl MessageStore {
    /// Open the store and apply the schema.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrated.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let pool = SqlitePool::connect(url).await?;
        Self::with_pool(pool).await
    }

    /// Open an in-memory store, mainly for tests.
    ///
    /// A pooled `:memory:` database is one database per connection, so the
    /// pool is pinned to a single never-reaped connection.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened.
    pub async fn in_memory() -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        Self::with_pool(pool).await
    }

    async fn with_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&pool).await?;
        }
        info!("message store ready");
        Ok(Self { pool })
    }

    /// Validate, timestamp, and durably persist a message.
    ///
    /// The id and `sent_at` are assigned here, atomically with the write.
    ///
    /// # Errors
    ///
    /// Returns `InvalidMessage` for an empty sender or content (nothing is
    /// written), or `Database` if the durable medium is unreachable. The
    /// caller must not silently drop the message on failure.
    pub async fn append(
        &self,
        sender: &str,
        recipient: Option<&str>,
        content: &str,
    ) -> Result<Message, StoreError> {
        if sender.is_empty() {
            return Err(StoreError::InvalidMessage("sender must not be empty"));
        }
        if content.is_empty() {
            return Err(StoreError::InvalidMessage("content must not be empty"));
        }

        let sent_at = Utc::now().trunc_subsecs(0);
        let result = sqlx::query(
            "INSERT INTO messages (sender, recipient, content, sent_at) VALUES (?, ?, ?, ?)",
        )
        .bind(sender)
        .bind(recipient)
        .bind(content)
        .bind(sent_at)
        .execute(&self.pool)
        .await?;

        let message = Message {
            id: result.last_insert_rowid(),
            sender: sender.to_owned(),
            recipient: recipient.map(str::to_owned),
            content: content.to_owned(),
            sent_at,
        };
        debug!(id = message.id, sender = %message.sender, broadcast = message.is_broadcast(), "message persisted");
        Ok(message)
    }

    /// Up to `limit` most-recent messages relevant to `username`: broadcasts,
    /// direct messages they received, and messages they sent. Returned
    /// oldest-first (fetched newest-first, then reversed for presentation).
    /// Direct messages between two other users are never included.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn history_for(&self, username: &str, limit: u32) -> Result<Vec<Message>, StoreError> {
        let mut messages: Vec<Message> = sqlx::query_as(
            "SELECT id, sender, recipient, content, sent_at FROM messages \
             WHERE recipient IS NULL OR recipient = ? OR sender = ? \
             ORDER BY sent_at DESC, id DESC LIMIT ?",
        )
        .bind(username)
        .bind(username)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        messages.reverse();
        Ok(messages)
    }

    /// Close the underlying pool. Subsequent operations fail with
    /// [`StoreError::Database`].
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_append_assigns_id_and_timestamp() {
        let store = MessageStore::in_memory().await.unwrap();

        let first = store.append("ayse", None, "selam").await.unwrap();
        let second = store.append("ayse", Some("mehmet"), "naber").await.unwrap();

        assert!(second.id > first.id);
        assert!(second.sent_at >= first.sent_at);
        assert_eq!(first.sent_at.timestamp_subsec_nanos(), 0);
        assert!(first.is_broadcast());
        assert!(!second.is_broadcast());
    }

    #[tokio::test]
    async fn test_append_validation() {
        let store = MessageStore::in_memory().await.unwrap();

        assert!(matches!(
            store.append("", None, "selam").await,
            Err(StoreError::InvalidMessage(_))
        ));
        assert!(matches!(
            store.append("ayse", None, "").await,
            Err(StoreError::InvalidMessage(_))
        ));

        // Nothing was written.
        assert!(store.history_for("ayse", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_history_includes_new_message() {
        let store = MessageStore::in_memory().await.unwrap();

        let message = store.append("ayse", None, "selam").await.unwrap();
        let history = store.history_for("ayse", 50).await.unwrap();

        assert_eq!(history, vec![message]);
    }

    #[tokio::test]
    async fn test_history_filters_third_party_directs() {
        let store = MessageStore::in_memory().await.unwrap();

        store.append("ayse", None, "herkese").await.unwrap();
        store.append("ayse", Some("mehmet"), "sana").await.unwrap();
        store.append("mehmet", Some("ayse"), "cevap").await.unwrap();
        store.append("mehmet", Some("fatma"), "gizli").await.unwrap();

        let history = store.history_for("ayse", 50).await.unwrap();
        let contents: Vec<&str> = history.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["herkese", "sana", "cevap"]);

        // The direct message between mehmet and fatma is invisible to ayse.
        let fatma = store.history_for("fatma", 50).await.unwrap();
        assert_eq!(fatma.len(), 2); // broadcast + her direct
    }

    #[tokio::test]
    async fn test_history_limit_and_order() {
        let store = MessageStore::in_memory().await.unwrap();

        for i in 0..60 {
            store.append("ayse", None, &format!("m{i}")).await.unwrap();
        }

        let history = store.history_for("mehmet", 50).await.unwrap();
        assert_eq!(history.len(), 50);
        // Oldest-first presentation of the 50 most recent.
        assert_eq!(history.first().unwrap().content, "m10");
        assert_eq!(history.last().unwrap().content, "m59");
        assert!(history.windows(2).all(|w| w[0].id < w[1].id));
    }

    #[tokio::test]
    async fn test_append_fails_when_medium_unreachable() {
        let store = MessageStore::in_memory().await.unwrap();
        store.close().await;

        assert!(matches!(
            store.append("ayse", None, "selam").await,
            Err(StoreError::Database(_))
        ));
    }
}
