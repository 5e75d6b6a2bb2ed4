//! SQLite checkpoint store.
//!
//! One row per message in a single `messages` table. The `(thread_id, seq)`
//! primary key gives each thread a monotonically increasing sequence and
//! `ORDER BY seq` reproduces the exact append order on load. Appends run
//! inside a transaction so a batch lands fully or not at all.

use async_trait::async_trait;
use chatloom_core::error::CheckpointError;
use chatloom_core::message::{Message, MessageToolCall, Role, ThreadId};
use chatloom_core::CheckpointStore;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::{debug, info};

/// A durable SQLite-backed checkpoint store.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Create a new SQLite store from a file path.
    ///
    /// The database and schema are created automatically.
    pub async fn new(path: &str) -> Result<Self, CheckpointError> {
        let options = SqliteConnectOptions::from_str(path)
            .map_err(|e| CheckpointError::Storage(format!("Invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .pragma("foreign_keys", "ON");

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| CheckpointError::Storage(format!("Failed to open SQLite: {e}")))?;

        let store = Self { pool };
        store.run_migrations().await?;
        info!("SQLite checkpoint store initialized at {path}");
        Ok(store)
    }

    /// Create from an existing pool (useful for testing).
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, CheckpointError> {
        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), CheckpointError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS messages (
                thread_id    TEXT NOT NULL,
                seq          INTEGER NOT NULL,
                id           TEXT NOT NULL,
                role         TEXT NOT NULL,
                content      TEXT NOT NULL,
                tool_calls   TEXT NOT NULL DEFAULT '[]',
                tool_call_id TEXT,
                created_at   TEXT NOT NULL,
                PRIMARY KEY (thread_id, seq)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| CheckpointError::MigrationFailed(format!("messages table: {e}")))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_messages_thread ON messages(thread_id, seq)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| CheckpointError::MigrationFailed(format!("thread index: {e}")))?;

        debug!("SQLite migrations complete");
        Ok(())
    }

    fn role_to_str(role: &Role) -> &'static str {
        match role {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
            Role::Tool => "tool",
        }
    }

    fn role_from_str(s: &str) -> Result<Role, CheckpointError> {
        match s {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            "system" => Ok(Role::System),
            "tool" => Ok(Role::Tool),
            other => Err(CheckpointError::QueryFailed(format!(
                "Unknown role in store: {other}"
            ))),
        }
    }

    /// Parse a `Message` from a SQLite row.
    fn row_to_message(row: &sqlx::sqlite::SqliteRow) -> Result<Message, CheckpointError> {
        let id: String = row
            .try_get("id")
            .map_err(|e| CheckpointError::QueryFailed(format!("id column: {e}")))?;
        let role_str: String = row
            .try_get("role")
            .map_err(|e| CheckpointError::QueryFailed(format!("role column: {e}")))?;
        let content: String = row
            .try_get("content")
            .map_err(|e| CheckpointError::QueryFailed(format!("content column: {e}")))?;
        let tool_calls_json: String = row
            .try_get("tool_calls")
            .map_err(|e| CheckpointError::QueryFailed(format!("tool_calls column: {e}")))?;
        let tool_call_id: Option<String> = row
            .try_get("tool_call_id")
            .map_err(|e| CheckpointError::QueryFailed(format!("tool_call_id column: {e}")))?;
        let created_at_str: String = row
            .try_get("created_at")
            .map_err(|e| CheckpointError::QueryFailed(format!("created_at column: {e}")))?;

        let tool_calls: Vec<MessageToolCall> =
            serde_json::from_str(&tool_calls_json).unwrap_or_default();

        let timestamp = chrono::DateTime::parse_from_rfc3339(&created_at_str)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());

        Ok(Message {
            id,
            role: Self::role_from_str(&role_str)?,
            content,
            tool_calls,
            tool_call_id,
            timestamp,
        })
    }
}

#[async_trait]
impl CheckpointStore for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn load(&self, thread_id: &ThreadId) -> Result<Vec<Message>, CheckpointError> {
        let rows = sqlx::query("SELECT * FROM messages WHERE thread_id = ?1 ORDER BY seq")
            .bind(thread_id.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| CheckpointError::QueryFailed(format!("Load thread: {e}")))?;

        rows.iter().map(Self::row_to_message).collect()
    }

    async fn append(
        &self,
        thread_id: &ThreadId,
        messages: &[Message],
    ) -> Result<(), CheckpointError> {
        if messages.is_empty() {
            return Ok(());
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| CheckpointError::Storage(format!("Begin transaction: {e}")))?;

        let row = sqlx::query(
            "SELECT COALESCE(MAX(seq), -1) AS max_seq FROM messages WHERE thread_id = ?1",
        )
        .bind(thread_id.as_str())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| CheckpointError::QueryFailed(format!("Max seq: {e}")))?;

        let mut seq: i64 = row
            .try_get("max_seq")
            .map_err(|e| CheckpointError::QueryFailed(format!("max_seq column: {e}")))?;

        for message in messages {
            seq += 1;
            let tool_calls_json = serde_json::to_string(&message.tool_calls)
                .map_err(|e| CheckpointError::Storage(format!("Tool calls serialization: {e}")))?;

            sqlx::query(
                r#"
                INSERT INTO messages (thread_id, seq, id, role, content, tool_calls, tool_call_id, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                "#,
            )
            .bind(thread_id.as_str())
            .bind(seq)
            .bind(&message.id)
            .bind(Self::role_to_str(&message.role))
            .bind(&message.content)
            .bind(&tool_calls_json)
            .bind(&message.tool_call_id)
            .bind(message.timestamp.to_rfc3339())
            .execute(&mut *tx)
            .await
            .map_err(|e| CheckpointError::Storage(format!("INSERT failed: {e}")))?;
        }

        tx.commit()
            .await
            .map_err(|e| CheckpointError::Storage(format!("Commit: {e}")))?;

        debug!(thread = %thread_id, count = messages.len(), "Appended messages");
        Ok(())
    }

    async fn list_thread_ids(&self) -> Result<Vec<ThreadId>, CheckpointError> {
        let rows = sqlx::query(
            "SELECT DISTINCT thread_id FROM messages ORDER BY thread_id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| CheckpointError::QueryFailed(format!("List threads: {e}")))?;

        rows.iter()
            .map(|row| {
                let id: String = row
                    .try_get("thread_id")
                    .map_err(|e| CheckpointError::QueryFailed(format!("thread_id column: {e}")))?;
                Ok(ThreadId::from(id.as_str()))
            })
            .collect()
    }
}
