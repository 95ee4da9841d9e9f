//! SQLite conversation repository implementation.
//!
//! Implements `ConversationRepository` from `sihah-core` using sqlx with split
//! read/write pools. Every write runs in one transaction on the single-connection
//! writer pool, so a turn's messages become visible together or not at all.

use sihah_core::chat::repository::ConversationRepository;
use sihah_types::chat::{
    Conversation, ConversationMessage, ConversationStatus, Metadata, NewMessage,
};
use sihah_types::error::RepositoryError;
use sihah_types::llm::MessageRole;
use chrono::{DateTime, Utc};
use sqlx::{Row, Sqlite, Transaction};
use uuid::Uuid;

use super::pool::DatabasePool;

/// SQLite-backed implementation of `ConversationRepository`.
pub struct SqliteConversationRepository {
    pool: DatabasePool,
}

impl SqliteConversationRepository {
    /// Create a new repository backed by the given database pool.
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

// ---------------------------------------------------------------------------
// Private Row types for SQLite-to-domain mapping
// ---------------------------------------------------------------------------

/// Internal row type for mapping SQLite rows to domain Conversation.
struct ConversationRow {
    id: String,
    agent_id: String,
    channel: String,
    status: String,
    metadata: String,
    started_at: String,
    ended_at: Option<String>,
}

impl ConversationRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            agent_id: row.try_get("agent_id")?,
            channel: row.try_get("channel")?,
            status: row.try_get("status")?,
            metadata: row.try_get("metadata")?,
            started_at: row.try_get("started_at")?,
            ended_at: row.try_get("ended_at")?,
        })
    }

    fn into_conversation(self) -> Result<Conversation, RepositoryError> {
        let id = Uuid::parse_str(&self.id)
            .map_err(|e| RepositoryError::Query(format!("invalid conversation id: {e}")))?;
        let agent_id = Uuid::parse_str(&self.agent_id)
            .map_err(|e| RepositoryError::Query(format!("invalid agent_id: {e}")))?;
        let status: ConversationStatus = self
            .status
            .parse()
            .map_err(|e: String| RepositoryError::Query(e))?;

        Ok(Conversation {
            id,
            agent_id,
            channel: self.channel,
            status,
            metadata: parse_metadata(&self.metadata)?,
            started_at: parse_datetime(&self.started_at)?,
            ended_at: self.ended_at.as_deref().map(parse_datetime).transpose()?,
        })
    }
}

/// Internal row type for mapping SQLite rows to domain ConversationMessage.
struct MessageRow {
    id: String,
    conversation_id: String,
    seq: i64,
    role: String,
    content: String,
    metadata: String,
    created_at: String,
}

impl MessageRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            conversation_id: row.try_get("conversation_id")?,
            seq: row.try_get("seq")?,
            role: row.try_get("role")?,
            content: row.try_get("content")?,
            metadata: row.try_get("metadata")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn into_message(self) -> Result<ConversationMessage, RepositoryError> {
        let id = Uuid::parse_str(&self.id)
            .map_err(|e| RepositoryError::Query(format!("invalid message id: {e}")))?;
        let conversation_id = Uuid::parse_str(&self.conversation_id)
            .map_err(|e| RepositoryError::Query(format!("invalid conversation_id: {e}")))?;
        let role: MessageRole = self
            .role
            .parse()
            .map_err(|e: String| RepositoryError::Query(e))?;

        Ok(ConversationMessage {
            id,
            conversation_id,
            seq: self.seq,
            role,
            content: self.content,
            metadata: parse_metadata(&self.metadata)?,
            created_at: parse_datetime(&self.created_at)?,
        })
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Query(format!("invalid datetime: {e}")))
}

fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

fn parse_metadata(s: &str) -> Result<Metadata, RepositoryError> {
    serde_json::from_str(s).map_err(|e| RepositoryError::Query(format!("invalid metadata: {e}")))
}

fn format_metadata(metadata: &Metadata) -> Result<String, RepositoryError> {
    serde_json::to_string(metadata).map_err(|e| RepositoryError::Query(e.to_string()))
}

fn query_err(e: sqlx::Error) -> RepositoryError {
    RepositoryError::Query(e.to_string())
}

fn rows_to_messages(
    rows: &[sqlx::sqlite::SqliteRow],
) -> Result<Vec<ConversationMessage>, RepositoryError> {
    let mut messages = Vec::with_capacity(rows.len());
    for row in rows {
        let msg_row = MessageRow::from_row(row).map_err(query_err)?;
        messages.push(msg_row.into_message()?);
    }
    Ok(messages)
}

async fn fetch_conversation_tx(
    tx: &mut Transaction<'_, Sqlite>,
    id: &Uuid,
) -> Result<Option<Conversation>, RepositoryError> {
    let row = sqlx::query("SELECT * FROM conversations WHERE id = ?")
        .bind(id.to_string())
        .fetch_optional(&mut **tx)
        .await
        .map_err(query_err)?;

    row.map(|r| {
        ConversationRow::from_row(&r)
            .map_err(query_err)?
            .into_conversation()
    })
    .transpose()
}

/// Insert `messages` after the conversation's current last `seq`.
async fn insert_messages_tx(
    tx: &mut Transaction<'_, Sqlite>,
    conversation_id: &Uuid,
    messages: &[NewMessage],
) -> Result<Vec<ConversationMessage>, RepositoryError> {
    let row = sqlx::query(
        "SELECT COALESCE(MAX(seq), 0) AS last_seq FROM conversation_messages WHERE conversation_id = ?",
    )
    .bind(conversation_id.to_string())
    .fetch_one(&mut **tx)
    .await
    .map_err(query_err)?;
    let last_seq: i64 = row.try_get("last_seq").map_err(query_err)?;

    let mut stored = Vec::with_capacity(messages.len());
    for (offset, message) in messages.iter().enumerate() {
        let seq = last_seq + 1 + offset as i64;
        sqlx::query(
            r#"INSERT INTO conversation_messages (id, conversation_id, seq, role, content, metadata, created_at)
               VALUES (?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(message.id.to_string())
        .bind(conversation_id.to_string())
        .bind(seq)
        .bind(message.role.to_string())
        .bind(&message.content)
        .bind(format_metadata(&message.metadata)?)
        .bind(format_datetime(&message.created_at))
        .execute(&mut **tx)
        .await
        .map_err(query_err)?;

        stored.push(ConversationMessage {
            id: message.id,
            conversation_id: *conversation_id,
            seq,
            role: message.role,
            content: message.content.clone(),
            metadata: message.metadata.clone(),
            created_at: message.created_at,
        });
    }
    Ok(stored)
}

// ---------------------------------------------------------------------------
// ConversationRepository implementation
// ---------------------------------------------------------------------------

impl ConversationRepository for SqliteConversationRepository {
    async fn get_conversation(&self, id: &Uuid) -> Result<Option<Conversation>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM conversations WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_err)?;

        match row {
            Some(row) => {
                let conv_row = ConversationRow::from_row(&row).map_err(query_err)?;
                Ok(Some(conv_row.into_conversation()?))
            }
            None => Ok(None),
        }
    }

    async fn append_turn(
        &self,
        conversation: &Conversation,
        messages: &[NewMessage],
    ) -> Result<Vec<ConversationMessage>, RepositoryError> {
        let mut tx = self.pool.writer.begin().await.map_err(query_err)?;

        sqlx::query(
            r#"INSERT INTO conversations (id, agent_id, channel, status, metadata, started_at, ended_at)
               VALUES (?, ?, ?, ?, ?, ?, ?)
               ON CONFLICT(id) DO NOTHING"#,
        )
        .bind(conversation.id.to_string())
        .bind(conversation.agent_id.to_string())
        .bind(&conversation.channel)
        .bind(conversation.status.to_string())
        .bind(format_metadata(&conversation.metadata)?)
        .bind(format_datetime(&conversation.started_at))
        .bind(conversation.ended_at.as_ref().map(format_datetime))
        .execute(&mut *tx)
        .await
        .map_err(query_err)?;

        let stored = fetch_conversation_tx(&mut tx, &conversation.id)
            .await?
            .ok_or(RepositoryError::NotFound)?;
        if !stored.status.accepts_turns() {
            // Dropping `tx` rolls back.
            return Err(RepositoryError::Conflict(format!(
                "conversation {} is {}",
                stored.id, stored.status
            )));
        }

        let appended = insert_messages_tx(&mut tx, &conversation.id, messages).await?;
        tx.commit().await.map_err(query_err)?;
        Ok(appended)
    }

    async fn read_recent_history(
        &self,
        conversation_id: &Uuid,
        limit: usize,
    ) -> Result<Vec<ConversationMessage>, RepositoryError> {
        let rows = sqlx::query(
            r#"SELECT * FROM (
                   SELECT * FROM conversation_messages
                   WHERE conversation_id = ?
                   ORDER BY seq DESC
                   LIMIT ?
               ) ORDER BY seq ASC"#,
        )
        .bind(conversation_id.to_string())
        .bind(limit as i64)
        .fetch_all(&self.pool.reader)
        .await
        .map_err(query_err)?;

        rows_to_messages(&rows)
    }

    async fn list_messages(
        &self,
        conversation_id: &Uuid,
    ) -> Result<Vec<ConversationMessage>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT * FROM conversation_messages WHERE conversation_id = ? ORDER BY seq ASC",
        )
        .bind(conversation_id.to_string())
        .fetch_all(&self.pool.reader)
        .await
        .map_err(query_err)?;

        rows_to_messages(&rows)
    }

    async fn update_conversation_status(
        &self,
        conversation_id: &Uuid,
        expected: ConversationStatus,
        next: ConversationStatus,
        note: &NewMessage,
    ) -> Result<Conversation, RepositoryError> {
        let mut tx = self.pool.writer.begin().await.map_err(query_err)?;

        let ended_at = next.is_terminal().then(|| format_datetime(&Utc::now()));
        let result = sqlx::query(
            r#"UPDATE conversations
               SET status = ?, ended_at = COALESCE(?, ended_at)
               WHERE id = ? AND status = ?"#,
        )
        .bind(next.to_string())
        .bind(ended_at)
        .bind(conversation_id.to_string())
        .bind(expected.to_string())
        .execute(&mut *tx)
        .await
        .map_err(query_err)?;

        if result.rows_affected() == 0 {
            return match fetch_conversation_tx(&mut tx, conversation_id).await? {
                Some(current) => Err(RepositoryError::Conflict(format!(
                    "expected status {expected}, found {}",
                    current.status
                ))),
                None => Err(RepositoryError::NotFound),
            };
        }

        insert_messages_tx(&mut tx, conversation_id, std::slice::from_ref(note)).await?;
        let updated = fetch_conversation_tx(&mut tx, conversation_id)
            .await?
            .ok_or(RepositoryError::NotFound)?;
        tx.commit().await.map_err(query_err)?;
        Ok(updated)
    }

    async fn annotate_conversation(
        &self,
        conversation_id: &Uuid,
        key: &str,
        value: serde_json::Value,
    ) -> Result<Conversation, RepositoryError> {
        let mut tx = self.pool.writer.begin().await.map_err(query_err)?;

        let mut conversation = fetch_conversation_tx(&mut tx, conversation_id)
            .await?
            .ok_or(RepositoryError::NotFound)?;
        conversation.metadata.insert(key.to_string(), value);

        sqlx::query("UPDATE conversations SET metadata = ? WHERE id = ?")
            .bind(format_metadata(&conversation.metadata)?)
            .bind(conversation_id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(query_err)?;

        tx.commit().await.map_err(query_err)?;
        Ok(conversation)
    }
}
