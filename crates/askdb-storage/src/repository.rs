//! Repository implementations for SQLite-backed persistence.
//!
//! `ConversationRepository` manages sessions; `MessageRepository` manages
//! the user/assistant halves of each turn.

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use rusqlite::OptionalExtension;
use uuid::Uuid;

use askdb_core::error::AskError;
use askdb_core::types::{Conversation, Message, MessagePatch, Role};

use crate::db::Database;

/// Repository for conversations (the `sessions` table).
#[derive(Clone)]
pub struct ConversationRepository {
    db: Arc<Database>,
}

impl ConversationRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Create a conversation with the given title.
    pub fn create(&self, title: &str) -> Result<Conversation, AskError> {
        let now = now_millis();
        let conversation = Conversation {
            id: Uuid::new_v4(),
            title: title.to_string(),
            created_at: from_millis(now)?,
            updated_at: from_millis(now)?,
        };
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO sessions (id, title, created_at, updated_at) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![conversation.id.to_string(), conversation.title, now, now],
            )
            .map_err(|e| AskError::Storage(format!("Failed to create session: {}", e)))?;
            Ok(())
        })?;
        Ok(conversation)
    }

    /// Find a conversation by ID.
    pub fn find_by_id(&self, id: Uuid) -> Result<Option<Conversation>, AskError> {
        self.db.with_conn(|conn| {
            let result = conn
                .query_row(
                    "SELECT id, title, created_at, updated_at FROM sessions WHERE id = ?1",
                    rusqlite::params![id.to_string()],
                    |row| Ok(row_to_conversation(row)),
                )
                .optional()
                .map_err(|e| AskError::Storage(e.to_string()))?;

            result.transpose()
        })
    }

    /// List all conversations, most recently updated first.
    pub fn list(&self) -> Result<Vec<Conversation>, AskError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT id, title, created_at, updated_at
                     FROM sessions
                     ORDER BY updated_at DESC, rowid DESC",
                )
                .map_err(|e| AskError::Storage(e.to_string()))?;

            let rows = stmt
                .query_map([], |row| Ok(row_to_conversation(row)))
                .map_err(|e| AskError::Storage(e.to_string()))?;

            let mut conversations = Vec::new();
            for row in rows {
                conversations.push(row.map_err(|e| AskError::Storage(e.to_string()))??);
            }
            Ok(conversations)
        })
    }

    /// Rename a conversation. Returns false if it does not exist.
    pub fn update_title(&self, id: Uuid, title: &str) -> Result<bool, AskError> {
        self.db.with_conn(|conn| {
            let changed = conn
                .execute(
                    "UPDATE sessions SET title = ?1 WHERE id = ?2",
                    rusqlite::params![title, id.to_string()],
                )
                .map_err(|e| AskError::Storage(format!("Failed to update title: {}", e)))?;
            Ok(changed > 0)
        })
    }

    /// Delete a conversation and, by cascade, its messages.
    ///
    /// Returns false if it did not exist.
    pub fn delete(&self, id: Uuid) -> Result<bool, AskError> {
        self.db.with_conn(|conn| {
            let changed = conn
                .execute(
                    "DELETE FROM sessions WHERE id = ?1",
                    rusqlite::params![id.to_string()],
                )
                .map_err(|e| AskError::Storage(format!("Failed to delete session: {}", e)))?;
            Ok(changed > 0)
        })
    }
}

/// Repository for the halves of each turn (the `messages` table).
#[derive(Clone)]
pub struct MessageRepository {
    db: Arc<Database>,
}

impl MessageRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Append a message to a conversation and bump the conversation's `updated_at`.
    pub fn append(&self, session_id: Uuid, role: Role, content: &str) -> Result<Message, AskError> {
        let now = now_millis();
        let message = Message {
            id: Uuid::new_v4(),
            session_id,
            role,
            content: content.to_string(),
            sql_query: None,
            query_result: None,
            chart_config: None,
            created_at: from_millis(now)?,
        };

        self.db.with_tx(|conn| {
            conn.execute(
                "INSERT INTO messages (id, session_id, role, content, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![
                    message.id.to_string(),
                    session_id.to_string(),
                    role.as_str(),
                    message.content,
                    now,
                ],
            )
            .map_err(|e| AskError::Storage(format!("Failed to save message: {}", e)))?;

            conn.execute(
                "UPDATE sessions SET updated_at = ?1 WHERE id = ?2",
                rusqlite::params![now, session_id.to_string()],
            )
            .map_err(|e| AskError::Storage(format!("Failed to touch session: {}", e)))?;
            Ok(())
        })?;

        Ok(message)
    }

    /// All messages of a conversation in chronological order.
    pub fn list_for_session(&self, session_id: Uuid) -> Result<Vec<Message>, AskError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT id, session_id, role, content, sql_query, query_result, chart_config, created_at
                     FROM messages
                     WHERE session_id = ?1
                     ORDER BY created_at ASC, rowid ASC",
                )
                .map_err(|e| AskError::Storage(e.to_string()))?;

            let rows = stmt
                .query_map(rusqlite::params![session_id.to_string()], |row| {
                    Ok(row_to_message(row))
                })
                .map_err(|e| AskError::Storage(e.to_string()))?;

            let mut messages = Vec::new();
            for row in rows {
                messages.push(row.map_err(|e| AskError::Storage(e.to_string()))??);
            }
            Ok(messages)
        })
    }

    /// Find a message by ID.
    pub fn find_by_id(&self, id: Uuid) -> Result<Option<Message>, AskError> {
        self.db.with_conn(|conn| {
            let result = conn
                .query_row(
                    "SELECT id, session_id, role, content, sql_query, query_result, chart_config, created_at
                     FROM messages WHERE id = ?1",
                    rusqlite::params![id.to_string()],
                    |row| Ok(row_to_message(row)),
                )
                .optional()
                .map_err(|e| AskError::Storage(e.to_string()))?;

            result.transpose()
        })
    }

    /// Apply a partial update to an existing message.
    ///
    /// Only the `Some` fields of the patch are written. Returns false when
    /// the message does not exist; an empty patch is a no-op that reports true.
    pub fn update_fields(&self, id: Uuid, patch: &MessagePatch) -> Result<bool, AskError> {
        if patch.is_empty() {
            return Ok(true);
        }

        let mut assignments: Vec<&str> = Vec::new();
        let mut values: Vec<&dyn rusqlite::types::ToSql> = Vec::new();
        if let Some(content) = &patch.content {
            assignments.push("content = ?");
            values.push(content);
        }
        if let Some(sql) = &patch.sql_query {
            assignments.push("sql_query = ?");
            values.push(sql);
        }
        if let Some(result) = &patch.query_result {
            assignments.push("query_result = ?");
            values.push(result);
        }
        if let Some(chart) = &patch.chart_config {
            assignments.push("chart_config = ?");
            values.push(chart);
        }
        let id_str = id.to_string();
        values.push(&id_str);

        let sql = format!(
            "UPDATE messages SET {} WHERE id = ?",
            assignments.join(", ")
        );

        self.db.with_conn(|conn| {
            let changed = conn
                .execute(&sql, values.as_slice())
                .map_err(|e| AskError::Storage(format!("Failed to update message: {}", e)))?;
            Ok(changed > 0)
        })
    }
}

// =============================================================================
// Row mapping
// =============================================================================

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

fn from_millis(ms: i64) -> Result<DateTime<Utc>, AskError> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or_else(|| AskError::Storage(format!("Invalid timestamp: {}", ms)))
}

fn parse_uuid(raw: &str) -> Result<Uuid, AskError> {
    Uuid::parse_str(raw).map_err(|e| AskError::Storage(format!("Invalid UUID: {}", e)))
}

fn row_to_conversation(row: &rusqlite::Row<'_>) -> Result<Conversation, AskError> {
    let id: String = row.get(0).map_err(|e| AskError::Storage(e.to_string()))?;
    let title: String = row.get(1).map_err(|e| AskError::Storage(e.to_string()))?;
    let created_at: i64 = row.get(2).map_err(|e| AskError::Storage(e.to_string()))?;
    let updated_at: i64 = row.get(3).map_err(|e| AskError::Storage(e.to_string()))?;

    Ok(Conversation {
        id: parse_uuid(&id)?,
        title,
        created_at: from_millis(created_at)?,
        updated_at: from_millis(updated_at)?,
    })
}

fn row_to_message(row: &rusqlite::Row<'_>) -> Result<Message, AskError> {
    let id: String = row.get(0).map_err(|e| AskError::Storage(e.to_string()))?;
    let session_id: String = row.get(1).map_err(|e| AskError::Storage(e.to_string()))?;
    let role: String = row.get(2).map_err(|e| AskError::Storage(e.to_string()))?;
    let content: String = row.get(3).map_err(|e| AskError::Storage(e.to_string()))?;
    let sql_query: Option<String> = row.get(4).map_err(|e| AskError::Storage(e.to_string()))?;
    let query_result: Option<String> =
        row.get(5).map_err(|e| AskError::Storage(e.to_string()))?;
    let chart_config: Option<String> =
        row.get(6).map_err(|e| AskError::Storage(e.to_string()))?;
    let created_at: i64 = row.get(7).map_err(|e| AskError::Storage(e.to_string()))?;

    Ok(Message {
        id: parse_uuid(&id)?,
        session_id: parse_uuid(&session_id)?,
        role: role.parse()?,
        content,
        sql_query,
        query_result,
        chart_config,
        created_at: from_millis(created_at)?,
    })
}
