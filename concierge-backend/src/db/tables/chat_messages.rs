//! Chat message database operations

use chrono::{DateTime, Utc};
use rusqlite::{params, Result as SqliteResult};

use crate::db::Database;
use crate::models::{CapabilityReference, ChatMessage, SenderRole};

fn row_to_message(row: &rusqlite::Row) -> rusqlite::Result<ChatMessage> {
    let sender_str: String = row.get(2)?;
    let capabilities_json: String = row.get(4)?;
    let created_at: String = row.get(5)?;

    Ok(ChatMessage {
        id: row.get(0)?,
        session_id: row.get(1)?,
        sender: SenderRole::from_str(&sender_str).unwrap_or(SenderRole::User),
        content: row.get(3)?,
        capabilities: serde_json::from_str(&capabilities_json).unwrap_or_default(),
        created_at: DateTime::parse_from_rfc3339(&created_at)
            .unwrap()
            .with_timezone(&Utc),
    })
}

impl Database {
    pub fn append_message(
        &self,
        session_id: &str,
        sender: SenderRole,
        content: &str,
        capabilities: &[CapabilityReference],
    ) -> SqliteResult<ChatMessage> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now();

        conn.execute(
            "INSERT INTO chat_messages (session_id, sender, content, capabilities, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                session_id,
                sender.as_str(),
                content,
                serde_json::to_string(capabilities).unwrap(),
                now.to_rfc3339(),
            ],
        )?;
        let id = conn.last_insert_rowid();

        Ok(ChatMessage {
            id,
            session_id: session_id.to_string(),
            sender,
            content: content.to_string(),
            capabilities: capabilities.to_vec(),
            created_at: now,
        })
    }

    /// Transcript in chronological order. `limit` caps how many of the most
    /// recent messages are returned (0 = everything).
    pub fn get_messages(&self, session_id: &str, limit: usize) -> SqliteResult<Vec<ChatMessage>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, session_id, sender, content, capabilities, created_at
             FROM chat_messages WHERE session_id = ?1
             ORDER BY id DESC LIMIT ?2",
        )?;
        let cap = if limit == 0 { i64::MAX } else { limit as i64 };
        let rows = stmt.query_map(params![session_id, cap], row_to_message)?;
        let mut messages: Vec<ChatMessage> = rows.collect::<Result<_, _>>()?;
        messages.reverse();
        Ok(messages)
    }
}
