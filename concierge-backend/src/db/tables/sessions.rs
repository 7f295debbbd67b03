//! Conversation session database operations
//!
//! The session row is the mode/status state machine. Mode and status are
//! orthogonal columns: closing a session never touches its mode, and a
//! closed session is silently reopened by the next inbound turn.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Result as SqliteResult};

use crate::db::Database;
use crate::models::session::SessionSummary;
use crate::models::{Session, SessionMode, SessionStatus};

fn row_to_session(row: &rusqlite::Row) -> rusqlite::Result<Session> {
    let mode_str: String = row.get(3)?;
    let status_str: String = row.get(4)?;
    let created_at: String = row.get(6)?;
    let updated_at: String = row.get(7)?;

    Ok(Session {
        session_id: row.get(0)?,
        user_id: row.get(1)?,
        agent_id: row.get(2)?,
        mode: SessionMode::from_str(&mode_str).unwrap_or(SessionMode::Automated),
        status: SessionStatus::from_str(&status_str).unwrap_or(SessionStatus::Open),
        context_snapshot: row.get(5)?,
        created_at: DateTime::parse_from_rfc3339(&created_at)
            .unwrap()
            .with_timezone(&Utc),
        updated_at: DateTime::parse_from_rfc3339(&updated_at)
            .unwrap()
            .with_timezone(&Utc),
    })
}

const SESSION_COLUMNS: &str =
    "session_id, user_id, agent_id, mode, status, context_snapshot, created_at, updated_at";

impl Database {
    /// Get the session for this id, creating it when absent. A done session
    /// is reopened in place; its mode is left exactly as it was.
    ///
    /// INSERT OR IGNORE keeps concurrent first-contact turns from racing
    /// into two rows for the same deterministic id.
    pub fn get_or_create_session(
        &self,
        session_id: &str,
        agent_id: &str,
        user_id: &str,
    ) -> SqliteResult<Session> {
        let conn = self.conn.lock().unwrap();
        let now_str = Utc::now().to_rfc3339();

        conn.execute(
            "INSERT OR IGNORE INTO sessions (session_id, user_id, agent_id, mode, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, 'automated', 'open', ?4, ?4)",
            params![session_id, user_id, agent_id, now_str],
        )?;
        conn.execute(
            "UPDATE sessions SET status = 'open', updated_at = ?1
             WHERE session_id = ?2 AND status != 'open'",
            params![now_str, session_id],
        )?;

        conn.query_row(
            &format!(
                "SELECT {} FROM sessions WHERE session_id = ?1",
                SESSION_COLUMNS
            ),
            params![session_id],
            row_to_session,
        )
    }

    pub fn get_session(&self, session_id: &str) -> SqliteResult<Option<Session>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            &format!(
                "SELECT {} FROM sessions WHERE session_id = ?1",
                SESSION_COLUMNS
            ),
            params![session_id],
            row_to_session,
        )
        .optional()
    }

    /// Flip a session's mode, creating the row first if it does not exist
    /// yet (an operator may claim a conversation before the first turn
    /// lands).
    pub fn set_session_mode(
        &self,
        session_id: &str,
        agent_id: &str,
        user_id: &str,
        mode: SessionMode,
    ) -> SqliteResult<Session> {
        let conn = self.conn.lock().unwrap();
        let now_str = Utc::now().to_rfc3339();

        conn.execute(
            "INSERT OR IGNORE INTO sessions (session_id, user_id, agent_id, mode, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, 'automated', 'open', ?4, ?4)",
            params![session_id, user_id, agent_id, now_str],
        )?;
        conn.execute(
            "UPDATE sessions SET mode = ?1, updated_at = ?2 WHERE session_id = ?3",
            params![mode.as_str(), now_str, session_id],
        )?;

        conn.query_row(
            &format!(
                "SELECT {} FROM sessions WHERE session_id = ?1",
                SESSION_COLUMNS
            ),
            params![session_id],
            row_to_session,
        )
    }

    /// Mark a session done. Mode is deliberately left alone: a closed
    /// human-mode session stays human if it resumes.
    pub fn close_session(&self, session_id: &str) -> SqliteResult<bool> {
        let conn = self.conn.lock().unwrap();
        let affected = conn.execute(
            "UPDATE sessions SET status = 'done', updated_at = ?1 WHERE session_id = ?2",
            params![Utc::now().to_rfc3339(), session_id],
        )?;
        Ok(affected > 0)
    }

    pub fn update_context_snapshot(
        &self,
        session_id: &str,
        snapshot: Option<&str>,
    ) -> SqliteResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE sessions SET context_snapshot = ?1, updated_at = ?2 WHERE session_id = ?3",
            params![snapshot, Utc::now().to_rfc3339(), session_id],
        )?;
        Ok(())
    }

    /// Inbox listing: all channel sessions for an agent with display name
    /// and last message resolved, newest activity first.
    pub fn list_sessions_for_agent(&self, agent_id: &str) -> SqliteResult<Vec<SessionSummary>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT s.session_id, s.user_id, COALESCE(u.name, s.user_id), s.mode, s.status,
                    COALESCE((SELECT content FROM chat_messages m
                              WHERE m.session_id = s.session_id
                              ORDER BY m.id DESC LIMIT 1), ''),
                    s.updated_at
             FROM sessions s
             LEFT JOIN end_users u ON u.line_id = s.user_id
             WHERE s.agent_id = ?1
             ORDER BY s.updated_at DESC",
        )?;
        let rows = stmt.query_map(params![agent_id], |row| {
            let mode_str: String = row.get(3)?;
            let status_str: String = row.get(4)?;
            Ok(SessionSummary {
                session_id: row.get(0)?,
                user_id: row.get(1)?,
                user_name: row.get(2)?,
                mode: SessionMode::from_str(&mode_str).unwrap_or(SessionMode::Automated),
                status: SessionStatus::from_str(&status_str).unwrap_or(SessionStatus::Open),
                last_message: row.get(5)?,
                last_time: row.get(6)?,
            })
        })?;
        rows.collect()
    }
}
