//! End user and admin identity database operations

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Result as SqliteResult};

use crate::db::Database;
use crate::models::{Admin, EndUser};

impl Database {
    /// Upsert a channel user on contact. Name is refreshed when the channel
    /// profile provides one; last_seen_at always moves forward.
    pub fn upsert_end_user(&self, line_id: &str, name: Option<&str>) -> SqliteResult<()> {
        let conn = self.conn.lock().unwrap();
        let now_str = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO end_users (line_id, name, created_at, last_seen_at)
             VALUES (?1, COALESCE(?2, ?1), ?3, ?3)
             ON CONFLICT(line_id) DO UPDATE SET
                 name = COALESCE(?2, end_users.name),
                 last_seen_at = ?3",
            params![line_id, name, now_str],
        )?;
        Ok(())
    }

    pub fn get_end_user(&self, line_id: &str) -> SqliteResult<Option<EndUser>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT line_id, name, created_at, last_seen_at FROM end_users WHERE line_id = ?1",
            params![line_id],
            |row| {
                let created_at: String = row.get(2)?;
                let last_seen_at: String = row.get(3)?;
                Ok(EndUser {
                    line_id: row.get(0)?,
                    name: row.get(1)?,
                    created_at: DateTime::parse_from_rfc3339(&created_at)
                        .unwrap()
                        .with_timezone(&Utc),
                    last_seen_at: DateTime::parse_from_rfc3339(&last_seen_at)
                        .unwrap()
                        .with_timezone(&Utc),
                })
            },
        )
        .optional()
    }

    /// Upsert an admin on dashboard login; login_at is bumped every call.
    pub fn upsert_admin(&self, line_id: &str, name: &str) -> SqliteResult<Admin> {
        let conn = self.conn.lock().unwrap();
        let now_str = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO admins (line_id, name, is_monitor, created_at, login_at)
             VALUES (?1, ?2, 0, ?3, ?3)
             ON CONFLICT(line_id) DO UPDATE SET name = ?2, login_at = ?3",
            params![line_id, name, now_str],
        )?;

        conn.query_row(
            "SELECT line_id, name, is_monitor, created_at, login_at FROM admins WHERE line_id = ?1",
            params![line_id],
            |row| {
                let created_at: String = row.get(3)?;
                let login_at: String = row.get(4)?;
                Ok(Admin {
                    line_id: row.get(0)?,
                    name: row.get(1)?,
                    is_monitor: row.get::<_, i64>(2)? != 0,
                    created_at: DateTime::parse_from_rfc3339(&created_at)
                        .unwrap()
                        .with_timezone(&Utc),
                    login_at: DateTime::parse_from_rfc3339(&login_at)
                        .unwrap()
                        .with_timezone(&Utc),
                })
            },
        )
    }

    pub fn is_monitor(&self, line_id: &str) -> SqliteResult<bool> {
        let conn = self.conn.lock().unwrap();
        let flag: Option<i64> = conn
            .query_row(
                "SELECT is_monitor FROM admins WHERE line_id = ?1",
                params![line_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(flag.unwrap_or(0) != 0)
    }
}
