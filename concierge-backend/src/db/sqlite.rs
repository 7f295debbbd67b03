use rusqlite::{Connection, Result as SqliteResult};
use std::path::Path;
use std::sync::Mutex;

pub struct Database {
    pub(super) conn: Mutex<Connection>,
}

impl Database {
    pub fn new(database_url: &str) -> SqliteResult<Self> {
        // Create parent directory if it doesn't exist
        if let Some(parent) = Path::new(database_url).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).ok();
            }
        }

        let conn = Connection::open(database_url)?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.init()?;
        Ok(db)
    }

    fn init(&self) -> SqliteResult<()> {
        let conn = self.conn.lock().unwrap();

        // Tenant agents table
        conn.execute(
            "CREATE TABLE IF NOT EXISTS agents (
                id TEXT PRIMARY KEY,
                admin_id TEXT NOT NULL,
                name TEXT NOT NULL,
                raw_config TEXT NOT NULL,
                compiled TEXT NOT NULL,
                capabilities TEXT NOT NULL DEFAULT '[]',
                access_token TEXT,
                channel_secret TEXT,
                operator_notify_id TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )?;

        // Conversation sessions table
        conn.execute(
            "CREATE TABLE IF NOT EXISTS sessions (
                session_id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                agent_id TEXT NOT NULL,
                mode TEXT NOT NULL DEFAULT 'automated',
                status TEXT NOT NULL DEFAULT 'open',
                context_snapshot TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )?;

        // Chat messages table (append-only transcript)
        conn.execute(
            "CREATE TABLE IF NOT EXISTS chat_messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL,
                sender TEXT NOT NULL,
                content TEXT NOT NULL,
                capabilities TEXT NOT NULL DEFAULT '[]',
                created_at TEXT NOT NULL
            )",
            [],
        )?;

        // Token usage ledger
        conn.execute(
            "CREATE TABLE IF NOT EXISTS usage_records (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                admin_id TEXT NOT NULL,
                agent_id TEXT,
                session_id TEXT,
                chat_message_id INTEGER,
                kind TEXT NOT NULL,
                model TEXT NOT NULL,
                input_tokens INTEGER NOT NULL DEFAULT 0,
                output_tokens INTEGER NOT NULL DEFAULT 0,
                tool_tokens INTEGER NOT NULL DEFAULT 0,
                thought_tokens INTEGER NOT NULL DEFAULT 0,
                total_tokens INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            )",
            [],
        )?;

        // Channel end users
        conn.execute(
            "CREATE TABLE IF NOT EXISTS end_users (
                line_id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                created_at TEXT NOT NULL,
                last_seen_at TEXT NOT NULL
            )",
            [],
        )?;

        // Tenant administrators
        conn.execute(
            "CREATE TABLE IF NOT EXISTS admins (
                line_id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                is_monitor INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                login_at TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_chat_messages_session
             ON chat_messages(session_id, id)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_sessions_agent ON sessions(agent_id)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_usage_agent ON usage_records(agent_id)",
            [],
        )?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CompiledInstructions, DeployConfig, RawAgentConfig};

    #[test]
    fn creates_parent_directory_and_reopens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir
            .path()
            .join("nested/concierge.db")
            .to_string_lossy()
            .to_string();

        let db = Database::new(&path).unwrap();
        let agent = db
            .create_agent(
                "admin-1",
                "Reopen Test",
                &RawAgentConfig::default(),
                &CompiledInstructions::default(),
                &[],
            )
            .unwrap();
        drop(db);

        // Second open runs init() again against the existing schema.
        let db = Database::new(&path).unwrap();
        let loaded = db.get_agent(&agent.id).unwrap().unwrap();
        assert_eq!(loaded.name, "Reopen Test");
    }

    #[test]
    fn deploy_columns_round_trip_but_never_serialize() {
        let db = Database::new(":memory:").unwrap();
        let agent = db
            .create_agent(
                "admin-1",
                "Deploy Test",
                &RawAgentConfig::default(),
                &CompiledInstructions::default(),
                &[],
            )
            .unwrap();
        db.set_deploy_config(
            &agent.id,
            &DeployConfig {
                access_token: "tok-secret".to_string(),
                channel_secret: "ch-secret".to_string(),
                operator_notify_id: Some("op-1".to_string()),
            },
        )
        .unwrap();

        let loaded = db.get_agent(&agent.id).unwrap().unwrap();
        let deploy = loaded.deploy.as_ref().unwrap();
        assert_eq!(deploy.access_token, "tok-secret");

        let json = serde_json::to_string(&loaded).unwrap();
        assert!(!json.contains("tok-secret"));
        assert!(!json.contains("ch-secret"));
    }
}
