//! Tenant agent database operations
//!
//! Raw form config and the compiled instruction bundle are stored as JSON
//! columns; deploy credentials live in dedicated nullable columns so a
//! deployed agent can be detected without deserializing anything.

use chrono::{DateTime, Utc};
use rusqlite::{params, Result as SqliteResult};
use uuid::Uuid;

use crate::db::Database;
use crate::models::{CompiledInstructions, DeployConfig, RawAgentConfig, TenantAgent};

fn row_to_agent(row: &rusqlite::Row) -> rusqlite::Result<TenantAgent> {
    let raw_json: String = row.get(3)?;
    let compiled_json: String = row.get(4)?;
    let capabilities_json: String = row.get(5)?;
    let access_token: Option<String> = row.get(6)?;
    let channel_secret: Option<String> = row.get(7)?;
    let operator_notify_id: Option<String> = row.get(8)?;
    let created_at: String = row.get(9)?;
    let updated_at: String = row.get(10)?;

    let deploy = match (access_token, channel_secret) {
        (Some(access_token), Some(channel_secret)) => Some(DeployConfig {
            access_token,
            channel_secret,
            operator_notify_id,
        }),
        _ => None,
    };

    Ok(TenantAgent {
        id: row.get(0)?,
        admin_id: row.get(1)?,
        name: row.get(2)?,
        raw_config: serde_json::from_str(&raw_json).unwrap_or_default(),
        compiled: serde_json::from_str(&compiled_json).unwrap_or_default(),
        capabilities: serde_json::from_str(&capabilities_json).unwrap_or_default(),
        deploy,
        created_at: DateTime::parse_from_rfc3339(&created_at)
            .unwrap()
            .with_timezone(&Utc),
        updated_at: DateTime::parse_from_rfc3339(&updated_at)
            .unwrap()
            .with_timezone(&Utc),
    })
}

const AGENT_COLUMNS: &str = "id, admin_id, name, raw_config, compiled, capabilities,
        access_token, channel_secret, operator_notify_id, created_at, updated_at";

impl Database {
    pub fn create_agent(
        &self,
        admin_id: &str,
        name: &str,
        raw_config: &RawAgentConfig,
        compiled: &CompiledInstructions,
        capabilities: &[String],
    ) -> SqliteResult<TenantAgent> {
        let conn = self.conn.lock().unwrap();
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let now_str = now.to_rfc3339();

        conn.execute(
            "INSERT INTO agents (id, admin_id, name, raw_config, compiled, capabilities, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
            params![
                id,
                admin_id,
                name,
                serde_json::to_string(raw_config).unwrap(),
                serde_json::to_string(compiled).unwrap(),
                serde_json::to_string(capabilities).unwrap(),
                now_str,
            ],
        )?;

        Ok(TenantAgent {
            id,
            admin_id: admin_id.to_string(),
            name: name.to_string(),
            raw_config: raw_config.clone(),
            compiled: compiled.clone(),
            capabilities: capabilities.to_vec(),
            deploy: None,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn get_agent(&self, agent_id: &str) -> SqliteResult<Option<TenantAgent>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM agents WHERE id = ?1",
            AGENT_COLUMNS
        ))?;
        let mut rows = stmt.query_map(params![agent_id], row_to_agent)?;
        rows.next().transpose()
    }

    pub fn get_agents_by_admin(&self, admin_id: &str) -> SqliteResult<Vec<TenantAgent>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM agents WHERE admin_id = ?1 ORDER BY created_at DESC",
            AGENT_COLUMNS
        ))?;
        let rows = stmt.query_map(params![admin_id], row_to_agent)?;
        rows.collect()
    }

    pub fn list_agents(&self) -> SqliteResult<Vec<TenantAgent>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM agents ORDER BY created_at DESC",
            AGENT_COLUMNS
        ))?;
        let rows = stmt.query_map([], row_to_agent)?;
        rows.collect()
    }

    /// Persist a new raw config plus its freshly compiled bundle and clear
    /// every session snapshot for the agent in the same transaction, so no
    /// window exists where new instructions coexist with old snapshots.
    /// Returns how many sessions were invalidated.
    pub fn update_agent_config(
        &self,
        agent_id: &str,
        raw_config: &RawAgentConfig,
        compiled: &CompiledInstructions,
    ) -> SqliteResult<usize> {
        let mut conn = self.conn.lock().unwrap();
        let now_str = Utc::now().to_rfc3339();
        let tx = conn.transaction()?;
        tx.execute(
            "UPDATE agents SET raw_config = ?1, compiled = ?2, updated_at = ?3 WHERE id = ?4",
            params![
                serde_json::to_string(raw_config).unwrap(),
                serde_json::to_string(compiled).unwrap(),
                now_str,
                agent_id,
            ],
        )?;
        let invalidated = tx.execute(
            "UPDATE sessions SET context_snapshot = NULL, updated_at = ?1
             WHERE agent_id = ?2 AND context_snapshot IS NOT NULL",
            params![now_str, agent_id],
        )?;
        tx.commit()?;
        Ok(invalidated)
    }

    /// Capability-set save: same transaction shape as a config save, and
    /// the same invalidation cascade.
    pub fn update_agent_capabilities(
        &self,
        agent_id: &str,
        capabilities: &[String],
        compiled: &CompiledInstructions,
    ) -> SqliteResult<usize> {
        let mut conn = self.conn.lock().unwrap();
        let now_str = Utc::now().to_rfc3339();
        let tx = conn.transaction()?;
        tx.execute(
            "UPDATE agents SET capabilities = ?1, compiled = ?2, updated_at = ?3 WHERE id = ?4",
            params![
                serde_json::to_string(capabilities).unwrap(),
                serde_json::to_string(compiled).unwrap(),
                now_str,
                agent_id,
            ],
        )?;
        let invalidated = tx.execute(
            "UPDATE sessions SET context_snapshot = NULL, updated_at = ?1
             WHERE agent_id = ?2 AND context_snapshot IS NOT NULL",
            params![now_str, agent_id],
        )?;
        tx.commit()?;
        Ok(invalidated)
    }

    pub fn set_deploy_config(&self, agent_id: &str, deploy: &DeployConfig) -> SqliteResult<bool> {
        let conn = self.conn.lock().unwrap();
        let affected = conn.execute(
            "UPDATE agents SET access_token = ?1, channel_secret = ?2, operator_notify_id = ?3,
             updated_at = ?4 WHERE id = ?5",
            params![
                deploy.access_token,
                deploy.channel_secret,
                deploy.operator_notify_id,
                Utc::now().to_rfc3339(),
                agent_id,
            ],
        )?;
        Ok(affected > 0)
    }

    /// Delete an agent along with its sessions and transcripts. Usage
    /// records are kept for billing history.
    pub fn delete_agent(&self, agent_id: &str) -> SqliteResult<bool> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "DELETE FROM chat_messages WHERE session_id IN
             (SELECT session_id FROM sessions WHERE agent_id = ?1)",
            params![agent_id],
        )?;
        conn.execute("DELETE FROM sessions WHERE agent_id = ?1", params![agent_id])?;
        let affected = conn.execute("DELETE FROM agents WHERE id = ?1", params![agent_id])?;
        Ok(affected > 0)
    }
}
