//! Usage ledger database operations
//!
//! One row per model call. Rows are never updated; monetary cost is
//! derived at read time from the current rate table so a pricing change
//! re-prices history consistently.

use chrono::{DateTime, Utc};
use rusqlite::{params, Result as SqliteResult};

use crate::db::Database;
use crate::models::{TokenUsage, UsageKind, UsageRecord};

fn row_to_record(row: &rusqlite::Row) -> rusqlite::Result<UsageRecord> {
    let kind_str: String = row.get(5)?;
    let created_at: String = row.get(12)?;

    Ok(UsageRecord {
        id: row.get(0)?,
        admin_id: row.get(1)?,
        agent_id: row.get(2)?,
        session_id: row.get(3)?,
        chat_message_id: row.get(4)?,
        kind: UsageKind::from_str(&kind_str).unwrap_or(UsageKind::Chat),
        model: row.get(6)?,
        usage: TokenUsage {
            input_tokens: row.get(7)?,
            output_tokens: row.get(8)?,
            tool_tokens: row.get(9)?,
            thought_tokens: row.get(10)?,
            total_tokens: row.get(11)?,
        },
        created_at: DateTime::parse_from_rfc3339(&created_at)
            .unwrap()
            .with_timezone(&Utc),
    })
}

const RECORD_COLUMNS: &str = "id, admin_id, agent_id, session_id, chat_message_id, kind, model,
        input_tokens, output_tokens, tool_tokens, thought_tokens, total_tokens, created_at";

impl Database {
    #[allow(clippy::too_many_arguments)]
    pub fn record_usage(
        &self,
        admin_id: &str,
        agent_id: Option<&str>,
        session_id: Option<&str>,
        chat_message_id: Option<i64>,
        kind: UsageKind,
        model: &str,
        usage: &TokenUsage,
    ) -> SqliteResult<i64> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO usage_records
             (admin_id, agent_id, session_id, chat_message_id, kind, model,
              input_tokens, output_tokens, tool_tokens, thought_tokens, total_tokens, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                admin_id,
                agent_id,
                session_id,
                chat_message_id,
                kind.as_str(),
                model,
                usage.input_tokens,
                usage.output_tokens,
                usage.tool_tokens,
                usage.thought_tokens,
                usage.total_tokens,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn get_usage_for_agent(&self, agent_id: &str) -> SqliteResult<Vec<UsageRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {RECORD_COLUMNS} FROM usage_records WHERE agent_id = ?1 ORDER BY id DESC"
        ))?;
        let rows = stmt.query_map(params![agent_id], row_to_record)?;
        rows.collect()
    }

    /// Aggregate billable totals per model for one agent.
    pub fn usage_totals_by_model(&self, agent_id: &str) -> SqliteResult<Vec<(String, TokenUsage)>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT model, SUM(input_tokens), SUM(output_tokens), SUM(tool_tokens),
                    SUM(thought_tokens), SUM(total_tokens)
             FROM usage_records WHERE agent_id = ?1
             GROUP BY model",
        )?;
        let rows = stmt.query_map(params![agent_id], |row| {
            Ok((
                row.get(0)?,
                TokenUsage {
                    input_tokens: row.get(1)?,
                    output_tokens: row.get(2)?,
                    tool_tokens: row.get(3)?,
                    thought_tokens: row.get(4)?,
                    total_tokens: row.get(5)?,
                },
            ))
        })?;
        rows.collect()
    }

    /// Per-day, per-model totals across an admin's agents for the last
    /// `days` days. Read-only derived view over the append-only log.
    pub fn usage_daily_totals(
        &self,
        admin_id: &str,
        days: i64,
    ) -> SqliteResult<Vec<(String, String, TokenUsage)>> {
        let conn = self.conn.lock().unwrap();
        // Cutoff compares on the date prefix only; created_at is RFC 3339
        // and its 'T' separator does not sort against datetime() output.
        let mut stmt = conn.prepare(
            "SELECT substr(created_at, 1, 10) AS day, model,
                    SUM(input_tokens), SUM(output_tokens), SUM(tool_tokens),
                    SUM(thought_tokens), SUM(total_tokens)
             FROM usage_records
             WHERE admin_id = ?1 AND substr(created_at, 1, 10) >= date('now', ?2)
             GROUP BY day, model
             ORDER BY day DESC",
        )?;
        let modifier = format!("-{} days", days);
        let rows = stmt.query_map(params![admin_id, modifier], |row| {
            Ok((
                row.get(0)?,
                row.get(1)?,
                TokenUsage {
                    input_tokens: row.get(2)?,
                    output_tokens: row.get(3)?,
                    tool_tokens: row.get(4)?,
                    thought_tokens: row.get(5)?,
                    total_tokens: row.get(6)?,
                },
            ))
        })?;
        rows.collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usage(input: i64, output: i64) -> TokenUsage {
        TokenUsage {
            input_tokens: input,
            output_tokens: output,
            total_tokens: input + output,
            ..Default::default()
        }
    }

    #[test]
    fn daily_totals_group_by_date_key_and_admin() {
        let db = Database::new(":memory:").unwrap();
        db.record_usage(
            "admin-1",
            None,
            None,
            None,
            UsageKind::Chat,
            "gemini-2.5-flash",
            &usage(100, 40),
        )
        .unwrap();
        db.record_usage(
            "admin-1",
            None,
            None,
            None,
            UsageKind::Chat,
            "gemini-2.5-flash",
            &usage(50, 10),
        )
        .unwrap();
        db.record_usage(
            "admin-2",
            None,
            None,
            None,
            UsageKind::Chat,
            "gemini-2.5-flash",
            &usage(999, 999),
        )
        .unwrap();

        let rows = db.usage_daily_totals("admin-1", 30).unwrap();
        assert_eq!(rows.len(), 1);
        let (day, model, totals) = &rows[0];
        // Bare date key, directly comparable to date('now', ...) output.
        assert_eq!(day.len(), 10);
        assert!(!day.contains('T'));
        assert_eq!(day, &Utc::now().to_rfc3339()[..10]);
        assert_eq!(model, "gemini-2.5-flash");
        assert_eq!(totals.input_tokens, 150);
        assert_eq!(totals.output_tokens, 50);
    }

    #[test]
    fn same_day_records_are_inside_the_one_day_window() {
        let db = Database::new(":memory:").unwrap();
        db.record_usage(
            "admin-1",
            None,
            None,
            None,
            UsageKind::FormParsing,
            "gemini-2.5-flash-lite",
            &usage(10, 5),
        )
        .unwrap();

        // The tightest window still includes records written today.
        let rows = db.usage_daily_totals("admin-1", 1).unwrap();
        assert_eq!(rows.len(), 1);
    }
}
