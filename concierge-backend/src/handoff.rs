//! Handoff coordination
//!
//! Flips sessions between automated and human mode and notifies the
//! tenant's operator when the model escalates. Escalation is transparent
//! to the end user: they still receive the model's reply for the turn
//! that triggered it.

use chrono::Utc;
use rand::Rng;
use std::sync::Arc;

use crate::channels::MessagingGateway;
use crate::db::Database;
use crate::models::{Session, SessionMode, TenantAgent};

const NOTIFY_CODE_CHARS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Short reference code included in the operator notification so replies
/// in a busy operator chat can be matched back to the conversation.
pub fn notify_code() -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..4)
        .map(|_| NOTIFY_CODE_CHARS[rng.gen_range(0..NOTIFY_CODE_CHARS.len())] as char)
        .collect();
    format!("{}-{}", Utc::now().timestamp(), suffix)
}

#[derive(Debug, Clone)]
pub struct EscalationOutcome {
    pub notify_code: String,
    /// False when the agent has no deploy config or no operator target;
    /// the mode flip still happened.
    pub notified: bool,
}

pub struct HandoffCoordinator {
    db: Arc<Database>,
    gateway: Arc<dyn MessagingGateway>,
}

impl HandoffCoordinator {
    pub fn new(db: Arc<Database>, gateway: Arc<dyn MessagingGateway>) -> Self {
        Self { db, gateway }
    }

    /// Model-initiated escalation: put the session into human mode and try
    /// to notify the operator. Notification failure never fails the turn.
    pub async fn escalate(
        &self,
        agent: &TenantAgent,
        session: &Session,
        user_display: &str,
        reason: Option<&str>,
        excerpt: &str,
    ) -> Result<EscalationOutcome, rusqlite::Error> {
        self.db.set_session_mode(
            &session.session_id,
            &session.agent_id,
            &session.user_id,
            SessionMode::Human,
        )?;

        let code = notify_code();
        let mut notified = false;

        if let Some(deploy) = &agent.deploy {
            if let Some(operator) = &deploy.operator_notify_id {
                let text = format!(
                    "[{code}] {user} needs a human.\nReason: {reason}\nLast message: {excerpt}\nReply from the inbox to take over.",
                    code = code,
                    user = user_display,
                    reason = reason.unwrap_or("not given"),
                    excerpt = excerpt,
                );
                match self
                    .gateway
                    .push_text(&deploy.access_token, operator, &text)
                    .await
                {
                    Ok(()) => notified = true,
                    Err(e) => {
                        log::warn!(
                            "Operator notification failed for session {}: {}",
                            session.session_id,
                            e
                        );
                    }
                }
            }
        }

        log::info!(
            "Session {} escalated to human mode (code {}, notified={})",
            session.session_id,
            code,
            notified
        );

        Ok(EscalationOutcome {
            notify_code: code,
            notified,
        })
    }

    /// Operator-initiated mode switch from the inbox.
    pub fn manual_switch(
        &self,
        session_id: &str,
        agent_id: &str,
        user_id: &str,
        mode: SessionMode,
    ) -> Result<Session, rusqlite::Error> {
        let session = self
            .db
            .set_session_mode(session_id, agent_id, user_id, mode)?;
        log::info!("Session {} manually switched to {}", session_id, mode);
        Ok(session)
    }

    /// Close a conversation. Status only; mode survives so a resumed
    /// human-mode conversation stays with the human.
    pub fn close(&self, session_id: &str) -> Result<bool, rusqlite::Error> {
        self.db.close_session(session_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notify_code_shape() {
        let re = regex::Regex::new(r"^\d+-[A-Z0-9]{4}$").unwrap();
        for _ in 0..20 {
            let code = notify_code();
            assert!(re.is_match(&code), "bad code: {}", code);
        }
    }
}
