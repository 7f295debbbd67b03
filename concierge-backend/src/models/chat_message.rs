use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::usage::CapabilityReference;

/// Who authored a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SenderRole {
    User,
    Agent,
    HumanOperator,
}

impl SenderRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            SenderRole::User => "user",
            SenderRole::Agent => "agent",
            SenderRole::HumanOperator => "human_operator",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "user" => Some(SenderRole::User),
            "agent" => Some(SenderRole::Agent),
            "human_operator" => Some(SenderRole::HumanOperator),
            _ => None,
        }
    }
}

/// One turn's utterance. Append-only; never mutated or deleted outside the
/// agent-level session-reset cascade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: i64,
    pub session_id: String,
    pub sender: SenderRole,
    pub content: String,
    /// Capability modules that contributed to an agent reply (empty for
    /// user and operator messages).
    pub capabilities: Vec<CapabilityReference>,
    pub created_at: DateTime<Utc>,
}
