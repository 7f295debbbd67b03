use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which party currently answers the end user.
///
/// `Automated` is the initial mode for every session. The only way back
/// from `Human` is an explicit manual switch - model output never flips a
/// session out of human mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionMode {
    Automated,
    Human,
}

impl SessionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionMode::Automated => "automated",
            SessionMode::Human => "human",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "automated" => Some(SessionMode::Automated),
            "human" => Some(SessionMode::Human),
            _ => None,
        }
    }
}

impl std::fmt::Display for SessionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Closing flag, orthogonal to mode. A `Done` session drops out of the
/// operator's active queue but resumes transparently on the next inbound
/// message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Open,
    Done,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Open => "open",
            SessionStatus::Done => "done",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "open" => Some(SessionStatus::Open),
            "done" => Some(SessionStatus::Done),
            _ => None,
        }
    }
}

/// One end-user <-> tenant-agent conversation thread.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub user_id: String,
    pub agent_id: String,
    pub mode: SessionMode,
    pub status: SessionStatus,
    /// Context snapshot (compiled instructions + live ids) persisted on the
    /// last turn. Cleared by the config-edit invalidation cascade so the
    /// next turn rebuilds it from freshly compiled instructions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_snapshot: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    /// Deterministic session id for a channel-bound conversation.
    /// Concurrent turns for the same (agent, user) pair always land on the
    /// same row.
    pub fn channel_session_id(agent_id: &str, user_id: &str) -> String {
        format!("line_{}_{}", agent_id, user_id)
    }

    /// Whether this session came in over the messaging channel (as opposed
    /// to an ephemeral dashboard test chat).
    pub fn is_channel_bound(&self) -> bool {
        self.session_id.starts_with("line_")
    }

    /// Inverse of `channel_session_id`: (agent_id, user_id). Relies on
    /// agent ids being UUIDs, which never contain underscores.
    pub fn parse_channel_session_id(session_id: &str) -> Option<(String, String)> {
        let rest = session_id.strip_prefix("line_")?;
        let (agent_id, user_id) = rest.split_once('_')?;
        if agent_id.is_empty() || user_id.is_empty() {
            return None;
        }
        Some((agent_id.to_string(), user_id.to_string()))
    }
}

/// Inbox listing entry (session + resolved display data).
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub user_id: String,
    pub user_name: String,
    pub mode: SessionMode,
    pub status: SessionStatus,
    pub last_message: String,
    pub last_time: String,
}
