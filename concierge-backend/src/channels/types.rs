use serde::Serialize;

use crate::ai::recovery::RelatedFaq;

/// Sent to the user whenever a turn cannot produce a real reply, whether
/// the runtime failed softly or the turn failed hard. The end user is
/// never left in silence.
pub const FALLBACK_REPLY: &str =
    "Sorry, something went wrong on our side. Please try again in a moment.";

/// Normalized inbound turn from any surface (channel webhook, dashboard
/// test chat, operator console).
#[derive(Debug, Clone)]
pub struct TurnRequest {
    pub agent_id: String,
    pub user_id: String,
    /// Display name from the channel profile, when known.
    pub user_name: Option<String>,
    pub text: String,
    /// Explicit session id. None = derive the deterministic channel id.
    pub session_id: Option<String>,
}

/// Result of orchestrating one turn.
///
/// Soft failures (runtime error, timeout, recovery miss) still produce a
/// response; `error` carries what went wrong for logging and the API body.
/// An empty response with no error means the session is in human mode and
/// nothing automated should be sent.
#[derive(Debug, Clone, Serialize)]
pub struct TurnResult {
    pub session_id: String,
    pub response: String,
    pub related_faqs: Vec<RelatedFaq>,
    pub handoff_triggered: bool,
    pub notify_code: Option<String>,
    pub error: Option<String>,
}

impl TurnResult {
    pub fn human_mode(session_id: String) -> Self {
        Self {
            session_id,
            response: String::new(),
            related_faqs: Vec::new(),
            handoff_triggered: false,
            notify_code: None,
            error: None,
        }
    }

    pub fn failure(session_id: String, error: String) -> Self {
        Self {
            session_id,
            response: FALLBACK_REPLY.to_string(),
            related_faqs: Vec::new(),
            handoff_triggered: false,
            notify_code: None,
            error: Some(error),
        }
    }

    pub fn has_reply(&self) -> bool {
        !self.response.is_empty()
    }
}
