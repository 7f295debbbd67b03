pub mod gemini;
pub mod recovery;

pub use gemini::GeminiClient;

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::models::TokenUsage;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeError {
    pub message: String,
}

impl RuntimeError {
    pub fn new(message: impl Into<String>) -> Self {
        RuntimeError {
            message: message.into(),
        }
    }
}

impl std::fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// One model call inside a runtime turn, for the usage ledger. A single
/// turn may produce several (router call + capability call). The caller
/// decides the ledger kind when it persists the event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageEvent {
    pub model: String,
    pub usage: TokenUsage,
}

/// What the runtime hands back for one awaited turn: the raw model text
/// (possibly malformed JSON, see `recovery`) plus every usage event it
/// accumulated along the way.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeResponse {
    pub raw_text: String,
    pub usage_events: Vec<UsageEvent>,
}

impl RuntimeResponse {
    pub fn text(raw_text: impl Into<String>) -> Self {
        RuntimeResponse {
            raw_text: raw_text.into(),
            usage_events: Vec::new(),
        }
    }
}

/// Everything a turn needs to run: compiled instructions, prior history,
/// and the live ids capability modules read at call time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnContext {
    pub system_instruction: String,
    pub history: Vec<Message>,
    pub user_message: String,
    pub current_agent_id: String,
    pub current_user_id: String,
    pub current_session_id: String,
}

/// A single iteration's INPUT and OUTPUT, captured by the mock runtime.
#[derive(Debug, Clone, Serialize)]
pub struct TraceEntry {
    pub iteration: usize,
    pub input_context: TurnContext,
    pub output_response: Option<RuntimeResponse>,
    pub output_error: Option<String>,
}

/// Mock runtime for integration tests - returns pre-configured responses
/// from a queue and captures an INPUT/OUTPUT trace per call.
#[derive(Clone)]
pub struct MockRuntime {
    responses: Arc<Mutex<VecDeque<Result<RuntimeResponse, RuntimeError>>>>,
    trace: Arc<Mutex<Vec<TraceEntry>>>,
    delay: Arc<Mutex<Option<std::time::Duration>>>,
}

impl MockRuntime {
    pub fn new(responses: Vec<Result<RuntimeResponse, RuntimeError>>) -> Self {
        MockRuntime {
            responses: Arc::new(Mutex::new(VecDeque::from(responses))),
            trace: Arc::new(Mutex::new(Vec::new())),
            delay: Arc::new(Mutex::new(None)),
        }
    }

    /// Make every subsequent call stall before answering, to exercise the
    /// orchestrator's timeout path.
    pub fn set_delay(&self, delay: std::time::Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    fn delay(&self) -> Option<std::time::Duration> {
        *self.delay.lock().unwrap()
    }

    fn next_response_traced(&self, context: &TurnContext) -> Result<RuntimeResponse, RuntimeError> {
        let mut queue = self.responses.lock().unwrap();
        let result = queue
            .pop_front()
            .unwrap_or_else(|| Ok(RuntimeResponse::text("(mock exhausted)")));

        let iteration = {
            let trace = self.trace.lock().unwrap();
            trace.len() + 1
        };
        let entry = TraceEntry {
            iteration,
            input_context: context.clone(),
            output_response: result.as_ref().ok().cloned(),
            output_error: result.as_ref().err().map(|e| e.message.clone()),
        };
        self.trace.lock().unwrap().push(entry);
        result
    }

    pub fn get_trace(&self) -> Vec<TraceEntry> {
        self.trace.lock().unwrap().clone()
    }
}

/// Unified model runtime that works with any configured provider.
pub enum RuntimeClient {
    Gemini(GeminiClient),
    Mock(MockRuntime),
}

impl RuntimeClient {
    /// Run one conversation turn. Exactly one await point; the caller wraps
    /// it in a timeout.
    pub async fn run_turn(&self, context: &TurnContext) -> Result<RuntimeResponse, RuntimeError> {
        match self {
            RuntimeClient::Gemini(client) => client.run_turn(context).await,
            RuntimeClient::Mock(mock) => {
                if let Some(delay) = mock.delay() {
                    tokio::time::sleep(delay).await;
                }
                mock.next_response_traced(context)
            }
        }
    }

    /// One-shot generation outside any session (form extraction, FAQ
    /// drafting). Uses the cheaper general-purpose model.
    pub async fn generate(
        &self,
        system_instruction: &str,
        user_text: &str,
    ) -> Result<RuntimeResponse, RuntimeError> {
        match self {
            RuntimeClient::Gemini(client) => client.generate(system_instruction, user_text).await,
            RuntimeClient::Mock(mock) => {
                let context = TurnContext {
                    system_instruction: system_instruction.to_string(),
                    history: Vec::new(),
                    user_message: user_text.to_string(),
                    current_agent_id: String::new(),
                    current_user_id: String::new(),
                    current_session_id: String::new(),
                };
                mock.next_response_traced(&context)
            }
        }
    }
}
