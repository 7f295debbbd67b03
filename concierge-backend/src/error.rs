//! Turn-level error taxonomy.
//!
//! Storage code stays on `rusqlite::Result`; client seams return string
//! errors. This enum is the boundary type the orchestrator and controllers
//! agree on, and it decides which failures are soft (the turn still
//! answers) versus hard (the request errors out).

use std::fmt;

#[derive(Debug)]
pub enum TurnError {
    /// The addressed agent does not exist or is not deployed.
    ConfigNotFound(String),
    /// Webhook signature or caller identity check failed.
    Unauthorized(String),
    /// The model runtime errored or timed out. Soft: the turn responds
    /// with a fallback message and records no usage.
    RuntimeFailure(String),
    /// Structured parse of the model output failed. Soft: the raw text is
    /// delivered anyway; this only tags the result with a diagnostic.
    FormatRecovery(String),
    /// Outbound channel delivery failed after the turn completed.
    Delivery(String),
    /// Storage layer failure.
    Storage(rusqlite::Error),
}

impl fmt::Display for TurnError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TurnError::ConfigNotFound(id) => write!(f, "agent config not found: {}", id),
            TurnError::Unauthorized(msg) => write!(f, "unauthorized: {}", msg),
            TurnError::RuntimeFailure(msg) => write!(f, "runtime failure: {}", msg),
            TurnError::FormatRecovery(msg) => write!(f, "format recovery: {}", msg),
            TurnError::Delivery(msg) => write!(f, "delivery failure: {}", msg),
            TurnError::Storage(e) => write!(f, "storage failure: {}", e),
        }
    }
}

impl From<rusqlite::Error> for TurnError {
    fn from(e: rusqlite::Error) -> Self {
        TurnError::Storage(e)
    }
}
