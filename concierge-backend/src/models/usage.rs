//! Token usage accounting and per-model pricing.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

/// What kind of model call produced a usage record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageKind {
    Chat,
    FormParsing,
    FaqGeneration,
}

impl UsageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            UsageKind::Chat => "chat",
            UsageKind::FormParsing => "form_parsing",
            UsageKind::FaqGeneration => "faq_generation",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "chat" => Some(UsageKind::Chat),
            "form_parsing" => Some(UsageKind::FormParsing),
            "faq_generation" => Some(UsageKind::FaqGeneration),
            _ => None,
        }
    }
}

/// Raw token counts as reported by the model runtime for a single call.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub tool_tokens: i64,
    pub thought_tokens: i64,
    pub total_tokens: i64,
}

impl TokenUsage {
    /// Collapse raw counts into the two billable buckets: tool-use prompt
    /// tokens bill at the input rate, thinking tokens at the output rate.
    pub fn billable(&self) -> (i64, i64) {
        (
            self.input_tokens + self.tool_tokens,
            self.output_tokens + self.thought_tokens,
        )
    }
}

/// A persisted ledger entry for one model call. Agent, session and chat
/// message are nullable: form parsing runs before an agent exists, and
/// only chat calls have a message to point at.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageRecord {
    pub id: i64,
    pub admin_id: String,
    pub agent_id: Option<String>,
    pub session_id: Option<String>,
    pub chat_message_id: Option<i64>,
    pub kind: UsageKind,
    pub model: String,
    pub usage: TokenUsage,
    pub created_at: DateTime<Utc>,
}

/// USD per one million tokens.
#[derive(Debug, Clone, Copy)]
pub struct ModelRate {
    pub input_per_million: f64,
    pub output_per_million: f64,
}

pub static MODEL_RATES: Lazy<HashMap<&'static str, ModelRate>> = Lazy::new(|| {
    let mut m = HashMap::new();
    m.insert(
        "gemini-2.5-flash",
        ModelRate {
            input_per_million: 0.3,
            output_per_million: 2.5,
        },
    );
    m.insert(
        "gemini-3-flash-preview",
        ModelRate {
            input_per_million: 0.5,
            output_per_million: 3.0,
        },
    );
    m
});

const DEFAULT_RATE: ModelRate = ModelRate {
    input_per_million: 0.3,
    output_per_million: 2.5,
};

/// Estimated USD cost of one call. Unknown model names fall back to the
/// default rate rather than erroring, so the ledger keeps accepting
/// records when a new model ships before a rate entry does.
pub fn estimate_cost(model: &str, usage: &TokenUsage) -> f64 {
    let rate = MODEL_RATES.get(model).copied().unwrap_or(DEFAULT_RATE);
    let (billable_in, billable_out) = usage.billable();
    billable_in as f64 / 1_000_000.0 * rate.input_per_million
        + billable_out as f64 / 1_000_000.0 * rate.output_per_million
}

/// Reference to a capability module that contributed to a reply. Stored
/// per assistant message; either a known module id or free-form inline
/// metadata for ad-hoc sources.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CapabilityReference {
    ById(String),
    Inline { title: String, description: String },
}

impl CapabilityReference {
    pub fn display_name(&self) -> &str {
        match self {
            CapabilityReference::ById(id) => id,
            CapabilityReference::Inline { title, .. } => title,
        }
    }
}
