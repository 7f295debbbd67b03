//! Structured reply recovery
//!
//! The runtime is instructed to answer with a JSON object, but models wrap
//! it in markdown fences, prepend prose, or emit Python-style literals
//! (`True`, `False`, `None`). Recovery extracts the most plausible JSON
//! region, normalizes those literals, and falls back to treating the whole
//! output as plain reply text when parsing still fails. A recovery failure
//! must never fail the turn.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static FENCED_JSON: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```json\s*(\{.*?\})\s*```").unwrap());

/// A FAQ entry the model says it drew on for this reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelatedFaq {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "Q", default)]
    pub question: String,
    #[serde(rename = "A", default)]
    pub answer: String,
}

/// The model's verdict on whether this turn needs a human.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandoffSignal {
    #[serde(rename = "hand_off", default)]
    pub requested: bool,
    #[serde(default)]
    pub reason: Option<String>,
}

/// The recovered shape of one model reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructuredReply {
    pub reply_text: String,
    pub related_faqs: Vec<RelatedFaq>,
    pub handoff: HandoffSignal,
    /// False when the raw output could not be parsed and is being passed
    /// through verbatim.
    pub parsed: bool,
}

#[derive(Debug, Deserialize)]
struct WireReply {
    response_text: Option<String>,
    #[serde(default)]
    related_faq_list: Vec<RelatedFaq>,
    #[serde(default)]
    handoff_result: Option<HandoffSignal>,
}

/// Pick the JSON region to attempt: a fenced ```json block first, then the
/// widest brace-delimited span, then the whole text.
fn candidate_json(raw: &str) -> &str {
    if let Some(caps) = FENCED_JSON.captures(raw) {
        return caps.get(1).unwrap().as_str();
    }
    if let (Some(start), Some(end)) = (raw.find('{'), raw.rfind('}')) {
        if start < end {
            return &raw[start..=end];
        }
    }
    raw
}

/// Rewrite Python-style literals to JSON ones. Only the value position
/// (after a colon) is touched so quoted text like "True story" survives.
fn normalize_literals(json: &str) -> String {
    json.replace(": True", ": true")
        .replace(":True", ":true")
        .replace(": False", ": false")
        .replace(":False", ":false")
        .replace(": None", ": null")
        .replace(":None", ":null")
}

fn passthrough(raw: &str) -> StructuredReply {
    StructuredReply {
        reply_text: raw.to_string(),
        related_faqs: Vec::new(),
        handoff: HandoffSignal::default(),
        parsed: false,
    }
}

/// Recover an arbitrary JSON value from raw model output, using the same
/// region extraction and literal normalization as reply recovery. Used by
/// the one-shot generation paths (onboarding extraction, FAQ drafting).
pub fn recover_value(raw: &str) -> Option<serde_json::Value> {
    let candidate = normalize_literals(candidate_json(raw));
    if let Ok(value) = serde_json::from_str(&candidate) {
        return Some(value);
    }
    // Top-level arrays (FAQ drafts) have no brace span to find.
    if let (Some(start), Some(end)) = (raw.find('['), raw.rfind(']')) {
        if start < end {
            return serde_json::from_str(&normalize_literals(&raw[start..=end])).ok();
        }
    }
    None
}

/// Recover a structured reply from raw model output. Always succeeds.
pub fn recover(raw: &str) -> StructuredReply {
    let candidate = normalize_literals(candidate_json(raw));

    let wire: WireReply = match serde_json::from_str(&candidate) {
        Ok(wire) => wire,
        Err(_) => return passthrough(raw),
    };

    // A parse without response_text is a schema miss, not an answer.
    let reply_text = match wire.response_text {
        Some(text) if !text.is_empty() => text,
        _ => return passthrough(raw),
    };

    StructuredReply {
        reply_text,
        related_faqs: wire.related_faq_list,
        // Documented default when the model omits the verdict entirely.
        handoff: wire.handoff_result.unwrap_or_else(|| HandoffSignal {
            requested: false,
            reason: Some("not applicable".to_string()),
        }),
        parsed: true,
    }
}
