//! Instruction compilation
//!
//! `compile` is a pure function from the raw form config plus the enabled
//! capability set to the instruction bundle the runtime receives. Saving a
//! config always recompiles; nothing else ever writes the compiled bundle.

use crate::models::{CompiledInstructions, RawAgentConfig};

/// Capability module ids.
pub const CAP_FAQ: &str = "faq";
pub const CAP_HANDOFF: &str = "handoff";

/// One-shot extraction prompt for onboarding: free-form business blurb in,
/// structured config JSON out.
pub const EXTRACTION_PROMPT: &str = "\
You extract a customer-service agent configuration from a merchant's free-form \
description of their business. Respond with a single JSON object and nothing else:
{
  \"merchant_name\": \"<business name>\",
  \"services\": \"<what the business offers, 1-3 sentences>\",
  \"tone\": \"<how the agent should speak>\",
  \"tone_avoid\": \"<what the agent must avoid saying>\",
  \"faqs\": [{\"id\": \"faq-1\", \"question\": \"...\", \"answer\": \"...\"}],
  \"handoff_triggers\": [\"<situation that needs a human>\"]
}
Leave any field you cannot infer as an empty string or empty list. Do not invent \
facts about the business.";

/// One-shot prompt for drafting FAQ entries from a merchant document.
pub const FAQ_GENERATION_PROMPT: &str = "\
You draft FAQ entries for a customer-service agent from the merchant text below. \
Respond with a single JSON array and nothing else: \
[{\"id\": \"faq-1\", \"question\": \"...\", \"answer\": \"...\"}]. \
Only include answers the text actually supports.";

fn router_instruction(raw: &RawAgentConfig, handoff_enabled: bool) -> String {
    let mut out = format!(
        "You are the customer-service agent for {merchant}.\n\
         Services: {services}\n\
         Tone: {tone}\n",
        merchant = if raw.merchant_name.is_empty() {
            "this business"
        } else {
            &raw.merchant_name
        },
        services = raw.services,
        tone = raw.tone,
    );
    if !raw.tone_avoid.is_empty() {
        out.push_str(&format!("Never: {}\n", raw.tone_avoid));
    }
    out.push_str(
        "\nAlways respond with a single JSON object:\n\
         {\n\
           \"response_text\": \"<your reply to the customer>\",\n\
           \"related_faq_list\": [{\"id\": \"...\", \"Q\": \"...\", \"A\": \"...\"}],\n\
           \"handoff_result\": {\"hand_off\": <bool>, \"reason\": \"<why, or null>\"}\n\
         }\n",
    );
    if !handoff_enabled {
        out.push_str("Handoff is disabled for this agent: hand_off must always be false.\n");
    }
    out
}

fn faq_instruction(raw: &RawAgentConfig) -> String {
    if raw.faqs.is_empty() {
        return String::new();
    }
    let mut out = String::from(
        "Answer from the FAQ entries below when they apply, and list the ones you \
         used in related_faq_list:\n",
    );
    for faq in &raw.faqs {
        out.push_str(&format!(
            "[{}] Q: {} A: {}\n",
            faq.id, faq.question, faq.answer
        ));
    }
    out
}

fn handoff_instruction(raw: &RawAgentConfig) -> String {
    let mut out = String::from(
        "Set handoff_result.hand_off to true when the customer needs a human: \
         when they ask for a person, when you cannot help, or when any of the \
         following applies.\n",
    );
    for trigger in &raw.handoff_triggers {
        out.push_str(&format!("- {}\n", trigger));
    }
    out.push_str(&format!(
        "Escalate when the user mentions any of: {}.\n",
        raw.handoff_triggers.join(", ")
    ));
    out.push_str("Give the concrete reason in handoff_result.reason.\n");
    out
}

/// Compile the runtime instruction bundle. Disabled capabilities compile to
/// empty sections so the bundle's shape is stable. Handoff needs both the
/// capability and at least one trigger; there is nothing to escalate on
/// otherwise.
pub fn compile(raw: &RawAgentConfig, capabilities: &[String]) -> CompiledInstructions {
    let handoff_enabled =
        capabilities.iter().any(|c| c == CAP_HANDOFF) && !raw.handoff_triggers.is_empty();
    let faq_enabled = capabilities.iter().any(|c| c == CAP_FAQ);

    CompiledInstructions {
        router_instruction: router_instruction(raw, handoff_enabled),
        faq_instruction: if faq_enabled {
            faq_instruction(raw)
        } else {
            String::new()
        },
        handoff_instruction: if handoff_enabled {
            handoff_instruction(raw)
        } else {
            String::new()
        },
        handoff_enabled,
    }
}

/// Flatten the bundle into the single system instruction a turn sends.
pub fn system_instruction(compiled: &CompiledInstructions) -> String {
    let mut out = compiled.router_instruction.clone();
    if !compiled.faq_instruction.is_empty() {
        out.push('\n');
        out.push_str(&compiled.faq_instruction);
    }
    if !compiled.handoff_instruction.is_empty() {
        out.push('\n');
        out.push_str(&compiled.handoff_instruction);
    }
    out
}
