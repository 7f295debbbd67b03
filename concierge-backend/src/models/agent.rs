use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One question/answer pair from the tenant's FAQ set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaqItem {
    pub id: String,
    pub question: String,
    pub answer: String,
}

/// Raw form configuration - the mutable source of truth the compiled
/// instruction bundle is regenerated from on every save.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawAgentConfig {
    #[serde(default)]
    pub merchant_name: String,
    #[serde(default)]
    pub services: String,
    #[serde(default)]
    pub tone: String,
    #[serde(default)]
    pub tone_avoid: String,
    #[serde(default)]
    pub faqs: Vec<FaqItem>,
    #[serde(default)]
    pub handoff_triggers: Vec<String>,
}

/// The derived, runtime-ready instruction bundle. Always a pure function
/// of `RawAgentConfig` + the enabled capability set (see `prompts::compile`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompiledInstructions {
    pub router_instruction: String,
    pub faq_instruction: String,
    pub handoff_instruction: String,
    pub handoff_enabled: bool,
}

/// Messaging-channel credentials for one tenant agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployConfig {
    #[serde(skip_serializing)]
    pub access_token: String,
    #[serde(skip_serializing)]
    pub channel_secret: String,
    /// Channel-native user id of the human operator to notify on
    /// escalation. Absent = escalation still flips the mode but
    /// notification delivery is skipped.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operator_notify_id: Option<String>,
}

/// One tenant's configured automated customer-service persona.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantAgent {
    pub id: String,
    pub admin_id: String,
    pub name: String,
    pub raw_config: RawAgentConfig,
    pub compiled: CompiledInstructions,
    /// Enabled capability modules ("subagents"), e.g. "faq", "handoff".
    pub capabilities: Vec<String>,
    pub deploy: Option<DeployConfig>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// API response shape for agent reads (never leaks channel secrets).
#[derive(Debug, Clone, Serialize)]
pub struct AgentResponse {
    pub id: String,
    pub admin_id: String,
    pub name: String,
    pub raw_config: RawAgentConfig,
    pub handoff_enabled: bool,
    pub capabilities: Vec<String>,
    pub deployed: bool,
    pub has_notify_target: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<TenantAgent> for AgentResponse {
    fn from(agent: TenantAgent) -> Self {
        Self {
            id: agent.id,
            admin_id: agent.admin_id,
            name: agent.name,
            handoff_enabled: agent.compiled.handoff_enabled,
            raw_config: agent.raw_config,
            capabilities: agent.capabilities,
            deployed: agent.deploy.is_some(),
            has_notify_target: agent
                .deploy
                .as_ref()
                .map(|d| d.operator_notify_id.is_some())
                .unwrap_or(false),
            created_at: agent.created_at,
            updated_at: agent.updated_at,
        }
    }
}
