//! Domain model modules

pub mod agent;
pub mod chat_message;
pub mod identity;
pub mod session;
pub mod usage;

pub use agent::{
    AgentResponse, CompiledInstructions, DeployConfig, FaqItem, RawAgentConfig, TenantAgent,
};
pub use chat_message::{ChatMessage, SenderRole};
pub use identity::{Admin, EndUser};
pub use session::{Session, SessionMode, SessionStatus};
pub use usage::{CapabilityReference, TokenUsage, UsageKind, UsageRecord};
