use std::env;

/// Environment variable names - single source of truth
pub mod env_vars {
    pub const PORT: &str = "PORT";
    pub const DATABASE_URL: &str = "DATABASE_URL";
    pub const GOOGLE_API_KEY: &str = "GOOGLE_API_KEY";
    pub const AGENT_MODEL: &str = "AGENT_MODEL";
    pub const GENERAL_MODEL: &str = "GENERAL_MODEL";
    pub const RUNTIME_TIMEOUT_SECS: &str = "RUNTIME_TIMEOUT_SECS";
    pub const PENDING_TTL_SECS: &str = "PENDING_TTL_SECS";
}

/// Default values
pub mod defaults {
    pub const PORT: u16 = 8080;
    pub const DATABASE_URL: &str = "./.db/concierge.db";
    pub const AGENT_MODEL: &str = "gemini-2.5-flash";
    pub const GENERAL_MODEL: &str = "gemini-2.5-flash-lite";
    pub const RUNTIME_TIMEOUT_SECS: u64 = 60;
    pub const PENDING_TTL_SECS: u64 = 900;
}

pub fn port() -> u16 {
    env::var(env_vars::PORT)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(defaults::PORT)
}

pub fn database_url() -> String {
    env::var(env_vars::DATABASE_URL).unwrap_or_else(|_| defaults::DATABASE_URL.to_string())
}

pub fn google_api_key() -> String {
    env::var(env_vars::GOOGLE_API_KEY).unwrap_or_default()
}

/// Model used for session turns.
pub fn agent_model() -> String {
    env::var(env_vars::AGENT_MODEL).unwrap_or_else(|_| defaults::AGENT_MODEL.to_string())
}

/// Cheaper model for one-shot generation (onboarding extraction, FAQ drafts).
pub fn general_model() -> String {
    env::var(env_vars::GENERAL_MODEL).unwrap_or_else(|_| defaults::GENERAL_MODEL.to_string())
}

/// Hard ceiling on one awaited runtime turn.
pub fn runtime_timeout_secs() -> u64 {
    env::var(env_vars::RUNTIME_TIMEOUT_SECS)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(defaults::RUNTIME_TIMEOUT_SECS)
}

/// How long an unconfirmed onboarding config draft stays retrievable.
pub fn pending_ttl_secs() -> u64 {
    env::var(env_vars::PENDING_TTL_SECS)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(defaults::PENDING_TTL_SECS)
}
