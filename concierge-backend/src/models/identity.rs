use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An end user of a tenant's channel, keyed by channel-native id and
/// upserted on first contact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndUser {
    pub line_id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
}

/// A tenant administrator (dashboard login identity).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Admin {
    pub line_id: String,
    pub name: String,
    pub is_monitor: bool,
    pub created_at: DateTime<Utc>,
    pub login_at: DateTime<Utc>,
}
