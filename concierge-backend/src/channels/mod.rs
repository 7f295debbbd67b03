pub mod dispatcher;
pub mod line;
pub mod session_locks;
pub mod types;

#[cfg(test)]
mod dispatcher_tests;

pub use dispatcher::TurnOrchestrator;
pub use line::{LineGateway, MockGateway};
pub use session_locks::SessionLocks;
pub use types::{TurnRequest, TurnResult};

use async_trait::async_trait;

/// Outbound side of the messaging channel. One implementation talks to the
/// real platform; the mock captures everything for tests.
#[async_trait]
pub trait MessagingGateway: Send + Sync {
    /// Fire-and-forget push to a user or operator.
    async fn push_text(&self, access_token: &str, to: &str, text: &str) -> Result<(), String>;

    /// Reply bound to one inbound event's reply token.
    async fn reply_text(
        &self,
        access_token: &str,
        reply_token: &str,
        text: &str,
    ) -> Result<(), String>;

    /// Typing/loading indicator while the turn runs. Failures are ignored
    /// by callers; the indicator is cosmetic.
    async fn show_loading(&self, access_token: &str, chat_id: &str) -> Result<(), String>;

    /// Display name from the channel profile, if the platform exposes one.
    async fn profile_name(&self, access_token: &str, user_id: &str) -> Option<String>;

    /// Webhook body authenticity check.
    fn verify_signature(&self, channel_secret: &str, body: &[u8], signature: &str) -> bool;
}
