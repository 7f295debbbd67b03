//! Turn orchestration
//!
//! One inbound message in, one (or zero) automated replies out. The
//! orchestrator owns the read-generate-write cycle: session resolution,
//! transcript persistence, the single awaited runtime call, reply
//! recovery, usage accounting, and escalation.

use std::sync::Arc;
use std::time::Duration;

use crate::ai::{recovery, Message, MessageRole, RuntimeClient, RuntimeResponse, TurnContext};
use crate::channels::session_locks::SessionLocks;
use crate::channels::types::{TurnRequest, TurnResult, FALLBACK_REPLY};
use crate::db::Database;
use crate::error::TurnError;
use crate::handoff::HandoffCoordinator;
use crate::models::{CapabilityReference, SenderRole, Session, SessionMode, TenantAgent, UsageKind};
use crate::prompts;

/// How many prior messages a turn replays to the runtime.
const HISTORY_LIMIT: usize = 20;

/// Inbound text longer than this is truncated before persistence and
/// prompting. Channel messages are short; anything past this is noise or
/// abuse.
const MAX_MESSAGE_CHARS: usize = 2000;

pub struct TurnOrchestrator {
    db: Arc<Database>,
    runtime: Arc<RuntimeClient>,
    handoff: Arc<HandoffCoordinator>,
    locks: SessionLocks,
    runtime_timeout: Duration,
}

impl TurnOrchestrator {
    pub fn new(
        db: Arc<Database>,
        runtime: Arc<RuntimeClient>,
        handoff: Arc<HandoffCoordinator>,
        runtime_timeout: Duration,
    ) -> Self {
        Self {
            db,
            runtime,
            handoff,
            locks: SessionLocks::new(),
            runtime_timeout,
        }
    }

    /// Run one turn end to end. Never fails the request path: storage
    /// failures come back in `error` with an empty response, runtime
    /// failures come back as a fallback reply.
    pub async fn handle_turn(&self, agent: &TenantAgent, request: TurnRequest) -> TurnResult {
        let session_id = request
            .session_id
            .clone()
            .unwrap_or_else(|| Session::channel_session_id(&agent.id, &request.user_id));

        // Serialize turns per session: held from session load to final write.
        let lock = self.locks.lock_for(&session_id);
        let _guard = lock.lock().await;

        match self.run(agent, &request, &session_id).await {
            Ok(result) => result,
            Err(e) => {
                // Even a hard failure answers; silence is forbidden.
                log::error!("Turn failed for session {}: {}", session_id, e);
                TurnResult::failure(session_id, e.to_string())
            }
        }
    }

    async fn run(
        &self,
        agent: &TenantAgent,
        request: &TurnRequest,
        session_id: &str,
    ) -> Result<TurnResult, TurnError> {
        // The caller loaded the agent before the session lock was taken; a
        // config save may have landed in between. Re-read under the lock so
        // the snapshot this turn writes is never built from a stale bundle.
        let agent: TenantAgent = self
            .db
            .get_agent(&agent.id)?
            .ok_or_else(|| TurnError::ConfigNotFound(agent.id.clone()))?;

        let text: String = if request.text.chars().count() > MAX_MESSAGE_CHARS {
            log::warn!(
                "Truncating oversized inbound message for session {} ({} chars)",
                session_id,
                request.text.chars().count()
            );
            request.text.chars().take(MAX_MESSAGE_CHARS).collect()
        } else {
            request.text.clone()
        };

        self.db
            .upsert_end_user(&request.user_id, request.user_name.as_deref())?;

        let session = self
            .db
            .get_or_create_session(session_id, &agent.id, &request.user_id)?;

        // Inbound is persisted before anything can fail downstream.
        self.db
            .append_message(session_id, SenderRole::User, &text, &[])?;

        if session.mode == SessionMode::Human {
            log::info!("Session {} is in human mode, no automated turn", session_id);
            return Ok(TurnResult::human_mode(session_id.to_string()));
        }

        let system_instruction = match &session.context_snapshot {
            Some(snapshot) => snapshot.clone(),
            None => {
                let built = prompts::system_instruction(&agent.compiled);
                if let Err(e) = self.db.update_context_snapshot(session_id, Some(&built)) {
                    log::warn!("Snapshot write failed for {}: {}", session_id, e);
                }
                built
            }
        };

        let context = TurnContext {
            system_instruction,
            history: self.load_history(session_id),
            user_message: text.clone(),
            current_agent_id: agent.id.clone(),
            current_user_id: request.user_id.clone(),
            current_session_id: session_id.to_string(),
        };

        // The only await on the model runtime in the whole turn.
        let outcome =
            tokio::time::timeout(self.runtime_timeout, self.runtime.run_turn(&context)).await;

        let response: RuntimeResponse = match outcome {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                return Ok(self.soft_fail(session_id, TurnError::RuntimeFailure(e.message)))
            }
            Err(_) => {
                let reason = format!("runtime timeout after {:?}", self.runtime_timeout);
                return Ok(self.soft_fail(session_id, TurnError::RuntimeFailure(reason)));
            }
        };

        let reply = recovery::recover(&response.raw_text);
        let recovery_error = if reply.parsed {
            None
        } else {
            // Delivered anyway; the tag is diagnostic, not user-facing.
            let e = TurnError::FormatRecovery("model output was not valid JSON".to_string());
            log::warn!("Session {}: {}, passing raw text through", session_id, e);
            Some(e.to_string())
        };

        let mut handoff_triggered = false;
        let mut notify_code = None;
        if reply.handoff.requested && agent.compiled.handoff_enabled {
            let user_display = request
                .user_name
                .clone()
                .unwrap_or_else(|| request.user_id.clone());
            match self
                .handoff
                .escalate(
                    &agent,
                    &session,
                    &user_display,
                    reply.handoff.reason.as_deref(),
                    &text,
                )
                .await
            {
                Ok(outcome) => {
                    handoff_triggered = true;
                    notify_code = Some(outcome.notify_code);
                }
                Err(e) => log::error!("Escalation failed for {}: {}", session_id, e),
            }
        }

        let mut capabilities: Vec<CapabilityReference> = Vec::new();
        if !reply.related_faqs.is_empty() {
            capabilities.push(CapabilityReference::ById(prompts::CAP_FAQ.to_string()));
        }
        if handoff_triggered {
            capabilities.push(CapabilityReference::ById(prompts::CAP_HANDOFF.to_string()));
        }

        let chat_message_id = match self.db.append_message(
            session_id,
            SenderRole::Agent,
            &reply.reply_text,
            &capabilities,
        ) {
            Ok(message) => Some(message.id),
            Err(e) => {
                // The ledger entry still lands, just without the link.
                log::error!("Failed to persist agent reply: {}", e);
                None
            }
        };

        for event in &response.usage_events {
            if let Err(e) = self.db.record_usage(
                &agent.admin_id,
                Some(&agent.id),
                Some(session_id),
                chat_message_id,
                UsageKind::Chat,
                &event.model,
                &event.usage,
            ) {
                log::error!("Usage record failed for {}: {}", session_id, e);
            }
        }

        Ok(TurnResult {
            session_id: session_id.to_string(),
            response: reply.reply_text,
            related_faqs: reply.related_faqs,
            handoff_triggered,
            notify_code,
            error: recovery_error,
        })
    }

    /// Replay window for the runtime: the most recent messages, excluding
    /// the inbound one that was just appended.
    fn load_history(&self, session_id: &str) -> Vec<Message> {
        let mut messages = self
            .db
            .get_messages(session_id, HISTORY_LIMIT + 1)
            .unwrap_or_default();
        messages.pop();
        messages
            .into_iter()
            .map(|m| Message {
                role: match m.sender {
                    SenderRole::User => MessageRole::User,
                    _ => MessageRole::Assistant,
                },
                content: m.content,
            })
            .collect()
    }

    /// Runtime failure or timeout: answer with the fallback, persist it,
    /// record nothing in the ledger.
    fn soft_fail(&self, session_id: &str, error: TurnError) -> TurnResult {
        log::error!("Soft failure for session {}: {}", session_id, error);
        if let Err(e) = self
            .db
            .append_message(session_id, SenderRole::Agent, FALLBACK_REPLY, &[])
        {
            log::error!("Failed to persist fallback reply: {}", e);
        }
        TurnResult {
            session_id: session_id.to_string(),
            response: FALLBACK_REPLY.to_string(),
            related_faqs: Vec::new(),
            handoff_triggered: false,
            notify_code: None,
            error: Some(error.to_string()),
        }
    }
}
