//! Integration tests for the turn pipeline.
//!
//! Each test wires an in-memory database, a mock runtime with queued
//! responses, and a capturing mock gateway, then drives whole turns
//! through the orchestrator and asserts on persisted state: transcripts,
//! session mode/status, the usage ledger, and operator notifications.

use std::sync::Arc;
use std::time::Duration;

use crate::ai::{MockRuntime, RuntimeClient, RuntimeError, RuntimeResponse, UsageEvent};
use crate::channels::dispatcher::TurnOrchestrator;
use crate::channels::line::MockGateway;
use crate::channels::types::TurnRequest;
use crate::db::Database;
use crate::handoff::HandoffCoordinator;
use crate::models::{
    DeployConfig, FaqItem, RawAgentConfig, SenderRole, Session, SessionMode, SessionStatus,
    TenantAgent, TokenUsage,
};
use crate::prompts;

struct TestHarness {
    db: Arc<Database>,
    orchestrator: TurnOrchestrator,
    gateway: MockGateway,
    mock: MockRuntime,
    agent: TenantAgent,
}

impl TestHarness {
    /// Build a harness around one deployed agent with the given capability
    /// modules and a queue of runtime responses.
    fn new(capabilities: &[&str], responses: Vec<Result<RuntimeResponse, RuntimeError>>) -> Self {
        Self::with_timeout(capabilities, responses, Duration::from_secs(5))
    }

    fn with_timeout(
        capabilities: &[&str],
        responses: Vec<Result<RuntimeResponse, RuntimeError>>,
        runtime_timeout: Duration,
    ) -> Self {
        let db = Arc::new(Database::new(":memory:").expect("in-memory db"));

        let raw = RawAgentConfig {
            merchant_name: "Cafe Luna".to_string(),
            services: "Coffee and pastries".to_string(),
            tone: "warm".to_string(),
            tone_avoid: String::new(),
            faqs: vec![FaqItem {
                id: "faq-1".to_string(),
                question: "When are you open?".to_string(),
                answer: "Daily 8-18.".to_string(),
            }],
            handoff_triggers: vec!["customer asks for a refund".to_string()],
        };
        let caps: Vec<String> = capabilities.iter().map(|c| c.to_string()).collect();
        let compiled = prompts::compile(&raw, &caps);

        let agent = db
            .create_agent("admin-1", "Cafe Luna Bot", &raw, &compiled, &caps)
            .expect("create agent");
        db.set_deploy_config(
            &agent.id,
            &DeployConfig {
                access_token: "token".to_string(),
                channel_secret: "secret".to_string(),
                operator_notify_id: Some("op-1".to_string()),
            },
        )
        .expect("deploy agent");
        let agent = db.get_agent(&agent.id).expect("reload").expect("exists");

        let gateway = MockGateway::new();
        let mock = MockRuntime::new(responses);
        let runtime = Arc::new(RuntimeClient::Mock(mock.clone()));
        let handoff = Arc::new(HandoffCoordinator::new(
            db.clone(),
            Arc::new(gateway.clone()),
        ));
        let orchestrator = TurnOrchestrator::new(db.clone(), runtime, handoff, runtime_timeout);

        TestHarness {
            db,
            orchestrator,
            gateway,
            mock,
            agent,
        }
    }

    async fn turn(&self, user_id: &str, text: &str) -> crate::channels::types::TurnResult {
        let request = TurnRequest {
            agent_id: self.agent.id.clone(),
            user_id: user_id.to_string(),
            user_name: Some("Alice".to_string()),
            text: text.to_string(),
            session_id: None,
        };
        self.orchestrator.handle_turn(&self.agent, request).await
    }

    fn session_id(&self, user_id: &str) -> String {
        Session::channel_session_id(&self.agent.id, user_id)
    }

    fn usage_count(&self) -> usize {
        self.db
            .get_usage_for_agent(&self.agent.id)
            .expect("usage query")
            .len()
    }
}

fn reply(text: &str) -> RuntimeResponse {
    RuntimeResponse {
        raw_text: serde_json::json!({
            "response_text": text,
            "related_faq_list": [],
            "handoff_result": {"hand_off": false, "reason": null}
        })
        .to_string(),
        usage_events: vec![UsageEvent {
            model: "gemini-2.5-flash".to_string(),
            usage: TokenUsage {
                input_tokens: 120,
                output_tokens: 40,
                tool_tokens: 5,
                thought_tokens: 10,
                total_tokens: 175,
            },
        }],
    }
}

fn handoff_reply(text: &str, reason: &str) -> RuntimeResponse {
    RuntimeResponse {
        // Python-style literal on purpose: this is what recovery sees in
        // the wild.
        raw_text: format!(
            "```json\n{{\"response_text\": \"{}\", \"related_faq_list\": [], \"handoff_result\": {{\"hand_off\": True, \"reason\": \"{}\"}}}}\n```",
            text, reason
        ),
        usage_events: vec![UsageEvent {
            model: "gemini-2.5-flash".to_string(),
            usage: TokenUsage {
                input_tokens: 200,
                output_tokens: 60,
                ..Default::default()
            },
        }],
    }
}

const BOTH: &[&str] = &[prompts::CAP_FAQ, prompts::CAP_HANDOFF];

#[tokio::test]
async fn normal_turn_persists_both_sides_and_usage() {
    let h = TestHarness::new(BOTH, vec![Ok(reply("We open at 8."))]);

    let result = h.turn("U1", "When do you open?").await;
    assert_eq!(result.response, "We open at 8.");
    assert!(result.error.is_none());
    assert!(!result.handoff_triggered);

    let messages = h.db.get_messages(&h.session_id("U1"), 0).unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].sender, SenderRole::User);
    assert_eq!(messages[0].content, "When do you open?");
    assert_eq!(messages[1].sender, SenderRole::Agent);
    assert_eq!(messages[1].content, "We open at 8.");

    assert_eq!(h.usage_count(), 1);
    let records = h.db.get_usage_for_agent(&h.agent.id).unwrap();
    assert_eq!(records[0].usage.total_tokens, 175);
    assert_eq!(records[0].admin_id, "admin-1");
    assert_eq!(records[0].session_id.as_deref(), Some(h.session_id("U1").as_str()));
    // The ledger row points at the agent reply it paid for.
    assert_eq!(records[0].chat_message_id, Some(messages[1].id));
}

#[tokio::test]
async fn human_mode_short_circuits_without_runtime_call() {
    let h = TestHarness::new(BOTH, vec![Ok(reply("should never be used"))]);
    let session_id = h.session_id("U1");

    h.db.set_session_mode(&session_id, &h.agent.id, "U1", SessionMode::Human)
        .unwrap();

    let result = h.turn("U1", "hello?").await;
    assert!(!result.has_reply());
    assert!(result.error.is_none());

    // No runtime call, no usage, but the inbound message is on the record.
    assert_eq!(h.mock.get_trace().len(), 0);
    assert_eq!(h.usage_count(), 0);
    let messages = h.db.get_messages(&session_id, 0).unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].sender, SenderRole::User);
}

#[tokio::test]
async fn model_handoff_flips_mode_and_notifies_operator() {
    let h = TestHarness::new(
        BOTH,
        vec![Ok(handoff_reply(
            "Let me get a colleague for you.",
            "customer asks for a refund",
        ))],
    );

    let result = h.turn("U1", "I want a refund").await;

    // Transparent to the user: the model's reply still goes out.
    assert_eq!(result.response, "Let me get a colleague for you.");
    assert!(result.handoff_triggered);
    let code = result.notify_code.expect("notify code");

    let session = h.db.get_session(&h.session_id("U1")).unwrap().unwrap();
    assert_eq!(session.mode, SessionMode::Human);

    let notifications = h.gateway.pushed_to("op-1");
    assert_eq!(notifications.len(), 1);
    assert!(notifications[0].contains(&code));
    assert!(notifications[0].contains("customer asks for a refund"));
    assert!(notifications[0].contains("I want a refund"));
}

#[tokio::test]
async fn handoff_signal_is_ignored_when_capability_disabled() {
    let h = TestHarness::new(
        &[prompts::CAP_FAQ],
        vec![Ok(handoff_reply("One moment.", "refund"))],
    );

    let result = h.turn("U1", "I want a refund").await;
    assert!(!result.handoff_triggered);
    assert!(result.notify_code.is_none());

    let session = h.db.get_session(&h.session_id("U1")).unwrap().unwrap();
    assert_eq!(session.mode, SessionMode::Automated);
    assert!(h.gateway.pushed_to("op-1").is_empty());
}

#[tokio::test]
async fn runtime_error_soft_fails_without_usage() {
    let h = TestHarness::new(BOTH, vec![Err(RuntimeError::new("upstream 500"))]);

    let result = h.turn("U1", "hello").await;
    assert!(result.has_reply());
    assert!(result.error.as_deref().unwrap().contains("upstream 500"));
    assert_eq!(h.usage_count(), 0);

    // Both the inbound and the fallback reply are on the transcript.
    let messages = h.db.get_messages(&h.session_id("U1"), 0).unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[1].sender, SenderRole::Agent);
    assert_eq!(messages[1].content, result.response);
}

#[tokio::test]
async fn unparseable_output_passes_through_verbatim() {
    let h = TestHarness::new(
        BOTH,
        vec![Ok(RuntimeResponse {
            raw_text: "Sorry, plain prose today.".to_string(),
            usage_events: vec![UsageEvent {
                model: "gemini-2.5-flash".to_string(),
                usage: TokenUsage {
                    input_tokens: 50,
                    output_tokens: 12,
                    ..Default::default()
                },
            }],
        })],
    );

    let result = h.turn("U1", "hi").await;
    assert_eq!(result.response, "Sorry, plain prose today.");
    assert!(!result.handoff_triggered);
    // Delivered anyway, but tagged with the recovery diagnostic.
    assert!(result.error.as_deref().unwrap().contains("format recovery"));
    // Tokens were still spent and still get recorded.
    assert_eq!(h.usage_count(), 1);
}

#[tokio::test]
async fn oversized_inbound_message_is_truncated() {
    let h = TestHarness::new(BOTH, vec![Ok(reply("that was a lot"))]);

    let long = "x".repeat(5000);
    let result = h.turn("U1", &long).await;
    assert!(result.error.is_none());

    let messages = h.db.get_messages(&h.session_id("U1"), 0).unwrap();
    assert_eq!(messages[0].content.chars().count(), 2000);

    let trace = h.mock.get_trace();
    assert_eq!(trace[0].input_context.user_message.chars().count(), 2000);
}

#[tokio::test]
async fn config_save_invalidates_snapshot_and_next_turn_rebuilds() {
    let h = TestHarness::new(BOTH, vec![Ok(reply("first")), Ok(reply("second"))]);
    let session_id = h.session_id("U1");

    h.turn("U1", "hello").await;
    let before = h
        .db
        .get_session(&session_id)
        .unwrap()
        .unwrap()
        .context_snapshot
        .expect("snapshot written on first turn");
    assert!(before.contains("Cafe Luna"));

    // Save a renamed config; the invalidation cascade runs in the same
    // transaction.
    let mut raw = h.agent.raw_config.clone();
    raw.merchant_name = "Cafe Sol".to_string();
    let compiled = prompts::compile(&raw, &h.agent.capabilities);
    let invalidated = h.db.update_agent_config(&h.agent.id, &raw, &compiled).unwrap();
    assert_eq!(invalidated, 1);
    assert!(h
        .db
        .get_session(&session_id)
        .unwrap()
        .unwrap()
        .context_snapshot
        .is_none());

    // Next turn rebuilds from the new compiled bundle.
    let agent = h.db.get_agent(&h.agent.id).unwrap().unwrap();
    let request = TurnRequest {
        agent_id: agent.id.clone(),
        user_id: "U1".to_string(),
        user_name: None,
        text: "still there?".to_string(),
        session_id: None,
    };
    h.orchestrator.handle_turn(&agent, request).await;

    let after = h
        .db
        .get_session(&session_id)
        .unwrap()
        .unwrap()
        .context_snapshot
        .expect("snapshot rebuilt");
    assert!(after.contains("Cafe Sol"));
    assert_ne!(before, after);
}

#[tokio::test]
async fn closed_session_resumes_open_with_mode_intact() {
    let h = TestHarness::new(BOTH, vec![Ok(reply("welcome back"))]);
    let session_id = h.session_id("U1");

    // Operator took over, then closed the conversation.
    h.db.set_session_mode(&session_id, &h.agent.id, "U1", SessionMode::Human)
        .unwrap();
    h.db.close_session(&session_id).unwrap();
    let closed = h.db.get_session(&session_id).unwrap().unwrap();
    assert_eq!(closed.status, SessionStatus::Done);
    assert_eq!(closed.mode, SessionMode::Human);

    // Next inbound reopens the same row; mode survives the close, so the
    // turn stays with the human.
    let result = h.turn("U1", "one more thing").await;
    assert!(!result.has_reply());

    let resumed = h.db.get_session(&session_id).unwrap().unwrap();
    assert_eq!(resumed.status, SessionStatus::Open);
    assert_eq!(resumed.mode, SessionMode::Human);
}

#[tokio::test]
async fn concurrent_turns_share_one_session_and_interleave_cleanly() {
    let h = Arc::new(TestHarness::new(
        BOTH,
        vec![Ok(reply("answer one")), Ok(reply("answer two"))],
    ));

    let a = {
        let h = h.clone();
        tokio::spawn(async move { h.turn("U1", "first question").await })
    };
    let b = {
        let h = h.clone();
        tokio::spawn(async move { h.turn("U1", "second question").await })
    };
    let (ra, rb) = (a.await.unwrap(), b.await.unwrap());
    assert!(ra.error.is_none());
    assert!(rb.error.is_none());

    // One deterministic session, four messages in strict user/agent pairs.
    let summaries = h.db.list_sessions_for_agent(&h.agent.id).unwrap();
    assert_eq!(summaries.len(), 1);
    let messages = h.db.get_messages(&h.session_id("U1"), 0).unwrap();
    assert_eq!(messages.len(), 4);
    assert_eq!(messages[0].sender, SenderRole::User);
    assert_eq!(messages[1].sender, SenderRole::Agent);
    assert_eq!(messages[2].sender, SenderRole::User);
    assert_eq!(messages[3].sender, SenderRole::Agent);
}

#[tokio::test]
async fn faq_citation_tags_the_agent_message() {
    let h = TestHarness::new(
        BOTH,
        vec![Ok(RuntimeResponse {
            raw_text: serde_json::json!({
                "response_text": "We open daily at 8.",
                "related_faq_list": [{"id": "faq-1", "Q": "When are you open?", "A": "Daily 8-18."}],
                "handoff_result": {"hand_off": false, "reason": null}
            })
            .to_string(),
            usage_events: Vec::new(),
        })],
    );

    let result = h.turn("U1", "opening hours?").await;
    assert_eq!(result.related_faqs.len(), 1);
    assert_eq!(result.related_faqs[0].id, "faq-1");

    let messages = h.db.get_messages(&h.session_id("U1"), 0).unwrap();
    let agent_msg = &messages[1];
    assert_eq!(agent_msg.capabilities.len(), 1);
    assert_eq!(agent_msg.capabilities[0].display_name(), "faq");
}

#[tokio::test]
async fn stale_agent_reference_cannot_resurrect_an_old_snapshot() {
    let h = TestHarness::new(BOTH, vec![Ok(reply("first")), Ok(reply("second"))]);
    let session_id = h.session_id("U1");

    h.turn("U1", "hello").await;

    // Config save lands between the handler loading the agent and the
    // turn taking the session lock. h.agent still holds the old bundle.
    let mut raw = h.agent.raw_config.clone();
    raw.merchant_name = "Cafe Sol".to_string();
    let compiled = prompts::compile(&raw, &h.agent.capabilities);
    h.db.update_agent_config(&h.agent.id, &raw, &compiled)
        .unwrap();

    let result = h.turn("U1", "still there?").await;
    assert!(result.error.is_none());

    // The turn re-reads the agent under the lock, so the rebuilt snapshot
    // comes from the new bundle, not the stale reference.
    let snapshot = h
        .db
        .get_session(&session_id)
        .unwrap()
        .unwrap()
        .context_snapshot
        .expect("snapshot rebuilt");
    assert!(snapshot.contains("Cafe Sol"));
    assert!(!snapshot.contains("Cafe Luna"));
}

#[tokio::test]
async fn runtime_timeout_soft_fails_without_usage() {
    let h = TestHarness::with_timeout(
        BOTH,
        vec![Ok(reply("too late"))],
        Duration::from_millis(50),
    );
    h.mock.set_delay(Duration::from_millis(500));

    let result = h.turn("U1", "anyone there?").await;
    assert!(result.has_reply());
    assert_ne!(result.response, "too late");
    assert!(!result.handoff_triggered);
    assert!(result.error.as_deref().unwrap().contains("timeout"));
    assert_eq!(h.usage_count(), 0);

    // Inbound plus the apology are on the transcript.
    let messages = h.db.get_messages(&h.session_id("U1"), 0).unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[1].sender, SenderRole::Agent);
    assert_eq!(messages[1].content, result.response);
}

#[tokio::test]
async fn hard_failure_still_answers_with_an_apology() {
    let h = TestHarness::new(BOTH, vec![Ok(reply("unused"))]);

    // The agent disappears between the handler loading it and the turn
    // running. The turn hard-fails but the user still gets a reply.
    h.db.delete_agent(&h.agent.id).unwrap();

    let result = h.turn("U1", "hello?").await;
    assert!(result.has_reply());
    assert!(result.error.as_deref().unwrap().contains("not found"));
    assert_eq!(h.mock.get_trace().len(), 0);
}

#[tokio::test]
async fn history_is_replayed_to_the_runtime() {
    let h = TestHarness::new(BOTH, vec![Ok(reply("one")), Ok(reply("two"))]);

    h.turn("U1", "first").await;
    h.turn("U1", "second").await;

    let trace = h.mock.get_trace();
    assert_eq!(trace.len(), 2);
    assert!(trace[0].input_context.history.is_empty());
    // Second turn sees the first exchange, not its own inbound message.
    let history = &trace[1].input_context.history;
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].content, "first");
    assert_eq!(history[1].content, "one");
    assert_eq!(trace[1].input_context.user_message, "second");
}
