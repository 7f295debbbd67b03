//! Dashboard test chat
//!
//! Runs the same turn pipeline as the webhook, but on a `test_`-prefixed
//! session so tenant admins can try their agent without a deployed
//! channel. Handoff still flips the session's mode; delivery just happens
//! over HTTP instead of push.

use actix_web::{web, HttpResponse, Responder};
use serde::Deserialize;

use crate::channels::TurnRequest;
use crate::AppState;

#[derive(Deserialize)]
struct ChatRequest {
    agent_id: String,
    user_id: String,
    message: String,
}

async fn send_message(state: web::Data<AppState>, body: web::Json<ChatRequest>) -> impl Responder {
    let body = body.into_inner();
    if body.message.trim().is_empty() {
        return HttpResponse::BadRequest().json(serde_json::json!({
            "error": "message is empty"
        }));
    }

    let agent = match state.db.get_agent(&body.agent_id) {
        Ok(Some(agent)) => agent,
        Ok(None) => {
            return HttpResponse::NotFound().json(serde_json::json!({
                "error": "Agent not found"
            }))
        }
        Err(e) => {
            log::error!("Failed to load agent {}: {}", body.agent_id, e);
            return HttpResponse::InternalServerError().json(serde_json::json!({
                "error": format!("Database error: {}", e)
            }));
        }
    };

    let session_id = format!("test_{}_{}", agent.id, body.user_id);
    let request = TurnRequest {
        agent_id: agent.id.clone(),
        user_id: body.user_id,
        user_name: None,
        text: body.message,
        session_id: Some(session_id),
    };

    let result = state.orchestrator.handle_turn(&agent, request).await;
    HttpResponse::Ok().json(result)
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::scope("/api/chat").route("", web::post().to(send_message)));
}
