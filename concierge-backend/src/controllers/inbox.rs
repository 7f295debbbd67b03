//! Operator inbox endpoints
//!
//! Conversation listing, transcript reads, manual mode switches, session
//! close, and operator replies sent into the channel. Session writes are
//! owner-checked against the agent's admin before any state changes.

use actix_web::{web, HttpResponse, Responder};
use serde::Deserialize;

use crate::error::TurnError;
use crate::models::{SenderRole, Session, SessionMode, SessionStatus};
use crate::AppState;

#[derive(Deserialize)]
struct ModeRequest {
    admin_id: String,
    mode: String,
}

#[derive(Deserialize)]
struct CloseRequest {
    admin_id: String,
}

#[derive(Deserialize)]
struct SendRequest {
    admin_id: String,
    text: String,
}

/// Reject unless the caller owns the agent behind this conversation.
fn owner_gate(state: &AppState, agent_id: &str, admin_id: &str) -> Option<HttpResponse> {
    match state.db.get_agent(agent_id) {
        Ok(Some(agent)) if agent.admin_id == admin_id => None,
        Ok(Some(_)) => {
            let err = TurnError::Unauthorized(format!("agent {} has a different owner", agent_id));
            log::warn!("Rejected inbox write from {}: {}", admin_id, err);
            Some(HttpResponse::Unauthorized().json(serde_json::json!({
                "error": err.to_string()
            })))
        }
        Ok(None) => Some(HttpResponse::NotFound().json(serde_json::json!({
            "error": "Agent not found"
        }))),
        Err(e) => Some(HttpResponse::InternalServerError().json(serde_json::json!({
            "error": format!("Database error: {}", e)
        }))),
    }
}

#[derive(Deserialize)]
struct MessagesQuery {
    limit: Option<usize>,
}

#[derive(Deserialize)]
struct ListQuery {
    /// "open" = conversations waiting on a human, "done" = closed ones.
    tab: Option<String>,
}

async fn list_sessions(
    state: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<ListQuery>,
) -> impl Responder {
    let agent_id = path.into_inner();
    match state.db.list_sessions_for_agent(&agent_id) {
        Ok(summaries) => {
            let filtered: Vec<_> = match query.tab.as_deref() {
                Some("open") => summaries
                    .into_iter()
                    .filter(|s| s.mode == SessionMode::Human && s.status == SessionStatus::Open)
                    .collect(),
                Some("done") => summaries
                    .into_iter()
                    .filter(|s| s.status == SessionStatus::Done)
                    .collect(),
                _ => summaries,
            };
            HttpResponse::Ok().json(filtered)
        }
        Err(e) => {
            log::error!("Failed to list sessions for {}: {}", agent_id, e);
            HttpResponse::InternalServerError().json(serde_json::json!({
                "error": format!("Database error: {}", e)
            }))
        }
    }
}

async fn get_user(state: web::Data<AppState>, path: web::Path<String>) -> impl Responder {
    let user_id = path.into_inner();
    match state.db.get_end_user(&user_id) {
        Ok(Some(user)) => HttpResponse::Ok().json(user),
        Ok(None) => HttpResponse::NotFound().json(serde_json::json!({
            "error": "User not found"
        })),
        Err(e) => {
            log::error!("Failed to load user {}: {}", user_id, e);
            HttpResponse::InternalServerError().json(serde_json::json!({
                "error": format!("Database error: {}", e)
            }))
        }
    }
}

async fn get_messages(
    state: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<MessagesQuery>,
) -> impl Responder {
    let session_id = path.into_inner();
    match state.db.get_messages(&session_id, query.limit.unwrap_or(0)) {
        Ok(messages) => HttpResponse::Ok().json(messages),
        Err(e) => {
            log::error!("Failed to load transcript for {}: {}", session_id, e);
            HttpResponse::InternalServerError().json(serde_json::json!({
                "error": format!("Database error: {}", e)
            }))
        }
    }
}

/// Manual mode switch. Works even before the session row exists, so an
/// operator can claim a conversation ahead of the first turn.
async fn set_mode(
    state: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<ModeRequest>,
) -> impl Responder {
    let session_id = path.into_inner();
    let mode = match SessionMode::from_str(&body.mode) {
        Some(mode) => mode,
        None => {
            return HttpResponse::BadRequest().json(serde_json::json!({
                "error": format!("Unknown mode: {}", body.mode)
            }))
        }
    };

    // Creating on write needs the (agent, user) pair; take it from the
    // existing row or from the deterministic id.
    let (agent_id, user_id) = match state.db.get_session(&session_id) {
        Ok(Some(session)) => (session.agent_id, session.user_id),
        Ok(None) => match Session::parse_channel_session_id(&session_id) {
            Some(pair) => pair,
            None => {
                return HttpResponse::NotFound().json(serde_json::json!({
                    "error": "Session not found"
                }))
            }
        },
        Err(e) => {
            return HttpResponse::InternalServerError().json(serde_json::json!({
                "error": format!("Database error: {}", e)
            }))
        }
    };

    if let Some(response) = owner_gate(&state, &agent_id, &body.admin_id) {
        return response;
    }

    match state
        .handoff
        .manual_switch(&session_id, &agent_id, &user_id, mode)
    {
        Ok(session) => HttpResponse::Ok().json(session),
        Err(e) => {
            log::error!("Mode switch failed for {}: {}", session_id, e);
            HttpResponse::InternalServerError().json(serde_json::json!({
                "error": format!("Database error: {}", e)
            }))
        }
    }
}

async fn close_session(
    state: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<CloseRequest>,
) -> impl Responder {
    let session_id = path.into_inner();

    let session = match state.db.get_session(&session_id) {
        Ok(Some(session)) => session,
        Ok(None) => {
            return HttpResponse::NotFound().json(serde_json::json!({
                "error": "Session not found"
            }))
        }
        Err(e) => {
            return HttpResponse::InternalServerError().json(serde_json::json!({
                "error": format!("Database error: {}", e)
            }))
        }
    };
    if let Some(response) = owner_gate(&state, &session.agent_id, &body.admin_id) {
        return response;
    }

    match state.handoff.close(&session_id) {
        Ok(true) => HttpResponse::Ok().json(serde_json::json!({ "closed": true })),
        Ok(false) => HttpResponse::NotFound().json(serde_json::json!({
            "error": "Session not found"
        })),
        Err(e) => {
            log::error!("Close failed for {}: {}", session_id, e);
            HttpResponse::InternalServerError().json(serde_json::json!({
                "error": format!("Database error: {}", e)
            }))
        }
    }
}

/// Operator reply: append to the transcript and push into the channel.
async fn send_message(
    state: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<SendRequest>,
) -> impl Responder {
    let session_id = path.into_inner();
    if body.text.trim().is_empty() {
        return HttpResponse::BadRequest().json(serde_json::json!({
            "error": "text is empty"
        }));
    }

    let session = match state.db.get_session(&session_id) {
        Ok(Some(session)) => session,
        Ok(None) => {
            return HttpResponse::NotFound().json(serde_json::json!({
                "error": "Session not found"
            }))
        }
        Err(e) => {
            return HttpResponse::InternalServerError().json(serde_json::json!({
                "error": format!("Database error: {}", e)
            }))
        }
    };

    if let Some(response) = owner_gate(&state, &session.agent_id, &body.admin_id) {
        return response;
    }

    let message = match state
        .db
        .append_message(&session_id, SenderRole::HumanOperator, &body.text, &[])
    {
        Ok(message) => message,
        Err(e) => {
            log::error!("Failed to persist operator message: {}", e);
            return HttpResponse::InternalServerError().json(serde_json::json!({
                "error": format!("Database error: {}", e)
            }));
        }
    };

    // Delivery only applies to channel-bound sessions with a deployed agent.
    let mut delivered = false;
    if session.is_channel_bound() {
        match state.db.get_agent(&session.agent_id) {
            Ok(Some(agent)) => {
                if let Some(deploy) = &agent.deploy {
                    match state
                        .gateway
                        .push_text(&deploy.access_token, &session.user_id, &body.text)
                        .await
                    {
                        Ok(()) => delivered = true,
                        Err(e) => log::error!("Operator push failed for {}: {}", session_id, e),
                    }
                }
            }
            Ok(None) => log::warn!("Session {} references missing agent", session_id),
            Err(e) => log::error!("Failed to load agent for {}: {}", session_id, e),
        }
    }

    HttpResponse::Ok().json(serde_json::json!({
        "message": message,
        "delivered": delivered,
    }))
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/inbox")
            .route("/{agent_id}", web::get().to(list_sessions))
            .route("/user/{user_id}", web::get().to(get_user))
            .route("/session/{session_id}/messages", web::get().to(get_messages))
            .route("/session/{session_id}/mode", web::post().to(set_mode))
            .route("/session/{session_id}/close", web::post().to(close_session))
            .route("/session/{session_id}/send", web::post().to(send_message)),
    );
}
