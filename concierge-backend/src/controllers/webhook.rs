//! Channel webhook endpoint
//!
//! One path per deployed agent. The raw body is needed for signature
//! verification, so the handler takes `web::Bytes` and parses JSON itself.
//! Per-event turn failures are logged but the webhook still answers 200;
//! a non-2xx makes the platform redeliver the whole batch.

use actix_web::{web, HttpRequest, HttpResponse, Responder};

use crate::channels::line::{postback_param, LineWebhookPayload};
use crate::channels::TurnRequest;
use crate::error::TurnError;
use crate::models::{Session, SessionMode, TenantAgent};
use crate::AppState;

const SIGNATURE_HEADER: &str = "x-line-signature";

fn error_response(err: TurnError) -> HttpResponse {
    let body = serde_json::json!({ "error": err.to_string() });
    match err {
        TurnError::ConfigNotFound(_) => HttpResponse::NotFound().json(body),
        TurnError::Unauthorized(_) => HttpResponse::Unauthorized().json(body),
        _ => HttpResponse::InternalServerError().json(body),
    }
}

async fn receive(
    state: web::Data<AppState>,
    path: web::Path<String>,
    req: HttpRequest,
    body: web::Bytes,
) -> impl Responder {
    let agent_id = path.into_inner();

    let agent: TenantAgent = match state.db.get_agent(&agent_id) {
        Ok(Some(agent)) if agent.deploy.is_some() => agent,
        Ok(_) => return error_response(TurnError::ConfigNotFound(agent_id)),
        Err(e) => {
            log::error!("Failed to load agent {}: {}", agent_id, e);
            return error_response(TurnError::Storage(e));
        }
    };
    let deploy = agent.deploy.clone().unwrap();

    let signature = req
        .headers()
        .get(SIGNATURE_HEADER)
        .and_then(|h| h.to_str().ok())
        .unwrap_or("");
    if !state
        .gateway
        .verify_signature(&deploy.channel_secret, &body, signature)
    {
        log::warn!("Rejected webhook for agent {}: bad signature", agent_id);
        return error_response(TurnError::Unauthorized("invalid signature".to_string()));
    }

    let payload: LineWebhookPayload = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(e) => {
            return HttpResponse::BadRequest().json(serde_json::json!({
                "error": format!("Malformed payload: {}", e)
            }))
        }
    };

    let mut processed = 0usize;
    for event in payload.events {
        // Rich-menu postback: the user flips their own conversation mode.
        if event.event_type == "postback" {
            let data = event.postback.as_ref().map(|p| p.data.as_str());
            let user_id = event.source.as_ref().and_then(|s| s.user_id.clone());
            if let (Some(data), Some(user_id)) = (data, user_id) {
                if postback_param(data, "action") == Some("change_mode") {
                    let mode = match postback_param(data, "mode").and_then(SessionMode::from_str) {
                        Some(mode) => mode,
                        None => continue,
                    };
                    let session_id = Session::channel_session_id(&agent.id, &user_id);
                    match state
                        .handoff
                        .manual_switch(&session_id, &agent.id, &user_id, mode)
                    {
                        Ok(_) => processed += 1,
                        Err(e) => {
                            log::error!("Postback mode switch failed for {}: {}", session_id, e)
                        }
                    }
                }
            }
            continue;
        }
        if event.event_type != "message" {
            continue;
        }
        let text = match event
            .message
            .as_ref()
            .filter(|m| m.message_type == "text")
            .and_then(|m| m.text.clone())
        {
            Some(text) => text,
            None => continue,
        };
        let user_id = match event.source.as_ref().and_then(|s| s.user_id.clone()) {
            Some(user_id) => user_id,
            None => continue,
        };

        // Cosmetic; a failure here never blocks the turn.
        if let Err(e) = state
            .gateway
            .show_loading(&deploy.access_token, &user_id)
            .await
        {
            log::debug!("Loading indicator failed for {}: {}", user_id, e);
        }

        let user_name = state
            .gateway
            .profile_name(&deploy.access_token, &user_id)
            .await;

        let request = TurnRequest {
            agent_id: agent.id.clone(),
            user_id: user_id.clone(),
            user_name: user_name.clone(),
            text: text.clone(),
            session_id: None,
        };
        let result = state.orchestrator.handle_turn(&agent, request).await;

        if let Some(error) = &result.error {
            log::error!("Turn failed for session {}: {}", result.session_id, error);
        }

        // Human mode: no automated reply, but the operator needs to see
        // what the user just said.
        if !result.has_reply() && result.error.is_none() {
            if let Some(operator) = &deploy.operator_notify_id {
                let display = user_name.unwrap_or_else(|| user_id.clone());
                let forward = format!("{}: {}", display, text);
                if let Err(e) = state
                    .gateway
                    .push_text(&deploy.access_token, operator, &forward)
                    .await
                {
                    let err = TurnError::Delivery(e);
                    log::error!("Session {}: {}", result.session_id, err);
                }
            }
        }

        if result.has_reply() {
            let delivery = match &event.reply_token {
                Some(token) => {
                    state
                        .gateway
                        .reply_text(&deploy.access_token, token, &result.response)
                        .await
                }
                None => {
                    state
                        .gateway
                        .push_text(&deploy.access_token, &user_id, &result.response)
                        .await
                }
            };
            if let Err(e) = delivery {
                let err = TurnError::Delivery(e);
                log::error!("Session {}: {}", result.session_id, err);
            }
        }
        processed += 1;
    }

    HttpResponse::Ok().json(serde_json::json!({ "processed": processed }))
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/api/webhook/{agent_id}").route(web::post().to(receive)));
}
