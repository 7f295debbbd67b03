//! Onboarding endpoints
//!
//! Free-form business description in, structured config draft out. Drafts
//! sit in the TTL store until the admin confirms; confirm compiles and
//! creates the agent in one step.

use actix_web::{web, HttpResponse, Responder};
use serde::Deserialize;

use crate::ai::recovery;
use crate::models::{AgentResponse, FaqItem, RawAgentConfig, UsageKind};
use crate::prompts;
use crate::AppState;

#[derive(Deserialize)]
struct ExtractRequest {
    admin_id: String,
    description: String,
}

#[derive(Deserialize)]
struct ConfirmRequest {
    admin_id: String,
    name: String,
    #[serde(default = "default_capabilities")]
    capabilities: Vec<String>,
}

fn default_capabilities() -> Vec<String> {
    vec![
        prompts::CAP_FAQ.to_string(),
        prompts::CAP_HANDOFF.to_string(),
    ]
}

#[derive(Deserialize)]
struct FaqDraftRequest {
    agent_id: String,
    document: String,
}

/// Extract a config draft from the admin's description and park it in the
/// pending store.
async fn extract(state: web::Data<AppState>, body: web::Json<ExtractRequest>) -> impl Responder {
    let body = body.into_inner();
    if body.description.trim().is_empty() {
        return HttpResponse::BadRequest().json(serde_json::json!({
            "error": "description is empty"
        }));
    }

    let response = match state
        .runtime
        .generate(prompts::EXTRACTION_PROMPT, &body.description)
        .await
    {
        Ok(response) => response,
        Err(e) => {
            log::error!("Extraction failed for admin {}: {}", body.admin_id, e);
            return HttpResponse::BadGateway().json(serde_json::json!({
                "error": format!("Extraction failed: {}", e)
            }));
        }
    };

    // Onboarding happens before an agent exists; the ledger rows carry
    // only the admin id.
    for event in &response.usage_events {
        if let Err(e) = state.db.record_usage(
            &body.admin_id,
            None,
            None,
            None,
            UsageKind::FormParsing,
            &event.model,
            &event.usage,
        ) {
            log::error!("Usage record failed for extraction: {}", e);
        }
    }

    let draft: RawAgentConfig = match recovery::recover_value(&response.raw_text)
        .and_then(|value| serde_json::from_value(value).ok())
    {
        Some(draft) => draft,
        None => {
            log::warn!("Extraction output was not a config object");
            return HttpResponse::UnprocessableEntity().json(serde_json::json!({
                "error": "Could not extract a config from that description, please rephrase"
            }));
        }
    };

    state.pending.put(&body.admin_id, draft.clone());
    HttpResponse::Ok().json(draft)
}

async fn get_pending(state: web::Data<AppState>, path: web::Path<String>) -> impl Responder {
    let admin_id = path.into_inner();
    match state.pending.peek(&admin_id) {
        Some(draft) => HttpResponse::Ok().json(draft),
        None => HttpResponse::NotFound().json(serde_json::json!({
            "error": "No pending draft (it may have expired)"
        })),
    }
}

/// Confirm the pending draft: compile it and create the agent.
async fn confirm(state: web::Data<AppState>, body: web::Json<ConfirmRequest>) -> impl Responder {
    let body = body.into_inner();

    let draft = match state.pending.take(&body.admin_id) {
        Some(draft) => draft,
        None => {
            return HttpResponse::NotFound().json(serde_json::json!({
                "error": "No pending draft (it may have expired), run extraction again"
            }))
        }
    };

    let compiled = prompts::compile(&draft, &body.capabilities);
    match state.db.create_agent(
        &body.admin_id,
        &body.name,
        &draft,
        &compiled,
        &body.capabilities,
    ) {
        Ok(agent) => HttpResponse::Ok().json(AgentResponse::from(agent)),
        Err(e) => {
            log::error!("Failed to create agent from draft: {}", e);
            HttpResponse::InternalServerError().json(serde_json::json!({
                "error": format!("Database error: {}", e)
            }))
        }
    }
}

/// Draft FAQ entries from a merchant document. Returned, not saved; the
/// dashboard merges accepted entries into the config and PUTs it.
async fn draft_faqs(
    state: web::Data<AppState>,
    body: web::Json<FaqDraftRequest>,
) -> impl Responder {
    let body = body.into_inner();
    if body.document.trim().is_empty() {
        return HttpResponse::BadRequest().json(serde_json::json!({
            "error": "document is empty"
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
            return HttpResponse::InternalServerError().json(serde_json::json!({
                "error": format!("Database error: {}", e)
            }))
        }
    };

    let response = match state
        .runtime
        .generate(prompts::FAQ_GENERATION_PROMPT, &body.document)
        .await
    {
        Ok(response) => response,
        Err(e) => {
            log::error!("FAQ drafting failed for agent {}: {}", body.agent_id, e);
            return HttpResponse::BadGateway().json(serde_json::json!({
                "error": format!("FAQ drafting failed: {}", e)
            }));
        }
    };

    for event in &response.usage_events {
        if let Err(e) = state.db.record_usage(
            &agent.admin_id,
            Some(&agent.id),
            None,
            None,
            UsageKind::FaqGeneration,
            &event.model,
            &event.usage,
        ) {
            log::error!("Usage record failed for FAQ drafting: {}", e);
        }
    }

    let faqs: Vec<FaqItem> = match recovery::recover_value(&response.raw_text)
        .and_then(|value| serde_json::from_value(value).ok())
    {
        Some(faqs) => faqs,
        None => {
            return HttpResponse::UnprocessableEntity().json(serde_json::json!({
                "error": "Could not draft FAQs from that document"
            }))
        }
    };

    HttpResponse::Ok().json(faqs)
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/setup")
            .route("/extract", web::post().to(extract))
            .route("/pending/{admin_id}", web::get().to(get_pending))
            .route("/confirm", web::post().to(confirm))
            .route("/faqs", web::post().to(draft_faqs)),
    );
}
