//! Tenant agent management endpoints
//!
//! Config and capability writes recompile the instruction bundle and run
//! the session-snapshot invalidation cascade in the same request. Every
//! mutation is owner-checked: the caller's admin_id must match the stored
//! owner before any state changes.

use actix_web::{web, HttpResponse, Responder};
use serde::Deserialize;

use crate::error::TurnError;
use crate::models::{AgentResponse, DeployConfig, RawAgentConfig, TenantAgent};
use crate::prompts;
use crate::AppState;

#[derive(Deserialize)]
struct CreateAgentRequest {
    admin_id: String,
    name: String,
    #[serde(default)]
    raw_config: RawAgentConfig,
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
struct ListQuery {
    admin_id: Option<String>,
}

#[derive(Deserialize)]
struct CallerQuery {
    admin_id: String,
}

#[derive(Deserialize)]
struct ConfigSaveRequest {
    admin_id: String,
    raw_config: RawAgentConfig,
}

#[derive(Deserialize)]
struct CapabilitiesRequest {
    admin_id: String,
    capabilities: Vec<String>,
}

#[derive(Deserialize)]
struct DeployRequest {
    admin_id: String,
    access_token: String,
    channel_secret: String,
    operator_notify_id: Option<String>,
}

/// Load the agent and reject the request unless the caller owns it. No
/// mutation happens past a mismatch.
fn load_owned_agent(
    state: &AppState,
    agent_id: &str,
    admin_id: &str,
) -> Result<TenantAgent, HttpResponse> {
    match state.db.get_agent(agent_id) {
        Ok(Some(agent)) if agent.admin_id == admin_id => Ok(agent),
        Ok(Some(_)) => {
            let err = TurnError::Unauthorized(format!("agent {} has a different owner", agent_id));
            log::warn!("Rejected write from {}: {}", admin_id, err);
            Err(HttpResponse::Unauthorized().json(serde_json::json!({
                "error": err.to_string()
            })))
        }
        Ok(None) => Err(HttpResponse::NotFound().json(serde_json::json!({
            "error": "Agent not found"
        }))),
        Err(e) => Err(HttpResponse::InternalServerError().json(serde_json::json!({
            "error": format!("Database error: {}", e)
        }))),
    }
}

async fn create_agent(
    state: web::Data<AppState>,
    body: web::Json<CreateAgentRequest>,
) -> impl Responder {
    let body = body.into_inner();
    let compiled = prompts::compile(&body.raw_config, &body.capabilities);

    match state.db.create_agent(
        &body.admin_id,
        &body.name,
        &body.raw_config,
        &compiled,
        &body.capabilities,
    ) {
        Ok(agent) => HttpResponse::Ok().json(AgentResponse::from(agent)),
        Err(e) => {
            log::error!("Failed to create agent: {}", e);
            HttpResponse::InternalServerError().json(serde_json::json!({
                "error": format!("Database error: {}", e)
            }))
        }
    }
}

async fn list_agents(state: web::Data<AppState>, query: web::Query<ListQuery>) -> impl Responder {
    let result = match &query.admin_id {
        Some(admin_id) => state.db.get_agents_by_admin(admin_id),
        None => state.db.list_agents(),
    };
    match result {
        Ok(agents) => {
            let responses: Vec<AgentResponse> =
                agents.into_iter().map(AgentResponse::from).collect();
            HttpResponse::Ok().json(responses)
        }
        Err(e) => {
            log::error!("Failed to list agents: {}", e);
            HttpResponse::InternalServerError().json(serde_json::json!({
                "error": format!("Database error: {}", e)
            }))
        }
    }
}

async fn get_agent(state: web::Data<AppState>, path: web::Path<String>) -> impl Responder {
    let agent_id = path.into_inner();
    match state.db.get_agent(&agent_id) {
        Ok(Some(agent)) => HttpResponse::Ok().json(AgentResponse::from(agent)),
        Ok(None) => HttpResponse::NotFound().json(serde_json::json!({
            "error": "Agent not found"
        })),
        Err(e) => {
            log::error!("Failed to get agent {}: {}", agent_id, e);
            HttpResponse::InternalServerError().json(serde_json::json!({
                "error": format!("Database error: {}", e)
            }))
        }
    }
}

/// Save a new raw config: recompile, persist, and invalidate every session
/// snapshot for this agent in one transaction so the next turn picks up
/// the new instructions.
async fn update_config(
    state: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<ConfigSaveRequest>,
) -> impl Responder {
    let agent_id = path.into_inner();
    let body = body.into_inner();

    let agent = match load_owned_agent(&state, &agent_id, &body.admin_id) {
        Ok(agent) => agent,
        Err(response) => return response,
    };

    let compiled = prompts::compile(&body.raw_config, &agent.capabilities);
    let invalidated = match state
        .db
        .update_agent_config(&agent_id, &body.raw_config, &compiled)
    {
        Ok(invalidated) => invalidated,
        Err(e) => {
            log::error!("Failed to update agent {}: {}", agent_id, e);
            return HttpResponse::InternalServerError().json(serde_json::json!({
                "error": format!("Database error: {}", e)
            }));
        }
    };
    log::info!(
        "Agent {} config saved, {} session snapshots invalidated",
        agent_id,
        invalidated
    );

    match state.db.get_agent(&agent_id) {
        Ok(Some(agent)) => HttpResponse::Ok().json(serde_json::json!({
            "agent": AgentResponse::from(agent),
            "invalidated_sessions": invalidated,
        })),
        _ => HttpResponse::InternalServerError().json(serde_json::json!({
            "error": "Agent disappeared during update"
        })),
    }
}

/// Toggle capability modules. Recompiles and invalidates like a config
/// save, since the capability set shapes the compiled bundle.
async fn update_capabilities(
    state: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<CapabilitiesRequest>,
) -> impl Responder {
    let agent_id = path.into_inner();
    let body = body.into_inner();

    let agent = match load_owned_agent(&state, &agent_id, &body.admin_id) {
        Ok(agent) => agent,
        Err(response) => return response,
    };

    let compiled = prompts::compile(&agent.raw_config, &body.capabilities);
    if let Err(e) = state
        .db
        .update_agent_capabilities(&agent_id, &body.capabilities, &compiled)
    {
        log::error!("Failed to update capabilities for {}: {}", agent_id, e);
        return HttpResponse::InternalServerError().json(serde_json::json!({
            "error": format!("Database error: {}", e)
        }));
    }

    match state.db.get_agent(&agent_id) {
        Ok(Some(agent)) => HttpResponse::Ok().json(AgentResponse::from(agent)),
        _ => HttpResponse::InternalServerError().json(serde_json::json!({
            "error": "Agent disappeared during update"
        })),
    }
}

async fn deploy_agent(
    state: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<DeployRequest>,
) -> impl Responder {
    let agent_id = path.into_inner();
    let body = body.into_inner();

    if body.access_token.is_empty() || body.channel_secret.is_empty() {
        return HttpResponse::BadRequest().json(serde_json::json!({
            "error": "access_token and channel_secret are required"
        }));
    }

    if let Err(response) = load_owned_agent(&state, &agent_id, &body.admin_id) {
        return response;
    }

    let deploy = DeployConfig {
        access_token: body.access_token,
        channel_secret: body.channel_secret,
        operator_notify_id: body.operator_notify_id,
    };

    match state.db.set_deploy_config(&agent_id, &deploy) {
        Ok(true) => HttpResponse::Ok().json(serde_json::json!({
            "deployed": true,
            "webhook_path": format!("/api/webhook/{}", agent_id),
        })),
        Ok(false) => HttpResponse::NotFound().json(serde_json::json!({
            "error": "Agent not found"
        })),
        Err(e) => {
            log::error!("Failed to deploy agent {}: {}", agent_id, e);
            HttpResponse::InternalServerError().json(serde_json::json!({
                "error": format!("Database error: {}", e)
            }))
        }
    }
}

async fn delete_agent(
    state: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<CallerQuery>,
) -> impl Responder {
    let agent_id = path.into_inner();

    if let Err(response) = load_owned_agent(&state, &agent_id, &query.admin_id) {
        return response;
    }

    match state.db.delete_agent(&agent_id) {
        Ok(true) => HttpResponse::Ok().json(serde_json::json!({ "deleted": true })),
        Ok(false) => HttpResponse::NotFound().json(serde_json::json!({
            "error": "Agent not found"
        })),
        Err(e) => {
            log::error!("Failed to delete agent {}: {}", agent_id, e);
            HttpResponse::InternalServerError().json(serde_json::json!({
                "error": format!("Database error: {}", e)
            }))
        }
    }
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/agents")
            .route("", web::post().to(create_agent))
            .route("", web::get().to(list_agents))
            .route("/{id}", web::get().to(get_agent))
            .route("/{id}", web::delete().to(delete_agent))
            .route("/{id}/config", web::put().to(update_config))
            .route("/{id}/capabilities", web::put().to(update_capabilities))
            .route("/{id}/deploy", web::post().to(deploy_agent)),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::http::StatusCode;
    use actix_web::{test, App};
    use std::sync::Arc;
    use std::time::Duration;

    use crate::ai::{MockRuntime, RuntimeClient};
    use crate::channels::line::MockGateway;
    use crate::channels::{MessagingGateway, TurnOrchestrator};
    use crate::db::Database;
    use crate::handoff::HandoffCoordinator;
    use crate::models::CompiledInstructions;
    use crate::pending::PendingConfigStore;

    fn test_state() -> web::Data<AppState> {
        let db = Arc::new(Database::new(":memory:").expect("in-memory db"));
        let gateway: Arc<dyn MessagingGateway> = Arc::new(MockGateway::new());
        let runtime = Arc::new(RuntimeClient::Mock(MockRuntime::new(Vec::new())));
        let handoff = Arc::new(HandoffCoordinator::new(db.clone(), gateway.clone()));
        let orchestrator = Arc::new(TurnOrchestrator::new(
            db.clone(),
            runtime.clone(),
            handoff.clone(),
            Duration::from_secs(5),
        ));
        let pending = Arc::new(PendingConfigStore::new(Duration::from_secs(60)));
        web::Data::new(AppState {
            db,
            runtime,
            gateway,
            orchestrator,
            handoff,
            pending,
        })
    }

    fn seed_agent(state: &AppState) -> TenantAgent {
        state
            .db
            .create_agent(
                "admin-owner",
                "Owned Bot",
                &RawAgentConfig::default(),
                &CompiledInstructions::default(),
                &[],
            )
            .expect("create agent")
    }

    #[actix_web::test]
    async fn config_update_rejects_non_owner_without_mutating() {
        let state = test_state();
        let agent = seed_agent(&state);
        let app = test::init_service(App::new().app_data(state.clone()).configure(config)).await;

        let req = test::TestRequest::put()
            .uri(&format!("/api/agents/{}/config", agent.id))
            .set_json(serde_json::json!({
                "admin_id": "intruder",
                "raw_config": {"merchant_name": "Hijacked"}
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let stored = state.db.get_agent(&agent.id).unwrap().unwrap();
        assert_eq!(stored.raw_config.merchant_name, "");
    }

    #[actix_web::test]
    async fn config_update_accepts_the_owner() {
        let state = test_state();
        let agent = seed_agent(&state);
        let app = test::init_service(App::new().app_data(state.clone()).configure(config)).await;

        let req = test::TestRequest::put()
            .uri(&format!("/api/agents/{}/config", agent.id))
            .set_json(serde_json::json!({
                "admin_id": "admin-owner",
                "raw_config": {"merchant_name": "Renamed"}
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let stored = state.db.get_agent(&agent.id).unwrap().unwrap();
        assert_eq!(stored.raw_config.merchant_name, "Renamed");
    }

    #[actix_web::test]
    async fn delete_and_deploy_reject_non_owner() {
        let state = test_state();
        let agent = seed_agent(&state);
        let app = test::init_service(App::new().app_data(state.clone()).configure(config)).await;

        let req = test::TestRequest::delete()
            .uri(&format!("/api/agents/{}?admin_id=intruder", agent.id))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert!(state.db.get_agent(&agent.id).unwrap().is_some());

        let req = test::TestRequest::post()
            .uri(&format!("/api/agents/{}/deploy", agent.id))
            .set_json(serde_json::json!({
                "admin_id": "intruder",
                "access_token": "tok",
                "channel_secret": "sec"
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert!(state.db.get_agent(&agent.id).unwrap().unwrap().deploy.is_none());
    }
}
