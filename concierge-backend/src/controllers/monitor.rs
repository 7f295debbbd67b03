//! Monitor and usage read endpoints
//!
//! Cross-tenant reads are gated on the caller's is_monitor flag; usage for
//! a single agent is also open to the owning admin.

use actix_web::{web, HttpResponse, Responder};
use serde::Deserialize;

use crate::models::usage::estimate_cost;
use crate::models::AgentResponse;
use crate::AppState;

#[derive(Deserialize)]
struct CallerQuery {
    admin_id: String,
}

#[derive(Deserialize)]
struct StatsQuery {
    admin_id: String,
    /// Which admin's ledger to roll up. Defaults to the caller's own.
    target_admin_id: Option<String>,
    days: Option<i64>,
}

fn forbidden() -> HttpResponse {
    HttpResponse::Forbidden().json(serde_json::json!({
        "error": "Monitor access required"
    }))
}

async fn list_all_agents(
    state: web::Data<AppState>,
    query: web::Query<CallerQuery>,
) -> impl Responder {
    match state.db.is_monitor(&query.admin_id) {
        Ok(true) => {}
        Ok(false) => return forbidden(),
        Err(e) => {
            return HttpResponse::InternalServerError().json(serde_json::json!({
                "error": format!("Database error: {}", e)
            }))
        }
    }

    match state.db.list_agents() {
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

/// Usage summary per model plus derived cost. Cost is computed at read
/// time from the current rate table, never stored.
async fn agent_usage(
    state: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<CallerQuery>,
) -> impl Responder {
    let agent_id = path.into_inner();

    let is_monitor = state.db.is_monitor(&query.admin_id).unwrap_or(false);
    if !is_monitor {
        let owns = match state.db.get_agent(&agent_id) {
            Ok(Some(agent)) => agent.admin_id == query.admin_id,
            _ => false,
        };
        if !owns {
            return forbidden();
        }
    }

    let totals = match state.db.usage_totals_by_model(&agent_id) {
        Ok(totals) => totals,
        Err(e) => {
            log::error!("Failed to aggregate usage for {}: {}", agent_id, e);
            return HttpResponse::InternalServerError().json(serde_json::json!({
                "error": format!("Database error: {}", e)
            }));
        }
    };

    let mut total_cost = 0.0;
    let models: Vec<serde_json::Value> = totals
        .into_iter()
        .map(|(model, usage)| {
            let cost = estimate_cost(&model, &usage);
            total_cost += cost;
            serde_json::json!({
                "model": model,
                "usage": usage,
                "cost_usd": cost,
            })
        })
        .collect();

    HttpResponse::Ok().json(serde_json::json!({
        "agent_id": agent_id,
        "models": models,
        "total_cost_usd": total_cost,
    }))
}

async fn agent_usage_records(
    state: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<CallerQuery>,
) -> impl Responder {
    let agent_id = path.into_inner();

    let is_monitor = state.db.is_monitor(&query.admin_id).unwrap_or(false);
    if !is_monitor {
        let owns = match state.db.get_agent(&agent_id) {
            Ok(Some(agent)) => agent.admin_id == query.admin_id,
            _ => false,
        };
        if !owns {
            return forbidden();
        }
    }

    match state.db.get_usage_for_agent(&agent_id) {
        Ok(records) => HttpResponse::Ok().json(records),
        Err(e) => {
            log::error!("Failed to load usage records for {}: {}", agent_id, e);
            HttpResponse::InternalServerError().json(serde_json::json!({
                "error": format!("Database error: {}", e)
            }))
        }
    }
}

/// Daily rollup over an admin's whole ledger, with per-day derived cost.
/// Reading another admin's rollup requires monitor access.
async fn daily_stats(state: web::Data<AppState>, query: web::Query<StatsQuery>) -> impl Responder {
    let target = query
        .target_admin_id
        .clone()
        .unwrap_or_else(|| query.admin_id.clone());
    if target != query.admin_id && !state.db.is_monitor(&query.admin_id).unwrap_or(false) {
        return forbidden();
    }

    let days = query.days.unwrap_or(30).clamp(1, 365);
    let rows = match state.db.usage_daily_totals(&target, days) {
        Ok(rows) => rows,
        Err(e) => {
            log::error!("Failed to roll up usage for {}: {}", target, e);
            return HttpResponse::InternalServerError().json(serde_json::json!({
                "error": format!("Database error: {}", e)
            }));
        }
    };

    let days_json: Vec<serde_json::Value> = rows
        .into_iter()
        .map(|(day, model, usage)| {
            let cost = estimate_cost(&model, &usage);
            serde_json::json!({
                "day": day,
                "model": model,
                "usage": usage,
                "cost_usd": cost,
            })
        })
        .collect();

    HttpResponse::Ok().json(serde_json::json!({
        "admin_id": target,
        "days": days_json,
    }))
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/monitor")
            .route("/agents", web::get().to(list_all_agents))
            .route("/stats", web::get().to(daily_stats))
            .route("/usage/{agent_id}", web::get().to(agent_usage))
            .route(
                "/usage/{agent_id}/records",
                web::get().to(agent_usage_records),
            ),
    );
}
