use actix_web::{web, HttpResponse, Responder};
use serde::Deserialize;

use crate::AppState;

#[derive(Deserialize)]
struct LoginRequest {
    line_id: String,
    name: String,
}

/// Dashboard login: upsert the admin identity and bump login_at.
async fn login(state: web::Data<AppState>, body: web::Json<LoginRequest>) -> impl Responder {
    if body.line_id.is_empty() {
        return HttpResponse::BadRequest().json(serde_json::json!({
            "error": "line_id is required"
        }));
    }

    match state.db.upsert_admin(&body.line_id, &body.name) {
        Ok(admin) => HttpResponse::Ok().json(admin),
        Err(e) => {
            log::error!("Admin login failed: {}", e);
            HttpResponse::InternalServerError().json(serde_json::json!({
                "error": format!("Database error: {}", e)
            }))
        }
    }
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::scope("/api/auth").route("/login", web::post().to(login)));
}
