use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use dotenv::dotenv;
use std::sync::Arc;
use std::time::Duration;

mod ai;
mod channels;
mod config;
mod controllers;
mod db;
mod error;
mod handoff;
mod models;
mod pending;
mod prompts;

use ai::{GeminiClient, RuntimeClient};
use channels::{LineGateway, MessagingGateway, TurnOrchestrator};
use db::Database;
use handoff::HandoffCoordinator;
use pending::PendingConfigStore;

pub struct AppState {
    pub db: Arc<Database>,
    pub runtime: Arc<RuntimeClient>,
    pub gateway: Arc<dyn MessagingGateway>,
    pub orchestrator: Arc<TurnOrchestrator>,
    pub handoff: Arc<HandoffCoordinator>,
    pub pending: Arc<PendingConfigStore>,
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv().ok();
    env_logger::init();

    let database_url = config::database_url();
    let db = Arc::new(Database::new(&database_url).expect("Failed to initialize database"));
    log::info!("Database ready at {}", database_url);

    let gemini = GeminiClient::new(
        &config::google_api_key(),
        &config::agent_model(),
        &config::general_model(),
    )
    .expect("Failed to create Gemini client");
    let runtime = Arc::new(RuntimeClient::Gemini(gemini));

    let gateway: Arc<dyn MessagingGateway> =
        Arc::new(LineGateway::new().expect("Failed to create LINE gateway"));

    let handoff = Arc::new(HandoffCoordinator::new(db.clone(), gateway.clone()));
    let orchestrator = Arc::new(TurnOrchestrator::new(
        db.clone(),
        runtime.clone(),
        handoff.clone(),
        Duration::from_secs(config::runtime_timeout_secs()),
    ));
    let pending = Arc::new(PendingConfigStore::new(Duration::from_secs(
        config::pending_ttl_secs(),
    )));

    let state = web::Data::new(AppState {
        db,
        runtime,
        gateway,
        orchestrator,
        handoff,
        pending,
    });

    let port = config::port();
    log::info!("Starting server on port {}", port);

    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .wrap(Logger::default())
            .wrap(cors)
            .app_data(state.clone())
            .configure(controllers::health::config)
            .configure(controllers::auth::config)
            .configure(controllers::agents::config)
            .configure(controllers::setup::config)
            .configure(controllers::chat::config)
            .configure(controllers::webhook::config)
            .configure(controllers::inbox::config)
            .configure(controllers::monitor::config)
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await
}
