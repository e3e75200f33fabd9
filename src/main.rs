//! Clinic appointment chatbot service
//!
//! A dialogue orchestration engine that walks a user from free-text
//! symptoms to a booked appointment, with durable per-conversation state
//! in a TTL-expiring session store.

mod api;
mod db;
mod llm;
mod orchestrator;
mod retry;
mod session;

use api::{create_router, AppState};
use db::Database;
use llm::{ClassifierConfig, OpenAiClassifier};
use orchestrator::Orchestrator;
use session::Sessions;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "clinic_chat=info,tower_http=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    // Configuration
    let db_path = std::env::var("CLINIC_DB_PATH").unwrap_or_else(|_| {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
        format!("{home}/.clinic-chat/clinic.db")
    });

    let port: u16 = std::env::var("CLINIC_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8000);

    // Ensure database directory exists
    if let Some(parent) = PathBuf::from(&db_path).parent() {
        std::fs::create_dir_all(parent)?;
    }

    // Initialize database
    tracing::info!(path = %db_path, "Opening database");
    let db = Database::open(&db_path)?;

    if std::env::var("CLINIC_SEED_DEMO").map(|v| v == "1").unwrap_or(false) {
        db.seed_demo_data()?;
    }

    // Specialty classifier
    let classifier_config = ClassifierConfig::from_env();
    if !classifier_config.has_credentials() {
        tracing::warn!(
            "No classifier API key configured. Set OPENAI_API_KEY; \
             symptoms will fall back to the default speciality."
        );
    }
    let classifier = Arc::new(OpenAiClassifier::new(&classifier_config));

    // Session store: in-process by default, Redis when configured.
    // A failed Redis init falls back to the in-process map for the
    // lifetime of this process.
    let sessions = Sessions::from_env().await;

    let orchestrator = Orchestrator::new(sessions.clone(), classifier, db);
    let state = AppState::new(orchestrator, sessions);

    // Create router
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Clinic chat server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
