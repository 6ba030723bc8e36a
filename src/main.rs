use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use chrono::Utc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use booking_agent::config::AppConfig;
use booking_agent::db;
use booking_agent::handlers;
use booking_agent::services::ai::groq::GroqProvider;
use booking_agent::services::ai::ollama::OllamaProvider;
use booking_agent::services::ai::LlmProvider;
use booking_agent::services::delivery::webhook::WebhookTransport;
use booking_agent::services::worker;
use booking_agent::state::AppState;

const SWEEP_INTERVAL: Duration = Duration::from_secs(3600);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AppConfig::from_env();

    let conn = db::init_db(&config.database_url)?;

    let llm: Box<dyn LlmProvider> = match config.llm_provider.as_str() {
        "groq" => {
            anyhow::ensure!(!config.groq_api_key.is_empty(), "GROQ_API_KEY must be set when LLM_PROVIDER=groq");
            tracing::info!("using Groq LLM provider (model: {})", config.groq_model);
            Box::new(GroqProvider::new(config.groq_api_key.clone(), config.groq_model.clone()))
        }
        _ => {
            tracing::info!("using Ollama LLM provider (url: {})", config.ollama_url);
            Box::new(OllamaProvider::new(config.ollama_url.clone(), config.ollama_model.clone()))
        }
    };

    if config.webhook_url.is_empty() {
        tracing::warn!("WEBHOOK_URL is not set; deferred replies will be dead-lettered");
    }
    let transport = WebhookTransport::new(config.webhook_url.clone(), config.webhook_secret.clone())?;

    let (state, deferred_rx) = AppState::build(conn, config.clone(), llm, Box::new(transport))?;
    let state = Arc::new(state);

    tokio::spawn(worker::run(state.clone(), deferred_rx));

    let sweeper = state.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SWEEP_INTERVAL);
        loop {
            interval.tick().await;
            let purged = sweeper.sentiment.purge_cache() + sweeper.intent.purge_cache();
            tracing::debug!(purged, "classification cache swept");
            let removed = sweeper
                .db()
                .and_then(|conn| db::queries::expire_old_sessions(&conn, &Utc::now().naive_utc()));
            match removed {
                Ok(0) => {}
                Ok(n) => tracing::info!(removed = n, "expired sessions removed"),
                Err(e) => tracing::error!(error = %e, "session sweep failed"),
            }
        }
    });

    let app = Router::new()
        .route("/health", get(handlers::health::health))
        .route("/chat", post(handlers::chat::chat))
        .route(
            "/sessions/:session_id/owner",
            post(handlers::owner::owner_message),
        )
        .route(
            "/api/admin/dead-letters",
            get(handlers::admin::list_dead_letters),
        )
        .route(
            "/api/admin/dead-letters/:id/reprocessed",
            post(handlers::admin::mark_reprocessed),
        )
        .route(
            "/metrics/:company_id/usage",
            get(handlers::metrics::usage),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("starting server on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
