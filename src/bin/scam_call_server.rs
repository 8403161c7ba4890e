//! Scam call simulation server
//!
//! ## Usage
//!
//! ```bash
//! # Heuristic agents only
//! LLM_PROVIDER=none cargo run --bin scam_call_server
//!
//! # With a provider and the static frontend
//! GOOGLE_API_KEY=... STATIC_DIR=frontend cargo run --bin scam_call_server
//!
//! curl -X POST http://127.0.0.1:8000/api/simulation/step \
//!   -H "Content-Type: application/json" \
//!   -d '{"scammer_input": "Bonjour, support Microsoft"}'
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use scam_call_sim::api::create_simulation_router;
use scam_call_sim::config::Settings;
use scam_call_sim::engine::TurnEngine;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "scam_call_sim=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = Settings::from_env();
    tracing::info!(
        "Starting scam call simulation (provider: {}, model: {})",
        settings.llm_provider_name(),
        settings.llm.model
    );

    let addr: SocketAddr = format!("{}:{}", settings.app_host, settings.app_port).parse()?;
    let engine = Arc::new(TurnEngine::from_settings(settings));

    let mut app = create_simulation_router(engine);
    if let Ok(static_dir) = std::env::var("STATIC_DIR") {
        tracing::info!("Serving frontend from {}", static_dir);
        app = app.fallback_service(ServeDir::new(static_dir).append_index_html_on_directories(true));
    }

    let app = app
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Server listening on http://{}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}
