//! Sage - structured coaching engines over a hosted LLM
//!
//! Serves a catalog of prompt-driven engines: multi-turn sessions that end
//! in a structured evaluation, and single-shot generators.

mod api;
mod config;
mod engine;
mod extract;
mod gateway;
mod llm;
mod oneshot;
mod prompt;
mod session;
mod state_machine;
#[cfg(test)]
mod testing;

use api::{create_router, AppState};
use config::AppConfig;
use engine::Catalog;
use gateway::CompletionGateway;
use llm::{AnthropicService, LlmError, LoggingService};
use std::net::SocketAddr;
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
                .unwrap_or_else(|_| "sage_engines=info,tower_http=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    let config = AppConfig::from_env();

    let catalog = Catalog::load(config.prompts_dir.as_deref())?;
    tracing::info!(
        engines = catalog.len(),
        overrides = ?config.prompts_dir,
        "Engine catalog loaded"
    );

    if !config.has_credential() {
        tracing::warn!("No LLM API key configured. Set ANTHROPIC_API_KEY to enable the engines.");
    }
    let gateway = config
        .api_key
        .clone()
        .map(|api_key| build_gateway(api_key, &config))
        .transpose()?;

    let state = AppState::new(catalog, gateway);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Sage server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn build_gateway(api_key: String, config: &AppConfig) -> Result<CompletionGateway, LlmError> {
    let service = AnthropicService::new(api_key, &config.model, config.gateway.as_deref())?;
    let gateway = CompletionGateway::new(Arc::new(LoggingService::new(Arc::new(service))));
    tracing::info!(
        model = %gateway.model_id(),
        gateway = ?config.gateway,
        "Completion gateway ready"
    );
    Ok(gateway)
}
