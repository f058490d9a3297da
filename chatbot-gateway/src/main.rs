use anyhow::{Context, Result};
use axum::{Router, extract::DefaultBodyLimit};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

mod api;
mod core;
mod middleware;
mod models;
mod utils;

use crate::api::AppServices;
use crate::core::{
    auth::AuthManager,
    cache::{CacheConfig, ResponseCache},
    completion::{OpenRouterClient, ProviderConfig},
    config::Settings,
    context::ContextWindowBuilder,
    gateway::Gateway,
    rate_limiter::{RateLimitConfig, TrafficShaper},
    storage::{InMemoryProjectDirectory, InMemoryTranscriptStore},
};
use crate::middleware::{error_handler, request_id};
use crate::models::error::ErrorPolicy;

/// Inline image data references can be large.
const BODY_LIMIT_BYTES: usize = 10 * 1024 * 1024;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    let settings = Settings::new().context("Failed to load configuration")?;
    init_tracing(settings.logging.json);

    // `chatbot-gateway --issue-token <user>` prints a bearer token and exits
    let args: Vec<String> = std::env::args().collect();
    if let Some(pos) = args.iter().position(|a| a == "--issue-token") {
        let user = args
            .get(pos + 1)
            .context("--issue-token requires a user id")?;
        let auth = AuthManager::new(settings.auth.secret_key.clone());
        let token = auth.generate_token(user, settings.auth.token_expiry_hours)?;
        println!("{token}");
        return Ok(());
    }

    if settings.server.production && settings.auth.secret_key == "change-me-in-production" {
        error!("auth.secret_key is still the default; set CHAT_GATEWAY__AUTH__SECRET_KEY");
    }

    info!(
        "Starting chatbot gateway on {}:{}",
        settings.server.host, settings.server.port
    );

    let app = create_app(&settings);

    let addr: SocketAddr = format!("{}:{}", settings.server.host, settings.server.port)
        .parse()
        .context("Invalid server.host / server.port")?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!("Server running on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

fn create_app(settings: &Settings) -> Router {
    let transcripts = Arc::new(InMemoryTranscriptStore::new());
    let projects = Arc::new(InMemoryProjectDirectory::new());
    let shaper = Arc::new(TrafficShaper::new(RateLimitConfig::from(&settings.rate_limit)));
    let cache = ResponseCache::new(CacheConfig::from(&settings.cache));
    let provider = Arc::new(OpenRouterClient::new(ProviderConfig::from(
        &settings.provider,
    )));

    if settings.provider.api_key.is_empty() {
        warn!("provider.api_key is empty; completion requests will be rejected upstream");
    }

    let window = ContextWindowBuilder::new(
        settings.history.context_turns,
        settings.history.default_system_prompt.clone(),
    );

    let gateway = Gateway::new(
        transcripts,
        projects.clone(),
        shaper.clone(),
        provider,
        window,
        settings.history.fetch_limit,
    );

    let services = AppServices {
        gateway,
        projects,
        cache,
        shaper,
        auth: Arc::new(AuthManager::new(settings.auth.secret_key.clone())),
        errors: ErrorPolicy::new(settings.server.production),
    };

    api::router(services)
        .layer(DefaultBodyLimit::max(BODY_LIMIT_BYTES))
        .layer(axum::middleware::from_fn(error_handler::log_responses))
        .layer(axum::middleware::from_fn(request_id::add_request_id))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            },
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}
