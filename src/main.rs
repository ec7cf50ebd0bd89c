use axum::http::HeaderValue;
use axum::{routing::get, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api;
mod chains;
mod config;
mod constants;
mod db;
mod error;
mod indexer;
mod models;
mod services;
#[cfg(test)]
mod testing;

use chains::ChainRegistry;
use config::Config;
use constants::API_VERSION;
use db::Database;
use indexer::ExplorerClient;
use services::{DepositReconciler, ReconcilerOptions};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "deposit_reconciler=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;
    config.validate()?;

    tracing::info!("Starting deposit reconciler");
    tracing::info!("Environment: {}", config.environment);
    tracing::info!("API Version: {}", API_VERSION);

    let registry = Arc::new(ChainRegistry::from_config(&config)?);
    if registry.is_empty() {
        anyhow::bail!("No chains configured");
    }
    tracing::info!(
        "Reconciling chains: {:?}",
        registry.chain_ids().collect::<Vec<_>>()
    );

    // Initialize database
    let db = Database::new(&config).await?;

    tracing::info!("Running database migrations...");
    db.run_migrations().await?;

    let explorer = ExplorerClient::new(
        registry.clone(),
        Duration::from_secs(config.explorer_timeout_secs),
        config.explorer_page_size,
    )?;
    let store = Arc::new(db.clone());
    let reconciler = Arc::new(DepositReconciler::new(
        registry,
        Arc::new(explorer),
        store.clone(),
        store,
        ReconcilerOptions::from_config(&config),
    ));

    if !config.watermark_resets.is_empty() {
        reconciler.reset_watermarks(&config.watermark_resets).await?;
    }

    let app_state = api::AppState {
        db,
        reconciler: reconciler.clone(),
        config: config.clone(),
    };

    let app = build_router(app_state);

    // Start background services
    tokio::spawn(services::start_background_services(
        reconciler,
        config.clone(),
    ));

    // Start server
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;

    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn build_router(state: api::AppState) -> Router {
    let cors = cors_from_config(&state.config);

    Router::new()
        .route("/health", get(api::health::health_check))
        // Deposit reconciliation
        .route(
            "/api/v1/deposits/check",
            get(api::deposits::check_deposits).post(api::deposits::check_deposits),
        )
        .route(
            "/api/v1/deposits/watermarks",
            get(api::deposits::get_watermarks),
        )
        .route("/api/v1/chains", get(api::chains::list_chains))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

fn cors_from_config(config: &Config) -> CorsLayer {
    let raw = config.cors_allowed_origins.trim();
    if raw.is_empty() || raw == "*" {
        return CorsLayer::very_permissive();
    }

    let allowed: Vec<HeaderValue> = raw
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse::<HeaderValue>().ok())
        .collect();

    if allowed.is_empty() {
        tracing::warn!("No valid CORS origins parsed; falling back to permissive");
        return CorsLayer::very_permissive();
    }

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods(Any)
        .allow_headers(Any)
}
