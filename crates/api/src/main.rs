//! Courier API server binary entrypoint.

use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use courier_common::config::AppConfig;
use courier_common::db::{create_pool, migrate};
use courier_engine::store::PgDeliveryStore;

use courier_api::routes::create_router;
use courier_api::state::AppState;

/// Upper bound on an intake request body.
const MAX_BODY_BYTES: usize = 1024 * 1024;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("courier_api=debug,courier_engine=info,courier_notifier=info,tower_http=debug")
        }))
        .init();

    tracing::info!("Starting Courier API server...");

    // Load configuration
    let config = AppConfig::from_env()?;

    // Create database connection pool
    let pool = create_pool(&config.database_url, config.db_max_connections).await?;
    migrate(&pool).await?;

    // Build application state
    let store = Arc::new(PgDeliveryStore::new(pool));
    let state = AppState::build(store, config)?;
    let addr = state.config.api_bind_addr.clone();

    // Build router
    let app = create_router(state)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    // Start server
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("API server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("API server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
