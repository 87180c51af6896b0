//! Retry sweeper binary.
//!
//! Runs a single sweep and exits, or sweeps every `SWEEP_INTERVAL_SECS`
//! until interrupted when that variable is set.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use courier_common::config::AppConfig;
use courier_common::db;
use courier_engine::store::PgDeliveryStore;
use courier_engine::sweep::RetrySweep;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "courier_sweeper=info,courier_engine=info".into()),
        )
        .json()
        .init();

    tracing::info!("Courier retry sweeper starting...");

    // Load configuration
    let config = AppConfig::from_env()?;

    // Connect to database
    let pool = db::create_pool(&config.database_url, config.db_max_connections).await?;
    db::migrate(&pool).await?;

    let store = Arc::new(PgDeliveryStore::new(pool));
    let sweep = RetrySweep::from_config(store, &config)?;

    let Some(interval_secs) = config.sweep_interval_secs else {
        let report = sweep.run_once().await?;
        tracing::info!(
            claimed = report.claimed,
            delivered = report.delivered,
            "Courier retry sweeper finished single run"
        );
        return Ok(());
    };

    // Ctrl+C stops the loop between sweeps; an in-flight sweep drains first
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let signal = async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
        tracing::info!("Received shutdown signal, stopping gracefully...");
        let _ = shutdown_tx.send(true);
    };

    tokio::join!(sweep.run(Duration::from_secs(interval_secs), shutdown_rx), signal);

    tracing::info!("Courier retry sweeper stopped.");
    Ok(())
}
