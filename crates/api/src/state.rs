//! Shared application state for the Axum API server.

use std::sync::Arc;
use std::time::Duration;

use courier_common::config::AppConfig;
use courier_engine::backoff::RetryPolicy;
use courier_engine::dispatcher::Dispatcher;
use courier_engine::intake::IntakeService;
use courier_engine::store::DeliveryStore;
use courier_notifier::CallbackClient;

/// Application state shared across all route handlers via Axum `State`.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn DeliveryStore>,
    pub intake: Arc<IntakeService>,
    pub config: AppConfig,
}

impl AppState {
    pub fn new(store: Arc<dyn DeliveryStore>, intake: Arc<IntakeService>, config: AppConfig) -> Self {
        Self {
            store,
            intake,
            config,
        }
    }

    /// Wire the intake service and its dispatcher on top of `store`.
    pub fn build(store: Arc<dyn DeliveryStore>, config: AppConfig) -> anyhow::Result<Self> {
        let client = CallbackClient::new(Duration::from_secs(config.client_timeout_secs))?;
        let dispatcher = Dispatcher::new(
            Arc::clone(&store),
            client,
            RetryPolicy::from_config(&config),
        );
        let intake = IntakeService::new(Arc::clone(&store), Arc::new(dispatcher));
        Ok(Self::new(store, Arc::new(intake), config))
    }
}
