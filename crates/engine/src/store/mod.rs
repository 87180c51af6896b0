//! Delivery record store.
//!
//! The store is the only shared mutable state between intake dispatches and
//! retry sweeps. Every write is field-scoped and conditioned on the record's
//! current status, so two actors racing on the same record can never both
//! win a transition.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgDeliveryStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use courier_common::error::AppError;
use courier_common::types::{
    Delivery, NewNotification, NotificationRecord, OutcomeUpdate, RecipientEndpoint,
};

#[async_trait]
pub trait DeliveryStore: Send + Sync {
    /// Look up the callback endpoint for a recipient key and product.
    async fn resolve_endpoint(
        &self,
        recipient_key: &str,
        product_id: &str,
    ) -> Result<Option<RecipientEndpoint>, AppError>;

    /// Persist a new record with `status = pending` and `retry_count = 0`.
    async fn insert(&self, notification: NewNotification) -> Result<NotificationRecord, AppError>;

    async fn get(&self, id: Uuid) -> Result<Option<NotificationRecord>, AppError>;

    /// Failed records with `retry_count < max_retry` and
    /// `next_delivery_time <= now`, each with its endpoint if one resolves.
    async fn select_retryable(
        &self,
        now: DateTime<Utc>,
        max_retry: i32,
    ) -> Result<Vec<Delivery>, AppError>;

    /// Move a failed record back to pending.
    ///
    /// Returns `false` when the record was no longer claimable, meaning some
    /// other sweep already owns it.
    async fn claim(&self, id: Uuid, max_retry: i32) -> Result<bool, AppError>;

    /// Write the result of a dispatch attempt to a pending record.
    ///
    /// Returns `false` when the record was not pending.
    async fn record_outcome(&self, id: Uuid, update: &OutcomeUpdate) -> Result<bool, AppError>;
}
