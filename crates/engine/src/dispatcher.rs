//! Callback dispatcher: one delivery attempt and its state write.
//!
//! For each call:
//! 1. POST the payload to the recipient's callback URL
//! 2. Map the response to a lifecycle event (200 → delivered, anything else → failed)
//! 3. Persist the matching partial update, conditioned on the record still being pending
//!
//! The dispatcher never retries by itself. A failed attempt only moves the
//! record's next eligible time forward; the retry sweep picks it up later.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use courier_common::error::DeliveryError;
use courier_common::lifecycle::LifecycleEvent;
use courier_common::types::{Delivery, OutcomeUpdate};
use courier_notifier::{CallbackClient, CallbackError};

use crate::backoff::RetryPolicy;
use crate::store::DeliveryStore;

/// What a dispatch did to the record.
#[derive(Debug)]
pub enum DispatchOutcome {
    Delivered,
    Rescheduled {
        retry_count: i32,
        next_delivery_time: DateTime<Utc>,
        cause: CallbackError,
    },
}

pub struct Dispatcher {
    store: Arc<dyn DeliveryStore>,
    client: CallbackClient,
    policy: RetryPolicy,
}

impl Dispatcher {
    pub fn new(store: Arc<dyn DeliveryStore>, client: CallbackClient, policy: RetryPolicy) -> Self {
        Self {
            store,
            client,
            policy,
        }
    }

    /// Attempt delivery of a pending record.
    ///
    /// Fails with `RecipientNotResolved` without touching the store when the
    /// delivery carries no endpoint.
    pub async fn dispatch(&self, delivery: &Delivery) -> Result<DispatchOutcome, DeliveryError> {
        let record = &delivery.record;
        let endpoint = delivery
            .endpoint
            .as_ref()
            .ok_or(DeliveryError::RecipientNotResolved(record.id))?;

        // Only a pending record may be attempted
        record.status.transition(LifecycleEvent::Delivered)?;

        match self
            .client
            .post(&endpoint.callback_url, &endpoint.token, &record.payload)
            .await
        {
            Ok(()) => {
                self.persist(record.id, &OutcomeUpdate::Delivered).await?;
                tracing::info!(notification_id = %record.id, "Callback delivered");
                Ok(DispatchOutcome::Delivered)
            }
            Err(cause) => {
                record.status.transition(LifecycleEvent::AttemptFailed)?;
                let next = self.policy.reschedule(record);
                self.persist(record.id, &OutcomeUpdate::Rescheduled(next))
                    .await?;

                if self.policy.is_exhausted(next.retry_count) {
                    tracing::warn!(
                        notification_id = %record.id,
                        retry_count = next.retry_count,
                        error = %cause,
                        "Callback failed, retry budget exhausted, abandoning"
                    );
                } else {
                    tracing::warn!(
                        notification_id = %record.id,
                        retry_count = next.retry_count,
                        next_delivery_time = %next.next_delivery_time,
                        error = %cause,
                        "Callback failed, rescheduled"
                    );
                }

                Ok(DispatchOutcome::Rescheduled {
                    retry_count: next.retry_count,
                    next_delivery_time: next.next_delivery_time,
                    cause,
                })
            }
        }
    }

    async fn persist(&self, id: Uuid, update: &OutcomeUpdate) -> Result<(), DeliveryError> {
        if self.store.record_outcome(id, update).await? {
            Ok(())
        } else {
            Err(DeliveryError::StaleTransition(id))
        }
    }
}
