use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use courier_common::error::AppError;
use courier_common::types::{
    Delivery, DeliveryStatus, NewNotification, NotificationRecord, OutcomeUpdate,
    RecipientEndpoint,
};

use super::DeliveryStore;

#[derive(Debug, Default)]
struct MemoryState {
    /// recipient_key -> (recipient id, token)
    recipients: HashMap<String, (Uuid, String)>,
    /// (recipient id, product id) -> callback url
    endpoints: HashMap<(Uuid, String), String>,
    notifications: HashMap<Uuid, NotificationRecord>,
}

impl MemoryState {
    fn endpoint_for(&self, recipient_id: Uuid, product_id: &str) -> Option<RecipientEndpoint> {
        let token = self
            .recipients
            .values()
            .find(|(id, _)| *id == recipient_id)
            .map(|(_, token)| token.clone())?;
        let callback_url = self
            .endpoints
            .get(&(recipient_id, product_id.to_string()))?
            .clone();
        Some(RecipientEndpoint {
            recipient_id,
            callback_url,
            token,
        })
    }
}

/// In-process store with the same conditional-write semantics as Postgres.
///
/// Every operation runs under one lock, so each conditional update is atomic.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<MutexGuard<'_, MemoryState>, AppError> {
        self.state
            .lock()
            .map_err(|_| AppError::Internal("memory store lock poisoned".to_string()))
    }

    /// Register a recipient and return its id.
    pub fn add_recipient(&self, recipient_key: &str, token: &str) -> Result<Uuid, AppError> {
        let mut state = self.state()?;
        let id = Uuid::new_v4();
        state
            .recipients
            .insert(recipient_key.to_string(), (id, token.to_string()));
        Ok(id)
    }

    pub fn add_endpoint(
        &self,
        recipient_id: Uuid,
        product_id: &str,
        callback_url: &str,
    ) -> Result<(), AppError> {
        self.state()?.endpoints.insert(
            (recipient_id, product_id.to_string()),
            callback_url.to_string(),
        );
        Ok(())
    }

    pub fn remove_endpoint(&self, recipient_id: Uuid, product_id: &str) -> Result<(), AppError> {
        self.state()?
            .endpoints
            .remove(&(recipient_id, product_id.to_string()));
        Ok(())
    }

    /// Insert or overwrite a record verbatim.
    pub fn put(&self, record: NotificationRecord) -> Result<(), AppError> {
        self.state()?.notifications.insert(record.id, record);
        Ok(())
    }

    pub fn records(&self) -> Result<Vec<NotificationRecord>, AppError> {
        Ok(self.state()?.notifications.values().cloned().collect())
    }
}

#[async_trait]
impl DeliveryStore for MemoryStore {
    async fn resolve_endpoint(
        &self,
        recipient_key: &str,
        product_id: &str,
    ) -> Result<Option<RecipientEndpoint>, AppError> {
        let state = self.state()?;
        let Some((recipient_id, _)) = state.recipients.get(recipient_key) else {
            return Ok(None);
        };
        Ok(state.endpoint_for(*recipient_id, product_id))
    }

    async fn insert(&self, notification: NewNotification) -> Result<NotificationRecord, AppError> {
        let now = Utc::now();
        let record = NotificationRecord {
            id: Uuid::new_v4(),
            recipient_id: notification.recipient_id,
            product_id: notification.product_id,
            product_type: notification.product_type,
            payload: notification.payload,
            status: DeliveryStatus::Pending,
            retry_count: 0,
            next_delivery_time: now,
            created_at: now,
            updated_at: now,
        };
        self.state()?
            .notifications
            .insert(record.id, record.clone());
        Ok(record)
    }

    async fn get(&self, id: Uuid) -> Result<Option<NotificationRecord>, AppError> {
        Ok(self.state()?.notifications.get(&id).cloned())
    }

    async fn select_retryable(
        &self,
        now: DateTime<Utc>,
        max_retry: i32,
    ) -> Result<Vec<Delivery>, AppError> {
        let state = self.state()?;
        let mut selected: Vec<Delivery> = state
            .notifications
            .values()
            .filter(|r| {
                r.status == DeliveryStatus::Failed
                    && r.retry_count < max_retry
                    && r.next_delivery_time <= now
            })
            .map(|r| Delivery::new(r.clone(), state.endpoint_for(r.recipient_id, &r.product_id)))
            .collect();
        selected.sort_by_key(|d| d.record.next_delivery_time);
        Ok(selected)
    }

    async fn claim(&self, id: Uuid, max_retry: i32) -> Result<bool, AppError> {
        let mut state = self.state()?;
        match state.notifications.get_mut(&id) {
            Some(r) if r.status == DeliveryStatus::Failed && r.retry_count < max_retry => {
                r.status = DeliveryStatus::Pending;
                r.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn record_outcome(&self, id: Uuid, update: &OutcomeUpdate) -> Result<bool, AppError> {
        let mut state = self.state()?;
        let Some(r) = state.notifications.get_mut(&id) else {
            return Ok(false);
        };
        if r.status != DeliveryStatus::Pending {
            return Ok(false);
        }

        if let OutcomeUpdate::Rescheduled(next) = update {
            if next.next_delivery_time < r.next_delivery_time {
                return Ok(false);
            }
            r.retry_count = next.retry_count;
            r.next_delivery_time = next.next_delivery_time;
        }
        r.status = update.status();
        r.updated_at = Utc::now();
        Ok(true)
    }
}
