//! Intake path: queue a callback and fire the first attempt.
//!
//! The caller only learns that the notification was durably stored. The
//! first delivery attempt runs as a detached task; its outcome shows up in
//! the record's status and in the logs, never in the intake response.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use courier_common::error::AppError;
use courier_common::types::{Delivery, NewNotification, NotificationRecord};

use crate::dispatcher::Dispatcher;
use crate::spawn::spawn_detached;
use crate::store::DeliveryStore;

/// Request body for queuing a callback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallbackRequest {
    #[serde(alias = "business_id")]
    pub recipient_key: String,
    pub product_id: String,
    pub product_type: String,
    pub payload: String,
}

impl CallbackRequest {
    fn validate(&self) -> Result<(), AppError> {
        for (field, value) in [
            ("recipient_key", &self.recipient_key),
            ("product_id", &self.product_id),
            ("product_type", &self.product_type),
        ] {
            if value.trim().is_empty() {
                return Err(AppError::Validation(format!("{} must not be empty", field)));
            }
        }
        Ok(())
    }
}

pub struct IntakeService {
    store: Arc<dyn DeliveryStore>,
    dispatcher: Arc<Dispatcher>,
}

impl IntakeService {
    pub fn new(store: Arc<dyn DeliveryStore>, dispatcher: Arc<Dispatcher>) -> Self {
        Self { store, dispatcher }
    }

    /// Persist a new pending notification and launch its first delivery.
    ///
    /// Returns as soon as the record is stored.
    pub async fn submit(&self, request: &CallbackRequest) -> Result<NotificationRecord, AppError> {
        request.validate()?;

        let endpoint = self
            .store
            .resolve_endpoint(&request.recipient_key, &request.product_id)
            .await?
            .ok_or_else(|| AppError::RecipientNotFound {
                recipient_key: request.recipient_key.clone(),
                product_id: request.product_id.clone(),
            })?;

        let record = self
            .store
            .insert(NewNotification {
                recipient_id: endpoint.recipient_id,
                product_id: request.product_id.clone(),
                product_type: request.product_type.clone(),
                payload: request.payload.clone(),
            })
            .await?;

        tracing::info!(
            notification_id = %record.id,
            recipient_id = %record.recipient_id,
            product_id = %record.product_id,
            "Callback queued"
        );

        let dispatcher = Arc::clone(&self.dispatcher);
        let delivery = Delivery::new(record.clone(), Some(endpoint));
        spawn_detached("intake_dispatch", record.id, async move {
            dispatcher.dispatch(&delivery).await
        });

        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration as StdDuration;

    use chrono::Duration;
    use courier_common::types::DeliveryStatus;
    use courier_notifier::{CallbackClient, TOKEN_HEADER};
    use uuid::Uuid;
    use wiremock::matchers::{body_string, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::backoff::RetryPolicy;
    use crate::store::MemoryStore;

    fn service(store: Arc<MemoryStore>) -> IntakeService {
        let dispatcher = Dispatcher::new(
            store.clone(),
            CallbackClient::new(StdDuration::from_secs(5)).unwrap(),
            RetryPolicy::default(),
        );
        IntakeService::new(store, Arc::new(dispatcher))
    }

    fn store_with_recipient(server: &MockServer) -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        let recipient_id = store.add_recipient("user00", "some token").unwrap();
        store
            .add_endpoint(recipient_id, "abc", &format!("{}/hook", server.uri()))
            .unwrap();
        store
    }

    fn request() -> CallbackRequest {
        CallbackRequest {
            recipient_key: "user00".to_string(),
            product_id: "abc".to_string(),
            product_type: "efg".to_string(),
            payload: "{}".to_string(),
        }
    }

    /// Poll the store until the record leaves `Pending`.
    async fn wait_settled(store: &MemoryStore, id: Uuid) -> NotificationRecord {
        for _ in 0..200 {
            let record = store.get(id).await.unwrap().unwrap();
            if record.status != DeliveryStatus::Pending {
                return record;
            }
            tokio::time::sleep(StdDuration::from_millis(10)).await;
        }
        panic!("notification {} never left pending", id);
    }

    #[tokio::test]
    async fn test_submit_delivers_in_background() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .and(header(TOKEN_HEADER, "some token"))
            .and(body_string("{}"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let store = store_with_recipient(&server);
        let record = service(store.clone()).submit(&request()).await.unwrap();
        assert_eq!(record.status, DeliveryStatus::Pending);
        assert_eq!(record.retry_count, 0);

        let settled = wait_settled(&store, record.id).await;
        assert_eq!(settled.status, DeliveryStatus::Success);
        assert_eq!(settled.retry_count, 0);
    }

    #[tokio::test]
    async fn test_failed_first_attempt_is_rescheduled() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;

        let store = store_with_recipient(&server);
        let record = service(store.clone()).submit(&request()).await.unwrap();

        let settled = wait_settled(&store, record.id).await;
        assert_eq!(settled.status, DeliveryStatus::Failed);
        assert_eq!(settled.retry_count, 1);
        assert_eq!(
            settled.next_delivery_time,
            record.next_delivery_time + Duration::minutes(15)
        );
    }

    #[tokio::test]
    async fn test_unknown_recipient_persists_nothing() {
        let server = MockServer::start().await;
        let store = store_with_recipient(&server);

        let mut req = request();
        req.recipient_key = "nobody".to_string();
        let err = service(store.clone()).submit(&req).await.unwrap_err();
        assert!(matches!(err, AppError::RecipientNotFound { .. }));
        assert!(store.records().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_product_persists_nothing() {
        let server = MockServer::start().await;
        let store = store_with_recipient(&server);

        let mut req = request();
        req.product_id = "other".to_string();
        let err = service(store.clone()).submit(&req).await.unwrap_err();
        assert!(matches!(err, AppError::RecipientNotFound { .. }));
        assert!(store.records().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_blank_fields_rejected() {
        let server = MockServer::start().await;
        let store = store_with_recipient(&server);

        let mut req = request();
        req.product_type = "  ".to_string();
        let err = service(store.clone()).submit(&req).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert!(store.records().unwrap().is_empty());
    }

    #[test]
    fn test_request_accepts_business_id_alias() {
        let req: CallbackRequest = serde_json::from_str(
            r#"{"business_id":"user00","product_id":"abc","product_type":"efg","payload":"{}"}"#,
        )
        .unwrap();
        assert_eq!(req.recipient_key, "user00");
    }
}
