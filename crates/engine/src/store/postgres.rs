use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use courier_common::error::AppError;
use courier_common::types::{
    Delivery, DeliveryStatus, NewNotification, NotificationRecord, OutcomeUpdate,
    RecipientEndpoint,
};

use super::DeliveryStore;

/// PostgreSQL-backed store.
#[derive(Debug, Clone)]
pub struct PgDeliveryStore {
    pool: PgPool,
}

impl PgDeliveryStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Selection row: the record plus its endpoint columns from the outer joins.
#[derive(Debug, sqlx::FromRow)]
struct RetryRow {
    #[sqlx(flatten)]
    record: NotificationRecord,
    callback_url: Option<String>,
    token: Option<String>,
}

impl From<RetryRow> for Delivery {
    fn from(row: RetryRow) -> Self {
        let endpoint = match (row.callback_url, row.token) {
            (Some(callback_url), Some(token)) => Some(RecipientEndpoint {
                recipient_id: row.record.recipient_id,
                callback_url,
                token,
            }),
            _ => None,
        };
        Delivery::new(row.record, endpoint)
    }
}

#[async_trait]
impl DeliveryStore for PgDeliveryStore {
    async fn resolve_endpoint(
        &self,
        recipient_key: &str,
        product_id: &str,
    ) -> Result<Option<RecipientEndpoint>, AppError> {
        let endpoint: Option<RecipientEndpoint> = sqlx::query_as(
            r#"
            SELECT r.id AS recipient_id, e.callback_url, r.token
            FROM recipients r
            JOIN callback_endpoints e ON e.recipient_id = r.id
            WHERE r.recipient_key = $1
              AND e.product_id = $2
            "#,
        )
        .bind(recipient_key)
        .bind(product_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(endpoint)
    }

    async fn insert(&self, notification: NewNotification) -> Result<NotificationRecord, AppError> {
        let record: NotificationRecord = sqlx::query_as(
            r#"
            INSERT INTO notifications
                (id, recipient_id, product_id, product_type, payload, status, retry_count,
                 next_delivery_time, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, 0, NOW(), NOW(), NOW())
            RETURNING id, recipient_id, product_id, product_type, payload, status, retry_count,
                      next_delivery_time, created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(notification.recipient_id)
        .bind(&notification.product_id)
        .bind(&notification.product_type)
        .bind(&notification.payload)
        .bind(DeliveryStatus::Pending.as_str())
        .fetch_one(&self.pool)
        .await?;

        Ok(record)
    }

    async fn get(&self, id: Uuid) -> Result<Option<NotificationRecord>, AppError> {
        let record: Option<NotificationRecord> = sqlx::query_as(
            r#"
            SELECT id, recipient_id, product_id, product_type, payload, status, retry_count,
                   next_delivery_time, created_at, updated_at
            FROM notifications
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn select_retryable(
        &self,
        now: DateTime<Utc>,
        max_retry: i32,
    ) -> Result<Vec<Delivery>, AppError> {
        let rows: Vec<RetryRow> = sqlx::query_as(
            r#"
            SELECT n.id, n.recipient_id, n.product_id, n.product_type, n.payload, n.status,
                   n.retry_count, n.next_delivery_time, n.created_at, n.updated_at,
                   e.callback_url, r.token
            FROM notifications n
            LEFT JOIN recipients r ON r.id = n.recipient_id
            LEFT JOIN callback_endpoints e
                   ON e.recipient_id = n.recipient_id AND e.product_id = n.product_id
            WHERE n.status = $1
              AND n.retry_count < $2
              AND n.next_delivery_time <= $3
            ORDER BY n.next_delivery_time
            "#,
        )
        .bind(DeliveryStatus::Failed.as_str())
        .bind(max_retry)
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Delivery::from).collect())
    }

    async fn claim(&self, id: Uuid, max_retry: i32) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE notifications
            SET status = $1, updated_at = NOW()
            WHERE id = $2
              AND status = $3
              AND retry_count < $4
            "#,
        )
        .bind(DeliveryStatus::Pending.as_str())
        .bind(id)
        .bind(DeliveryStatus::Failed.as_str())
        .bind(max_retry)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn record_outcome(&self, id: Uuid, update: &OutcomeUpdate) -> Result<bool, AppError> {
        let result = match update {
            OutcomeUpdate::Delivered => {
                sqlx::query(
                    r#"
                    UPDATE notifications
                    SET status = $1, updated_at = NOW()
                    WHERE id = $2 AND status = $3
                    "#,
                )
                .bind(DeliveryStatus::Success.as_str())
                .bind(id)
                .bind(DeliveryStatus::Pending.as_str())
                .execute(&self.pool)
                .await?
            }
            OutcomeUpdate::Rescheduled(next) => {
                sqlx::query(
                    r#"
                    UPDATE notifications
                    SET status = $1, retry_count = $2, next_delivery_time = $3, updated_at = NOW()
                    WHERE id = $4
                      AND status = $5
                      AND next_delivery_time <= $3
                    "#,
                )
                .bind(DeliveryStatus::Failed.as_str())
                .bind(next.retry_count)
                .bind(next.next_delivery_time)
                .bind(id)
                .bind(DeliveryStatus::Pending.as_str())
                .execute(&self.pool)
                .await?
            }
        };

        Ok(result.rows_affected() == 1)
    }
}
