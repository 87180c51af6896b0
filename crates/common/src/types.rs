use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Callback delivery status.
///
/// `Pending` covers both "not yet attempted" and "claimed by a sweep and in
/// flight". `Success` is terminal. `Failed` records wait for the retry sweep
/// until their retry budget runs out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Pending,
    Success,
    Failed,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Pending => "pending",
            DeliveryStatus::Success => "success",
            DeliveryStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A persisted callback notification and its delivery state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct NotificationRecord {
    pub id: Uuid,
    /// Row id of the recipient the callback belongs to.
    pub recipient_id: Uuid,
    pub product_id: String,
    pub product_type: String,
    /// Raw body posted to the callback URL, never rewritten after insert.
    pub payload: String,
    pub status: DeliveryStatus,
    pub retry_count: i32,
    /// Earliest time a failed record becomes eligible for the retry sweep.
    pub next_delivery_time: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Where and how to deliver callbacks for one (recipient, product) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct RecipientEndpoint {
    pub recipient_id: Uuid,
    pub callback_url: String,
    pub token: String,
}

/// Fields supplied when a new notification is queued.
#[derive(Debug, Clone)]
pub struct NewNotification {
    pub recipient_id: Uuid,
    pub product_id: String,
    pub product_type: String,
    pub payload: String,
}

/// A record paired with its endpoint, as handed to the dispatcher.
///
/// `endpoint` is `None` when the recipient's callback configuration could not
/// be found at selection time.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub record: NotificationRecord,
    pub endpoint: Option<RecipientEndpoint>,
}

impl Delivery {
    pub fn new(record: NotificationRecord, endpoint: Option<RecipientEndpoint>) -> Self {
        Self { record, endpoint }
    }
}

/// Retry bookkeeping written when an attempt fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reschedule {
    pub retry_count: i32,
    pub next_delivery_time: DateTime<Utc>,
}

/// Partial update written after a dispatch attempt.
///
/// Only the listed fields (plus `updated_at`) are persisted so concurrent
/// edits to other columns are never clobbered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeUpdate {
    /// `status = success`
    Delivered,
    /// `status = failed`, `retry_count`, `next_delivery_time`
    Rescheduled(Reschedule),
}

impl OutcomeUpdate {
    pub fn status(&self) -> DeliveryStatus {
        match self {
            OutcomeUpdate::Delivered => DeliveryStatus::Success,
            OutcomeUpdate::Rescheduled(_) => DeliveryStatus::Failed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_display_matches_column_values() {
        assert_eq!(DeliveryStatus::Pending.to_string(), "pending");
        assert_eq!(DeliveryStatus::Success.to_string(), "success");
        assert_eq!(DeliveryStatus::Failed.to_string(), "failed");
    }

    #[test]
    fn test_status_serializes_lowercase() {
        let json = serde_json::to_string(&DeliveryStatus::Failed).unwrap();
        assert_eq!(json, "\"failed\"");
        let back: DeliveryStatus = serde_json::from_str("\"success\"").unwrap();
        assert_eq!(back, DeliveryStatus::Success);
    }

    #[test]
    fn test_outcome_update_status() {
        assert_eq!(OutcomeUpdate::Delivered.status(), DeliveryStatus::Success);
        let rescheduled = OutcomeUpdate::Rescheduled(Reschedule {
            retry_count: 1,
            next_delivery_time: Utc::now(),
        });
        assert_eq!(rescheduled.status(), DeliveryStatus::Failed);
    }
}
