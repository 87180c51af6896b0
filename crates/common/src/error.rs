use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

use crate::lifecycle::LifecycleEvent;
use crate::types::DeliveryStatus;

/// Message shown to callers in place of internal error details.
pub const GENERIC_ERROR_MESSAGE: &str = "Sorry, there was a problem. Please try again later.";

/// Service-level errors surfaced by intake and lookup operations.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("No callback endpoint for recipient '{recipient_key}' and product '{product_id}'")]
    RecipientNotFound {
        recipient_key: String,
        product_id: String,
    },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Stable machine-readable code returned in the `error` field.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Database(_) => "internal_error",
            AppError::RecipientNotFound { .. } => "recipient_not_found",
            AppError::NotFound(_) => "not_found",
            AppError::Validation(_) => "bad_request",
            AppError::Config(_) => "internal_error",
            AppError::Internal(_) => "internal_error",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::RecipientNotFound { .. } => StatusCode::NOT_FOUND,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        // 5xx details stay in the logs
        let message = if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
            GENERIC_ERROR_MESSAGE.to_string()
        } else {
            self.to_string()
        };

        let body = json!({ "error": self.code(), "message": message });
        (status, Json(body)).into_response()
    }
}

/// Errors raised by a single dispatch attempt.
///
/// Callback failures (transport errors, non-200 replies) are not errors at
/// this level: they are recorded as a `Failed` transition and retried.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("Recipient endpoint not resolved for notification {0}")]
    RecipientNotResolved(Uuid),

    #[error("Failed to persist outcome: {0}")]
    Persistence(#[from] sqlx::Error),

    #[error("Notification {0} is no longer pending, outcome discarded")]
    StaleTransition(Uuid),

    #[error("Invalid transition from {from} on {event}")]
    InvalidTransition {
        from: DeliveryStatus,
        event: LifecycleEvent,
    },

    #[error("Store error: {0}")]
    Store(String),
}

impl From<AppError> for DeliveryError {
    fn from(err: AppError) -> Self {
        match err {
            AppError::Database(e) => DeliveryError::Persistence(e),
            other => DeliveryError::Store(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        let not_found = AppError::RecipientNotFound {
            recipient_key: "merchant-1".to_string(),
            product_id: "p1".to_string(),
        };
        assert_eq!(not_found.status(), StatusCode::NOT_FOUND);
        assert_eq!(not_found.code(), "recipient_not_found");
        assert_eq!(
            AppError::Validation("x".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::Internal("x".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_recipient_not_found_message_names_key() {
        let err = AppError::RecipientNotFound {
            recipient_key: "merchant-1".to_string(),
            product_id: "p1".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("merchant-1"));
        assert!(msg.contains("p1"));
    }

    #[test]
    fn test_app_error_converts_to_delivery_error() {
        let err: DeliveryError = AppError::Internal("lock poisoned".into()).into();
        assert!(matches!(err, DeliveryError::Store(_)));
    }
}
