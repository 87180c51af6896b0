//! Notification lookup route.

use axum::extract::rejection::PathRejection;
use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use uuid::Uuid;

use courier_common::error::AppError;
use courier_common::types::NotificationRecord;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/api/notifications/{id}", get(get_notification))
}

/// GET /api/notifications/{id}: current delivery state of a notification.
async fn get_notification(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<NotificationRecord>, AppError> {
    let Path(id) = id.map_err(|e| AppError::Validation(e.body_text()))?;

    state
        .store
        .get(id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Notification {} not found", id)))
}
