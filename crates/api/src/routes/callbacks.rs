//! Callback intake route.

use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::routing::post;
use axum::{Json, Router};
use serde::Serialize;
use uuid::Uuid;

use courier_common::error::AppError;
use courier_common::types::DeliveryStatus;
use courier_engine::intake::CallbackRequest;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/callback", post(queue_callback))
}

#[derive(Debug, Serialize)]
pub struct QueuedCallback {
    pub id: Uuid,
    pub status: DeliveryStatus,
}

/// POST /callback: persist a callback and start delivering it in the background.
async fn queue_callback(
    State(state): State<AppState>,
    body: Result<Json<CallbackRequest>, JsonRejection>,
) -> Result<Json<QueuedCallback>, AppError> {
    let Json(request) = body.map_err(|e| AppError::Validation(e.body_text()))?;

    let record = state.intake.submit(&request).await?;
    Ok(Json(QueuedCallback {
        id: record.id,
        status: record.status,
    }))
}
