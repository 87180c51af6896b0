//! Courier intake API.
//!
//! Endpoints:
//! - POST /callback: queue a callback for delivery
//! - GET  /api/notifications/{id}: inspect a notification's delivery state
//! - GET  /health: liveness probe

pub mod routes;
pub mod state;
