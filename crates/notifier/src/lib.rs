//! Outbound callback delivery.
//!
//! A [`CallbackClient`] performs exactly one `POST` per call and reports
//! whether the recipient accepted it. It never retries on its own; retries are
//! scheduled through persisted state by the engine.

pub mod callback;

pub use callback::{CallbackClient, CallbackError, TOKEN_HEADER};
