//! Delivery engine: intake dispatch, retry policy and the retry sweep.

pub mod backoff;
pub mod dispatcher;
pub mod intake;
pub mod spawn;
pub mod store;
pub mod sweep;
