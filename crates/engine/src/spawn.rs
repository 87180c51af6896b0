//! Detached background work.
//!
//! Intake hands each first delivery attempt to a task nobody awaits. The only
//! place its result goes is the log; the persisted record carries the outcome.

use std::fmt::Display;
use std::future::Future;

use uuid::Uuid;

/// Run `work` on the runtime without keeping a handle to it.
///
/// Errors are logged with `task` and `notification_id` as context.
pub fn spawn_detached<F, T, E>(task: &'static str, notification_id: Uuid, work: F)
where
    F: Future<Output = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: Display + Send + 'static,
{
    tokio::spawn(async move {
        if let Err(e) = work.await {
            tracing::error!(
                task,
                notification_id = %notification_id,
                error = %e,
                "Detached task failed"
            );
        }
    });
}
