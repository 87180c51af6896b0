//! Retry sweep: periodic redelivery of failed callbacks.
//!
//! One sweep:
//! 1. Selects failed records within the retry budget whose next delivery time has passed
//! 2. Claims each one (failed → pending) with a conditional update
//! 3. Fans the claimed batch out to a fixed pool of workers
//! 4. Waits for every dispatch to finish
//!
//! Every claim commits before the first dispatch starts. A sweep that
//! overlaps with another one therefore never selects or claims the same
//! record, since claimed rows no longer match `status = failed`.
//!
//! Once claimed, a record is only left `pending` if the process dies. The
//! worker clients exist before any claim, and shutdown is only observed
//! between sweeps, never in the middle of one.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinSet;

use courier_common::config::AppConfig;
use courier_common::error::{AppError, DeliveryError};
use courier_common::lifecycle::LifecycleEvent;
use courier_common::types::Delivery;
use courier_notifier::{CallbackClient, CallbackError};

use crate::backoff::RetryPolicy;
use crate::dispatcher::{DispatchOutcome, Dispatcher};
use crate::store::DeliveryStore;

/// Default size of the worker pool.
pub const DEFAULT_WORKERS: usize = 10;

/// Counters for one sweep.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    /// Records matched by the selection query
    pub selected: usize,
    /// Selected records skipped because their endpoint no longer resolves
    pub unresolved: usize,
    /// Records this sweep took ownership of
    pub claimed: usize,
    pub delivered: usize,
    pub rescheduled: usize,
    /// Dispatches that ended in an error (persistence, stale state)
    pub errored: usize,
}

impl SweepReport {
    fn merge(&mut self, other: SweepReport) {
        self.delivered += other.delivered;
        self.rescheduled += other.rescheduled;
        self.errored += other.errored;
    }
}

pub struct RetrySweep {
    store: Arc<dyn DeliveryStore>,
    policy: RetryPolicy,
    /// One HTTP client per worker, reused across sweeps
    clients: Vec<CallbackClient>,
}

impl RetrySweep {
    /// Build a sweep with `workers` pool slots.
    ///
    /// Fails if an HTTP client cannot be built, before anything is claimed.
    pub fn new(
        store: Arc<dyn DeliveryStore>,
        policy: RetryPolicy,
        workers: usize,
        client_timeout: Duration,
    ) -> Result<Self, CallbackError> {
        let clients = (0..workers.max(1))
            .map(|_| CallbackClient::new(client_timeout))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            store,
            policy,
            clients,
        })
    }

    pub fn from_config(
        store: Arc<dyn DeliveryStore>,
        config: &AppConfig,
    ) -> Result<Self, CallbackError> {
        Self::new(
            store,
            RetryPolicy::from_config(config),
            config.retry_workers,
            Duration::from_secs(config.client_timeout_secs),
        )
    }

    /// Run a single sweep to completion.
    ///
    /// Only a failed selection query aborts the sweep. Claim and dispatch
    /// errors are logged per record.
    pub async fn run_once(&self) -> Result<SweepReport, AppError> {
        let candidates = self
            .store
            .select_retryable(Utc::now(), self.policy.max_retry)
            .await?;

        let mut report = SweepReport {
            selected: candidates.len(),
            ..SweepReport::default()
        };
        tracing::info!(selected = report.selected, "Retrieved notifications to retry");

        let batch = self.claim(candidates, &mut report).await;
        report.claimed = batch.len();

        if !batch.is_empty() {
            let tally = self.dispatch_all(batch).await;
            report.merge(tally);
        }

        tracing::info!(
            selected = report.selected,
            unresolved = report.unresolved,
            claimed = report.claimed,
            delivered = report.delivered,
            rescheduled = report.rescheduled,
            errored = report.errored,
            "Retry sweep finished"
        );

        Ok(report)
    }

    pub fn workers(&self) -> usize {
        self.clients.len()
    }

    /// Sweep every `interval` until `shutdown` flips to `true` or its sender
    /// is dropped.
    ///
    /// Shutdown is checked only while waiting for the next tick. A sweep that
    /// has started always drains its claimed batch before this returns.
    pub async fn run(&self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        tracing::info!(
            interval_secs = interval.as_secs(),
            workers = self.workers(),
            "Retry sweeper started"
        );

        loop {
            if *shutdown.borrow_and_update() {
                break;
            }

            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow_and_update() {
                        break;
                    }
                    continue;
                }
                _ = ticker.tick() => {}
            }

            if let Err(e) = self.run_once().await {
                tracing::error!(error = %e, "Retry sweep failed");
            }
        }

        tracing::info!("Retry sweeper stopped");
    }

    /// Claim every resolvable candidate, returning those this sweep now owns.
    async fn claim(&self, candidates: Vec<Delivery>, report: &mut SweepReport) -> Vec<Delivery> {
        let mut claimed = Vec::with_capacity(candidates.len());

        for mut delivery in candidates {
            let id = delivery.record.id;

            // Leave it failed so a later sweep can pick it up once configured
            if delivery.endpoint.is_none() {
                let err = DeliveryError::RecipientNotResolved(id);
                tracing::warn!(notification_id = %id, error = %err, "Skipping retry");
                report.unresolved += 1;
                continue;
            }

            let status = match delivery.record.status.transition(LifecycleEvent::Claimed) {
                Ok(status) => status,
                Err(e) => {
                    tracing::error!(notification_id = %id, error = %e, "Selected record not claimable");
                    continue;
                }
            };

            match self.store.claim(id, self.policy.max_retry).await {
                Ok(true) => {
                    delivery.record.status = status;
                    claimed.push(delivery);
                }
                Ok(false) => {
                    tracing::debug!(notification_id = %id, "Already claimed by another sweep");
                }
                Err(e) => {
                    tracing::error!(notification_id = %id, error = %e, "Failed to claim notification");
                }
            }
        }

        claimed
    }

    /// Dispatch a claimed batch through the worker pool and wait for it to drain.
    async fn dispatch_all(&self, batch: Vec<Delivery>) -> SweepReport {
        let total = batch.len();
        let (tx, rx) = mpsc::channel::<Delivery>(self.workers());
        let rx = Arc::new(Mutex::new(rx));

        let mut pool = JoinSet::new();
        for (idx, client) in self.clients.iter().take(total).enumerate() {
            let dispatcher =
                Dispatcher::new(Arc::clone(&self.store), client.clone(), self.policy.clone());
            pool.spawn(run_worker(idx + 1, dispatcher, Arc::clone(&rx)));
        }

        let mut sent = 0;
        for delivery in batch {
            if tx.send(delivery).await.is_err() {
                break;
            }
            sent += 1;
        }
        drop(tx);

        if sent < total {
            tracing::error!(
                stranded = total - sent,
                "All retry workers exited early, claimed notifications left pending"
            );
        }

        let mut tally = SweepReport::default();
        while let Some(joined) = pool.join_next().await {
            match joined {
                Ok(worker_tally) => tally.merge(worker_tally),
                Err(e) => tracing::error!(error = %e, "Retry worker panicked"),
            }
        }

        tally
    }
}

async fn run_worker(
    worker: usize,
    dispatcher: Dispatcher,
    rx: Arc<Mutex<mpsc::Receiver<Delivery>>>,
) -> SweepReport {
    tracing::debug!(worker, "Starting retry worker");
    let mut tally = SweepReport::default();

    loop {
        let next = rx.lock().await.recv().await;
        let Some(delivery) = next else { break };
        let id = delivery.record.id;

        match dispatcher.dispatch(&delivery).await {
            Ok(DispatchOutcome::Delivered) => tally.delivered += 1,
            Ok(DispatchOutcome::Rescheduled { .. }) => tally.rescheduled += 1,
            Err(e) => {
                tracing::error!(worker, notification_id = %id, error = %e, "Error retrying callback");
                tally.errored += 1;
            }
        }
    }

    tracing::debug!(worker, "Retry worker finished");
    tally
}
