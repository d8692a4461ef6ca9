//! Periodic replay of queued tasks
//!
//! The synchronizer runs on a fixed interval, takes the top of the queue in
//! `(priority desc, created_at asc)` order, and pushes each entry back
//! through the router's dispatch path. It only charges a retry when a
//! reachable target actually failed the dispatch; an unreachable mesh just
//! leaves the entry for the next tick.

use crate::store::{QueueStore, RetryOutcome};
use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use weft_core::{DispatchReceipt, NodeName, QueueConfig, Task};

/// The dispatch path the sync loop replays through. Implemented by the
/// router so queued tasks take the same route as live traffic.
#[async_trait]
pub trait ReplayDispatcher: Send + Sync {
    /// Cheap reachability probe with a short timeout. `None` asks whether
    /// any live node is reachable.
    async fn is_available(&self, target: Option<&NodeName>) -> bool;

    /// Attempt to dispatch the task to a live node, without re-enqueueing
    /// on failure.
    async fn replay(&self, task: &Task) -> weft_core::Result<DispatchReceipt>;
}

/// Counters from one sync tick
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncReport {
    pub examined: usize,
    pub replayed: usize,
    pub retried: usize,
    pub dropped: usize,
    pub unreachable: usize,
}

/// Periodic queue replay driver
pub struct QueueSynchronizer {
    store: QueueStore,
    dispatcher: Arc<dyn ReplayDispatcher>,
    config: QueueConfig,
}

impl QueueSynchronizer {
    /// Create a synchronizer over a store and a dispatch path
    pub fn new(store: QueueStore, dispatcher: Arc<dyn ReplayDispatcher>, config: QueueConfig) -> Self {
        Self {
            store,
            dispatcher,
            config,
        }
    }

    /// Run the loop until the shutdown signal flips
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.config.replay.interval);
        // The first tick of a tokio interval fires immediately.
        ticker.tick().await;

        info!(interval = ?self.config.replay.interval, "Offline queue sync loop started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.sync_tick().await {
                        Ok(report) if report.examined > 0 => {
                            info!(
                                examined = report.examined,
                                replayed = report.replayed,
                                retried = report.retried,
                                dropped = report.dropped,
                                unreachable = report.unreachable,
                                "Sync tick complete"
                            );
                        }
                        Ok(_) => {}
                        Err(e) => warn!(error = %e, "Sync tick failed"),
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Offline queue sync loop stopping");
                        break;
                    }
                }
            }
        }
    }

    /// One pass over the top of the queue. Public so callers (and tests)
    /// can drive replay without the timer.
    pub async fn sync_tick(&self) -> Result<SyncReport> {
        let batch = self.store.next_batch(self.config.batch_size);
        let mut report = SyncReport {
            examined: batch.len(),
            ..Default::default()
        };

        for entry in batch {
            let id = entry.task.id;

            if !self.dispatcher.is_available(entry.target.as_ref()).await {
                debug!(task = %id, "Target unreachable, leaving entry for next tick");
                report.unreachable += 1;
                continue;
            }

            match self.dispatcher.replay(&entry.task).await {
                Ok(receipt) => {
                    self.store.remove(&id).await?;
                    report.replayed += 1;
                    info!(task = %id, node = %receipt.executed_on, "Replayed queued task");
                }
                Err(e) => match self.store.record_failure(&id, e.to_string()).await? {
                    RetryOutcome::Retained(count) => {
                        report.retried += 1;
                        debug!(task = %id, retries = count, "Replay failed, will retry");
                    }
                    RetryOutcome::Dropped => {
                        report.dropped += 1;
                    }
                },
            }
        }

        Ok(report)
    }
}
