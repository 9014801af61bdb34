//! The batch-pop supervisor loop (spec §4.4 steps 1, 5) and the
//! bulkhead-bounded persistence stage (step 4), grounded on the
//! `message_queue_worker` example's "bulkhead limits concurrent processing"
//! composition.

use crate::heartbeat::HeartbeatState;
use crate::process::{process_batch, stamp_for_dlq};
use fiber_core::config::EtlConfig;
use fiber_core::QueueItem;
use fiber_queue::QueueBackend;
use fiber_storage::WriteBackend;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower::{Service, ServiceBuilder, ServiceExt};
use tower_resilience_bulkhead::BulkheadConfig;

pub struct WorkerPool {
    queue: Arc<dyn QueueBackend>,
    storage: Arc<dyn WriteBackend>,
    config: EtlConfig,
    heartbeat: Arc<HeartbeatState>,
}

impl WorkerPool {
    pub fn new(
        queue: Arc<dyn QueueBackend>,
        storage: Arc<dyn WriteBackend>,
        config: EtlConfig,
        heartbeat: Arc<HeartbeatState>,
    ) -> Self {
        Self { queue, storage, config, heartbeat }
    }

    /// Supervisor loop: pops batches and dispatches each through a
    /// bulkhead-gated persistence stage so at most `worker_count` batches
    /// persist concurrently while popping never blocks on it.
    pub async fn run(self, cancel: CancellationToken) {
        let bulkhead = BulkheadConfig::builder()
            .max_concurrent_calls(self.config.worker_count)
            .name("fiber-etl-persist")
            .build();

        let storage = self.storage.clone();
        let service = ServiceBuilder::new().layer(bulkhead).service_fn(move |items: Vec<QueueItem>| {
            let storage = storage.clone();
            async move { process_batch(items, storage).await }
        });

        let mut service = service;
        let pop_timeout = Duration::from_millis(self.config.batch_pop_timeout_ms);
        let idle_backoff = Duration::from_millis(self.config.idle_backoff_ms);

        loop {
            if cancel.is_cancelled() {
                tracing::info!("etl worker pool shutting down");
                break;
            }

            let popped = match self.queue.pop_batch(self.config.batch_size, pop_timeout).await {
                Ok(popped) => popped,
                Err(err) => {
                    tracing::warn!(error = %err, "failed to pop queue");
                    tokio::time::sleep(idle_backoff).await;
                    continue;
                }
            };

            if popped.is_empty() {
                tokio::time::sleep(idle_backoff).await;
                continue;
            }
            let token = popped.token.clone();
            let batch = popped.items;

            let ready = match service.ready().await {
                Ok(svc) => svc,
                Err(err) => {
                    tracing::error!(error = %err, "persistence service unavailable");
                    self.retry_or_dlq(batch).await;
                    let _ = self.queue.ack_batch(&token).await;
                    continue;
                }
            };

            let count = batch.len();
            let retryable = batch.clone();
            self.heartbeat.enter();
            let result = ready.call(batch).await;
            self.heartbeat.exit(chrono::Utc::now());
            match result {
                Ok(outcome) => {
                    tracing::info!(inserted = outcome.inserted, conflicts = outcome.conflicts, "batch persisted");
                }
                Err(err) => {
                    tracing::warn!(error = %err, count, "batch persist failed, will retry or DLQ");
                    self.retry_or_dlq(retryable).await;
                }
            }
            // Ack regardless of outcome: a persist failure was already
            // explicitly re-enqueued or routed to the DLQ above, so the
            // in-flight entry must clear or the reaper would redeliver it a
            // second time on top of that explicit handling.
            let _ = self.queue.ack_batch(&token).await;
        }
    }

    /// Recovers batches left in-flight by a popper that died before acking
    /// (spec §8 scenario "ETL crash mid-batch") — run alongside `run` as a
    /// background task against the same queue.
    pub async fn run_reaper(queue: Arc<dyn QueueBackend>, visibility_timeout: Duration, interval: Duration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    match queue.reap_stale(visibility_timeout).await {
                        Ok(0) => {}
                        Ok(n) => tracing::warn!(requeued = n, "reaped stale in-flight batch"),
                        Err(err) => tracing::warn!(error = %err, "reap_stale failed"),
                    }
                }
            }
        }
    }

    /// Bumps each item's attempt counter and either re-enqueues the batch
    /// after an exponential backoff delay or, once `max_persist_retries` is
    /// exhausted, routes it to the DLQ (spec §4.4 step 5 / §7
    /// `TransientBackendFailure`).
    async fn retry_or_dlq(&self, items: Vec<QueueItem>) {
        let attempts = items.iter().map(|item| item.persist_attempts).max().unwrap_or(0) + 1;
        let bumped: Vec<QueueItem> = items
            .into_iter()
            .map(|mut item| {
                item.persist_attempts = attempts;
                item
            })
            .collect();

        if attempts < self.config.max_persist_retries {
            let queue = self.queue.clone();
            let delay = Duration::from_secs_f64(self.config.persist_retry_backoff_base.powi(attempts as i32));
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                if let Err(err) = queue.enqueue(bumped).await {
                    tracing::error!(error = %err, "failed to re-enqueue batch for retry");
                }
            });
            return;
        }

        let stamped: Vec<QueueItem> =
            bumped.into_iter().map(|item| stamp_for_dlq(item, "persist retries exhausted".into(), attempts)).collect();
        if let Err(err) = self.queue.push_dlq(stamped).await {
            tracing::error!(error = %err, "failed to route exhausted batch to DLQ");
        }
    }
}

