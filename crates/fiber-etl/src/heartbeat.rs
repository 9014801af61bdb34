//! Per-worker heartbeat (spec §4.4 step 6): in-flight count and
//! last-processed timestamp, emitted as a structured log line every
//! `heartbeat_s` — the ambient logging stack is the "status endpoint"
//! consumer here, the same way the rest of this workspace treats `tracing`
//! as the source of truth for liveness.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Default)]
pub struct HeartbeatState {
    in_flight: AtomicU64,
    last_processed_ts: AtomicI64,
}

impl HeartbeatState {
    pub fn enter(&self) {
        self.in_flight.fetch_add(1, Ordering::Relaxed);
    }

    pub fn exit(&self, processed_ts: chrono::DateTime<chrono::Utc>) {
        self.in_flight.fetch_sub(1, Ordering::Relaxed);
        self.last_processed_ts.store(processed_ts.timestamp(), Ordering::Relaxed);
    }
}

pub async fn run(state: Arc<HeartbeatState>, worker_id: &str, interval: Duration, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                tracing::info!(
                    worker_id,
                    in_flight = state.in_flight.load(Ordering::Relaxed),
                    last_processed_ts = state.last_processed_ts.load(Ordering::Relaxed),
                    "etl heartbeat"
                );
            }
        }
    }
}
