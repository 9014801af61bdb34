//! In-memory backend used by unit/integration tests and by the documented
//! degraded fallback mode (spec §4.5 Atomicity: "local in-memory fallback is
//! permitted when the shared backend is unavailable, with documented loss of
//! cross-instance fairness").

use crate::backend::{IdempotencyOutcome, IdempotencyStore, QueueBackend, RateLimitBackend};
use async_trait::async_trait;
use fiber_core::{generate_trace_id, AdminCommand, BucketState, Decision, FiberResult, PoppedBatch, QueueItem, TokenBucket};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

struct InFlightBatch {
    items: Vec<QueueItem>,
    popped_at: Instant,
}

#[derive(Default)]
pub struct InMemoryQueue {
    queue: Mutex<VecDeque<QueueItem>>,
    dlq: Mutex<VecDeque<QueueItem>>,
    admin: Mutex<VecDeque<AdminCommand>>,
    in_flight: Mutex<HashMap<String, InFlightBatch>>,
}

impl InMemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl QueueBackend for InMemoryQueue {
    async fn enqueue(&self, items: Vec<QueueItem>) -> FiberResult<()> {
        let mut q = self.queue.lock().unwrap();
        q.extend(items);
        Ok(())
    }

    async fn pop_batch(&self, max: usize, _timeout: Duration) -> FiberResult<PoppedBatch> {
        let mut q = self.queue.lock().unwrap();
        let n = max.min(q.len());
        let items: Vec<QueueItem> = q.drain(..n).collect();
        if items.is_empty() {
            return Ok(PoppedBatch::default());
        }
        let token = generate_trace_id();
        self.in_flight
            .lock()
            .unwrap()
            .insert(token.clone(), InFlightBatch { items: items.clone(), popped_at: Instant::now() });
        Ok(PoppedBatch { token, items })
    }

    async fn ack_batch(&self, token: &str) -> FiberResult<()> {
        self.in_flight.lock().unwrap().remove(token);
        Ok(())
    }

    async fn reap_stale(&self, visibility_timeout: Duration) -> FiberResult<u64> {
        let now = Instant::now();
        let mut in_flight = self.in_flight.lock().unwrap();
        let stale: Vec<String> = in_flight
            .iter()
            .filter(|(_, batch)| now.duration_since(batch.popped_at) > visibility_timeout)
            .map(|(token, _)| token.clone())
            .collect();

        let mut requeued = 0u64;
        let mut q = self.queue.lock().unwrap();
        for token in stale {
            if let Some(batch) = in_flight.remove(&token) {
                requeued += batch.items.len() as u64;
                for item in batch.items.into_iter().rev() {
                    q.push_front(item);
                }
            }
        }
        Ok(requeued)
    }

    async fn push_dlq(&self, items: Vec<QueueItem>) -> FiberResult<()> {
        let mut dlq = self.dlq.lock().unwrap();
        dlq.extend(items);
        Ok(())
    }

    async fn queue_len(&self) -> FiberResult<u64> {
        Ok(self.queue.lock().unwrap().len() as u64)
    }

    async fn dlq_len(&self) -> FiberResult<u64> {
        Ok(self.dlq.lock().unwrap().len() as u64)
    }

    async fn enqueue_admin(&self, cmd: AdminCommand) -> FiberResult<()> {
        self.admin.lock().unwrap().push_back(cmd);
        Ok(())
    }

    async fn pop_admin(&self) -> FiberResult<Option<AdminCommand>> {
        Ok(self.admin.lock().unwrap().pop_front())
    }
}

struct IdempotencyEntry {
    enqueued: usize,
    expires_at: Instant,
}

#[derive(Default)]
pub struct InMemoryIdempotencyStore {
    entries: Mutex<HashMap<String, IdempotencyEntry>>,
}

impl InMemoryIdempotencyStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IdempotencyStore for InMemoryIdempotencyStore {
    async fn check_and_set(
        &self,
        batch_id: &str,
        enqueued_count: usize,
        ttl: Duration,
    ) -> FiberResult<IdempotencyOutcome> {
        let mut entries = self.entries.lock().unwrap();
        let now = Instant::now();
        entries.retain(|_, v| v.expires_at > now);

        if let Some(existing) = entries.get(batch_id) {
            return Ok(IdempotencyOutcome::Duplicate { enqueued: existing.enqueued });
        }

        entries.insert(
            batch_id.to_string(),
            IdempotencyEntry { enqueued: enqueued_count, expires_at: now + ttl },
        );
        Ok(IdempotencyOutcome::Fresh)
    }
}

#[derive(Default)]
pub struct InMemoryRateLimiter {
    buckets: Mutex<HashMap<String, (BucketState, Instant)>>,
}

impl InMemoryRateLimiter {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RateLimitBackend for InMemoryRateLimiter {
    async fn allow(
        &self,
        key: &str,
        bucket: TokenBucket,
        requested: f64,
        ttl: Duration,
    ) -> FiberResult<Decision> {
        let mut buckets = self.buckets.lock().unwrap();
        let now = Instant::now();
        buckets.retain(|_, (_, expires_at)| *expires_at > now);

        let now_secs = now.elapsed().as_secs_f64(); // monotonic within this process
        let state = buckets
            .get(key)
            .map(|(s, _)| *s)
            .unwrap_or_else(|| BucketState::full(bucket.capacity, now_secs));

        let (decision, new_state) = bucket.allow(state, requested, now_secs);
        buckets.insert(key.to_string(), (new_state, now + ttl));
        Ok(decision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fiber_core::Sample;

    fn item() -> QueueItem {
        QueueItem {
            envelope: fiber_core::Envelope {
                sample: Sample {
                    node_id: "p1".into(),
                    timestamp: chrono::Utc::now(),
                    latency_ms: 1.0,
                    uptime_pct: 100.0,
                    packet_loss_pct: 0.0,
                    target_host: "h".into(),
                    probe_type: "icmp".into(),
                    country: "GH".into(),
                    region: "Accra".into(),
                    metadata: serde_json::json!({}),
                },
                trace_id: "AbCdEfGh".into(),
                ingest_region: None,
                ingest_ts: chrono::Utc::now(),
            },
            persist_attempts: 0,
            failure: None,
        }
    }

    #[tokio::test]
    async fn pop_batch_is_atomic_and_fifo() {
        let q = InMemoryQueue::new();
        q.enqueue(vec![item(), item(), item()]).await.unwrap();
        let popped = q.pop_batch(2, Duration::from_millis(10)).await.unwrap();
        assert_eq!(popped.len(), 2);
        assert_eq!(q.queue_len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn acked_batch_is_not_requeued_by_reap() {
        let q = InMemoryQueue::new();
        q.enqueue(vec![item()]).await.unwrap();
        let popped = q.pop_batch(10, Duration::from_millis(10)).await.unwrap();
        q.ack_batch(&popped.token).await.unwrap();

        let requeued = q.reap_stale(Duration::from_secs(0)).await.unwrap();
        assert_eq!(requeued, 0);
        assert_eq!(q.queue_len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn unacked_batch_is_requeued_once_stale() {
        let q = InMemoryQueue::new();
        q.enqueue(vec![item(), item()]).await.unwrap();
        let popped = q.pop_batch(10, Duration::from_millis(10)).await.unwrap();
        assert_eq!(popped.len(), 2);
        assert_eq!(q.queue_len().await.unwrap(), 0);

        // Simulate a crashed popper: never acked, visibility window already elapsed.
        let requeued = q.reap_stale(Duration::from_millis(0)).await.unwrap();
        assert_eq!(requeued, 2);
        assert_eq!(q.queue_len().await.unwrap(), 2);

        // A second reap is a no-op: the batch is no longer in flight.
        let requeued_again = q.reap_stale(Duration::from_millis(0)).await.unwrap();
        assert_eq!(requeued_again, 0);
    }

    #[tokio::test]
    async fn duplicate_batch_id_returns_original_count() {
        let store = InMemoryIdempotencyStore::new();
        let first = store.check_and_set("b-1", 3, Duration::from_secs(3600)).await.unwrap();
        assert_eq!(first, IdempotencyOutcome::Fresh);

        let second = store.check_and_set("b-1", 999, Duration::from_secs(3600)).await.unwrap();
        assert_eq!(second, IdempotencyOutcome::Duplicate { enqueued: 3 });
    }

    #[tokio::test]
    async fn rate_limiter_denies_after_capacity_exhausted() {
        let limiter = InMemoryRateLimiter::new();
        let bucket = TokenBucket::new(2.0, 0.0);
        for _ in 0..2 {
            let d = limiter.allow("probe-1", bucket, 1.0, Duration::from_secs(600)).await.unwrap();
            assert!(d.allowed);
        }
        let d = limiter.allow("probe-1", bucket, 1.0, Duration::from_secs(600)).await.unwrap();
        assert!(!d.allowed);
    }
}
