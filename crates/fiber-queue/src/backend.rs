//! Backend-agnostic traits for the durable queue, DLQ, idempotency index, and
//! rate-limit cache (spec §3 persisted-state table, §9 "shared mutable state
//! → atomic RMW primitive"). `fiber-gateway`, `fiber-relay` and `fiber-etl`
//! all program against these traits; swapping Redis for an in-memory backend
//! in tests changes nothing about their logic.

use async_trait::async_trait;
use fiber_core::{AdminCommand, FiberResult, PoppedBatch, QueueItem, TokenBucket};
use std::time::Duration;

/// The durable FIFO queue (`fiber:etl:queue`) plus its dead-letter sibling
/// (`fiber:etl:dlq`). The gateway is the only writer; the ETL is the only
/// reader (spec §5 "no other reader permitted").
#[async_trait]
pub trait QueueBackend: Send + Sync {
    /// Appends items to the tail of the queue. This is the gateway's commit
    /// point (spec §4.2 step 6) — once this returns `Ok`, the samples are
    /// durably enqueued even if the gateway process dies immediately after.
    async fn enqueue(&self, items: Vec<QueueItem>) -> FiberResult<()>;

    /// Atomically removes up to `max` items from the head of the queue in one
    /// indivisible operation (spec §4.4 step 1, I-At-Least-Once) — two
    /// workers must never be able to split a batch. Blocks up to `timeout`
    /// before returning an empty batch. Popped items are not gone for good:
    /// they move into an in-flight set keyed by the returned token until
    /// [`QueueBackend::ack_batch`] confirms they were durably handled.
    async fn pop_batch(&self, max: usize, timeout: Duration) -> FiberResult<PoppedBatch>;

    /// Confirms a popped batch was durably handled (persisted, or explicitly
    /// routed to retry/DLQ) and clears it from the in-flight set. A popper
    /// that dies before calling this leaves the batch to `reap_stale`.
    async fn ack_batch(&self, token: &str) -> FiberResult<()>;

    /// Requeues any in-flight batch whose pop is older than
    /// `visibility_timeout` and never got a matching `ack_batch` —
    /// the recovery path for a popper that crashed between pop and ack
    /// (spec §8 scenario: "ETL crash mid-batch"). Returns the number of
    /// items requeued.
    async fn reap_stale(&self, visibility_timeout: Duration) -> FiberResult<u64>;

    /// Routes unacknowledged items to the DLQ with a failure stamp attached
    /// (spec §4.4 step 5).
    async fn push_dlq(&self, items: Vec<QueueItem>) -> FiberResult<()>;

    async fn queue_len(&self) -> FiberResult<u64>;
    async fn dlq_len(&self) -> FiberResult<u64>;

    /// Enqueues an operator-originated privileged action (spec §9B) so the
    /// ETL remains the sole writer to the node table.
    async fn enqueue_admin(&self, cmd: AdminCommand) -> FiberResult<()>;
    async fn pop_admin(&self) -> FiberResult<Option<AdminCommand>>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum IdempotencyOutcome {
    /// First time this `batch_id` has been seen within the retention window.
    Fresh,
    /// Already processed; the original enqueued count is echoed back as-is
    /// (spec §4.2 step 4, §8 I-Idempotent-Batch).
    Duplicate { enqueued: usize },
}

/// The short-lived idempotency index keyed `fiber:batch:<id>` (spec §3/§6).
#[async_trait]
pub trait IdempotencyStore: Send + Sync {
    /// Atomically checks-and-sets: if `batch_id` is unseen, records
    /// `enqueued_count` under it with `ttl` and returns `Fresh`; otherwise
    /// returns the count recorded on the *first* sighting.
    async fn check_and_set(
        &self,
        batch_id: &str,
        enqueued_count: usize,
        ttl: Duration,
    ) -> FiberResult<IdempotencyOutcome>;
}

/// The rate-limit cache keyed `fiber:rl:<key>` (spec §4.5). Implementations
/// must perform the read-modify-write as a single critical section (spec §9
/// Design Note) — a Lua script server-side for Redis, a `Mutex` locally.
#[async_trait]
pub trait RateLimitBackend: Send + Sync {
    async fn allow(
        &self,
        key: &str,
        bucket: TokenBucket,
        requested: f64,
        ttl: Duration,
    ) -> FiberResult<fiber_core::Decision>;
}
