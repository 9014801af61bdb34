//! Queue, DLQ, idempotency index and rate-limit cache behind one set of
//! traits, with a Redis-backed production implementation and an in-memory
//! implementation for tests and degraded-mode fallback.

pub mod backend;
pub mod memory;
pub mod redis_backend;

pub use backend::{IdempotencyOutcome, IdempotencyStore, QueueBackend, RateLimitBackend};
pub use memory::{InMemoryIdempotencyStore, InMemoryQueue, InMemoryRateLimiter};
pub use redis_backend::{RedisIdempotencyStore, RedisQueue, RedisRateLimiter};
