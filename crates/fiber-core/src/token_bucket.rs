//! The token-bucket primitive shared by the gateway and the relay (spec §4.5).
//!
//! This module is deliberately backend-agnostic: it is pure state plus a
//! transition function, the same separation `tower-resilience-ratelimiter`
//! draws between its window *state* structs and the `SharedRateLimiter` that
//! wraps them for concurrent access. `fiber-queue`'s Redis backend drives
//! this logic from inside a Lua script (atomic server-side RMW); the
//! in-memory backend drives it from behind a `std::sync::Mutex` — the
//! "documented degraded fallback" the spec calls out under Atomicity.

use std::time::Duration;

/// `(tokens, last_refill)` — the only state a bucket needs (spec §3 Rate-limit bucket).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BucketState {
    pub tokens: f64,
    pub last_refill_secs: f64,
}

impl BucketState {
    pub fn full(capacity: f64, now_secs: f64) -> Self {
        Self { tokens: capacity, last_refill_secs: now_secs }
    }
}

/// Static parameters of a bucket: how fast it refills and how big it can get.
#[derive(Debug, Clone, Copy)]
pub struct TokenBucket {
    pub capacity: f64,
    pub rate_per_sec: f64,
}

/// Outcome of an `allow` call (spec §4.5 contract).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Decision {
    pub allowed: bool,
    pub remaining: f64,
    /// Seconds until the bucket would be fully refilled from its state at decision time.
    pub reset_at_secs: f64,
    /// `None` when allowed; `Some(seconds)` the caller should wait before retrying.
    pub retry_after: Option<f64>,
}

impl TokenBucket {
    pub fn new(capacity: f64, rate_per_sec: f64) -> Self {
        Self { capacity, rate_per_sec }
    }

    /// Implements the exact algorithm in spec §4.5 steps 1-5. `state` is the
    /// bucket's persisted state before the call; the returned tuple is the
    /// decision plus the state to persist back (steps 4).
    pub fn allow(&self, state: BucketState, requested: f64, now_secs: f64) -> (Decision, BucketState) {
        let elapsed = (now_secs - state.last_refill_secs).max(0.0);
        let refill = elapsed * self.rate_per_sec;
        let tokens = (state.tokens + refill).min(self.capacity);

        let (allowed, tokens_after, retry_after) = if tokens >= requested {
            (true, tokens - requested, None)
        } else if self.rate_per_sec > 0.0 {
            let wait = (requested - tokens) / self.rate_per_sec;
            (false, tokens, Some(wait))
        } else {
            // rate == 0: once the bucket is dry it never refills (spec §8 boundary behavior).
            (false, tokens, None)
        };

        let new_state = BucketState { tokens: tokens_after, last_refill_secs: now_secs };

        let reset_at_secs = if self.rate_per_sec > 0.0 {
            ((self.capacity - tokens_after) / self.rate_per_sec).max(0.0).ceil()
        } else {
            f64::INFINITY
        };

        (
            Decision { allowed, remaining: tokens_after, reset_at_secs, retry_after },
            new_state,
        )
    }

    /// `allow(key, 0, t)` must be a no-op on bucket state (spec §8 round-trip law):
    /// a zero-cost probe never mutates `tokens` or `last_refill`.
    pub fn peek(&self, state: BucketState, now_secs: f64) -> Decision {
        let elapsed = (now_secs - state.last_refill_secs).max(0.0);
        let tokens = (state.tokens + elapsed * self.rate_per_sec).min(self.capacity);
        let reset_at_secs = if self.rate_per_sec > 0.0 {
            ((self.capacity - tokens) / self.rate_per_sec).max(0.0).ceil()
        } else {
            f64::INFINITY
        };
        Decision { allowed: true, remaining: tokens, reset_at_secs, retry_after: None }
    }
}

impl Decision {
    pub fn retry_after_duration(&self) -> Option<Duration> {
        self.retry_after.map(Duration::from_secs_f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_request_is_read_only() {
        let bucket = TokenBucket::new(10.0, 1.0);
        let state = BucketState::full(10.0, 0.0);
        let (_decision, new_state) = bucket.allow(state, 0.0, 5.0);
        // tokens should have refilled (capped at capacity) but the call itself
        // must not consume anything beyond what elapsed time already implies.
        let (peek_decision, _) = bucket.allow(state, 0.0, 5.0);
        assert_eq!(new_state.tokens, peek_decision.remaining);
    }

    #[test]
    fn replaying_identical_inputs_is_deterministic() {
        let bucket = TokenBucket::new(5.0, 2.0);
        let state = BucketState::full(5.0, 0.0);
        let (d1, s1) = bucket.allow(state, 1.0, 1.0);
        let (d2, s2) = bucket.allow(state, 1.0, 1.0);
        assert_eq!(d1, d2);
        assert_eq!(s1, s2);
    }

    #[test]
    fn rate_zero_denies_after_capacity_exhausted() {
        let bucket = TokenBucket::new(3.0, 0.0);
        let mut state = BucketState::full(3.0, 0.0);
        for _ in 0..3 {
            let (d, s) = bucket.allow(state, 1.0, 0.0);
            assert!(d.allowed);
            state = s;
        }
        let (d, _) = bucket.allow(state, 1.0, 1000.0);
        assert!(!d.allowed, "rate 0 must never refill");
    }

    #[test]
    fn capacity_ten_rate_one_admits_ten_then_denies() {
        let bucket = TokenBucket::new(10.0, 1.0);
        let mut state = BucketState::full(10.0, 0.0);
        let mut accepted = 0;
        let mut denied = 0;
        for _ in 0..12 {
            let (d, s) = bucket.allow(state, 1.0, 0.0);
            state = s;
            if d.allowed { accepted += 1 } else { denied += 1 }
        }
        assert_eq!(accepted, 10);
        assert_eq!(denied, 2);
    }
}
