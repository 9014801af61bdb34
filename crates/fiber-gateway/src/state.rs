//! Shared application state (spec §5: "no shared mutable state in-process
//! beyond connection pools and the rate-limit cache").

use fiber_auth::TokenVerifier;
use fiber_core::config::RateLimitConfig;
use fiber_queue::{IdempotencyStore, QueueBackend, RateLimitBackend};
use fiber_storage::ReadBackend;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub verifier: Arc<TokenVerifier>,
    pub queue: Arc<dyn QueueBackend>,
    pub idempotency: Arc<dyn IdempotencyStore>,
    pub rate_limiter: Arc<dyn RateLimitBackend>,
    pub storage: Arc<dyn ReadBackend>,
    pub rate_limit_config: Arc<RateLimitConfig>,
    pub idempotency_ttl_s: u64,
    pub dlq_degrade_threshold: Option<u64>,
    /// `"central"` for the gateway, `"regional"` when this router is reused
    /// by `fiber-relay` for intake (spec §4.3 "same gateway shape").
    pub role: &'static str,
}

impl AppState {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        verifier: Arc<TokenVerifier>,
        queue: Arc<dyn QueueBackend>,
        idempotency: Arc<dyn IdempotencyStore>,
        rate_limiter: Arc<dyn RateLimitBackend>,
        storage: Arc<dyn ReadBackend>,
        rate_limit_config: RateLimitConfig,
        idempotency_ttl_s: u64,
        dlq_degrade_threshold: Option<u64>,
        role: &'static str,
    ) -> Self {
        Self {
            verifier,
            queue,
            idempotency,
            rate_limiter,
            storage,
            rate_limit_config: Arc::new(rate_limit_config),
            idempotency_ttl_s,
            dlq_degrade_threshold,
            role,
        }
    }
}
