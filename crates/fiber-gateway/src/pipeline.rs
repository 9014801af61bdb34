//! The request pipeline steps shared by `/push` and `/ingest` (spec §4.2):
//! auth, rate limit. Size-gate and validation live inline in the handlers
//! since they operate on already-parsed, endpoint-specific shapes.

use crate::state::AppState;
use fiber_auth::ProbeClaims;
use fiber_core::{Decision, FiberError, TokenBucket};
use std::time::Duration;

/// Step 1: bearer token verification (spec §4.2 step 1).
pub fn authenticate(state: &AppState, bearer: Option<&str>, declared_region: Option<&str>) -> Result<ProbeClaims, FiberError> {
    let token = bearer.ok_or_else(|| FiberError::AuthFailure("missing bearer token".into()))?;
    state.verifier.verify(token, declared_region)
}

/// Step 5: token-bucket rate limit, per-probe bucket checked first, then the
/// global ceiling (spec §4.5, §9B "global rate-limit ceiling"). Fails closed
/// on backend error after the single attempt — the queue/cache backend is
/// itself expected to retry internally; the gateway does not loop here.
pub async fn check_rate_limit(state: &AppState, actor: &str) -> Result<Decision, FiberError> {
    let cfg = &state.rate_limit_config;
    let ttl = Duration::from_secs(cfg.bucket_ttl_s);

    let effective_capacity = cfg.ingest_burst.min(cfg.global_capacity * cfg.max_probe_fraction_of_global);
    let probe_bucket = TokenBucket::new(effective_capacity, cfg.ingest_rate_per_sec);
    let probe_decision = state.rate_limiter.allow(actor, probe_bucket, 1.0, ttl).await?;
    if !probe_decision.allowed {
        return Err(FiberError::RateLimited {
            retry_after: probe_decision.retry_after_duration().unwrap_or(Duration::from_secs(1)),
        });
    }

    let global_rate_per_sec = cfg.ingest_rate_per_sec * (cfg.global_capacity / cfg.ingest_burst);
    let global_bucket = TokenBucket::new(cfg.global_capacity, global_rate_per_sec);
    let global_decision = state.rate_limiter.allow("global", global_bucket, 1.0, ttl).await?;
    if !global_decision.allowed {
        return Err(FiberError::RateLimited {
            retry_after: global_decision.retry_after_duration().unwrap_or(Duration::from_secs(1)),
        });
    }

    Ok(probe_decision)
}
