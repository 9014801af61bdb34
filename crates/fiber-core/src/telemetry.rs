//! Tracing/log bootstrap, honoring `LOG_LEVEL`, `LOG_FORMAT`, `LOG_SAMPLE_RATE`
//! (spec §6). Grounded on the `tracing_subscriber::fmt()` bootstrap every
//! teacher example uses; `LOG_FORMAT=json` switches to the JSON formatter.

use crate::config::TelemetryConfig;
use tracing_subscriber::EnvFilter;

/// Initializes the global tracing subscriber. Call once, at process start,
/// before spawning any worker loop.
pub fn init(cfg: &TelemetryConfig) {
    let filter = EnvFilter::try_new(&cfg.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    if cfg.log_format == "json" {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .with_current_span(true)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .compact()
            .init();
    }
}

/// Whether a high-volume, non-critical debug span should be emitted this
/// time, per `LOG_SAMPLE_RATE`. Never applied to error/audit/conflict paths —
/// only to per-sample collection/forward spans (spec §9A).
pub fn should_sample(sample_rate: f64) -> bool {
    if sample_rate >= 1.0 {
        return true;
    }
    if sample_rate <= 0.0 {
        return false;
    }
    rand::random::<f64>() < sample_rate
}
