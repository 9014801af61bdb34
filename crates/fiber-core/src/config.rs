//! Environment-driven configuration (spec §6 "Environment configuration").
//!
//! Grounded on the `Envconfig`-derive style used by `rust-capture`'s own
//! ingestion config: one flat struct, `#[envconfig(default = "...")]` for
//! every tunable, nested sub-configs where a concern (rate limiting) has
//! more than one knob.

use envconfig::Envconfig;

#[derive(Envconfig, Clone, Debug)]
pub struct ProbeConfig {
    #[envconfig(from = "NODE_ID")]
    pub node_id: String,
    #[envconfig(from = "REGION")]
    pub region: String,
    #[envconfig(from = "COUNTRY")]
    pub country: String,
    #[envconfig(from = "API_ENDPOINT")]
    pub api_endpoint: String,
    #[envconfig(from = "REGIONAL_ENDPOINT")]
    pub regional_endpoint: Option<String>,
    #[envconfig(from = "FEDERATION_SECRET")]
    pub federation_secret: Option<String>,

    #[envconfig(from = "INTERVAL", default = "60")]
    pub interval_s: u64,
    #[envconfig(from = "MAX_RETRIES", default = "3")]
    pub max_retries: u32,
    #[envconfig(from = "RETRY_BACKOFF_BASE", default = "2.0")]
    pub retry_backoff_base: f64,
    #[envconfig(from = "REQUEST_TIMEOUT", default = "10")]
    pub request_timeout_s: u64,
    #[envconfig(from = "MAX_BUFFER", default = "1000")]
    pub max_buffer: usize,

    #[envconfig(default = "50")]
    pub flush_batch_size: usize,
    #[envconfig(default = "120")]
    pub stickiness_s: u64,
    #[envconfig(default = "5")]
    pub shutdown_grace_s: u64,
}

#[derive(Envconfig, Clone, Debug)]
pub struct RateLimitConfig {
    #[envconfig(from = "RATE_LIMIT_INGEST_RATE", default = "1.6666667")]
    pub ingest_rate_per_sec: f64, // 100 req/min per probe, spec §6 defaults
    #[envconfig(from = "RATE_LIMIT_INGEST_BURST", default = "100")]
    pub ingest_burst: f64,
    #[envconfig(from = "RATE_LIMIT_GLOBAL_MAX", default = "10000")]
    pub global_capacity: f64,
    /// No single probe may sustain more than this fraction of the global budget (spec §4.5 Fairness).
    #[envconfig(default = "0.2")]
    pub max_probe_fraction_of_global: f64,
    #[envconfig(default = "600")]
    pub bucket_ttl_s: u64,
}

#[derive(Envconfig, Clone, Debug)]
pub struct GatewayConfig {
    #[envconfig(from = "JWT_PUBLIC_KEY")]
    pub jwt_public_key: String,
    #[envconfig(from = "QUEUE_URL")]
    pub queue_url: String,
    #[envconfig(from = "DB_URL")]
    pub db_url: String,
    #[envconfig(from = "DLQ_DIR", default = "fiber:etl:dlq")]
    pub dlq_key: String,
    #[envconfig(default = "0.0.0.0:8080")]
    pub bind_addr: String,
    #[envconfig(default = "3600")]
    pub idempotency_ttl_s: u64,
    /// Open Question resolution (spec §9): disabled unless explicitly configured.
    pub dlq_degrade_threshold: Option<u64>,
    #[envconfig(nested = true)]
    pub rate_limit: RateLimitConfig,
}

#[derive(Envconfig, Clone, Debug)]
pub struct EtlConfig {
    #[envconfig(from = "QUEUE_URL")]
    pub queue_url: String,
    #[envconfig(from = "DB_URL")]
    pub db_url: String,
    #[envconfig(from = "BATCH_SIZE", default = "100")]
    pub batch_size: usize,
    #[envconfig(default = "200")]
    pub idle_backoff_ms: u64,
    #[envconfig(default = "1000")]
    pub batch_pop_timeout_ms: u64,
    #[envconfig(default = "10")]
    pub heartbeat_s: u64,
    #[envconfig(default = "5")]
    pub max_persist_retries: u32,
    /// Exponential backoff base between persist retries: delay is
    /// `persist_retry_backoff_base ^ attempt` seconds (spec §7
    /// `TransientBackendFailure`: "retry with exponential backoff up to a cap").
    #[envconfig(default = "2.0")]
    pub persist_retry_backoff_base: f64,
    #[envconfig(from = "DLQ_DIR", default = "fiber:etl:dlq")]
    pub dlq_key: String,
    #[envconfig(default = "4")]
    pub worker_count: usize,
    /// How long a popped-but-unacked batch may sit in flight before the
    /// reaper assumes its popper died and requeues it (spec §8 "ETL crash
    /// mid-batch").
    #[envconfig(default = "60")]
    pub visibility_timeout_s: u64,
    #[envconfig(default = "15")]
    pub reap_interval_s: u64,
}

#[derive(Envconfig, Clone, Debug)]
pub struct RelayConfig {
    #[envconfig(from = "REGION")]
    pub region: String,
    #[envconfig(from = "API_ENDPOINT")]
    pub central_endpoint: String,
    #[envconfig(from = "QUEUE_URL")]
    pub regional_queue_url: String,
    #[envconfig(from = "JWT_PUBLIC_KEY")]
    pub jwt_public_key: String,
    /// Central-issued, revocable token this relay presents on the central hop
    /// (spec §4.3 Topology: "central issues scoped, revocable tokens to regionals").
    #[envconfig(from = "FEDERATION_SECRET")]
    pub relay_token: Option<String>,
    #[envconfig(default = "0.0.0.0:8081")]
    pub bind_addr: String,
    #[envconfig(nested = true)]
    pub rate_limit: RateLimitConfig,
    #[envconfig(default = "3600")]
    pub idempotency_ttl_s: u64,
    #[envconfig(default = "./data/regional-buffer")]
    pub buffer_dir: String,
    #[envconfig(default = "1000")]
    pub forward_batch_size: usize,
    #[envconfig(default = "3")]
    pub unreachable_threshold: u32,
    #[envconfig(default = "30")]
    pub health_probe_interval_s: u64,
    /// 24h of samples at the configured batch rate, expressed as a buffer item cap.
    #[envconfig(default = "86400")]
    pub buffer_high_water: u64,
    #[envconfig(default = "43200")]
    pub buffer_low_water: u64,
    /// Mirrors `EtlConfig::visibility_timeout_s` for the regional buffer's
    /// own in-flight set — recovers a batch stuck mid-forward if the
    /// forwarder task itself stalls without the process dying.
    #[envconfig(default = "60")]
    pub visibility_timeout_s: u64,
}

#[derive(Envconfig, Clone, Debug)]
pub struct TelemetryConfig {
    #[envconfig(from = "LOG_LEVEL", default = "info")]
    pub log_level: String,
    #[envconfig(from = "LOG_FORMAT", default = "json")]
    pub log_format: String,
    #[envconfig(from = "LOG_SAMPLE_RATE", default = "1.0")]
    pub log_sample_rate: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_defaults_match_spec_wire_limits() {
        let cfg = RateLimitConfig::init_from_hashmap(&std::collections::HashMap::new()).unwrap();
        assert_eq!(cfg.ingest_burst, 100.0);
        // 100 req/min == ~1.667 req/sec
        assert!((cfg.ingest_rate_per_sec - 100.0 / 60.0).abs() < 1e-6);
    }
}
