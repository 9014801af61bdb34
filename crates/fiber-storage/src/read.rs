//! The gateway-facing query-only path (spec §4.2 "`/status` and `/metrics`
//! use a query-only path, never the write path" — I-Central-Writer applies
//! to the whole storage tier, not just the sample table).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fiber_core::FiberResult;
use serde::Serialize;

#[derive(Debug, Clone, Default)]
pub struct MetricsQuery {
    pub node_id: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub limit: u32,
    pub offset: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricRow {
    pub time: DateTime<Utc>,
    pub node_id: String,
    pub latency_ms: f64,
    pub uptime_pct: f64,
    pub packet_loss_pct: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub db: &'static str,
    pub node_count: i64,
    pub conflict_count: i64,
}

#[async_trait]
pub trait ReadBackend: Send + Sync {
    async fn status(&self) -> FiberResult<StatusReport>;
    async fn query_metrics(&self, query: MetricsQuery) -> FiberResult<Vec<MetricRow>>;
}
