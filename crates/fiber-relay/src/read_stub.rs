//! Regional `/metrics` has no local persistence to query against — only the
//! central ETL writes storage (I-Central-Writer). This stub lets the relay
//! reuse `fiber-gateway`'s router/`AppState` unchanged for intake while
//! returning an honest "not available here" read path.

use async_trait::async_trait;
use fiber_core::FiberResult;
use fiber_storage::{MetricRow, MetricsQuery, ReadBackend, StatusReport};

pub struct RegionalReadStub;

#[async_trait]
impl ReadBackend for RegionalReadStub {
    async fn status(&self) -> FiberResult<StatusReport> {
        Ok(StatusReport { db: "n/a (regional)", node_count: 0, conflict_count: 0 })
    }

    async fn query_metrics(&self, _query: MetricsQuery) -> FiberResult<Vec<MetricRow>> {
        Ok(Vec::new())
    }
}
