//! Batch normalization and persistence (spec §4.4 steps 2-4).

use fiber_core::{sample::canonical_region, FailureStamp, FiberError, QueueItem};
use fiber_storage::WriteBackend;
use std::collections::HashSet;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("persistence failed: {0}")]
    Persist(#[from] FiberError),
    #[error(transparent)]
    Bulkhead(#[from] tower_resilience_bulkhead::BulkheadError),
}

#[derive(Debug, Clone)]
pub struct ProcessOutcome {
    pub inserted: usize,
    pub conflicts: usize,
}

/// Normalizes every sample in the batch (spec §4.4 step 2: bounds clip,
/// timestamp truncation, region canonicalization), upserts the node registry
/// for every distinct `node_id` seen (step 3), then persists the batch in one
/// transaction (step 4).
pub async fn process_batch(
    mut items: Vec<QueueItem>,
    storage: Arc<dyn WriteBackend>,
) -> Result<ProcessOutcome, ProcessError> {
    let mut seen_nodes = HashSet::new();
    for item in &mut items {
        item.envelope.sample.clip_bounds();
        item.envelope.sample.normalize_timestamp();
        item.envelope.sample.region =
            canonical_region(&item.envelope.sample.country, &item.envelope.sample.region);
        seen_nodes.insert(item.envelope.sample.node_id.clone());
    }

    for node_id in &seen_nodes {
        let seen_at = items
            .iter()
            .filter(|item| &item.envelope.sample.node_id == node_id)
            .map(|item| item.envelope.sample.timestamp)
            .max()
            .unwrap_or_else(chrono::Utc::now);
        storage.upsert_node(node_id, seen_at).await?;
    }

    // Each item keeps its own `ingest_region`: a popped batch routinely mixes
    // samples from several regions, so the conflict log must cite the region
    // of the specific sample that lost the race (spec §8 scenario 3), not
    // whichever item happened to be first in the batch.
    let samples = items
        .into_iter()
        .map(|item| (item.envelope.sample, item.envelope.ingest_region))
        .collect();
    let outcome = storage.insert_samples(samples).await?;

    Ok(ProcessOutcome { inserted: outcome.inserted, conflicts: outcome.conflicts.len() })
}

/// Builds the DLQ-bound item after `max_retries` persist failures (spec §4.4 step 5).
pub fn stamp_for_dlq(mut item: QueueItem, reason: String, attempts: u32) -> QueueItem {
    item.failure = Some(FailureStamp { reason, attempts, failed_at: chrono::Utc::now() });
    item
}
