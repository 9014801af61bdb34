//! The ETL-only write path (spec §5 "only ETL writes to sample/node/conflict
//! tables", I-Central-Writer). `fiber-gateway` must never import this
//! module's trait for its own use — only `fiber-etl` drives it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fiber_core::{ConflictRecord, FiberResult, Node, Sample};

/// Result of persisting one normalized batch (spec §4.4 step 4).
#[derive(Debug, Clone, Default)]
pub struct PersistOutcome {
    pub inserted: usize,
    pub conflicts: Vec<ConflictRecord>,
}

#[async_trait]
pub trait WriteBackend: Send + Sync {
    /// Insert-on-absent with minimal fields; bumps `last_seen_at` to
    /// `max(existing, seen_at)` and never overwrites operator-set geo/country
    /// fields (spec §4.4 step 3).
    async fn upsert_node(&self, node_id: &str, seen_at: DateTime<Utc>) -> FiberResult<Node>;

    /// Applies an operator-provided registration, creating or updating the
    /// operator-owned fields directly (node does not yet exist, or the
    /// operator is correcting metadata — distinct from the ETL's
    /// first-sighting auto-create).
    async fn register_node(&self, node: Node) -> FiberResult<Node>;

    /// Soft-deletes a node (status -> deleted); never a hard delete (spec §3).
    async fn delete_node(&self, node_id: &str) -> FiberResult<()>;

    /// Inserts all samples in one transaction; rows violating the unique
    /// `(time, node_id)` constraint are captured into the conflict table
    /// instead of failing the batch (spec §4.4 step 4, I-Dedup-Sample).
    ///
    /// Each sample carries its own originating `ingest_region`: a popped
    /// batch routinely mixes items from several regions (gateway, relays),
    /// so a conflict record must cite the region of the specific sample that
    /// lost the race, not the region of whichever item happened to be first
    /// in the batch (spec §8 scenario 3).
    async fn insert_samples(&self, samples: Vec<(Sample, Option<String>)>) -> FiberResult<PersistOutcome>;

    /// Appends a tamper-evident audit entry for a privileged action (spec §3
    /// Audit entry, §9B). Returns the entry actually stored (with its
    /// computed hash) so callers can log it.
    async fn append_audit_entry(&self, action: &str, actor: &str) -> FiberResult<crate::audit::AuditEntry>;
}
