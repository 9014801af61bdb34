//! In-memory storage for integration tests (spec §8 scenarios) — same
//! conflict-on-unique-key semantics as [`crate::postgres::PostgresStorage`]
//! without a live database.

use crate::audit::{AuditEntry, GENESIS_HASH};
use crate::read::{MetricRow, MetricsQuery, ReadBackend, StatusReport};
use crate::write::{PersistOutcome, WriteBackend};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fiber_core::{ConflictRecord, FiberResult, Node, NodeStatus, Sample};
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Default)]
pub struct InMemoryStorage {
    samples: Mutex<HashMap<(String, i64), Sample>>,
    nodes: Mutex<HashMap<String, Node>>,
    conflicts: Mutex<Vec<ConflictRecord>>,
    audit_log: Mutex<Vec<AuditEntry>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn conflict_count(&self) -> usize {
        self.conflicts.lock().unwrap().len()
    }

    pub fn sample_count(&self) -> usize {
        self.samples.lock().unwrap().len()
    }

    pub fn audit_entries(&self) -> Vec<AuditEntry> {
        self.audit_log.lock().unwrap().clone()
    }
}

fn sample_key(sample: &Sample) -> (String, i64) {
    (sample.node_id.clone(), sample.timestamp.timestamp_millis())
}

#[async_trait]
impl WriteBackend for InMemoryStorage {
    async fn upsert_node(&self, node_id: &str, seen_at: DateTime<Utc>) -> FiberResult<Node> {
        let mut nodes = self.nodes.lock().unwrap();
        let node = nodes
            .entry(node_id.to_string())
            .and_modify(|n| n.last_seen_at = n.last_seen_at.max(seen_at))
            .or_insert_with(|| Node::auto_created(node_id, "", "", seen_at));
        Ok(node.clone())
    }

    async fn register_node(&self, node: Node) -> FiberResult<Node> {
        let mut nodes = self.nodes.lock().unwrap();
        nodes.insert(node.node_id.clone(), node.clone());
        Ok(node)
    }

    async fn delete_node(&self, node_id: &str) -> FiberResult<()> {
        let mut nodes = self.nodes.lock().unwrap();
        if let Some(node) = nodes.get_mut(node_id) {
            node.status = NodeStatus::Deleted;
        }
        Ok(())
    }

    async fn insert_samples(&self, samples: Vec<(Sample, Option<String>)>) -> FiberResult<PersistOutcome> {
        let mut store = self.samples.lock().unwrap();
        let mut conflicts_log = self.conflicts.lock().unwrap();
        let mut outcome = PersistOutcome::default();

        for (sample, ingest_region) in samples {
            let key = sample_key(&sample);
            if store.contains_key(&key) {
                let conflict = ConflictRecord::from_rejected(sample, ingest_region);
                conflicts_log.push(conflict.clone());
                outcome.conflicts.push(conflict);
            } else {
                store.insert(key, sample);
                outcome.inserted += 1;
            }
        }

        Ok(outcome)
    }

    async fn append_audit_entry(&self, action: &str, actor: &str) -> FiberResult<AuditEntry> {
        let mut log = self.audit_log.lock().unwrap();
        let prev_hash = log.last().map(|e| e.hash.clone()).unwrap_or_else(|| GENESIS_HASH.to_string());
        let entry = AuditEntry::next(&prev_hash, action, actor, Utc::now());
        log.push(entry.clone());
        Ok(entry)
    }
}

#[async_trait]
impl ReadBackend for InMemoryStorage {
    async fn status(&self) -> FiberResult<StatusReport> {
        Ok(StatusReport {
            db: "ok",
            node_count: self.nodes.lock().unwrap().len() as i64,
            conflict_count: self.conflicts.lock().unwrap().len() as i64,
        })
    }

    async fn query_metrics(&self, query: MetricsQuery) -> FiberResult<Vec<MetricRow>> {
        let store = self.samples.lock().unwrap();
        let mut rows: Vec<MetricRow> = store
            .values()
            .filter(|s| query.node_id.as_deref().map_or(true, |id| id == s.node_id))
            .filter(|s| query.since.map_or(true, |since| s.timestamp >= since))
            .map(|s| MetricRow {
                time: s.timestamp,
                node_id: s.node_id.clone(),
                latency_ms: s.latency_ms,
                uptime_pct: s.uptime_pct,
                packet_loss_pct: s.packet_loss_pct,
            })
            .collect();
        rows.sort_by(|a, b| b.time.cmp(&a.time));

        let offset = query.offset as usize;
        let limit = if query.limit == 0 { 100 } else { query.limit as usize };
        Ok(rows.into_iter().skip(offset).take(limit).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample(node_id: &str, ts: DateTime<Utc>) -> Sample {
        Sample {
            node_id: node_id.into(),
            timestamp: ts,
            latency_ms: 10.0,
            uptime_pct: 100.0,
            packet_loss_pct: 0.0,
            target_host: "h".into(),
            probe_type: "icmp".into(),
            country: "GH".into(),
            region: "Accra".into(),
            metadata: serde_json::json!({}),
        }
    }

    #[tokio::test]
    async fn duplicate_time_node_pair_becomes_a_conflict_not_a_failure() {
        let storage = InMemoryStorage::new();
        let t = Utc.with_ymd_and_hms(2025, 12, 30, 12, 0, 0).unwrap();

        let first = storage.insert_samples(vec![(sample("p1", t), None)]).await.unwrap();
        assert_eq!(first.inserted, 1);
        assert!(first.conflicts.is_empty());

        let second = storage.insert_samples(vec![(sample("p1", t), Some("eu-west".into()))]).await.unwrap();
        assert_eq!(second.inserted, 0);
        assert_eq!(second.conflicts.len(), 1);
        assert_eq!(second.conflicts[0].ingest_region.as_deref(), Some("eu-west"));
        assert_eq!(storage.sample_count(), 1);
        assert_eq!(storage.conflict_count(), 1);
    }

    #[tokio::test]
    async fn audit_entries_chain_across_calls() {
        let storage = InMemoryStorage::new();
        storage.append_audit_entry("node.create", "operator-1").await.unwrap();
        storage.append_audit_entry("node.delete", "operator-2").await.unwrap();

        let entries = storage.audit_entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].prev_hash, entries[0].hash);
        assert!(entries.iter().all(|e| e.verify()));
    }
}
