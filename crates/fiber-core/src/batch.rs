//! `Batch`, `Envelope` and `QueueItem` (spec §3): the units that move between
//! the gateway, the queue, and the ETL.

use crate::error::FiberError;
use crate::sample::Sample;
use serde::{Deserialize, Serialize};

pub const MAX_BATCH_SAMPLES: usize = 1000;
pub const MAX_BATCH_BYTES: usize = 10 * 1024 * 1024;
pub const MAX_SAMPLE_BYTES: usize = 4 * 1024;

/// A batch of samples sharing one idempotency key (`batch_id`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Batch {
    pub batch_id: String,
    pub samples: Vec<Sample>,
    pub source_region: Option<String>,
    pub trace_id: String,
}

impl Batch {
    /// Size-gate checks from spec §4.2 step 2. Oversized payload bytes map to
    /// 413; an over-cardinality batch stays 400.
    pub fn check_size(&self, payload_bytes: usize) -> Result<(), FiberError> {
        if payload_bytes > MAX_BATCH_BYTES {
            return Err(FiberError::PayloadTooLarge(format!(
                "payload {payload_bytes} bytes exceeds {MAX_BATCH_BYTES}"
            )));
        }
        if self.samples.len() > MAX_BATCH_SAMPLES {
            return Err(FiberError::MalformedInput(format!(
                "batch has {} samples, exceeds {MAX_BATCH_SAMPLES}",
                self.samples.len()
            )));
        }
        Ok(())
    }

    /// Validates every sample; the first offender aborts the whole batch (spec §4.2 step 3).
    pub fn validate_samples(&self) -> Result<(), FiberError> {
        for sample in &self.samples {
            sample.validate()?;
        }
        Ok(())
    }
}

/// The `_meta` wrapper attached to every sample on enqueue (spec §3/§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub sample: Sample,
    pub trace_id: String,
    pub ingest_region: Option<String>,
    pub ingest_ts: chrono::DateTime<chrono::Utc>,
}

/// A batch of items popped from a [`crate::FiberResult`]-returning queue
/// backend, tagged with an opaque `token` identifying this pop so the
/// popper can later `ack_batch` it (spec §4.4 step 1 / §8 I-At-Least-Once:
/// a crash between pop and ack must make the batch redeliverable).
#[derive(Debug, Clone, Default)]
pub struct PoppedBatch {
    pub token: String,
    pub items: Vec<QueueItem>,
}

impl PoppedBatch {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }
}

/// An item as it sits in the durable queue (`fiber:etl:queue`) or the DLQ
/// (`fiber:etl:dlq`, with a failure stamp attached on routing).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueItem {
    pub envelope: Envelope,
    /// Number of persist attempts already made on this item. Bumped by
    /// `fiber-etl`'s retry loop each time a batch is re-enqueued after a
    /// storage failure; compared against `max_persist_retries` to decide
    /// whether the next failure routes to the DLQ (spec §4.4 step 5 / §7
    /// `TransientBackendFailure`).
    #[serde(default)]
    pub persist_attempts: u32,
    /// Present only once a pop/persist attempt has failed and the item has
    /// been routed to the dead-letter queue.
    pub failure: Option<FailureStamp>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureStamp {
    pub reason: String,
    pub attempts: u32,
    pub failed_at: chrono::DateTime<chrono::Utc>,
}

/// Operator-originated privileged actions. These travel through the queue
/// rather than being written directly by the gateway, so the ETL remains the
/// sole writer to the node table (spec §5 "Storage: only ETL writes…",
/// I-Central-Writer) even for actions that are not per-sample ingestion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AdminCommand {
    DeleteNode { node_id: String, actor: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::Sample;
    use chrono::Utc;

    fn sample() -> Sample {
        Sample {
            node_id: "p1".into(),
            timestamp: Utc::now(),
            latency_ms: 1.0,
            uptime_pct: 100.0,
            packet_loss_pct: 0.0,
            target_host: "h".into(),
            probe_type: "icmp".into(),
            country: "GH".into(),
            region: "Accra".into(),
            metadata: serde_json::json!({}),
        }
    }

    #[test]
    fn batch_of_1000_accepted_1001_rejected() {
        let b1000 = Batch {
            batch_id: "b".into(),
            samples: (0..1000).map(|_| sample()).collect(),
            source_region: None,
            trace_id: "t".into(),
        };
        assert!(b1000.check_size(100).is_ok());

        let b1001 = Batch {
            batch_id: "b".into(),
            samples: (0..1001).map(|_| sample()).collect(),
            source_region: None,
            trace_id: "t".into(),
        };
        assert!(b1001.check_size(100).is_err());
    }

    #[test]
    fn payload_exactly_10mb_accepted_plus_one_byte_rejected() {
        let b = Batch { batch_id: "b".into(), samples: vec![], source_region: None, trace_id: "t".into() };
        assert!(b.check_size(MAX_BATCH_BYTES).is_ok());
        assert!(b.check_size(MAX_BATCH_BYTES + 1).is_err());
    }
}
