//! `ConflictRecord` (spec §3): the append-only audit trail for samples
//! rejected by the unique `(time, node_id)` constraint.

use crate::sample::Sample;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictRecord {
    pub time: DateTime<Utc>,
    pub node_id: String,
    pub payload: Sample,
    pub conflict_at: DateTime<Utc>,
    pub ingest_region: Option<String>,
}

impl ConflictRecord {
    pub fn from_rejected(sample: Sample, ingest_region: Option<String>) -> Self {
        Self {
            time: sample.timestamp,
            node_id: sample.node_id.clone(),
            payload: sample,
            conflict_at: Utc::now(),
            ingest_region,
        }
    }
}
