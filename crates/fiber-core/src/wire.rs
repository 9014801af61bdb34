//! Wire-level sample shape (spec §6 "Sample wire shape (push)") and its
//! conversion into the internal [`crate::Sample`]. Shared by every component
//! that speaks the HTTP ingest contract: the gateway (request bodies), the
//! relay (re-serializing on the forward hop), and the probe (posting in the
//! first place).

use crate::sample::Sample;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SampleWire {
    pub node_id: String,
    pub country: String,
    pub region: String,
    pub latency_ms: f64,
    pub uptime_pct: f64,
    #[serde(rename = "packet_loss")]
    pub packet_loss_pct: f64,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub target_host: String,
    #[serde(default = "default_probe_type")]
    pub probe_type: String,
    #[serde(default = "serde_json::Value::default")]
    pub metadata: serde_json::Value,
}

fn default_probe_type() -> String {
    "unspecified".to_string()
}

impl From<SampleWire> for Sample {
    fn from(wire: SampleWire) -> Self {
        Sample {
            node_id: wire.node_id,
            timestamp: wire.timestamp,
            latency_ms: wire.latency_ms,
            uptime_pct: wire.uptime_pct,
            packet_loss_pct: wire.packet_loss_pct,
            target_host: wire.target_host,
            probe_type: wire.probe_type,
            country: wire.country,
            region: wire.region,
            metadata: wire.metadata,
        }
    }
}

/// Used by `fiber-probe` when posting collected samples and by `fiber-relay`
/// when re-serializing buffered samples for the central `/ingest` hop (spec
/// §4.1 step 2, §4.3 forward path).
impl From<Sample> for SampleWire {
    fn from(sample: Sample) -> Self {
        SampleWire {
            node_id: sample.node_id,
            country: sample.country,
            region: sample.region,
            latency_ms: sample.latency_ms,
            uptime_pct: sample.uptime_pct,
            packet_loss_pct: sample.packet_loss_pct,
            timestamp: sample.timestamp,
            target_host: sample.target_host,
            probe_type: sample.probe_type,
            metadata: sample.metadata,
        }
    }
}
