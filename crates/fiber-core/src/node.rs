//! The `Node` entity (spec §3): operator-issued identity plus ETL-maintained liveness.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Registered,
    Reporting,
    Deleted,
}

/// A registered probe identity. Created by operator registration or, more
/// commonly, auto-created by the ETL on first sighting with minimal fields
/// (spec §3). Deletion is always logical — `status` flips to `Deleted`, the
/// row is never removed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Node {
    pub node_id: String,
    pub country: String,
    pub region: String,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub status: NodeStatus,
    pub last_seen_at: DateTime<Utc>,
    #[serde(default = "serde_json::Value::default")]
    pub metadata: serde_json::Value,
}

impl Node {
    /// Minimal auto-created row for a `node_id` seen for the first time by the ETL.
    pub fn auto_created(node_id: &str, country: &str, region: &str, seen_at: DateTime<Utc>) -> Self {
        Self {
            node_id: node_id.to_string(),
            country: country.to_string(),
            region: region.to_string(),
            lat: None,
            lng: None,
            status: NodeStatus::Reporting,
            last_seen_at: seen_at,
            metadata: serde_json::Value::Null,
        }
    }
}
