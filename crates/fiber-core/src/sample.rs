//! The `Sample` entity (spec §3) and the bounds it is validated against.

use crate::error::FiberError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const LATENCY_MS_MIN: f64 = 0.0;
pub const LATENCY_MS_MAX: f64 = 10_000.0;
pub const PERCENT_MIN: f64 = 0.0;
pub const PERCENT_MAX: f64 = 100.0;

/// A single per-minute telemetry reading from a probe.
///
/// `(node_id, timestamp)` uniquely identifies one accepted sample end to end
/// (spec §3, I-Dedup-Sample). Timestamps are monotonic-ish per probe but not
/// guaranteed — storage is the final arbiter via the unique constraint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Sample {
    pub node_id: String,
    pub timestamp: DateTime<Utc>,
    pub latency_ms: f64,
    pub uptime_pct: f64,
    pub packet_loss_pct: f64,
    pub target_host: String,
    pub probe_type: String,
    pub country: String,
    pub region: String,
    #[serde(default = "serde_json::Value::default")]
    pub metadata: serde_json::Value,
}

impl Sample {
    /// Validates the bounds from spec §3 / §8 (boundary behaviors). `country`
    /// must match `[A-Z]{2}` exactly — `"GHA"` and `"gh"` are both rejected.
    pub fn validate(&self) -> Result<(), FiberError> {
        if !(LATENCY_MS_MIN..=LATENCY_MS_MAX).contains(&self.latency_ms) {
            return Err(FiberError::MalformedInput(format!(
                "latency_ms {} out of range [{LATENCY_MS_MIN}, {LATENCY_MS_MAX}]",
                self.latency_ms
            )));
        }
        if !(PERCENT_MIN..=PERCENT_MAX).contains(&self.uptime_pct) {
            return Err(FiberError::MalformedInput(format!(
                "uptime_pct {} out of range [0, 100]",
                self.uptime_pct
            )));
        }
        if !(PERCENT_MIN..=PERCENT_MAX).contains(&self.packet_loss_pct) {
            return Err(FiberError::MalformedInput(format!(
                "packet_loss_pct {} out of range [0, 100]",
                self.packet_loss_pct
            )));
        }
        if !is_alpha2_country(&self.country) {
            return Err(FiberError::MalformedInput(format!(
                "country {:?} must match [A-Z]{{2}}",
                self.country
            )));
        }
        if self.node_id.is_empty() {
            return Err(FiberError::MalformedInput("node_id must not be empty".into()));
        }
        Ok(())
    }

    /// Clips numeric fields into their valid ranges. Used by the ETL normalize
    /// step (spec §4.4) for samples that arrive already bounds-enforced by the
    /// gateway but may have drifted due to float rounding at the wire edge.
    pub fn clip_bounds(&mut self) {
        self.latency_ms = self.latency_ms.clamp(LATENCY_MS_MIN, LATENCY_MS_MAX);
        self.uptime_pct = self.uptime_pct.clamp(PERCENT_MIN, PERCENT_MAX);
        self.packet_loss_pct = self.packet_loss_pct.clamp(PERCENT_MIN, PERCENT_MAX);
    }

    /// Truncates the timestamp to millisecond resolution in UTC (spec §4.4 normalize).
    pub fn normalize_timestamp(&mut self) {
        let ms = self.timestamp.timestamp_millis();
        if let Some(truncated) = DateTime::<Utc>::from_timestamp_millis(ms) {
            self.timestamp = truncated;
        }
    }
}

fn is_alpha2_country(code: &str) -> bool {
    code.len() == 2 && code.chars().all(|c| c.is_ascii_uppercase())
}

/// `lower(country) + '-' + slug(region)` canonicalization (spec §4.4).
pub fn canonical_region(country: &str, region: &str) -> String {
    let slug: String = region
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '-' })
        .collect();
    let slug = slug.split('-').filter(|s| !s.is_empty()).collect::<Vec<_>>().join("-");
    format!("{}-{}", country.to_lowercase(), slug)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample() -> Sample {
        Sample {
            node_id: "p1".into(),
            timestamp: Utc.with_ymd_and_hms(2025, 12, 30, 12, 0, 0).unwrap(),
            latency_ms: 42.0,
            uptime_pct: 100.0,
            packet_loss_pct: 0.0,
            target_host: "1.1.1.1".into(),
            probe_type: "icmp".into(),
            country: "GH".into(),
            region: "Accra".into(),
            metadata: serde_json::json!({}),
        }
    }

    #[test]
    fn accepts_valid_sample() {
        assert!(sample().validate().is_ok());
    }

    #[test]
    fn rejects_latency_out_of_bounds() {
        let mut s = sample();
        s.latency_ms = 10_000.1;
        assert!(s.validate().is_err());

        let mut s = sample();
        s.latency_ms = -0.1;
        assert!(s.validate().is_err());
    }

    #[test]
    fn accepts_latency_boundary_values() {
        let mut s = sample();
        s.latency_ms = 0.0;
        assert!(s.validate().is_ok());
        s.latency_ms = 10_000.0;
        assert!(s.validate().is_ok());
    }

    #[test]
    fn rejects_malformed_country() {
        let mut s = sample();
        s.country = "GHA".into();
        assert!(s.validate().is_err());

        let mut s = sample();
        s.country = "gh".into();
        assert!(s.validate().is_err());
    }

    #[test]
    fn canonical_region_lowercases_and_slugs() {
        assert_eq!(canonical_region("GH", "Greater Accra"), "gh-greater-accra");
        assert_eq!(canonical_region("US", "New York!"), "us-new-york");
    }
}
