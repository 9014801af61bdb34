//! Samples local network vitals plus CPU/memory metadata (spec §4.1 step 1).

use chrono::Utc;
use fiber_core::Sample;
use std::time::Instant;
use sysinfo::System;

pub struct Collector {
    system: System,
    node_id: String,
    country: String,
    region: String,
    target_host: String,
    client: reqwest::Client,
    consecutive_probe_failures: u32,
    probes_attempted: u64,
    probes_succeeded: u64,
}

impl Collector {
    pub fn new(node_id: String, country: String, region: String, target_host: String, request_timeout: std::time::Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .expect("reqwest client builds with a finite timeout");

        Self {
            system: System::new(),
            node_id,
            country,
            region,
            target_host,
            client,
            consecutive_probe_failures: 0,
            probes_attempted: 0,
            probes_succeeded: 0,
        }
    }

    /// Measures one sample: latency via a timed request to `target_host`,
    /// packet loss/uptime derived from the running success ratio, and
    /// host vitals via `sysinfo`. Bounds-clips before returning so the
    /// agent never emits an out-of-range sample (spec §4.1 step 1).
    pub async fn sample(&mut self) -> Sample {
        self.system.refresh_memory();
        self.system.refresh_cpu_usage();

        self.probes_attempted += 1;
        let started = Instant::now();
        let reachable = self
            .client
            .get(&self.target_host)
            .send()
            .await
            .map(|resp| resp.status().is_success() || resp.status().is_redirection())
            .unwrap_or(false);
        let latency_ms = started.elapsed().as_secs_f64() * 1000.0;

        if reachable {
            self.probes_succeeded += 1;
            self.consecutive_probe_failures = 0;
        } else {
            self.consecutive_probe_failures += 1;
        }

        let uptime_pct = if self.probes_attempted > 0 {
            (self.probes_succeeded as f64 / self.probes_attempted as f64) * 100.0
        } else {
            100.0
        };
        let packet_loss_pct = 100.0 - uptime_pct;

        let metadata = serde_json::json!({
            "cpu_pct": self.system.global_cpu_usage(),
            "mem_used_kb": self.system.used_memory(),
            "mem_total_kb": self.system.total_memory(),
        });

        let mut sample = Sample {
            node_id: self.node_id.clone(),
            timestamp: Utc::now(),
            latency_ms,
            uptime_pct,
            packet_loss_pct,
            target_host: self.target_host.clone(),
            probe_type: "http".to_string(),
            country: self.country.clone(),
            region: self.region.clone(),
            metadata,
        };
        sample.clip_bounds();
        sample.normalize_timestamp();
        sample
    }
}
