//! Background task draining the regional buffer to the central gateway
//! (spec §4.3 "A forwarder drains the regional buffer in batches (≤ 1000
//! samples, ≤ 10 MB) and POSTs to central `/ingest`").

use crate::state_machine::{Forwarder, ForwarderState};
use fiber_core::config::RelayConfig;
use fiber_core::{trace::generate_trace_id, Batch, QueueItem};
use fiber_gateway::wire::SampleWire;
use fiber_queue::QueueBackend;
use reqwest::Client;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Derives a stable `X-Batch-ID` from the batch's own contents (sorted
/// `(node_id, timestamp)` pairs) instead of minting a fresh random one per
/// attempt. A re-enqueued batch retried after a failed forward must present
/// the same idempotency key each time, or central's dedup index can never
/// recognize the retry as a repeat (spec §4.3 "forward with the original or
/// a derived X-Batch-ID to preserve idempotency. Central dedupes.").
fn derive_batch_id(items: &[QueueItem]) -> String {
    let mut keys: Vec<String> = items
        .iter()
        .map(|item| format!("{}@{}", item.envelope.sample.node_id, item.envelope.sample.timestamp.to_rfc3339()))
        .collect();
    keys.sort();

    let mut hasher = Sha256::new();
    for key in &keys {
        hasher.update(key.as_bytes());
        hasher.update(b"\n");
    }
    format!("{:x}", hasher.finalize())
}

pub struct ForwarderTask {
    buffer: Arc<dyn QueueBackend>,
    client: Client,
    central_endpoint: String,
    relay_token: Option<String>,
    region: String,
    batch_size: usize,
    buffer_high_water: u64,
    buffer_low_water: u64,
    health_probe_interval: Duration,
    visibility_timeout: Duration,
}

impl ForwarderTask {
    pub fn new(buffer: Arc<dyn QueueBackend>, config: &RelayConfig, relay_token: Option<String>) -> Self {
        Self {
            buffer,
            client: Client::new(),
            central_endpoint: config.central_endpoint.clone(),
            relay_token,
            region: config.region.clone(),
            batch_size: config.forward_batch_size,
            buffer_high_water: config.buffer_high_water,
            buffer_low_water: config.buffer_low_water,
            health_probe_interval: Duration::from_secs(config.health_probe_interval_s),
            visibility_timeout: Duration::from_secs(config.visibility_timeout_s),
        }
    }

    /// Drives the forwarder state machine forever until `cancel` fires.
    pub async fn run(self, unreachable_threshold: u32, cancel: CancellationToken) {
        let mut forwarder = Forwarder::new(unreachable_threshold);
        let mut drain_ticker = tokio::time::interval(Duration::from_millis(200));
        let mut health_ticker = tokio::time::interval(self.health_probe_interval);
        let mut reap_ticker = tokio::time::interval(self.visibility_timeout);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("forwarder shutting down");
                    break;
                }
                _ = drain_ticker.tick() => {
                    self.tick(&mut forwarder).await;
                }
                _ = health_ticker.tick() => {
                    if forwarder.state() == ForwarderState::Buffering {
                        let reachable = self.health_probe().await;
                        forwarder.record_forward_result(reachable);
                    }
                }
                _ = reap_ticker.tick() => {
                    match self.buffer.reap_stale(self.visibility_timeout).await {
                        Ok(0) => {}
                        Ok(n) => tracing::warn!(requeued = n, "reaped stale in-flight forward batch"),
                        Err(err) => tracing::warn!(error = %err, "reap_stale failed"),
                    }
                }
            }
        }
    }

    async fn tick(&self, forwarder: &mut Forwarder) {
        let depth = self.buffer.queue_len().await.unwrap_or(0);
        forwarder.record_buffer_depth(depth, self.buffer_high_water, self.buffer_low_water);

        if forwarder.state() != ForwarderState::Forwarding {
            return;
        }

        let popped = match self.buffer.pop_batch(self.batch_size, Duration::from_millis(100)).await {
            Ok(popped) if !popped.is_empty() => popped,
            Ok(_) => return,
            Err(err) => {
                tracing::warn!(error = %err, "failed to pop regional buffer");
                return;
            }
        };

        let ok = self.forward_batch(&popped.items).await;
        forwarder.record_forward_result(ok);
        if !ok {
            // Central rejected or was unreachable: re-enqueue for retry once
            // the forwarder recovers. Not a DLQ case — the regional buffer
            // itself is the retry mechanism (spec §4.3 Replay semantics).
            let _ = self.buffer.enqueue(popped.items).await;
        }
        // Either path above already accounts for the items durably (forwarded
        // or re-enqueued), so clear the in-flight entry now.
        let _ = self.buffer.ack_batch(&popped.token).await;
    }

    async fn forward_batch(&self, items: &[QueueItem]) -> bool {
        let batch = Batch {
            batch_id: derive_batch_id(items),
            samples: items.iter().map(|item| item.envelope.sample.clone()).collect(),
            source_region: Some(self.region.clone()),
            trace_id: generate_trace_id(),
        };

        let wire: Vec<SampleWire> = batch.samples.iter().cloned().map(SampleWire::from).collect();
        let mut request = self
            .client
            .post(format!("{}/ingest", self.central_endpoint))
            .header("X-Batch-ID", &batch.batch_id)
            .header("X-Region-ID", &self.region)
            .json(&wire);
        if let Some(token) = &self.relay_token {
            request = request.bearer_auth(token);
        }

        match request.send().await {
            Ok(response) if response.status().is_success() || response.status().as_u16() == 409 => true,
            Ok(response) => {
                tracing::warn!(status = %response.status(), "central rejected forwarded batch");
                false
            }
            Err(err) => {
                tracing::warn!(error = %err, "central unreachable while forwarding");
                false
            }
        }
    }

    async fn health_probe(&self) -> bool {
        self.client
            .get(format!("{}/status", self.central_endpoint))
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fiber_core::{Envelope, Sample};

    fn item(node_id: &str, timestamp: chrono::DateTime<chrono::Utc>) -> QueueItem {
        QueueItem {
            envelope: Envelope {
                sample: Sample {
                    node_id: node_id.into(),
                    timestamp,
                    latency_ms: 1.0,
                    uptime_pct: 100.0,
                    packet_loss_pct: 0.0,
                    target_host: "h".into(),
                    probe_type: "icmp".into(),
                    country: "GH".into(),
                    region: "Accra".into(),
                    metadata: serde_json::json!({}),
                },
                trace_id: "AbCdEfGh".into(),
                ingest_region: Some("gh-accra".into()),
                ingest_ts: chrono::Utc::now(),
            },
            persist_attempts: 0,
            failure: None,
        }
    }

    #[test]
    fn batch_id_is_stable_across_reorder_and_changes_with_contents() {
        use chrono::TimeZone;
        let t1 = chrono::Utc.with_ymd_and_hms(2025, 12, 30, 12, 0, 0).unwrap();
        let t2 = chrono::Utc.with_ymd_and_hms(2025, 12, 30, 12, 1, 0).unwrap();

        let forward_order = vec![item("p1", t1), item("p2", t2)];
        let retry_order = vec![item("p2", t2), item("p1", t1)];
        assert_eq!(derive_batch_id(&forward_order), derive_batch_id(&retry_order));

        let different = vec![item("p1", t1), item("p3", t2)];
        assert_ne!(derive_batch_id(&forward_order), derive_batch_id(&different));
    }
}
