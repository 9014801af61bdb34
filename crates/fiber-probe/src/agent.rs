//! Top-level orchestration: one cooperative scheduling loop (spec §4.1,
//! §5 "single logical scheduling loop ... collection and send must not
//! block each other indefinitely").

use crate::buffer::SampleBuffer;
use crate::collector::Collector;
use crate::federation::{FederationState, Role};
use crate::sender::Sender;
use fiber_core::config::ProbeConfig;
use fiber_core::generate_trace_id;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub struct ProbeAgent {
    config: ProbeConfig,
    collector: Collector,
    buffer: SampleBuffer,
    sender: Sender,
    federation: FederationState,
}

impl ProbeAgent {
    pub fn new(config: ProbeConfig) -> Self {
        let request_timeout = Duration::from_secs(config.request_timeout_s);
        let collector = Collector::new(
            config.node_id.clone(),
            config.country.clone(),
            config.region.clone(),
            config.api_endpoint.clone(),
            request_timeout,
        );
        let buffer = SampleBuffer::new(config.max_buffer);
        let sender = Sender::new(request_timeout, config.max_retries, config.retry_backoff_base);
        let federation = FederationState::new(Duration::from_secs(config.stickiness_s));

        Self { config, collector, buffer, sender, federation }
    }

    fn endpoint(&self) -> (&str, Role) {
        match self.federation.role() {
            Role::Regional => match &self.config.regional_endpoint {
                Some(regional) => (regional.as_str(), Role::Regional),
                None => (self.config.api_endpoint.as_str(), Role::Central),
            },
            Role::Central => (self.config.api_endpoint.as_str(), Role::Central),
        }
    }

    /// Runs the scheduling loop until `cancel` fires, then flushes buffered
    /// samples within the shutdown grace period (spec §4.1 step 6).
    pub async fn run(mut self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(Duration::from_secs(self.config.interval_s));
        let bearer = self.config.federation_secret.clone().unwrap_or_default();

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.federation.maybe_recover();
                    self.emit_one(&bearer).await;
                }
                _ = cancel.cancelled() => {
                    info!("shutdown signal received, flushing buffer");
                    self.flush_on_shutdown(&bearer).await;
                    break;
                }
            }
        }
    }

    async fn emit_one(&mut self, bearer: &str) {
        let sample = self.collector.sample().await;
        let trace_id = generate_trace_id();
        let (endpoint, role) = {
            let (e, r) = self.endpoint();
            (e.to_string(), r)
        };

        let ok = self.sender.send_one(&endpoint, bearer, &trace_id, &sample).await;
        if role == Role::Regional {
            self.federation.record_regional_result(ok);
        }

        if ok {
            self.opportunistic_flush(bearer).await;
        } else {
            warn!(node_id = %sample.node_id, "send failed after retries, buffering sample");
            self.buffer.push(sample).await;
        }
    }

    async fn opportunistic_flush(&mut self, bearer: &str) {
        if self.buffer.len().await == 0 {
            return;
        }
        let (endpoint, _role) = {
            let (e, r) = self.endpoint();
            (e.to_string(), r)
        };
        let batch = self.buffer.drain(self.config.flush_batch_size).await;
        if batch.is_empty() {
            return;
        }
        let trace_id = generate_trace_id();
        let batch_id = generate_trace_id();
        if !self.sender.send_batch(&endpoint, bearer, &trace_id, &batch_id, &batch).await {
            // Failed to flush; put the batch back at the front conceptually by
            // re-pushing (order degrades slightly but no samples are lost).
            for sample in batch {
                self.buffer.push(sample).await;
            }
        }
    }

    async fn flush_on_shutdown(&mut self, bearer: &str) {
        let grace = Duration::from_secs(self.config.shutdown_grace_s);
        let deadline = tokio::time::Instant::now() + grace;
        let (endpoint, _role) = {
            let (e, r) = self.endpoint();
            (e.to_string(), r)
        };

        while self.buffer.len().await > 0 && tokio::time::Instant::now() < deadline {
            let batch = self.buffer.drain(self.config.flush_batch_size).await;
            let trace_id = generate_trace_id();
            let batch_id = generate_trace_id();
            if !self.sender.send_batch(&endpoint, bearer, &trace_id, &batch_id, &batch).await {
                break;
            }
        }
    }
}
