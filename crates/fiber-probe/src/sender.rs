//! Send-with-retry (spec §4.1 step 2), grounded on the exponential-backoff
//! idiom `tower-resilience-retry` builds as a layer — here applied directly
//! since the probe is a single outbound call site, not a `tower::Service`
//! chain.

use fiber_core::wire::SampleWire;
use fiber_core::Sample;
use serde::Serialize;
use std::time::Duration;
use tracing::warn;

pub struct Sender {
    client: reqwest::Client,
    max_retries: u32,
    backoff_base: f64,
}

impl Sender {
    pub fn new(request_timeout: Duration, max_retries: u32, backoff_base: f64) -> Self {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .expect("reqwest client builds with a finite timeout");
        Self { client, max_retries, backoff_base }
    }

    /// Posts a single sample to `{endpoint}/push` (spec §6 "Sample wire shape
    /// (push)": one `SampleWire` object, no `X-Batch-ID`).
    pub async fn send_one(&self, endpoint: &str, bearer_token: &str, trace_id: &str, sample: &Sample) -> bool {
        let wire = SampleWire::from(sample.clone());
        self.post_with_retry(&format!("{endpoint}/push"), bearer_token, trace_id, None, &wire).await
    }

    /// Posts a batch to `{endpoint}/ingest` with the `X-Batch-ID` header
    /// central-side idempotency requires (spec §4.2 step 4, §6).
    pub async fn send_batch(
        &self,
        endpoint: &str,
        bearer_token: &str,
        trace_id: &str,
        batch_id: &str,
        samples: &[Sample],
    ) -> bool {
        let wire: Vec<SampleWire> = samples.iter().cloned().map(SampleWire::from).collect();
        self.post_with_retry(&format!("{endpoint}/ingest"), bearer_token, trace_id, Some(batch_id), &wire).await
    }

    /// Retries `base^attempt` seconds apart (spec §4.1 step 2: default base
    /// 2.0 → 2s, 4s, 8s). A 409 counts as success: the gateway has already
    /// accepted this batch id, so a retried attempt is a no-op, not a failure.
    async fn post_with_retry<T: Serialize>(
        &self,
        url: &str,
        bearer_token: &str,
        trace_id: &str,
        batch_id: Option<&str>,
        body: &T,
    ) -> bool {
        for attempt in 0..=self.max_retries {
            let mut request = self.client.post(url).bearer_auth(bearer_token).header("X-Trace-ID", trace_id);
            if let Some(id) = batch_id {
                request = request.header("X-Batch-ID", id);
            }

            let result = request.json(body).send().await;
            match result {
                Ok(resp) if resp.status().is_success() || resp.status().as_u16() == 409 => return true,
                Ok(resp) => warn!(status = %resp.status(), attempt, "send rejected by gateway"),
                Err(err) => warn!(%err, attempt, "send failed"),
            }

            if attempt < self.max_retries {
                let delay = Duration::from_secs_f64(self.backoff_base.powi(attempt as i32 + 1));
                tokio::time::sleep(delay).await;
            }
        }
        false
    }
}
