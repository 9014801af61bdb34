//! Bounded FIFO used when sends persistently fail (spec §4.1 step 3,
//! I-Probe-Buffer-Bound). Single-writer behind a `tokio::sync::Mutex`
//! (spec §5 "Buffer access is single-writer").

use fiber_core::Sample;
use std::collections::VecDeque;
use tokio::sync::Mutex;

pub struct SampleBuffer {
    inner: Mutex<VecDeque<Sample>>,
    capacity: usize,
}

impl SampleBuffer {
    pub fn new(capacity: usize) -> Self {
        Self { inner: Mutex::new(VecDeque::with_capacity(capacity.min(4096))), capacity }
    }

    /// Pushes a sample, dropping the oldest entry if the buffer is full
    /// (spec §4.1 step 3: "drop the oldest to preserve recency").
    pub async fn push(&self, sample: Sample) {
        let mut buf = self.inner.lock().await;
        if buf.len() >= self.capacity {
            buf.pop_front();
        }
        buf.push_back(sample);
    }

    /// Drains up to `max` samples for an opportunistic flush (spec §4.1 step 4).
    pub async fn drain(&self, max: usize) -> Vec<Sample> {
        let mut buf = self.inner.lock().await;
        let n = max.min(buf.len());
        buf.drain(..n).collect()
    }

    /// Drains everything currently buffered — used during the shutdown grace
    /// period (spec §4.1 step 6).
    pub async fn drain_all(&self) -> Vec<Sample> {
        let mut buf = self.inner.lock().await;
        buf.drain(..).collect()
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn sample(n: u32) -> Sample {
        Sample {
            node_id: format!("p{n}"),
            timestamp: Utc::now(),
            latency_ms: 1.0,
            uptime_pct: 100.0,
            packet_loss_pct: 0.0,
            target_host: "h".into(),
            probe_type: "http".into(),
            country: "GH".into(),
            region: "Accra".into(),
            metadata: serde_json::json!({}),
        }
    }

    #[tokio::test]
    async fn drops_oldest_when_full() {
        let buf = SampleBuffer::new(2);
        buf.push(sample(1)).await;
        buf.push(sample(2)).await;
        buf.push(sample(3)).await;

        let remaining = buf.drain_all().await;
        assert_eq!(remaining.len(), 2);
        assert_eq!(remaining[0].node_id, "p2");
        assert_eq!(remaining[1].node_id, "p3");
    }

    #[tokio::test]
    async fn drain_respects_max() {
        let buf = SampleBuffer::new(10);
        for i in 0..5 {
            buf.push(sample(i)).await;
        }
        let drained = buf.drain(3).await;
        assert_eq!(drained.len(), 3);
        assert_eq!(buf.len().await, 2);
    }
}
