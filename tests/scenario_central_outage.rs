//! Spec §8 scenario: central is unreachable, the regional relay keeps
//! buffering pushed samples instead of dropping them, and once central comes
//! back every buffered sample is forwarded and lands in its queue.

mod common;

use fiber_core::config::RelayConfig;
use fiber_core::{Envelope, Sample};
use fiber_queue::QueueBackend;
use fiber_relay::{DurableBuffer, ForwarderTask};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn item(node_id: &str) -> fiber_core::QueueItem {
    fiber_core::QueueItem {
        envelope: Envelope {
            sample: Sample {
                node_id: node_id.into(),
                timestamp: chrono::Utc::now(),
                latency_ms: 5.0,
                uptime_pct: 100.0,
                packet_loss_pct: 0.0,
                target_host: "1.1.1.1".into(),
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

/// Grabs an ephemeral port and releases it immediately — good enough for a
/// test that needs a "definitely nothing listening here yet" address.
async fn reserve_port() -> u16 {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

#[tokio::test]
async fn buffers_while_central_down_then_replays_everything_on_recovery() {
    let port = reserve_port().await;
    let central_endpoint = format!("http://127.0.0.1:{port}");

    let dir = std::env::temp_dir().join(format!("fiber-relay-scenario-{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    let buffer = Arc::new(DurableBuffer::open(&dir).await.unwrap());
    buffer.enqueue(vec![item("p1"), item("p2"), item("p3")]).await.unwrap();

    let config = RelayConfig {
        region: "gh-accra".into(),
        central_endpoint: central_endpoint.clone(),
        regional_queue_url: "unused".into(),
        jwt_public_key: common::TEST_PUBLIC_KEY_PEM.into(),
        relay_token: Some(common::sign_token("relay-gh", "gh-accra", true)),
        bind_addr: "0.0.0.0:0".into(),
        rate_limit: common::generous_rate_limit(),
        idempotency_ttl_s: 3600,
        buffer_dir: dir.to_string_lossy().into_owned(),
        forward_batch_size: 10,
        unreachable_threshold: 1,
        health_probe_interval_s: 1,
        buffer_high_water: 10_000,
        buffer_low_water: 5_000,
        visibility_timeout_s: 60,
    };

    let cancel = CancellationToken::new();
    let forwarder = ForwarderTask::new(buffer.clone(), &config, config.relay_token.clone());
    let run_cancel = cancel.clone();
    let forwarder_handle = tokio::spawn(async move {
        forwarder.run(config.unreachable_threshold, run_cancel).await;
    });

    // Give the forwarder a couple of drain ticks against the unreachable
    // central: with threshold 1 the very first failed attempt flips it to
    // Buffering and re-enqueues, so nothing should be lost.
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(buffer.queue_len().await.unwrap(), 3, "samples must stay buffered while central is down");

    // Bring "central" up on the exact port the forwarder is already
    // configured to hit.
    let central = common::TestHarness::new();
    let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{port}")).await.unwrap();
    let central_app = central.router();
    tokio::spawn(async move {
        axum::serve(listener, central_app).await.unwrap();
    });

    // Health probe (1s) then drain tick (200ms) should replay the buffer.
    tokio::time::sleep(Duration::from_secs(3)).await;
    cancel.cancel();
    let _ = forwarder_handle.await;

    assert_eq!(buffer.queue_len().await.unwrap(), 0, "buffer should be fully drained after recovery");
    assert_eq!(central.queue.queue_len().await.unwrap(), 3, "every buffered sample must reach central's queue");
}
