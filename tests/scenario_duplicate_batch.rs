//! Spec §8 scenario: resubmitting the same `X-Batch-ID` is a no-op that
//! echoes the original enqueued count rather than enqueuing a second time
//! (I-Idempotent-Batch).

mod common;

use fiber_queue::QueueBackend;

fn batch_body(nodes: &[&str]) -> serde_json::Value {
    let samples: Vec<serde_json::Value> =
        nodes.iter().map(|n| common::sample_json(n, chrono::Utc::now())).collect();
    serde_json::Value::Array(samples)
}

#[tokio::test]
async fn duplicate_batch_id_does_not_double_enqueue() {
    let harness = common::TestHarness::new();
    let token = common::sign_token("relay-gh", "gh-accra", true);

    let (status, body) = common::send(
        harness.router(),
        common::ingest_request(&token, "batch-1", Some("gh-accra"), batch_body(&["p1", "p2", "p3"])),
    )
    .await;
    assert_eq!(status, axum::http::StatusCode::ACCEPTED);
    assert_eq!(body["enqueued"], 3);
    assert_eq!(harness.queue.queue_len().await.unwrap(), 3);

    let (status, body) = common::send(
        harness.router(),
        common::ingest_request(&token, "batch-1", Some("gh-accra"), batch_body(&["p4", "p5"])),
    )
    .await;

    assert_eq!(status, axum::http::StatusCode::CONFLICT);
    assert_eq!(body["status"], "accepted");
    assert_eq!(body["batch_id"], "batch-1");
    // Echoes the *original* count, not the resubmitted payload's.
    assert_eq!(body["enqueued"], 3);
    assert_eq!(harness.queue.queue_len().await.unwrap(), 3, "duplicate must not enqueue again");
}

#[tokio::test]
async fn distinct_batch_ids_both_enqueue() {
    let harness = common::TestHarness::new();
    let token = common::sign_token("relay-gh", "gh-accra", true);

    common::send(
        harness.router(),
        common::ingest_request(&token, "batch-a", Some("gh-accra"), batch_body(&["p1"])),
    )
    .await;
    common::send(
        harness.router(),
        common::ingest_request(&token, "batch-b", Some("gh-accra"), batch_body(&["p2"])),
    )
    .await;

    assert_eq!(harness.queue.queue_len().await.unwrap(), 2);
}
