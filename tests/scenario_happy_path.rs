//! Spec §8 scenario: a single authenticated sample pushed through the
//! gateway ends up in storage once the ETL drains the queue.

mod common;

use fiber_queue::QueueBackend;
use std::sync::Arc;

#[tokio::test]
async fn pushed_sample_is_accepted_and_reaches_storage() {
    let harness = common::TestHarness::new();
    let token = common::sign_token("probe-accra-1", "gh-accra", false);

    let (status, body) = common::send(
        harness.router(),
        common::push_request(&token, common::sample_json("p1", chrono::Utc::now())),
    )
    .await;

    assert_eq!(status, axum::http::StatusCode::ACCEPTED);
    assert_eq!(body["status"], "accepted");
    assert!(body["message_id"].is_string());
    assert_eq!(harness.queue.queue_len().await.unwrap(), 1);

    let popped = harness.queue.pop_batch(10, std::time::Duration::from_millis(10)).await.unwrap();
    assert_eq!(popped.len(), 1);

    let storage: Arc<dyn fiber_storage::WriteBackend> = harness.storage.clone();
    let outcome = fiber_etl::process::process_batch(popped.items, storage).await.unwrap();
    harness.queue.ack_batch(&popped.token).await.unwrap();

    assert_eq!(outcome.inserted, 1);
    assert_eq!(outcome.conflicts, 0);
    assert_eq!(harness.storage.sample_count(), 1);
}

#[tokio::test]
async fn missing_bearer_token_is_rejected() {
    let harness = common::TestHarness::new();
    let req = axum::http::Request::builder()
        .method("POST")
        .uri("/push")
        .header("content-type", "application/json")
        .body(axum::body::Body::from(common::sample_json("p1", chrono::Utc::now()).to_string()))
        .unwrap();

    let (status, body) = common::send(harness.router(), req).await;
    assert_eq!(status, axum::http::StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "INVALID_TOKEN");
}

#[tokio::test]
async fn expired_token_is_rejected() {
    let harness = common::TestHarness::new();
    let token = common::sign_expired_token("probe-accra-1", "gh-accra");

    let (status, _) = common::send(
        harness.router(),
        common::push_request(&token, common::sample_json("p1", chrono::Utc::now())),
    )
    .await;

    assert_eq!(status, axum::http::StatusCode::UNAUTHORIZED);
}
