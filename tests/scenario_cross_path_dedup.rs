//! Spec §8 scenario: the same (node, timestamp) sample arriving once via
//! `/push` and once via `/ingest` is not silently dropped or double-counted
//! — the second arrival is recorded as a conflict, not a failure.

mod common;

use fiber_queue::QueueBackend;
use std::sync::Arc;

#[tokio::test]
async fn same_sample_via_push_then_ingest_becomes_a_conflict() {
    let harness = common::TestHarness::new();
    let ts = chrono::Utc::now();

    let probe_token = common::sign_token("probe-accra-1", "gh-accra", false);
    common::send(harness.router(), common::push_request(&probe_token, common::sample_json("p1", ts))).await;

    let relay_token = common::sign_token("relay-gh", "gh-accra", true);
    let batch = serde_json::Value::Array(vec![common::sample_json("p1", ts)]);
    common::send(
        harness.router(),
        common::ingest_request(&relay_token, "batch-replay", Some("gh-accra"), batch),
    )
    .await;

    assert_eq!(harness.queue.queue_len().await.unwrap(), 2);

    let popped = harness.queue.pop_batch(10, std::time::Duration::from_millis(10)).await.unwrap();
    let storage: Arc<dyn fiber_storage::WriteBackend> = harness.storage.clone();
    let outcome = fiber_etl::process::process_batch(popped.items, storage).await.unwrap();
    harness.queue.ack_batch(&popped.token).await.unwrap();

    assert_eq!(outcome.inserted, 1);
    assert_eq!(outcome.conflicts, 1);
    assert_eq!(harness.storage.sample_count(), 1);
    assert_eq!(harness.storage.conflict_count(), 1);
}
