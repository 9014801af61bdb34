//! Spec §8 scenario: kill the ETL worker after it pops a batch but before it
//! acks (crash mid-commit). On restart the batch must be redelivered exactly
//! once — not lost, and not double-persisted once the real worker picks it
//! back up.

mod common;

use fiber_queue::QueueBackend;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn unacked_batch_is_redelivered_and_persisted_exactly_once() {
    let harness = common::TestHarness::new();
    let token = common::sign_token("relay-gh", "gh-accra", true);

    let batch = serde_json::Value::Array(vec![
        common::sample_json("p1", chrono::Utc::now()),
        common::sample_json("p2", chrono::Utc::now()),
    ]);
    common::send(harness.router(), common::ingest_request(&token, "batch-1", Some("gh-accra"), batch)).await;
    assert_eq!(harness.queue.queue_len().await.unwrap(), 2);

    // First ETL worker pops the batch... and crashes before acking.
    let first_pop = harness.queue.pop_batch(10, Duration::from_millis(10)).await.unwrap();
    assert_eq!(first_pop.len(), 2);
    assert_eq!(harness.queue.queue_len().await.unwrap(), 0, "popped items leave the visible queue immediately");
    drop(first_pop); // the crashed worker never calls ack_batch or persists anything

    // Recovery: the reaper notices the in-flight batch is past its
    // visibility window and requeues it for a fresh worker.
    let requeued = harness.queue.reap_stale(Duration::from_millis(0)).await.unwrap();
    assert_eq!(requeued, 2);
    assert_eq!(harness.queue.queue_len().await.unwrap(), 2);

    // The replacement worker pops, persists, and this time acks.
    let second_pop = harness.queue.pop_batch(10, Duration::from_millis(10)).await.unwrap();
    assert_eq!(second_pop.len(), 2);
    let storage: Arc<dyn fiber_storage::WriteBackend> = harness.storage.clone();
    let outcome = fiber_etl::process::process_batch(second_pop.items, storage).await.unwrap();
    harness.queue.ack_batch(&second_pop.token).await.unwrap();

    assert_eq!(outcome.inserted, 2);
    assert_eq!(outcome.conflicts, 0);
    assert_eq!(harness.storage.sample_count(), 2, "each sample must be persisted exactly once despite the crash");

    // A reaper sweep after the ack must not resurrect the already-handled batch.
    let requeued_again = harness.queue.reap_stale(Duration::from_millis(0)).await.unwrap();
    assert_eq!(requeued_again, 0);
}
