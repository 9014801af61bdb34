use envconfig::Envconfig;
use fiber_core::config::{EtlConfig, TelemetryConfig};
use fiber_etl::{HeartbeatState, WorkerPool};
use fiber_queue::RedisQueue;
use fiber_storage::PostgresStorage;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() {
    let telemetry = TelemetryConfig::init_from_env().expect("invalid telemetry configuration");
    fiber_core::telemetry::init(&telemetry);

    let config = EtlConfig::init_from_env().expect("invalid ETL configuration");

    let queue: Arc<dyn fiber_queue::QueueBackend> =
        Arc::new(RedisQueue::connect(&config.queue_url).await.expect("queue backend unreachable"));
    let storage = PostgresStorage::connect(&config.db_url).await.expect("database unreachable");
    storage.migrate().await.expect("failed to apply storage migrations");
    let storage: Arc<dyn fiber_storage::WriteBackend> = Arc::new(storage);

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        shutdown.cancel();
    });

    let heartbeat = Arc::new(HeartbeatState::default());
    let heartbeat_cancel = cancel.clone();
    let heartbeat_interval = Duration::from_secs(config.heartbeat_s);
    let heartbeat_task = {
        let heartbeat = heartbeat.clone();
        tokio::spawn(async move {
            fiber_etl::heartbeat::run(heartbeat, "fiber-etl-0", heartbeat_interval, heartbeat_cancel).await;
        })
    };

    let admin_task = {
        let queue = queue.clone();
        let storage = storage.clone();
        let admin_cancel = cancel.clone();
        tokio::spawn(async move {
            fiber_etl::admin::run(queue, storage, admin_cancel).await;
        })
    };

    let reaper_task = {
        let queue = queue.clone();
        let reap_cancel = cancel.clone();
        let visibility_timeout = Duration::from_secs(config.visibility_timeout_s);
        let reap_interval = Duration::from_secs(config.reap_interval_s);
        tokio::spawn(async move {
            WorkerPool::run_reaper(queue, visibility_timeout, reap_interval, reap_cancel).await;
        })
    };

    tracing::info!(worker_count = config.worker_count, "fiber-etl starting");
    let pool = WorkerPool::new(queue, storage, config, heartbeat);
    pool.run(cancel).await;

    let _ = tokio::join!(heartbeat_task, admin_task, reaper_task);
}
