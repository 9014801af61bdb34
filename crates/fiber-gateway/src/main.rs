use envconfig::Envconfig;
use fiber_auth::TokenVerifier;
use fiber_core::config::{GatewayConfig, TelemetryConfig};
use fiber_gateway::{router, AppState};
use fiber_queue::{RedisIdempotencyStore, RedisQueue, RedisRateLimiter};
use fiber_storage::PostgresStorage;
use std::sync::Arc;

#[tokio::main]
async fn main() {
    let telemetry = TelemetryConfig::init_from_env().expect("invalid telemetry configuration");
    fiber_core::telemetry::init(&telemetry);

    let config = GatewayConfig::init_from_env().expect("invalid gateway configuration");

    let verifier = Arc::new(TokenVerifier::from_pem(&config.jwt_public_key).expect("invalid JWT_PUBLIC_KEY"));
    let queue = Arc::new(RedisQueue::connect(&config.queue_url).await.expect("queue backend unreachable"));
    let idempotency =
        Arc::new(RedisIdempotencyStore::connect(&config.queue_url).await.expect("queue backend unreachable"));
    let rate_limiter =
        Arc::new(RedisRateLimiter::connect(&config.queue_url).await.expect("queue backend unreachable"));
    let storage = PostgresStorage::connect(&config.db_url).await.expect("database unreachable");
    storage.migrate().await.expect("failed to apply storage migrations");
    let storage = Arc::new(storage);

    let state = Arc::new(AppState::new(
        verifier,
        queue,
        idempotency,
        rate_limiter,
        storage,
        config.rate_limit.clone(),
        config.idempotency_ttl_s,
        config.dlq_degrade_threshold,
        "central",
    ));

    let app = router::build(state);
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await.expect("failed to bind");
    tracing::info!(addr = %config.bind_addr, "fiber-gateway listening");
    axum::serve(listener, app).await.expect("server error");
}
