use envconfig::Envconfig;
use fiber_auth::TokenVerifier;
use fiber_core::config::{RelayConfig, TelemetryConfig};
use fiber_gateway::{router, AppState};
use fiber_queue::{RedisIdempotencyStore, RedisRateLimiter};
use fiber_relay::{read_stub::RegionalReadStub, DurableBuffer, ForwarderTask};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() {
    let telemetry = TelemetryConfig::init_from_env().expect("invalid telemetry configuration");
    fiber_core::telemetry::init(&telemetry);

    let config = RelayConfig::init_from_env().expect("invalid relay configuration");

    let verifier = Arc::new(TokenVerifier::from_pem(&config.jwt_public_key).expect("invalid JWT_PUBLIC_KEY"));
    let idempotency = Arc::new(
        RedisIdempotencyStore::connect(&config.regional_queue_url)
            .await
            .expect("regional queue backend unreachable"),
    );
    let rate_limiter = Arc::new(
        RedisRateLimiter::connect(&config.regional_queue_url)
            .await
            .expect("regional queue backend unreachable"),
    );
    let buffer = Arc::new(
        DurableBuffer::open(&PathBuf::from(&config.buffer_dir))
            .await
            .expect("failed to open regional buffer"),
    );
    let storage = Arc::new(RegionalReadStub);

    let state = Arc::new(AppState::new(
        verifier,
        buffer.clone(),
        idempotency,
        rate_limiter,
        storage,
        config.rate_limit.clone(),
        config.idempotency_ttl_s,
        None,
        "regional",
    ));

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        shutdown.cancel();
    });

    let forwarder = ForwarderTask::new(buffer, &config, config.relay_token.clone());
    let forward_cancel = cancel.clone();
    let unreachable_threshold = config.unreachable_threshold;
    tokio::spawn(async move {
        forwarder.run(unreachable_threshold, forward_cancel).await;
    });

    let app = router::build(state);
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await.expect("failed to bind");
    tracing::info!(addr = %config.bind_addr, region = %config.region, "fiber-relay listening");

    let serve = axum::serve(listener, app);
    tokio::select! {
        result = serve => result.expect("server error"),
        _ = cancel.cancelled() => {},
    }
}
