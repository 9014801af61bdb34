//! Wires the handlers onto the HTTP surface of spec §6. Reused verbatim by
//! `fiber-relay` for regional intake with `AppState::role == "regional"`.

use crate::handlers;
use crate::state::AppState;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use std::time::Duration;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

pub fn build(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/push", post(handlers::push))
        .route("/ingest", post(handlers::ingest))
        .route("/status", get(handlers::status))
        .route("/metrics", get(handlers::metrics))
        .route("/federation/status", get(handlers::federation_status))
        .layer(RequestBodyLimitLayer::new(fiber_core::batch::MAX_BATCH_BYTES))
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
