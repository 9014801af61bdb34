//! Shared scaffolding for the end-to-end scenario tests (spec §8): an
//! in-memory `AppState`, a real RSA keypair for signing/verifying bearer
//! tokens, and small request-building helpers around `tower::ServiceExt::oneshot`.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use fiber_auth::{ProbeClaims, TokenVerifier};
use fiber_core::config::RateLimitConfig;
use fiber_gateway::{router, AppState};
use fiber_queue::{InMemoryIdempotencyStore, InMemoryQueue, InMemoryRateLimiter};
use fiber_storage::InMemoryStorage;
use jsonwebtoken::{encode, EncodingKey, Header};
use std::sync::Arc;
use tower::ServiceExt;

// Test-only RSA keypair, not used anywhere outside this test harness.
pub const TEST_PRIVATE_KEY_PEM: &str = include_str!("test_priv.pem");
pub const TEST_PUBLIC_KEY_PEM: &str = include_str!("test_pub.pem");

pub fn generous_rate_limit() -> RateLimitConfig {
    RateLimitConfig {
        ingest_rate_per_sec: 1000.0,
        ingest_burst: 1000.0,
        global_capacity: 10_000.0,
        max_probe_fraction_of_global: 0.2,
        bucket_ttl_s: 600,
    }
}

pub fn sign_token(sub: &str, region: &str, is_relay: bool) -> String {
    let claims = ProbeClaims {
        sub: sub.to_string(),
        region: region.to_string(),
        exp: chrono::Utc::now().timestamp() + 3600,
        is_relay,
    };
    let key = EncodingKey::from_rsa_pem(TEST_PRIVATE_KEY_PEM.as_bytes()).expect("valid test RSA key");
    encode(&Header::new(jsonwebtoken::Algorithm::RS256), &claims, &key).expect("sign test token")
}

pub fn sign_expired_token(sub: &str, region: &str) -> String {
    let claims = ProbeClaims {
        sub: sub.to_string(),
        region: region.to_string(),
        exp: chrono::Utc::now().timestamp() - 60,
        is_relay: false,
    };
    let key = EncodingKey::from_rsa_pem(TEST_PRIVATE_KEY_PEM.as_bytes()).expect("valid test RSA key");
    encode(&Header::new(jsonwebtoken::Algorithm::RS256), &claims, &key).expect("sign test token")
}

pub struct TestHarness {
    pub state: Arc<AppState>,
    pub storage: Arc<InMemoryStorage>,
    pub queue: Arc<InMemoryQueue>,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_rate_limit(generous_rate_limit())
    }

    pub fn with_rate_limit(rate_limit: RateLimitConfig) -> Self {
        let verifier = Arc::new(TokenVerifier::from_pem(TEST_PUBLIC_KEY_PEM).expect("valid test public key"));
        let queue = Arc::new(InMemoryQueue::new());
        let idempotency = Arc::new(InMemoryIdempotencyStore::new());
        let rate_limiter = Arc::new(InMemoryRateLimiter::new());
        let storage = Arc::new(InMemoryStorage::new());

        let state = Arc::new(AppState::new(
            verifier,
            queue.clone(),
            idempotency,
            rate_limiter,
            storage.clone(),
            rate_limit,
            3600,
            None,
            "central",
        ));

        Self { state, storage, queue }
    }

    pub fn router(&self) -> Router {
        router::build(self.state.clone())
    }
}

pub fn push_request(token: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/push")
        .header("authorization", format!("Bearer {token}"))
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn ingest_request(token: &str, batch_id: &str, region: Option<&str>, body: serde_json::Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/ingest")
        .header("authorization", format!("Bearer {token}"))
        .header("content-type", "application/json")
        .header("x-batch-id", batch_id);
    if let Some(region) = region {
        builder = builder.header("x-region-id", region);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

pub async fn send(app: Router, req: Request<Body>) -> (StatusCode, serde_json::Value) {
    let response = app.oneshot(req).await.expect("router call succeeds");
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.expect("read response body");
    let body: serde_json::Value = if bytes.is_empty() { serde_json::Value::Null } else { serde_json::from_slice(&bytes).expect("valid JSON body") };
    (status, body)
}

pub fn sample_json(node_id: &str, timestamp: chrono::DateTime<chrono::Utc>) -> serde_json::Value {
    serde_json::json!({
        "node_id": node_id,
        "country": "GH",
        "region": "Accra",
        "latency_ms": 42.0,
        "uptime_pct": 99.9,
        "packet_loss": 0.1,
        "timestamp": timestamp.to_rfc3339(),
        "target_host": "1.1.1.1",
        "probe_type": "icmp",
    })
}
