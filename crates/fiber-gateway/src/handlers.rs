//! HTTP handlers implementing the request pipeline of spec §4.2: auth,
//! size-gate, validate, idempotency, rate-limit, enqueue, respond.

use crate::error::ApiError;
use crate::pipeline::{authenticate, check_rate_limit};
use crate::state::AppState;
use crate::wire::SampleWire;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use fiber_core::{generate_trace_id, trace_id_or_generate, Batch, Decision, Envelope, FiberError, QueueItem, Sample};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;

fn trace_id_from(headers: &HeaderMap) -> String {
    let supplied = headers.get("x-trace-id").and_then(|v| v.to_str().ok());
    trace_id_or_generate(supplied)
}

fn bearer_from(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

/// Headers echoed on every accepted response (spec §6/§7: "`X-Trace-ID` is
/// echoed on every response", plus the rate-limit budget for that probe).
fn success_headers(trace_id: &str, decision: &Decision) -> [(&'static str, String); 3] {
    [
        ("x-trace-id", trace_id.to_string()),
        ("x-ratelimit-remaining", decision.remaining.to_string()),
        ("x-ratelimit-reset", decision.reset_at_secs.to_string()),
    ]
}

fn trace_header(trace_id: &str) -> [(&'static str, String); 1] {
    [("x-trace-id", trace_id.to_string())]
}

/// `POST /push` — single-sample ingest (spec §6).
pub async fn push(State(state): State<Arc<AppState>>, headers: HeaderMap, body: bytes::Bytes) -> Response {
    let trace_id = trace_id_from(&headers);
    match handle_push(&state, &headers, &body, &trace_id).await {
        Ok(response) => response,
        Err(err) => respond_error(err, &trace_id),
    }
}

async fn handle_push(state: &AppState, headers: &HeaderMap, body: &[u8], trace_id: &str) -> Result<Response, FiberError> {
    let claims = authenticate(state, bearer_from(headers), None)?;

    if body.len() > fiber_core::batch::MAX_SAMPLE_BYTES {
        return Err(FiberError::PayloadTooLarge(format!(
            "payload {} bytes exceeds {}",
            body.len(),
            fiber_core::batch::MAX_SAMPLE_BYTES
        )));
    }
    let wire: SampleWire =
        serde_json::from_slice(body).map_err(|e| FiberError::MalformedInput(format!("invalid JSON: {e}")))?;
    let sample: Sample = wire.into();
    sample.validate()?;

    let decision = check_rate_limit(state, &claims.sub).await?;

    let envelope = Envelope {
        sample,
        trace_id: trace_id.to_string(),
        ingest_region: Some(claims.region.clone()),
        ingest_ts: chrono::Utc::now(),
    };
    state
        .queue
        .enqueue(vec![QueueItem { envelope, persist_attempts: 0, failure: None }])
        .await
        .map_err(|e| FiberError::transient("queue", std::io::Error::other(e.to_string())))?;

    let message_id = generate_trace_id();
    let body = json!({ "status": "accepted", "message_id": message_id });
    Ok((StatusCode::ACCEPTED, success_headers(trace_id, &decision), Json(body)).into_response())
}

/// `POST /ingest` — batch ingest (spec §6, requires `X-Batch-ID`).
pub async fn ingest(State(state): State<Arc<AppState>>, headers: HeaderMap, body: bytes::Bytes) -> Response {
    let trace_id = trace_id_from(&headers);
    match handle_ingest(&state, &headers, &body, &trace_id).await {
        Ok(response) => response,
        Err(FiberError::Idempotent { batch_id, enqueued }) => (
            StatusCode::CONFLICT,
            trace_header(&trace_id),
            Json(json!({ "status": "accepted", "batch_id": batch_id, "enqueued": enqueued })),
        )
            .into_response(),
        Err(err) => respond_error(err, &trace_id),
    }
}

async fn handle_ingest(state: &AppState, headers: &HeaderMap, body: &[u8], trace_id: &str) -> Result<Response, FiberError> {
    let batch_id = headers
        .get("x-batch-id")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| FiberError::MalformedInput("missing X-Batch-ID header".into()))?
        .to_string();
    let declared_region = headers.get("x-region-id").and_then(|v| v.to_str().ok());

    let claims = authenticate(state, bearer_from(headers), declared_region)?;

    if body.len() > fiber_core::batch::MAX_BATCH_BYTES {
        return Err(FiberError::PayloadTooLarge(format!(
            "payload {} bytes exceeds {}",
            body.len(),
            fiber_core::batch::MAX_BATCH_BYTES
        )));
    }
    let wires: Vec<SampleWire> =
        serde_json::from_slice(body).map_err(|e| FiberError::MalformedInput(format!("invalid JSON: {e}")))?;
    let samples: Vec<Sample> = wires.into_iter().map(Sample::from).collect();
    let batch = Batch {
        batch_id: batch_id.clone(),
        samples,
        source_region: declared_region.map(str::to_string),
        trace_id: trace_id.to_string(),
    };
    batch.check_size(body.len())?;
    batch.validate_samples()?;

    // Idempotency before rate limit (spec §4.2 steps 4-5): a replayed batch
    // id short-circuits here as a free no-op and must not spend the probe's
    // rate-limit budget.
    let ttl = std::time::Duration::from_secs(state.idempotency_ttl_s);
    let outcome = state
        .idempotency
        .check_and_set(&batch_id, batch.samples.len(), ttl)
        .await
        .map_err(|e| FiberError::transient("idempotency", std::io::Error::other(e.to_string())))?;
    if let fiber_queue::IdempotencyOutcome::Duplicate { enqueued } = outcome {
        return Err(FiberError::Idempotent { batch_id, enqueued });
    }

    let decision = check_rate_limit(state, &claims.sub).await?;

    let items: Vec<QueueItem> = batch
        .samples
        .into_iter()
        .map(|sample| QueueItem {
            envelope: Envelope {
                sample,
                trace_id: trace_id.to_string(),
                ingest_region: batch.source_region.clone(),
                ingest_ts: chrono::Utc::now(),
            },
            persist_attempts: 0,
            failure: None,
        })
        .collect();
    let enqueued = items.len();
    state
        .queue
        .enqueue(items)
        .await
        .map_err(|e| FiberError::transient("queue", std::io::Error::other(e.to_string())))?;

    let body = json!({ "batch_id": batch_id, "enqueued": enqueued });
    Ok((StatusCode::ACCEPTED, success_headers(trace_id, &decision), Json(body)).into_response())
}

/// `GET /status` — liveness plus dependency health (spec §6).
pub async fn status(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    let trace_id = trace_id_from(&headers);
    let queue_len = state.queue.queue_len().await;
    let report = state.storage.status().await;

    let queue_ok = queue_len.is_ok();
    let storage_ok = report.is_ok();
    let overall = if queue_ok && storage_ok { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };

    let body = json!({
        "api": "ok",
        "queue": if queue_ok { "ok" } else { "down" },
        "db": if storage_ok { "ok" } else { "down" },
        "role": state.role,
    });
    (overall, trace_header(&trace_id), Json(body)).into_response()
}

/// `GET /metrics?node_id=&since=&limit=&offset=` — paged read path (spec §6).
pub async fn metrics(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let trace_id = trace_id_from(&headers);
    let query = fiber_storage::MetricsQuery {
        node_id: params.get("node_id").cloned(),
        since: params.get("since").and_then(|s| s.parse().ok()),
        limit: params.get("limit").and_then(|s| s.parse().ok()).unwrap_or(100),
        offset: params.get("offset").and_then(|s| s.parse().ok()).unwrap_or(0),
    };
    match state.storage.query_metrics(query).await {
        Ok(rows) => (trace_header(&trace_id), Json(json!({ "data": { "metrics": rows } }))).into_response(),
        Err(err) => respond_error(err, &trace_id),
    }
}

/// `GET /federation/status` — current role and its source (spec §6).
pub async fn federation_status(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    let trace_id = trace_id_from(&headers);
    (trace_header(&trace_id), Json(json!({ "role": state.role, "source": "configured" }))).into_response()
}

fn respond_error(err: FiberError, trace_id: &str) -> Response {
    ApiError::new(err, trace_id).into_response()
}
