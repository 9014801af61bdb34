//! Maps [`FiberError`] onto the wire error envelope (spec §7 "All error
//! responses carry `{status:\"error\", code, message}`"), echoing the same
//! `X-Trace-ID` every successful response carries (spec §6/§7).

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use fiber_core::FiberError;
use serde_json::json;

pub struct ApiError {
    err: FiberError,
    trace_id: String,
}

impl ApiError {
    pub fn new(err: FiberError, trace_id: impl Into<String>) -> Self {
        Self { err, trace_id: trace_id.into() }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let headers = [("x-trace-id", self.trace_id.clone())];
        match self.err.http_code() {
            Some((status, code)) => {
                let body = json!({ "status": "error", "code": code.as_str(), "message": self.err.to_string() });
                (StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR), headers, Json(body))
                    .into_response()
            }
            // `Idempotent` is handled by its own handler branch before this
            // path is reached; anything else without an HTTP mapping is a
            // programming error.
            None => {
                let body = json!({ "status": "error", "code": "UNAVAILABLE", "message": self.err.to_string() });
                (StatusCode::INTERNAL_SERVER_ERROR, headers, Json(body)).into_response()
            }
        }
    }
}
