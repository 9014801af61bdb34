//! The error taxonomy every FiberStack component maps its failures onto (spec §7).
//!
//! Each variant carries the policy its callers are expected to apply —
//! reject, retry, degrade, or treat as a no-op — rather than leaving that
//! decision to string matching on a message.

use std::time::Duration;

/// Upper-snake machine code returned to HTTP clients as `{status:"error", code, message}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    MalformedBatch,
    InvalidToken,
    RateLimited,
    PayloadTooLarge,
    Unavailable,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::MalformedBatch => "MALFORMED_BATCH",
            ErrorCode::InvalidToken => "INVALID_TOKEN",
            ErrorCode::RateLimited => "RATE_LIMITED",
            ErrorCode::PayloadTooLarge => "PAYLOAD_TOO_LARGE",
            ErrorCode::Unavailable => "UNAVAILABLE",
        }
    }
}

/// Unified error type for the ingestion/relay/ETL pipeline.
///
/// Variants correspond 1:1 to the taxonomy in spec §7. `Idempotent` and
/// `PersistenceConflict` are deliberately not "errors" in the panicky sense —
/// they are outcomes a caller is expected to treat as success/no-op.
#[derive(Debug, thiserror::Error)]
pub enum FiberError {
    /// Bounds violation, bad JSON, missing batch id, batch cardinality over
    /// the cap. Rejected at the gateway with 400.
    #[error("malformed input: {0}")]
    MalformedInput(String),

    /// Request body exceeds the size cap (spec §4.2 step 2). Mapped to 413;
    /// distinct from [`FiberError::MalformedInput`] because oversized-byte
    /// rejection and over-cardinality rejection carry different status codes.
    #[error("payload too large: {0}")]
    PayloadTooLarge(String),

    /// Missing/expired/region-mismatch token. Mapped to 401.
    #[error("auth failure: {0}")]
    AuthFailure(String),

    /// Bucket empty. Mapped to 429 with `retry_after`.
    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    /// Duplicate batch id within the idempotency window. Treated as success (409 no-op).
    #[error("duplicate batch {batch_id}, already processed ({enqueued} samples)")]
    Idempotent { batch_id: String, enqueued: usize },

    /// Queue/storage/network unreachable. Retry with backoff up to a cap; beyond the
    /// cap the gateway returns 503 and the ETL routes the item to the DLQ.
    #[error("transient backend failure in {component}: {source}")]
    TransientBackendFailure {
        component: &'static str,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Unique (time, node) violation. Not a failure — recorded in the conflict log.
    #[error("persistence conflict at ({node_id}, {time})")]
    PersistenceConflict { node_id: String, time: String },

    /// Unrecoverable internal invariant violation. Logged critical; process exits.
    #[error("fatal: {0}")]
    Fatal(String),
}

impl FiberError {
    pub fn transient(component: &'static str, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        FiberError::TransientBackendFailure {
            component,
            source: Box::new(source),
        }
    }

    /// Maps this error onto the wire-level `{code, message}` pair for non-2xx responses.
    /// Returns `None` for outcomes that are not HTTP errors (`Idempotent`, `PersistenceConflict`).
    pub fn http_code(&self) -> Option<(u16, ErrorCode)> {
        match self {
            FiberError::MalformedInput(_) => Some((400, ErrorCode::MalformedBatch)),
            FiberError::PayloadTooLarge(_) => Some((413, ErrorCode::PayloadTooLarge)),
            FiberError::AuthFailure(_) => Some((401, ErrorCode::InvalidToken)),
            FiberError::RateLimited { .. } => Some((429, ErrorCode::RateLimited)),
            FiberError::TransientBackendFailure { .. } => Some((503, ErrorCode::Unavailable)),
            FiberError::Idempotent { .. } => None,
            FiberError::PersistenceConflict { .. } => None,
            FiberError::Fatal(_) => Some((503, ErrorCode::Unavailable)),
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, FiberError::TransientBackendFailure { .. })
    }
}

pub type FiberResult<T> = Result<T, FiberError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idempotent_and_conflict_are_not_http_errors() {
        let dup = FiberError::Idempotent { batch_id: "b-1".into(), enqueued: 3 };
        assert!(dup.http_code().is_none());

        let conflict = FiberError::PersistenceConflict {
            node_id: "p1".into(),
            time: "2025-12-30T12:00:00Z".into(),
        };
        assert!(conflict.http_code().is_none());
    }

    #[test]
    fn rate_limited_maps_to_429() {
        let err = FiberError::RateLimited { retry_after: Duration::from_secs(2) };
        assert_eq!(err.http_code(), Some((429, ErrorCode::RateLimited)));
    }

    #[test]
    fn oversized_payload_maps_to_413_not_400() {
        let err = FiberError::PayloadTooLarge("payload 10485761 bytes exceeds 10485760".into());
        assert_eq!(err.http_code(), Some((413, ErrorCode::PayloadTooLarge)));
    }
}
