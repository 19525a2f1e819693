//! Boundary error mapping (§7).
//!
//! The core taxonomy (`askd_core::error::Error`) already names every
//! failure mode; this type only adds the HTTP status each one maps to, per
//! spec §6/§7 (422 request validation, 429 rate limit, 503 embedding
//! unavailable, 500 otherwise). A refusal is never an error — it is a 200
//! response with `mode = refused`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("invalid request: {0}")]
    InvalidInput(String),

    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("embedding provider unavailable: {0}")]
    EmbeddingUnavailable(String),

    #[error("search unavailable: {0}")]
    SearchUnavailable(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<askd_core::error::Error> for ServerError {
    fn from(err: askd_core::error::Error) -> Self {
        use askd_core::error::Error as E;
        match err {
            E::InvalidInput(m) => ServerError::InvalidInput(m),
            E::RateLimited { retry_after_ms } => ServerError::RateLimited { retry_after_ms },
            E::EmbeddingUnavailable(m) => ServerError::EmbeddingUnavailable(m),
            E::EmbeddingDimensionMismatch { expected, actual } => ServerError::EmbeddingUnavailable(
                format!("dimension mismatch: expected {expected}, got {actual}"),
            ),
            E::SearchUnavailable(m) => ServerError::SearchUnavailable(m),
            other => ServerError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            ServerError::InvalidInput(_) => (StatusCode::UNPROCESSABLE_ENTITY, "invalid_input"),
            ServerError::RateLimited { .. } => (StatusCode::TOO_MANY_REQUESTS, "rate_limited"),
            ServerError::EmbeddingUnavailable(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, "embedding_unavailable")
            },
            ServerError::SearchUnavailable(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, "search_unavailable")
            },
            ServerError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        };

        let mut body = json!({
            "error": code,
            "message": self.to_string(),
        });
        if let ServerError::RateLimited { retry_after_ms } = &self {
            body["retry_after_ms"] = json!(retry_after_ms);
        }

        (status, Json(body)).into_response()
    }
}
