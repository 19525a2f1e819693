//! Workspace-wide error taxonomy.
//!
//! Each crate that needs its own error variants (`askd-rag`, `askd-llm`,
//! `askd-memory`) defines a local `thiserror` enum and converts into this one
//! at the boundary, same shape the teacher used for `RagError`/`LlmError`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("insufficient knowledge: {0}")]
    InsufficientKnowledge(String),

    #[error("embedding provider unavailable: {0}")]
    EmbeddingUnavailable(String),

    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    EmbeddingDimensionMismatch { expected: usize, actual: usize },

    #[error("vector or lexical search unavailable: {0}")]
    SearchUnavailable(String),

    #[error("generation provider unavailable: {0}")]
    LlmUnavailable(String),

    #[error("memory store unavailable: {0}")]
    MemoryUnavailable(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;
