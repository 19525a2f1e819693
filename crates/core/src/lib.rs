//! Domain types, narrow traits, and shared resource primitives for `askd`.
//!
//! This crate is the foundation every other crate builds on: the response
//! envelope and chunk types (`domain`), the error taxonomy (`error`), the
//! seam traits external dependencies are abstracted behind (`traits`), and
//! the two resource primitives shared by more than one component
//! (`CircuitBreaker`, `RateLimiter`, `TtlCache`).

pub mod circuit_breaker;
pub mod confidence;
pub mod domain;
pub mod error;
pub mod rate_limiter;
pub mod traits;
pub mod ttl_cache;

pub use circuit_breaker::{BreakerConfig, BreakerOpen, CircuitBreaker, Outcome};
pub use confidence::{decide as confidence_decide, ConfidenceDecision};
pub use domain::{
    AskResponse, Chunk, MemoryEntry, MemoryType, ResponseMode, RetrievedChunk, SourceMap,
    SourceRef, Usage, Warning,
};
pub use error::{Error, Result};
pub use rate_limiter::{Admission, RateLimitConfig, RateLimiter};
pub use traits::{
    Clock, Embedder, GenerationEvent, GenerationRequest, GenerationResponse, Generator,
    LexicalIndex, MemoryKind, MemoryStore, ScoredMemory, SystemClock, VectorIndex, VectorMatch,
};
pub use ttl_cache::TtlCache;
