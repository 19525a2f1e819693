//! Narrow interfaces at the system's external seams.
//!
//! Per spec §9's redesign note, duck-typed protocols become explicit,
//! narrow traits here; each has a deterministic fake in its consumer's test
//! module, following the teacher's convention (`core/src/traits/*.rs`, one
//! trait per concern) narrowed down to what this service actually needs.

use crate::domain::{Chunk, MemoryEntry, MemoryType};
use crate::error::Result;
use async_trait::async_trait;

/// Remote embedding provider. `dim()` is fixed at startup; a mismatch
/// between what a provider returns and the configured dimension is fatal.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
    fn dim(&self) -> usize;
}

#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub system: String,
    pub user: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[derive(Debug, Clone)]
pub struct GenerationResponse {
    pub text: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
}

#[derive(Debug, Clone)]
pub enum GenerationEvent {
    Chunk(String),
    Done {
        input_tokens: u32,
        output_tokens: u32,
    },
}

/// A single generation provider, identified by a stable string id used in
/// `TaskRouter`'s per-tier fallback chains.
#[async_trait]
pub trait Generator: Send + Sync {
    fn identifier(&self) -> &str;
    async fn generate(&self, req: &GenerationRequest) -> Result<GenerationResponse>;
    async fn generate_stream(
        &self,
        req: &GenerationRequest,
        tx: tokio::sync::mpsc::Sender<GenerationEvent>,
    ) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct VectorMatch {
    pub chunk_id: String,
    pub score: f32,
}

#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn knn_search(
        &self,
        query_vector: &[f32],
        k: usize,
        sub_domain_filter: Option<&str>,
    ) -> Result<Vec<VectorMatch>>;
    async fn fetch(&self, ids: &[String]) -> Result<Vec<Chunk>>;
}

#[async_trait]
pub trait LexicalIndex: Send + Sync {
    async fn lexical_search(
        &self,
        query_text: &str,
        k: usize,
        sub_domain_filter: Option<&str>,
    ) -> Result<Vec<VectorMatch>>;
}

/// Wall-clock abstraction so tests can control `created_at`/decay math
/// deterministically (cf. spec §8's determinism requirements).
pub trait Clock: Send + Sync {
    fn now(&self) -> chrono::DateTime<chrono::Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> chrono::DateTime<chrono::Utc> {
        chrono::Utc::now()
    }
}

/// A memory entry plus its decayed score, as returned by `search`.
#[derive(Debug, Clone)]
pub struct ScoredMemory {
    pub entry: MemoryEntry,
    pub decayed_score: f32,
}

/// The embedded per-session memory store (§4.15). A failure here is
/// non-fatal to the orchestrator — it raises `memory_unavailable` and
/// injection is skipped.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    async fn add(&self, entry: MemoryEntry) -> Result<()>;
    async fn list(&self, session_id: &str) -> Result<Vec<MemoryEntry>>;
    /// Returns the `k` highest raw-cosine matches for `session_id`; decay
    /// and the trigger-threshold cutoff are applied by the caller
    /// (`MemoryInjector`), not the store, so the store stays a dumb index.
    async fn search(
        &self,
        session_id: &str,
        query_vector: &[f32],
        k: usize,
    ) -> Result<Vec<ScoredMemory>>;
}

/// Re-exported so callers that only need the type tag don't pull in the
/// whole `domain` module path.
pub type MemoryKind = MemoryType;
