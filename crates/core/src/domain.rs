//! Core domain types shared across the ask pipeline.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single retrievable unit of the corpus. Read-only: the ingestion
/// collaborator owns writes, this service only reads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub source_path: String,
    pub source_name: String,
    pub page_number: Option<u32>,
    pub chunk_index: u32,
    pub token_start: u32,
    pub token_end: u32,
    pub text: String,
    /// L2-normalized, dimension fixed at startup.
    pub embedding: Vec<f32>,
    pub sub_domain: Option<String>,
}

impl Chunk {
    pub fn validate(&self) -> Result<(), String> {
        if self.token_end <= self.token_start {
            return Err(format!(
                "chunk {} has token_end <= token_start ({} <= {})",
                self.id, self.token_end, self.token_start
            ));
        }
        Ok(())
    }
}

/// A chunk plus retrieval-stage metadata. Ephemeral — never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub chunk: Chunk,
    pub score: f32,
    pub rank: u32,
    pub dense_score: Option<f32>,
    pub lexical_score: Option<f32>,
}

/// Ordered 1..N citation source map built by ContextBuilder. Dense,
/// gap-free; identity is by position, not by chunk id.
pub type SourceMap = BTreeMap<u32, RetrievedChunk>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MemoryType {
    Practice,
    Preference,
    Achievement,
    Context,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub id: String,
    pub session_id: String,
    pub memory_type: MemoryType,
    pub content: String,
    pub embedding: Vec<f32>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseMode {
    Rag,
    Tool,
    Degraded,
    Refused,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceRef {
    pub index: u32,
    pub source_name: String,
    pub source_path: String,
    pub page_number: Option<u32>,
    pub score: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Warning {
    InvalidCitations,
    LlmUnavailable,
    MemoryUnavailable,
    InsufficientKnowledge,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Usage {
    pub tier: String,
    pub model: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub embedding_ms: u64,
    pub search_ms: u64,
    pub rerank_ms: u64,
    pub generation_ms: u64,
    pub total_ms: u64,
    pub cache_hit: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AskResponse {
    pub answer: String,
    pub mode: ResponseMode,
    pub citations: Vec<u32>,
    pub sources: Vec<SourceRef>,
    pub usage: Usage,
    pub warnings: std::collections::BTreeSet<Warning>,
}

impl AskResponse {
    /// Invariant: refused responses carry no citations; rag responses only
    /// ever cite valid, in-range indices.
    pub fn check_invariants(&self) -> Result<(), String> {
        if self.mode == ResponseMode::Refused && !self.citations.is_empty() {
            return Err("refused response must have empty citations".into());
        }
        if self.mode == ResponseMode::Rag {
            let n = self.sources.len() as u32;
            for &c in &self.citations {
                if c == 0 || c > n {
                    return Err(format!("citation {c} out of range 1..{n}"));
                }
            }
        }
        Ok(())
    }
}
