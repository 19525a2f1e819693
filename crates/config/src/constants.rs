//! Process-wide constants that are genuinely constant — not tunable per
//! deployment, and not business logic. This module ONLY contains: service
//! endpoint defaults, timeout defaults, and the RAG numeric defaults spec'd
//! in `SPEC_FULL.md` §6's configuration table. DO NOT add intent/tier
//! keyword lists here — those are data, loaded from config per spec §9 Open
//! Question 2 (`routing.toml` / `RoutingConfig`), not code.
//!
//! Structure (module-per-concern, `once_cell::sync::Lazy` for env-overridable
//! statics) is carried over verbatim from the teacher's
//! `config/src/constants.rs`; the values are the new domain's, not the
//! teacher's gold-loan-tuned ones.

pub mod endpoints {
    use once_cell::sync::Lazy;

    pub static QDRANT_DEFAULT: Lazy<String> = Lazy::new(|| {
        std::env::var("QDRANT_URL").unwrap_or_else(|_| "http://localhost:6334".to_string())
    });

    pub static EMBEDDING_DEFAULT: Lazy<String> = Lazy::new(|| {
        std::env::var("EMBEDDING_ENDPOINT").unwrap_or_else(|_| "http://localhost:11434".to_string())
    });
}

pub mod timeouts {
    pub const EMBEDDING_REQUEST_MS: u64 = 10_000;
    pub const GENERATION_REQUEST_MS: u64 = 60_000;
    pub const VECTOR_SEARCH_MS: u64 = 5_000;
    pub const LEXICAL_SEARCH_MS: u64 = 5_000;
}

pub mod rag {
    /// §4.7 HybridSearch RRF defaults.
    pub const RRF_DENSE_WEIGHT: f32 = 0.7;
    pub const RRF_LEXICAL_WEIGHT: f32 = 0.3;
    pub const RRF_K: f32 = 60.0;

    /// §6 defaults.
    pub const DEFAULT_TOP_K: usize = 6;
    pub const K_POOL_MULTIPLIER: usize = 3;

    /// §4.8 Reranker defaults.
    pub const MAX_PER_DOCUMENT: usize = 1;
    pub const COURSE_BOOST: f32 = 1.25;
    pub const FILENAME_BOOST: f32 = 1.20;
    pub const MMR_LAMBDA: f32 = 0.7;

    /// §4.9 ConfidenceGate default.
    pub const CONFIDENCE_THRESHOLD: f32 = 0.58;

    /// §4.2 CircuitBreaker defaults.
    pub const BREAKER_FAILURE_THRESHOLD: u32 = 3;
    pub const BREAKER_COOLDOWN_SECONDS: u64 = 30;

    /// §4.3 RateLimiter defaults.
    pub const RATE_LIMIT_MAX_REQUESTS: usize = 30;
    pub const RATE_LIMIT_WINDOW_SECONDS: u64 = 60;

    /// §3 memory decay defaults.
    pub const MEMORY_DECAY_LAMBDA_PER_DAY: f32 = 0.1;
    pub const MEMORY_TRIGGER_THRESHOLD: f32 = 0.35;
    pub const MEMORY_TOP_K: usize = 5;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rag_weights_sum_to_one() {
        assert!((rag::RRF_DENSE_WEIGHT + rag::RRF_LEXICAL_WEIGHT - 1.0).abs() < 1e-6);
    }

    #[test]
    fn timeouts_are_positive() {
        assert!(timeouts::EMBEDDING_REQUEST_MS > 0);
        assert!(timeouts::GENERATION_REQUEST_MS > 0);
    }
}
