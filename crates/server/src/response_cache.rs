//! Keyed cache of final answers for identical queries (§4.4).
//!
//! Built on `askd_core::TtlCache`, the same LRU+TTL primitive
//! `askd_rag::EmbeddingCache` uses (§4.1) — spec calls out the two as
//! sharing semantics. The key digest follows `EmbeddingCache`'s fingerprint
//! idiom (`sha2` over normalized text) extended to the full cache-key tuple
//! from spec §3: `(normalized_query, top_k, confidence_threshold,
//! genre_filter?, sub_domain_filter?, model_tier)`.

use std::time::Duration;

use askd_core::domain::AskResponse;
use askd_core::ttl_cache::TtlCache;
use sha2::{Digest, Sha256};
use unicode_normalization::UnicodeNormalization;

#[derive(Debug, Clone)]
pub struct ResponseCacheConfig {
    pub max_size: usize,
    pub ttl_seconds: u64,
}

impl Default for ResponseCacheConfig {
    fn default() -> Self {
        Self {
            max_size: 5_000,
            ttl_seconds: 600,
        }
    }
}

/// Everything a response depends on besides the query text itself.
#[derive(Clone)]
pub struct CacheKeyParams<'a> {
    pub query: &'a str,
    pub top_k: usize,
    pub confidence_threshold: f32,
    pub genre_filter: Option<&'a str>,
    pub sub_domain_filter: Option<&'a str>,
    pub model_tier: &'a str,
}

pub struct ResponseCache {
    inner: TtlCache<AskResponse>,
}

impl ResponseCache {
    pub fn new(config: ResponseCacheConfig) -> Self {
        Self {
            inner: TtlCache::new(config.max_size, Duration::from_secs(config.ttl_seconds)),
        }
    }

    pub fn key(params: &CacheKeyParams) -> String {
        let normalized: String = params.query.trim().nfc().collect::<String>().to_lowercase();
        let raw = format!(
            "{}|{}|{:.4}|{}|{}|{}",
            normalized,
            params.top_k,
            params.confidence_threshold,
            params.genre_filter.unwrap_or(""),
            params.sub_domain_filter.unwrap_or(""),
            params.model_tier,
        );
        let digest = Sha256::digest(raw.as_bytes());
        digest.iter().map(|b| format!("{:02x}", b)).collect()
    }

    /// A hit returns the cached envelope with a stale `usage.total_ms` —
    /// the caller is responsible for stamping a fresh value, since that
    /// field is explicitly excluded from the cached value's identity.
    pub fn get(&self, key: &str) -> Option<AskResponse> {
        self.inner.get(key)
    }

    pub fn put(&self, key: String, response: AskResponse) {
        self.inner.put(key, response);
    }

    pub fn clear(&self) {
        self.inner.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use askd_core::domain::{ResponseMode, Usage};
    use std::collections::BTreeSet;

    fn response(answer: &str) -> AskResponse {
        AskResponse {
            answer: answer.to_string(),
            mode: ResponseMode::Rag,
            citations: vec![1],
            sources: vec![],
            usage: Usage {
                tier: "factual".into(),
                model: "fast".into(),
                input_tokens: 10,
                output_tokens: 20,
                embedding_ms: 1,
                search_ms: 1,
                rerank_ms: 1,
                generation_ms: 1,
                total_ms: 5,
                cache_hit: false,
            },
            warnings: BTreeSet::new(),
        }
    }

    #[test]
    fn identical_params_produce_identical_key() {
        let a = CacheKeyParams {
            query: "How do I compress a kick drum?",
            top_k: 3,
            confidence_threshold: 0.58,
            genre_filter: None,
            sub_domain_filter: None,
            model_tier: "factual",
        };
        let b = CacheKeyParams {
            query: "  HOW DO I COMPRESS A KICK DRUM?  ",
            top_k: 3,
            confidence_threshold: 0.58,
            genre_filter: None,
            sub_domain_filter: None,
            model_tier: "factual",
        };
        assert_eq!(ResponseCache::key(&a), ResponseCache::key(&b));
    }

    #[test]
    fn put_then_get_round_trips_within_ttl() {
        let cache = ResponseCache::new(ResponseCacheConfig::default());
        let key = "k1".to_string();
        cache.put(key.clone(), response("use a 4:1 ratio [1]"));
        let got = cache.get(&key).unwrap();
        assert_eq!(got.answer, "use a 4:1 ratio [1]");
    }

    #[test]
    fn different_top_k_produces_different_key() {
        let a = CacheKeyParams {
            query: "q",
            top_k: 3,
            confidence_threshold: 0.58,
            genre_filter: None,
            sub_domain_filter: None,
            model_tier: "factual",
        };
        let b = CacheKeyParams { top_k: 5, ..a.clone() };
        assert_ne!(ResponseCache::key(&a), ResponseCache::key(&b));
    }
}
