//! Embedding fingerprint cache (§4.1).
//!
//! No teacher file survives for this exact module — `rag/src/cache.rs` is
//! referenced by the teacher's own `lib.rs` but absent from the retrieval
//! pack. Built on `askd_core::ttl_cache::TtlCache`, the same LRU+TTL
//! primitive the response cache (§4.4) uses, keyed by a fingerprint of the
//! normalized text rather than the raw query.

use askd_core::ttl_cache::TtlCache;
use sha2::{Digest, Sha256};
use unicode_normalization::UnicodeNormalization;

#[derive(Debug, Clone)]
pub struct EmbeddingCacheConfig {
    pub max_size: usize,
    pub ttl_seconds: u64,
}

impl Default for EmbeddingCacheConfig {
    fn default() -> Self {
        Self {
            max_size: 10_000,
            ttl_seconds: 3600,
        }
    }
}

pub struct EmbeddingCache {
    inner: TtlCache<Vec<f32>>,
}

impl EmbeddingCache {
    pub fn new(config: EmbeddingCacheConfig) -> Self {
        Self {
            inner: TtlCache::new(config.max_size, std::time::Duration::from_secs(config.ttl_seconds)),
        }
    }

    pub fn get(&self, text: &str) -> Option<Vec<f32>> {
        self.inner.get(&fingerprint(text))
    }

    pub fn put(&self, text: &str, vector: Vec<f32>) {
        self.inner.put(fingerprint(text), vector);
    }

    pub fn evict_expired(&self) {
        self.inner.evict_expired()
    }

    pub fn clear(&self) {
        self.inner.clear();
    }

    pub fn size(&self) -> usize {
        self.inner.size()
    }
}

/// Cryptographic digest of the normalized text (trimmed, NFC, lowercased
/// for cache-hit purposes only — the raw text, not this normalized form,
/// is what gets sent to the embedder on a miss).
fn fingerprint(text: &str) -> String {
    let normalized: String = text.trim().nfc().collect::<String>().to_lowercase();
    let digest = Sha256::digest(normalized.as_bytes());
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_normalized_text_hits_cache() {
        let cache = EmbeddingCache::new(EmbeddingCacheConfig::default());
        cache.put("Compress A Kick Drum", vec![0.1, 0.2]);
        assert_eq!(cache.get("  compress a kick drum  "), Some(vec![0.1, 0.2]));
    }

    #[test]
    fn different_text_misses() {
        let cache = EmbeddingCache::new(EmbeddingCacheConfig::default());
        cache.put("compress a kick drum", vec![0.1, 0.2]);
        assert_eq!(cache.get("eq a vocal"), None);
    }

    #[test]
    fn size_reflects_insertions() {
        let cache = EmbeddingCache::new(EmbeddingCacheConfig::default());
        cache.put("a", vec![1.0]);
        cache.put("b", vec![2.0]);
        assert_eq!(cache.size(), 2);
    }
}
