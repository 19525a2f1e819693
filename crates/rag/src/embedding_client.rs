//! `embed_one`/`embed_many` orchestration over a remote `Embedder` (§4.6).
//!
//! No teacher file implements this orchestration layer directly — closest
//! analog is `ollama_embeddings.rs::AsyncOllamaEmbedder`, a thin `Arc`
//! wrapper with no cache or breaker. This composes the cache-then-remote
//! idiom spec §9 calls out explicitly ("decorator-style cache becomes
//! explicit: call sites ask the cache first, then the remote") with the
//! breaker wrapping idiom from `llm/src/backend.rs`'s retry loop.

use std::sync::Arc;

use askd_core::circuit_breaker::{CircuitBreaker, Outcome};
use askd_core::error::{Error, Result};
use askd_core::traits::Embedder;

use crate::cache::EmbeddingCache;

pub struct EmbedOneResult {
    pub vector: Vec<f32>,
    pub cache_hit: bool,
}

pub struct EmbeddingClient {
    provider: Arc<dyn Embedder>,
    cache: Arc<EmbeddingCache>,
    breaker: Arc<CircuitBreaker>,
}

impl EmbeddingClient {
    pub fn new(provider: Arc<dyn Embedder>, cache: Arc<EmbeddingCache>, breaker: Arc<CircuitBreaker>) -> Self {
        Self {
            provider,
            cache,
            breaker,
        }
    }

    pub fn dim(&self) -> usize {
        self.provider.dim()
    }

    /// Cache-then-remote for a single query embedding. A cache hit never
    /// touches the breaker. On miss, the remote call is breaker-guarded;
    /// only a successful call is written back to the cache.
    pub async fn embed_one(&self, text: &str) -> Result<EmbedOneResult> {
        if let Some(vector) = self.cache.get(text) {
            return Ok(EmbedOneResult {
                vector,
                cache_hit: true,
            });
        }

        let owned = text.to_string();
        let provider = self.provider.clone();
        let outcome = self
            .breaker
            .call(|| async move {
                match provider.embed(std::slice::from_ref(&owned)).await {
                    Ok(mut vectors) if !vectors.is_empty() => {
                        (Ok(vectors.remove(0)), Outcome::Success)
                    },
                    Ok(_) => (
                        Err(Error::EmbeddingUnavailable("empty embedding batch".into())),
                        Outcome::Failure,
                    ),
                    Err(e) => (Err(e), Outcome::Failure),
                }
            })
            .await;

        let vector = match outcome {
            Ok(Ok(v)) => v,
            Ok(Err(e)) => return Err(e),
            Err(_) => return Err(Error::EmbeddingUnavailable("circuit open".into())),
        };

        self.cache.put(text, vector.clone());
        Ok(EmbedOneResult {
            vector,
            cache_hit: false,
        })
    }

    /// Batch path: never consults the cache, calls the remote once.
    pub async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let owned = texts.to_vec();
        let provider = self.provider.clone();
        let outcome = self
            .breaker
            .call(|| async move {
                match provider.embed(&owned).await {
                    Ok(vectors) => (Ok(vectors), Outcome::Success),
                    Err(e) => (Err(e), Outcome::Failure),
                }
            })
            .await;

        match outcome {
            Ok(Ok(vectors)) => Ok(vectors),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(Error::EmbeddingUnavailable("circuit open".into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::EmbeddingCacheConfig;
    use askd_core::circuit_breaker::BreakerConfig;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingEmbedder {
        calls: AtomicUsize,
        dim: usize,
        fail: bool,
    }

    #[async_trait]
    impl Embedder for CountingEmbedder {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(Error::EmbeddingUnavailable("simulated failure".into()));
            }
            Ok(texts.iter().map(|_| vec![1.0; self.dim]).collect())
        }

        fn dim(&self) -> usize {
            self.dim
        }
    }

    fn client(fail: bool) -> (EmbeddingClient, Arc<CountingEmbedder>) {
        let provider = Arc::new(CountingEmbedder {
            calls: AtomicUsize::new(0),
            dim: 4,
            fail,
        });
        let cache = Arc::new(EmbeddingCache::new(EmbeddingCacheConfig::default()));
        let breaker = Arc::new(CircuitBreaker::new(BreakerConfig::default()));
        (
            EmbeddingClient::new(provider.clone(), cache, breaker),
            provider,
        )
    }

    #[tokio::test]
    async fn embed_one_caches_on_success() {
        let (client, provider) = client(false);
        let first = client.embed_one("kick drum compression").await.unwrap();
        assert!(!first.cache_hit);
        let second = client.embed_one("kick drum compression").await.unwrap();
        assert!(second.cache_hit);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn embed_one_does_not_cache_on_failure() {
        let (client, _) = client(true);
        assert!(client.embed_one("anything").await.is_err());
        assert!(client.embed_one("anything").await.is_err());
    }

    #[tokio::test]
    async fn embed_many_skips_cache_and_calls_once() {
        let (client, provider) = client(false);
        let texts = vec!["a".to_string(), "b".to_string()];
        let result = client.embed_many(&texts).await.unwrap();
        assert_eq!(result.len(), 2);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }
}
