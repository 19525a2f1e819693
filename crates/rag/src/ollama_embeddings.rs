//! Remote embedding provider (§6), backed by Ollama's `/api/embed`.
//!
//! Grounded on the teacher's `OllamaEmbedder` (same endpoint, request/response
//! wire shape) narrowed to the `askd_core::traits::Embedder` seam and
//! generalized from single-text to the batch `embed(texts)` signature the
//! trait requires; L2 normalization is applied here since the trait's
//! contract (§8) guarantees unit-norm output regardless of what the remote
//! model returns.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use askd_core::error::{Error, Result};
use askd_core::traits::Embedder;

#[derive(Debug, Clone)]
pub struct OllamaEmbeddingConfig {
    pub endpoint: String,
    pub model: String,
    pub dim: usize,
    pub request_timeout_ms: u64,
}

impl Default for OllamaEmbeddingConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:11434".to_string(),
            model: "nomic-embed-text".to_string(),
            dim: 1536,
            request_timeout_ms: askd_config::constants::timeouts::EMBEDDING_REQUEST_MS,
        }
    }
}

#[derive(Debug, Serialize)]
struct EmbedRequest {
    model: String,
    input: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

pub struct OllamaEmbedder {
    client: Client,
    config: OllamaEmbeddingConfig,
}

impl OllamaEmbedder {
    pub fn new(config: OllamaEmbeddingConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|e| Error::Configuration(format!("embedding client: {e}")))?;
        Ok(Self { client, config })
    }

    async fn embed_raw(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let request = EmbedRequest {
            model: self.config.model.clone(),
            input: texts.to_vec(),
        };
        let url = format!("{}/api/embed", self.config.endpoint);

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::EmbeddingUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Error::EmbeddingUnavailable(format!(
                "ollama embed returned {}",
                response.status()
            )));
        }

        let parsed: EmbedResponse = response
            .json()
            .await
            .map_err(|e| Error::EmbeddingUnavailable(e.to_string()))?;

        for v in &parsed.embeddings {
            if v.len() != self.config.dim {
                return Err(Error::EmbeddingDimensionMismatch {
                    expected: self.config.dim,
                    actual: v.len(),
                });
            }
        }

        Ok(parsed.embeddings.into_iter().map(l2_normalize).collect())
    }
}

fn l2_normalize(mut v: Vec<f32>) -> Vec<f32> {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in &mut v {
            *x /= norm;
        }
    }
    v
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.embed_raw(texts).await
    }

    fn dim(&self) -> usize {
        self.config.dim
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn l2_normalize_produces_unit_vector() {
        let v = l2_normalize(vec![3.0, 4.0]);
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-6);
    }

    #[test]
    fn config_default_matches_spec_dim() {
        let config = OllamaEmbeddingConfig::default();
        assert_eq!(config.dim, 1536);
    }
}
