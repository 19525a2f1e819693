//! Hybrid dense + lexical retrieval with Reciprocal Rank Fusion (§4.7).
//!
//! Grounded on the teacher's `HybridRetriever` (`tokio::join!` for parallel
//! dense/sparse search, `HashMap<id, (score, candidate)>` fusion
//! accumulator) narrowed to compose the `VectorIndex`/`LexicalIndex` trait
//! objects rather than owning Qdrant/Tantivy directly, and to implement the
//! spec's exact RRF formula rather than the teacher's score-blend variant.

use std::collections::HashMap;
use std::sync::Arc;

use askd_core::domain::{Chunk, RetrievedChunk};
use askd_core::error::{Error, Result};
use askd_core::traits::{LexicalIndex, VectorIndex};

#[derive(Debug, Clone)]
pub struct HybridSearchConfig {
    pub dense_weight: f32,
    pub lexical_weight: f32,
    pub rrf_k: f32,
    pub k_pool_multiplier: usize,
}

impl Default for HybridSearchConfig {
    fn default() -> Self {
        Self {
            dense_weight: askd_config::constants::rag::RRF_DENSE_WEIGHT,
            lexical_weight: askd_config::constants::rag::RRF_LEXICAL_WEIGHT,
            rrf_k: askd_config::constants::rag::RRF_K,
            k_pool_multiplier: askd_config::constants::rag::K_POOL_MULTIPLIER,
        }
    }
}

pub struct HybridSearch {
    vector_index: Arc<dyn VectorIndex>,
    lexical_index: Arc<dyn LexicalIndex>,
    config: HybridSearchConfig,
}

struct Candidate {
    rrf_score: f32,
    dense_score: Option<f32>,
    lexical_score: Option<f32>,
}

impl HybridSearch {
    pub fn new(
        vector_index: Arc<dyn VectorIndex>,
        lexical_index: Arc<dyn LexicalIndex>,
        config: HybridSearchConfig,
    ) -> Self {
        Self {
            vector_index,
            lexical_index,
            config,
        }
    }

    /// Runs dense and lexical search in parallel, fuses by RRF, dereferences
    /// surviving candidates through `VectorIndex::fetch`, and returns the
    /// top `top_k` as fully-hydrated, 1-ranked `RetrievedChunk`s.
    ///
    /// `RRF(c) = w_dense / (K + rank_dense(c)) + w_lexical / (K + rank_lex(c))`
    /// — a candidate absent from one side simply omits that term. Ties are
    /// broken by higher dense cosine score, then lexicographic `source_path`,
    /// so ordering is fully deterministic given identical inputs.
    ///
    /// `RRF(c)` decides fusion *order* only — its magnitude (`~w/(K+rank)`,
    /// at most a few hundredths given `K=60`) is not on the same scale as
    /// `ConfidenceGate`'s `[0,1]` cosine threshold. The `score` carried on
    /// the returned `RetrievedChunk` is the candidate's dense cosine
    /// similarity instead, so downstream boosting (§4.8) and the confidence
    /// gate (§4.9) operate on a comparable `[0,1]` scale; a lexical-only
    /// candidate (no dense hit) scores `0.0` since BM25 magnitudes aren't
    /// comparable to a cosine threshold either.
    pub async fn search(
        &self,
        query_vector: &[f32],
        query_text: &str,
        top_k: usize,
        sub_domain_filter: Option<&str>,
    ) -> Result<Vec<RetrievedChunk>> {
        let pool = top_k * self.config.k_pool_multiplier.max(1);

        let (dense, lexical) = tokio::join!(
            self.vector_index.knn_search(query_vector, pool, sub_domain_filter),
            self.lexical_index.lexical_search(query_text, pool, sub_domain_filter),
        );
        let dense = dense?;
        let lexical = lexical?;

        let mut candidates: HashMap<String, Candidate> = HashMap::new();

        for (rank, m) in dense.iter().enumerate() {
            let rrf = self.config.dense_weight / (self.config.rrf_k + rank as f32 + 1.0);
            candidates
                .entry(m.chunk_id.clone())
                .and_modify(|c| {
                    c.rrf_score += rrf;
                    c.dense_score = Some(m.score);
                })
                .or_insert(Candidate {
                    rrf_score: rrf,
                    dense_score: Some(m.score),
                    lexical_score: None,
                });
        }

        for (rank, m) in lexical.iter().enumerate() {
            let rrf = self.config.lexical_weight / (self.config.rrf_k + rank as f32 + 1.0);
            candidates
                .entry(m.chunk_id.clone())
                .and_modify(|c| {
                    c.rrf_score += rrf;
                    c.lexical_score = Some(m.score);
                })
                .or_insert(Candidate {
                    rrf_score: rrf,
                    dense_score: None,
                    lexical_score: Some(m.score),
                });
        }

        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<String> = candidates.keys().cloned().collect();
        let chunks = self.vector_index.fetch(&ids).await?;
        let chunks_by_id: HashMap<String, Chunk> =
            chunks.into_iter().map(|c| (c.id.clone(), c)).collect();

        let mut fused: Vec<(String, Candidate)> = candidates.into_iter().collect();
        fused.sort_by(|a, b| {
            b.1.rrf_score
                .partial_cmp(&a.1.rrf_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| {
                    let ad = a.1.dense_score.unwrap_or(f32::MIN);
                    let bd = b.1.dense_score.unwrap_or(f32::MIN);
                    bd.partial_cmp(&ad).unwrap_or(std::cmp::Ordering::Equal)
                })
                .then_with(|| {
                    let a_path = chunks_by_id.get(&a.0).map(|c| c.source_path.as_str()).unwrap_or("");
                    let b_path = chunks_by_id.get(&b.0).map(|c| c.source_path.as_str()).unwrap_or("");
                    a_path.cmp(b_path)
                })
        });

        let mut out = Vec::with_capacity(top_k);
        for (rank, (id, candidate)) in fused.into_iter().take(top_k).enumerate() {
            let Some(chunk) = chunks_by_id.get(&id) else {
                continue;
            };
            out.push(RetrievedChunk {
                chunk: chunk.clone(),
                score: candidate.dense_score.unwrap_or(0.0),
                rank: (rank + 1) as u32,
                dense_score: candidate.dense_score,
                lexical_score: candidate.lexical_score,
            });
        }

        if out.is_empty() {
            return Err(Error::SearchUnavailable(
                "fused candidates could not be dereferenced".into(),
            ));
        }

        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use askd_core::traits::VectorMatch;
    use async_trait::async_trait;

    fn chunk(id: &str, path: &str) -> Chunk {
        Chunk {
            id: id.to_string(),
            source_path: path.to_string(),
            source_name: path.to_string(),
            page_number: None,
            chunk_index: 0,
            token_start: 0,
            token_end: 10,
            text: format!("text for {id}"),
            embedding: vec![0.1, 0.2],
            sub_domain: None,
        }
    }

    struct FakeVectors {
        hits: Vec<VectorMatch>,
        store: Vec<Chunk>,
    }

    #[async_trait]
    impl VectorIndex for FakeVectors {
        async fn knn_search(
            &self,
            _query_vector: &[f32],
            _k: usize,
            _sub_domain_filter: Option<&str>,
        ) -> Result<Vec<VectorMatch>> {
            Ok(self.hits.clone())
        }

        async fn fetch(&self, ids: &[String]) -> Result<Vec<Chunk>> {
            Ok(self
                .store
                .iter()
                .filter(|c| ids.contains(&c.id))
                .cloned()
                .collect())
        }
    }

    struct FakeLexical {
        hits: Vec<VectorMatch>,
    }

    #[async_trait]
    impl LexicalIndex for FakeLexical {
        async fn lexical_search(
            &self,
            _query_text: &str,
            _k: usize,
            _sub_domain_filter: Option<&str>,
        ) -> Result<Vec<VectorMatch>> {
            Ok(self.hits.clone())
        }
    }

    #[tokio::test]
    async fn candidate_present_in_both_sides_outranks_single_side_hits() {
        let store = vec![chunk("a", "a.pdf"), chunk("b", "b.pdf"), chunk("c", "c.pdf")];
        let dense = FakeVectors {
            hits: vec![
                VectorMatch { chunk_id: "a".into(), score: 0.9 },
                VectorMatch { chunk_id: "b".into(), score: 0.8 },
            ],
            store,
        };
        let lexical = FakeLexical {
            hits: vec![
                VectorMatch { chunk_id: "a".into(), score: 5.0 },
                VectorMatch { chunk_id: "c".into(), score: 4.0 },
            ],
        };

        let search = HybridSearch::new(Arc::new(dense), Arc::new(lexical), HybridSearchConfig::default());
        let results = search.search(&[0.1, 0.2], "query", 3, None).await.unwrap();

        assert_eq!(results[0].chunk.id, "a");
        assert_eq!(results[0].rank, 1);
        assert!(results[0].dense_score.is_some());
        assert!(results[0].lexical_score.is_some());
    }

    #[tokio::test]
    async fn empty_candidates_returns_empty_vec() {
        let dense = FakeVectors { hits: vec![], store: vec![] };
        let lexical = FakeLexical { hits: vec![] };
        let search = HybridSearch::new(Arc::new(dense), Arc::new(lexical), HybridSearchConfig::default());
        let results = search.search(&[0.1], "query", 3, None).await.unwrap();
        assert!(results.is_empty());
    }

    /// End-to-end HybridSearch -> Reranker -> ConfidenceGate, seeded with
    /// §8 scenario 1's cosine-scale scores (0.82/0.71/0.65, three distinct
    /// `source_path`s). The RRF magnitude (`~w/(K+rank)`, a few hundredths)
    /// must never reach the gate directly — only the dense cosine score
    /// should, so a real top candidate clears the 0.58 threshold.
    #[tokio::test]
    async fn fused_top_score_clears_confidence_gate_on_cosine_scale() {
        let store = vec![chunk("a", "a.pdf"), chunk("b", "b.pdf"), chunk("c", "c.pdf")];
        let dense = FakeVectors {
            hits: vec![
                VectorMatch { chunk_id: "a".into(), score: 0.82 },
                VectorMatch { chunk_id: "b".into(), score: 0.71 },
                VectorMatch { chunk_id: "c".into(), score: 0.65 },
            ],
            store,
        };
        let lexical = FakeLexical { hits: vec![] };

        let search = HybridSearch::new(Arc::new(dense), Arc::new(lexical), HybridSearchConfig::default());
        let candidates = search.search(&[0.1, 0.2], "query", 3, None).await.unwrap();

        let reranker = crate::Reranker::new(crate::RerankerConfig::default());
        let reranked = reranker.rerank(candidates, &[], 3);

        let top_score = reranked.first().map(|c| c.score).unwrap_or(0.0);
        assert!(top_score > 0.58, "top score {top_score} should clear the confidence threshold");
        assert_eq!(
            askd_core::confidence::decide(top_score, 0.58),
            askd_core::confidence::ConfidenceDecision::Allow
        );
    }
}
