//! Authority, filename, diversity, and MMR reranking (§4.8).
//!
//! The teacher's `EarlyExitReranker` is a cross-encoder cascade structurally
//! unrelated to this pipeline; kept only as texture (the `Mutex<RerankerStats>`
//! idiom for call-site observability survives below). The four-step pipeline
//! itself — authority boost, filename boost, per-document diversity cap, MMR
//! refinement — is new, implementing the ordered steps exactly.

use parking_lot::Mutex;

use askd_core::domain::RetrievedChunk;

#[derive(Debug, Clone)]
pub struct RerankerConfig {
    pub max_per_document: usize,
    pub course_boost: f32,
    pub filename_boost: f32,
    pub mmr_lambda: f32,
    pub mmr_enabled: bool,
    pub course_markers: Vec<String>,
}

impl Default for RerankerConfig {
    fn default() -> Self {
        Self {
            max_per_document: askd_config::constants::rag::MAX_PER_DOCUMENT,
            course_boost: askd_config::constants::rag::COURSE_BOOST,
            filename_boost: askd_config::constants::rag::FILENAME_BOOST,
            mmr_lambda: askd_config::constants::rag::MMR_LAMBDA,
            mmr_enabled: true,
            course_markers: vec!["/courses/".to_string(), "masterclass".to_string()],
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RerankerStats {
    pub total_calls: usize,
    pub total_candidates: usize,
    pub diversity_dropped: usize,
}

pub struct Reranker {
    config: RerankerConfig,
    stats: Mutex<RerankerStats>,
}

impl Reranker {
    pub fn new(config: RerankerConfig) -> Self {
        Self {
            config,
            stats: Mutex::new(RerankerStats::default()),
        }
    }

    pub fn stats(&self) -> RerankerStats {
        self.stats.lock().clone()
    }

    /// `rerank(candidates, intent, filename_keywords, top_k) -> Vec<RetrievedChunk>`,
    /// length at most `top_k`, ranks 1-based and gap-free.
    pub fn rerank(
        &self,
        mut candidates: Vec<RetrievedChunk>,
        filename_keywords: &[String],
        top_k: usize,
    ) -> Vec<RetrievedChunk> {
        {
            let mut stats = self.stats.lock();
            stats.total_calls += 1;
            stats.total_candidates += candidates.len();
        }

        self.apply_authority_boost(&mut candidates);
        self.apply_filename_boost(&mut candidates, filename_keywords);

        candidates.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

        let diverse = self.apply_diversity_cap(candidates, top_k);

        let selected = if self.config.mmr_enabled {
            self.mmr_refine(diverse, top_k)
        } else {
            diverse.into_iter().take(top_k).collect()
        };

        self.finalize(selected)
    }

    fn apply_authority_boost(&self, candidates: &mut [RetrievedChunk]) {
        for c in candidates.iter_mut() {
            if self
                .config
                .course_markers
                .iter()
                .any(|marker| c.chunk.source_path.contains(marker.as_str()))
            {
                c.score *= self.config.course_boost;
            }
        }
    }

    fn apply_filename_boost(&self, candidates: &mut [RetrievedChunk], filename_keywords: &[String]) {
        if filename_keywords.is_empty() {
            return;
        }
        for c in candidates.iter_mut() {
            let name_lower = c.chunk.source_name.to_lowercase();
            if filename_keywords
                .iter()
                .any(|kw| name_lower.contains(&kw.to_lowercase()))
            {
                c.score *= self.config.filename_boost;
            }
        }
    }

    /// Walks score-ordered candidates, admitting at most `max_per_document`
    /// per `source_path`, until `top_k` is filled or the pool is exhausted.
    fn apply_diversity_cap(&self, candidates: Vec<RetrievedChunk>, top_k: usize) -> Vec<RetrievedChunk> {
        let mut per_doc: std::collections::HashMap<String, usize> = std::collections::HashMap::new();
        let mut out = Vec::with_capacity(top_k);
        let mut dropped = 0usize;

        for c in candidates {
            if out.len() >= top_k {
                break;
            }
            let count = per_doc.entry(c.chunk.source_path.clone()).or_insert(0);
            if *count >= self.config.max_per_document {
                dropped += 1;
                continue;
            }
            *count += 1;
            out.push(c);
        }

        self.stats.lock().diversity_dropped += dropped;
        out
    }

    /// Greedy maximal marginal relevance: at each step pick the candidate
    /// maximizing `λ · relevance − (1 − λ) · max_similarity_to_selected`,
    /// using dense embeddings for the similarity term.
    fn mmr_refine(&self, candidates: Vec<RetrievedChunk>, top_k: usize) -> Vec<RetrievedChunk> {
        if candidates.len() <= 1 {
            return candidates;
        }
        let lambda = self.config.mmr_lambda;
        let mut pool = candidates;
        let mut selected: Vec<RetrievedChunk> = Vec::with_capacity(top_k.min(pool.len()));

        while !pool.is_empty() && selected.len() < top_k {
            let mut best_idx = 0;
            let mut best_mmr = f32::MIN;

            for (i, candidate) in pool.iter().enumerate() {
                let max_sim = selected
                    .iter()
                    .map(|s| cosine_similarity(&candidate.chunk.embedding, &s.chunk.embedding))
                    .fold(0.0f32, f32::max);
                let mmr = lambda * candidate.score - (1.0 - lambda) * max_sim;
                if mmr > best_mmr {
                    best_mmr = mmr;
                    best_idx = i;
                }
            }

            selected.push(pool.remove(best_idx));
        }

        selected
    }

    /// Clips final scores to `[0, 1]` for reporting and assigns dense,
    /// gap-free 1-based ranks.
    fn finalize(&self, mut chunks: Vec<RetrievedChunk>) -> Vec<RetrievedChunk> {
        for (rank, c) in chunks.iter_mut().enumerate() {
            c.score = c.score.clamp(0.0, 1.0);
            c.rank = (rank + 1) as u32;
        }
        chunks
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use askd_core::domain::Chunk;

    fn chunk(id: &str, path: &str, name: &str, score: f32, embedding: Vec<f32>) -> RetrievedChunk {
        RetrievedChunk {
            chunk: Chunk {
                id: id.to_string(),
                source_path: path.to_string(),
                source_name: name.to_string(),
                page_number: None,
                chunk_index: 0,
                token_start: 0,
                token_end: 10,
                text: "text".to_string(),
                embedding,
                sub_domain: None,
            },
            score,
            rank: 0,
            dense_score: Some(score),
            lexical_score: None,
        }
    }

    #[test]
    fn authority_boost_applies_to_course_sources() {
        let reranker = Reranker::new(RerankerConfig::default());
        let candidates = vec![
            chunk("a", "/courses/mixing101/a.pdf", "a.pdf", 0.5, vec![1.0, 0.0]),
            chunk("b", "/youtube/b.pdf", "b.pdf", 0.5, vec![0.0, 1.0]),
        ];
        let out = reranker.rerank(candidates, &[], 2);
        let a = out.iter().find(|c| c.chunk.id == "a").unwrap();
        let b = out.iter().find(|c| c.chunk.id == "b").unwrap();
        assert!(a.score > b.score);
    }

    #[test]
    fn diversity_cap_admits_at_most_one_per_document_by_default() {
        let reranker = Reranker::new(RerankerConfig::default());
        let candidates = vec![
            chunk("a1", "/docs/a.pdf", "a.pdf", 0.9, vec![1.0, 0.0]),
            chunk("a2", "/docs/a.pdf", "a.pdf", 0.85, vec![0.9, 0.1]),
            chunk("b1", "/docs/b.pdf", "b.pdf", 0.8, vec![0.0, 1.0]),
        ];
        let out = reranker.rerank(candidates, &[], 3);
        let paths: std::collections::HashSet<&str> =
            out.iter().map(|c| c.chunk.source_path.as_str()).collect();
        assert_eq!(paths.len(), out.len());
    }

    #[test]
    fn ranks_are_dense_and_one_based() {
        let reranker = Reranker::new(RerankerConfig::default());
        let candidates = vec![
            chunk("a", "/docs/a.pdf", "a.pdf", 0.9, vec![1.0, 0.0]),
            chunk("b", "/docs/b.pdf", "b.pdf", 0.7, vec![0.0, 1.0]),
        ];
        let out = reranker.rerank(candidates, &[], 5);
        assert_eq!(out[0].rank, 1);
        assert_eq!(out[1].rank, 2);
    }

    #[test]
    fn filename_boost_applies_only_to_matching_names() {
        let reranker = Reranker::new(RerankerConfig::default());
        let candidates = vec![
            chunk("a", "/docs/a.pdf", "mastering_guide.pdf", 0.5, vec![1.0, 0.0]),
            chunk("b", "/docs/b.pdf", "unrelated.pdf", 0.5, vec![0.0, 1.0]),
        ];
        let out = reranker.rerank(candidates, &["mastering".to_string()], 2);
        let a = out.iter().find(|c| c.chunk.id == "a").unwrap();
        let b = out.iter().find(|c| c.chunk.id == "b").unwrap();
        assert!(a.score > b.score);
    }
}
