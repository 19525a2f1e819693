//! Numbered context blocks and the citation source map (§4.10).
//!
//! No teacher file implements this directly; built fresh, following the
//! crate's preference for small pure functions over stateful builders (cf.
//! `query_expansion.rs::expand`).

use askd_core::domain::{RetrievedChunk, SourceMap};

pub struct ContextBuilder {
    /// Character budget derived from the target model's context window
    /// minus a safety margin; blocks are dropped lowest-ranked-first when
    /// the concatenation would exceed it.
    pub char_budget: usize,
}

impl Default for ContextBuilder {
    fn default() -> Self {
        Self { char_budget: 24_000 }
    }
}

impl ContextBuilder {
    pub fn new(char_budget: usize) -> Self {
        Self { char_budget }
    }

    /// `build(chunks) -> (numbered_text, source_map)`. Truncates by dropping
    /// lowest-ranked blocks first and renumbering so the map stays dense and
    /// citations in the answer refer to the post-truncation numbering.
    pub fn build(&self, chunks: &[RetrievedChunk]) -> (String, SourceMap) {
        let mut blocks: Vec<String> = chunks.iter().map(format_block).collect();
        let mut kept = chunks.to_vec();

        while !blocks.is_empty() && blocks.iter().map(|b| b.len()).sum::<usize>() > self.char_budget {
            blocks.pop();
            kept.pop();
        }

        let mut source_map = SourceMap::new();
        let mut numbered_text = String::new();
        for (i, chunk) in kept.into_iter().enumerate() {
            let n = (i + 1) as u32;
            numbered_text.push_str(&format_numbered_block(n, &chunk));
            source_map.insert(n, chunk);
        }

        (numbered_text, source_map)
    }
}

fn format_block(chunk: &RetrievedChunk) -> String {
    format_numbered_block(chunk.rank, chunk)
}

fn format_numbered_block(n: u32, chunk: &RetrievedChunk) -> String {
    let page = chunk
        .chunk
        .page_number
        .map(|p| format!("p.{p}"))
        .unwrap_or_else(|| "p.?".to_string());
    format!(
        "[{n}] ({}, {page}, score: {:.2})\n{}\n",
        chunk.chunk.source_name, chunk.score, chunk.chunk.text
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use askd_core::domain::Chunk;

    fn chunk(rank: u32, score: f32, text: &str) -> RetrievedChunk {
        RetrievedChunk {
            chunk: Chunk {
                id: format!("c{rank}"),
                source_path: format!("/docs/{rank}.pdf"),
                source_name: format!("{rank}.pdf"),
                page_number: Some(1),
                chunk_index: 0,
                token_start: 0,
                token_end: 10,
                text: text.to_string(),
                embedding: vec![0.1],
                sub_domain: None,
            },
            score,
            rank,
            dense_score: Some(score),
            lexical_score: None,
        }
    }

    #[test]
    fn numbering_is_dense_and_one_based() {
        let builder = ContextBuilder::default();
        let chunks = vec![chunk(1, 0.9, "one"), chunk(2, 0.8, "two")];
        let (text, map) = builder.build(&chunks);
        assert!(text.starts_with("[1]"));
        assert!(text.contains("[2]"));
        assert_eq!(map.len(), 2);
        assert_eq!(map.get(&1).unwrap().chunk.text, "one");
    }

    #[test]
    fn truncation_drops_lowest_ranked_first_and_renumbers() {
        let builder = ContextBuilder::new(10);
        let chunks = vec![
            chunk(1, 0.9, "short"),
            chunk(2, 0.8, "this block is long enough to force truncation of lower ranks"),
        ];
        let (text, map) = builder.build(&chunks);
        assert_eq!(map.len(), 1);
        assert!(text.contains("[1]"));
        assert!(!text.contains("[2]"));
    }
}
