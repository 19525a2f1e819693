//! Lexical (BM25) index over chunk text, backed by Tantivy.
//!
//! Grounded on the teacher's `SparseIndex` (index/schema/writer-reader
//! lifecycle, `RwLock<Option<IndexWriter>>` idiom) dropped down to a single
//! `text` field keyed by chunk id — the teacher's multilingual/Hindi
//! tokenizer registration doesn't apply to this corpus, so the English
//! stemming pipeline (`SimpleTokenizer` + `LowerCaser` + `Stemmer::English`)
//! is used directly. Tantivy's built-in BM25 scorer uses fixed `k1=1.2`,
//! `b=0.75` (spec §4.7's defaults) — no per-query tuning knob exists or is
//! needed.

use parking_lot::RwLock;
use std::path::Path;
use tantivy::{
    collector::TopDocs,
    query::QueryParser,
    schema::{Field, OwnedValue, Schema, TextFieldIndexing, TextOptions, STORED, STRING},
    tokenizer::{Language, LowerCaser, RemoveLongFilter, SimpleTokenizer, Stemmer, TextAnalyzer},
    Index, IndexReader, IndexWriter, TantivyDocument,
};

use async_trait::async_trait;

use askd_core::error::Error;
use askd_core::traits::{LexicalIndex, VectorMatch};

#[derive(Debug, Clone)]
pub struct SparseConfig {
    /// Index path; RAM-backed if `None` (used by tests).
    pub index_path: Option<String>,
}

impl Default for SparseConfig {
    fn default() -> Self {
        Self { index_path: None }
    }
}

pub struct SparseIndex {
    index: Index,
    reader: IndexReader,
    writer: RwLock<Option<IndexWriter>>,
    id_field: Field,
    text_field: Field,
    sub_domain_field: Field,
}

impl SparseIndex {
    pub fn new(config: SparseConfig) -> Result<Self, Error> {
        let mut schema_builder = Schema::builder();

        let text_options = TextOptions::default()
            .set_indexing_options(
                TextFieldIndexing::default()
                    .set_tokenizer("en_stem_simple")
                    .set_index_option(tantivy::schema::IndexRecordOption::WithFreqsAndPositions),
            )
            .set_stored();

        let id_field = schema_builder.add_text_field("id", STRING | STORED);
        let text_field = schema_builder.add_text_field("text", text_options);
        let sub_domain_field = schema_builder.add_text_field("sub_domain", STRING | STORED);

        let schema = schema_builder.build();

        let index = if let Some(ref path) = config.index_path {
            let dir = tantivy::directory::MmapDirectory::open(Path::new(path))
                .map_err(|e| Error::SearchUnavailable(format!("index dir: {e}")))?;
            Index::open_or_create(dir, schema.clone())
                .map_err(|e| Error::SearchUnavailable(format!("index open: {e}")))?
        } else {
            Index::create_in_ram(schema.clone())
        };

        let tokenizer = TextAnalyzer::builder(SimpleTokenizer::default())
            .filter(RemoveLongFilter::limit(60))
            .filter(LowerCaser)
            .filter(Stemmer::new(Language::English))
            .build();
        index.tokenizers().register("en_stem_simple", tokenizer);

        let reader = index
            .reader()
            .map_err(|e| Error::SearchUnavailable(format!("index reader: {e}")))?;
        let writer = index
            .writer(50_000_000)
            .map_err(|e| Error::SearchUnavailable(format!("index writer: {e}")))?;

        Ok(Self {
            index,
            reader,
            writer: RwLock::new(Some(writer)),
            id_field,
            text_field,
            sub_domain_field,
        })
    }

    /// Indexes a chunk's text. Production population is the ingestion
    /// collaborator's responsibility (spec §1); this exists for test
    /// fixtures and for a same-process dev setup that shares this index.
    pub fn index_chunk(&self, id: &str, text: &str, sub_domain: Option<&str>) -> Result<(), Error> {
        let mut writer = self.writer.write();
        let writer = writer
            .as_mut()
            .ok_or_else(|| Error::SearchUnavailable("lexical writer unavailable".into()))?;

        let mut doc = TantivyDocument::default();
        doc.add_text(self.id_field, id);
        doc.add_text(self.text_field, text);
        if let Some(sd) = sub_domain {
            doc.add_text(self.sub_domain_field, sd);
        }
        writer
            .add_document(doc)
            .map_err(|e| Error::SearchUnavailable(format!("add_document: {e}")))?;
        writer
            .commit()
            .map_err(|e| Error::SearchUnavailable(format!("commit: {e}")))?;
        self.reader
            .reload()
            .map_err(|e| Error::SearchUnavailable(format!("reload: {e}")))?;
        Ok(())
    }

    pub fn doc_count(&self) -> u64 {
        self.reader.searcher().num_docs()
    }
}

#[async_trait]
impl LexicalIndex for SparseIndex {
    async fn lexical_search(
        &self,
        query_text: &str,
        k: usize,
        sub_domain_filter: Option<&str>,
    ) -> Result<Vec<VectorMatch>, Error> {
        let searcher = self.reader.searcher();
        let query_parser = QueryParser::for_index(&self.index, vec![self.text_field]);
        let query = query_parser
            .parse_query(query_text)
            .map_err(|e| Error::SearchUnavailable(format!("query parse: {e}")))?;

        let top_docs = searcher
            .search(&query, &TopDocs::with_limit(k))
            .map_err(|e| Error::SearchUnavailable(format!("bm25 search: {e}")))?;

        let mut results = Vec::with_capacity(top_docs.len());
        for (score, addr) in top_docs {
            let doc: TantivyDocument = searcher
                .doc(addr)
                .map_err(|e| Error::SearchUnavailable(format!("doc fetch: {e}")))?;

            if let Some(filter) = sub_domain_filter {
                let sd = doc.get_first(self.sub_domain_field).and_then(|v| match v {
                    OwnedValue::Str(s) => Some(s.as_str()),
                    _ => None,
                });
                if sd != Some(filter) {
                    continue;
                }
            }

            let chunk_id = doc
                .get_first(self.id_field)
                .and_then(|v| match v {
                    OwnedValue::Str(s) => Some(s.to_string()),
                    _ => None,
                })
                .unwrap_or_default();
            results.push(VectorMatch { chunk_id, score });
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn indexes_and_finds_by_keyword() {
        let idx = SparseIndex::new(SparseConfig::default()).unwrap();
        idx.index_chunk("c1", "compressing a kick drum with a fast attack", None)
            .unwrap();
        idx.index_chunk("c2", "eq tips for vocal clarity", None).unwrap();
        assert_eq!(idx.doc_count(), 2);

        let hits = idx.lexical_search("compress kick drum", 5, None).await.unwrap();
        assert!(!hits.is_empty());
        assert_eq!(hits[0].chunk_id, "c1");
    }

    #[tokio::test]
    async fn sub_domain_filter_excludes_non_matching() {
        let idx = SparseIndex::new(SparseConfig::default()).unwrap();
        idx.index_chunk("c1", "mixing console routing basics", Some("mixing"))
            .unwrap();
        idx.index_chunk("c2", "mixing bus compression tricks", Some("mastering"))
            .unwrap();

        let hits = idx
            .lexical_search("mixing", 5, Some("mastering"))
            .await
            .unwrap();
        assert!(hits.iter().all(|h| h.chunk_id == "c2"));
    }
}
