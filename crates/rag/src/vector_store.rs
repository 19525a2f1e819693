//! Dense vector index backed by Qdrant.
//!
//! Read-only from this crate's perspective (spec §1: ingestion owns corpus
//! writes). Grounded on the teacher's `VectorStore` (`Qdrant` client setup,
//! `SearchPointsBuilder`/`collection_info` usage) narrowed to the
//! `askd_core::traits::VectorIndex` seam and extended with `fetch` (point
//! retrieval by id, needed once `HybridSearch` has deduplicated candidate ids
//! from both retrievals) and `collection_info` (startup dimension check,
//! spec §9 Open Question 4).

use async_trait::async_trait;
use qdrant_client::qdrant::{
    value::Kind, GetPointsBuilder, PointId, SearchPointsBuilder, WithPayloadSelector,
    WithVectorsSelector,
};
use qdrant_client::Qdrant;
use std::collections::HashMap;

use askd_core::domain::Chunk;
use askd_core::error::Error;
use askd_core::traits::{VectorIndex, VectorMatch};

#[derive(Debug, Clone)]
pub struct VectorStoreConfig {
    pub endpoint: String,
    pub collection: String,
    pub api_key: Option<String>,
}

pub struct VectorStore {
    client: Qdrant,
    collection: String,
}

impl VectorStore {
    pub fn new(config: VectorStoreConfig) -> Result<Self, Error> {
        let mut builder = Qdrant::from_url(&config.endpoint);
        if let Some(api_key) = config.api_key {
            builder = builder.api_key(api_key);
        }
        let client = builder
            .build()
            .map_err(|e| Error::SearchUnavailable(format!("qdrant client: {e}")))?;
        Ok(Self {
            client,
            collection: config.collection,
        })
    }

    /// Dimension reported by the collection, used by the server's startup
    /// sequence to validate against `embedding.dim` (spec §9 Open Question
    /// 4: mismatch is fatal).
    pub async fn collection_dim(&self) -> Result<Option<u64>, Error> {
        let info = self
            .client
            .collection_info(&self.collection)
            .await
            .map_err(|e| Error::SearchUnavailable(format!("collection_info: {e}")))?;
        Ok(info.result.and_then(|r| r.config).and_then(|c| {
            c.params
                .and_then(|p| p.vectors_config)
                .and_then(|vc| vc.config)
                .and_then(|cfg| match cfg {
                    qdrant_client::qdrant::vectors_config::Config::Params(p) => Some(p.size),
                    _ => None,
                })
        }))
    }

    pub async fn collection_exists(&self) -> Result<bool, Error> {
        self.client
            .collection_exists(&self.collection)
            .await
            .map_err(|e| Error::SearchUnavailable(format!("collection_exists: {e}")))
    }
}

fn chunk_from_payload(id: String, embedding: Vec<f32>, payload: HashMap<String, qdrant_client::qdrant::Value>) -> Chunk {
    let mut source_path = String::new();
    let mut source_name = String::new();
    let mut page_number = None;
    let mut chunk_index = 0u32;
    let mut token_start = 0u32;
    let mut token_end = 0u32;
    let mut text = String::new();
    let mut sub_domain = None;

    for (k, v) in payload {
        match (k.as_str(), v.kind) {
            ("source_path", Some(Kind::StringValue(s))) => source_path = s,
            ("source_name", Some(Kind::StringValue(s))) => source_name = s,
            ("page_number", Some(Kind::IntegerValue(n))) => page_number = Some(n as u32),
            ("chunk_index", Some(Kind::IntegerValue(n))) => chunk_index = n as u32,
            ("token_start", Some(Kind::IntegerValue(n))) => token_start = n as u32,
            ("token_end", Some(Kind::IntegerValue(n))) => token_end = n as u32,
            ("text", Some(Kind::StringValue(s))) => text = s,
            ("sub_domain", Some(Kind::StringValue(s))) => sub_domain = Some(s),
            _ => {},
        }
    }

    Chunk {
        id,
        source_path,
        source_name,
        page_number,
        chunk_index,
        token_start,
        token_end,
        text,
        embedding,
        sub_domain,
    }
}

#[async_trait]
impl VectorIndex for VectorStore {
    async fn knn_search(
        &self,
        query_vector: &[f32],
        k: usize,
        sub_domain_filter: Option<&str>,
    ) -> Result<Vec<VectorMatch>, Error> {
        let mut builder = SearchPointsBuilder::new(&self.collection, query_vector.to_vec(), k as u64)
            .with_payload(false);

        if let Some(sub_domain) = sub_domain_filter {
            let filter = qdrant_client::qdrant::Filter::must([
                qdrant_client::qdrant::Condition::matches("sub_domain", sub_domain.to_string()),
            ]);
            builder = builder.filter(filter);
        }

        let results = self
            .client
            .search_points(builder)
            .await
            .map_err(|e| Error::SearchUnavailable(format!("dense search: {e}")))?;

        Ok(results
            .result
            .into_iter()
            .map(|p| VectorMatch {
                chunk_id: point_id_to_string(p.id),
                score: p.score,
            })
            .collect())
    }

    async fn fetch(&self, ids: &[String]) -> Result<Vec<Chunk>, Error> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let point_ids: Vec<PointId> = ids.iter().map(|id| PointId::from(id.clone())).collect();
        let response = self
            .client
            .get_points(
                GetPointsBuilder::new(&self.collection, point_ids)
                    .with_payload(WithPayloadSelector::from(true))
                    .with_vectors(WithVectorsSelector::from(true)),
            )
            .await
            .map_err(|e| Error::SearchUnavailable(format!("fetch: {e}")))?;

        Ok(response
            .result
            .into_iter()
            .map(|p| {
                let id = p.id.clone().map(point_id_to_string).unwrap_or_default();
                let embedding = p
                    .vectors
                    .and_then(|v| v.vectors_options)
                    .and_then(|opt| match opt {
                        qdrant_client::qdrant::vectors::VectorsOptions::Vector(v) => Some(v.data),
                        _ => None,
                    })
                    .unwrap_or_default();
                chunk_from_payload(id, embedding, p.payload)
            })
            .collect())
    }
}

fn point_id_to_string(id: PointId) -> String {
    match id.point_id_options {
        Some(qdrant_client::qdrant::point_id::PointIdOptions::Uuid(u)) => u,
        Some(qdrant_client::qdrant::point_id::PointIdOptions::Num(n)) => n.to_string(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_from_payload_reads_all_fields() {
        let mut payload = HashMap::new();
        payload.insert(
            "source_path".to_string(),
            qdrant_client::qdrant::Value::from("/corpus/a.pdf".to_string()),
        );
        payload.insert(
            "source_name".to_string(),
            qdrant_client::qdrant::Value::from("a.pdf".to_string()),
        );
        payload.insert("chunk_index".to_string(), qdrant_client::qdrant::Value::from(3i64));
        payload.insert("token_start".to_string(), qdrant_client::qdrant::Value::from(10i64));
        payload.insert("token_end".to_string(), qdrant_client::qdrant::Value::from(20i64));
        payload.insert(
            "text".to_string(),
            qdrant_client::qdrant::Value::from("hello".to_string()),
        );

        let chunk = chunk_from_payload("id1".to_string(), vec![0.1, 0.2], payload);
        assert_eq!(chunk.source_path, "/corpus/a.pdf");
        assert_eq!(chunk.chunk_index, 3);
        assert_eq!(chunk.token_start, 10);
        assert_eq!(chunk.token_end, 20);
        assert_eq!(chunk.text, "hello");
    }
}
