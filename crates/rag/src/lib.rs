//! Retrieval: hybrid dense + lexical search, reranking, query expansion,
//! embedding orchestration, and context assembly for the ask pipeline.

pub mod cache;
pub mod context;
pub mod embedding_client;
pub mod ollama_embeddings;
pub mod query_expansion;
pub mod reranker;
pub mod retriever;
pub mod sparse_search;
pub mod vector_store;

pub use cache::{EmbeddingCache, EmbeddingCacheConfig};
pub use context::ContextBuilder;
pub use embedding_client::{EmbedOneResult, EmbeddingClient};
pub use ollama_embeddings::{OllamaEmbedder, OllamaEmbeddingConfig};
pub use query_expansion::{ExpandedQuery, QueryExpander};
pub use reranker::{Reranker, RerankerConfig, RerankerStats};
pub use retriever::{HybridSearch, HybridSearchConfig};
pub use sparse_search::{SparseConfig, SparseIndex};
pub use vector_store::{VectorStore, VectorStoreConfig};
