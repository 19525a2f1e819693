//! Embedded per-session memory store (§4.15), backed by `sqlx` + SQLite.
//!
//! Grounded structurally on `recall.rs::RecallMemory` (per-session storage,
//! `search(query, top_k) -> Vec<SearchResult>` signature shape) but the
//! teacher's store is pure in-process (`RwLock<VecDeque<_>>`, lost on
//! restart) and its `search_by_embedding` is an admitted stub returning
//! `Vec::new()`. Spec §4.15 requires persistence ("a small embedded
//! relational store indexed by session_id") and real cosine similarity, so
//! this is a fresh `sqlx::SqlitePool`-backed implementation, following the
//! workspace's preference for a narrow trait over the raw driver (cf.
//! `rag/src/vector_store.rs` wrapping `qdrant-client`).

use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;

use askd_core::domain::{MemoryEntry, MemoryType};
use askd_core::error::{Error, Result};
use askd_core::traits::{MemoryStore, ScoredMemory};

pub struct SqliteMemoryStore {
    pool: SqlitePool,
}

impl SqliteMemoryStore {
    pub async fn connect(database_path: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&format!("sqlite://{database_path}"))
            .map_err(|e| Error::MemoryUnavailable(e.to_string()))?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect_with(options)
            .await
            .map_err(|e| Error::MemoryUnavailable(e.to_string()))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS memory_entries (
                id TEXT PRIMARY KEY,
                session_id TEXT NOT NULL,
                memory_type TEXT NOT NULL,
                content TEXT NOT NULL,
                embedding TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await
        .map_err(|e| Error::MemoryUnavailable(e.to_string()))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_memory_session ON memory_entries(session_id)")
            .execute(&pool)
            .await
            .map_err(|e| Error::MemoryUnavailable(e.to_string()))?;

        Ok(Self { pool })
    }
}

fn memory_type_str(kind: MemoryType) -> &'static str {
    match kind {
        MemoryType::Practice => "practice",
        MemoryType::Preference => "preference",
        MemoryType::Achievement => "achievement",
        MemoryType::Context => "context",
    }
}

fn parse_memory_type(s: &str) -> Result<MemoryType> {
    match s {
        "practice" => Ok(MemoryType::Practice),
        "preference" => Ok(MemoryType::Preference),
        "achievement" => Ok(MemoryType::Achievement),
        "context" => Ok(MemoryType::Context),
        other => Err(Error::MemoryUnavailable(format!("unknown memory_type {other}"))),
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 { 0.0 } else { dot / (norm_a * norm_b) }
}

#[async_trait]
impl MemoryStore for SqliteMemoryStore {
    async fn add(&self, entry: MemoryEntry) -> Result<()> {
        let embedding_json = serde_json::to_string(&entry.embedding)
            .map_err(|e| Error::MemoryUnavailable(e.to_string()))?;

        sqlx::query(
            "INSERT INTO memory_entries (id, session_id, memory_type, content, embedding, created_at) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&entry.id)
        .bind(&entry.session_id)
        .bind(memory_type_str(entry.memory_type))
        .bind(&entry.content)
        .bind(embedding_json)
        .bind(entry.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| Error::MemoryUnavailable(e.to_string()))?;

        Ok(())
    }

    async fn list(&self, session_id: &str) -> Result<Vec<MemoryEntry>> {
        let rows = sqlx::query_as::<_, (String, String, String, String, String, String)>(
            "SELECT id, session_id, memory_type, content, embedding, created_at FROM memory_entries WHERE session_id = ? ORDER BY created_at DESC",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::MemoryUnavailable(e.to_string()))?;

        rows.into_iter().map(row_to_entry).collect()
    }

    async fn search(&self, session_id: &str, query_vector: &[f32], k: usize) -> Result<Vec<ScoredMemory>> {
        let entries = self.list(session_id).await?;

        let mut scored: Vec<ScoredMemory> = entries
            .into_iter()
            .map(|entry| {
                let score = cosine_similarity(query_vector, &entry.embedding);
                ScoredMemory { entry, decayed_score: score }
            })
            .collect();

        scored.sort_by(|a, b| b.decayed_score.partial_cmp(&a.decayed_score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        Ok(scored)
    }
}

fn row_to_entry(row: (String, String, String, String, String, String)) -> Result<MemoryEntry> {
    let (id, session_id, memory_type, content, embedding_json, created_at) = row;
    let embedding: Vec<f32> =
        serde_json::from_str(&embedding_json).map_err(|e| Error::MemoryUnavailable(e.to_string()))?;
    let created_at = chrono::DateTime::parse_from_rfc3339(&created_at)
        .map_err(|e| Error::MemoryUnavailable(e.to_string()))?
        .with_timezone(&Utc);

    Ok(MemoryEntry {
        id,
        session_id,
        memory_type: parse_memory_type(&memory_type)?,
        content,
        embedding,
        created_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    async fn store() -> SqliteMemoryStore {
        let path = std::env::temp_dir().join(format!("askd-memory-test-{}.db", Uuid::new_v4()));
        SqliteMemoryStore::connect(path.to_str().unwrap()).await.unwrap()
    }

    fn entry(session_id: &str, embedding: Vec<f32>) -> MemoryEntry {
        MemoryEntry {
            id: Uuid::new_v4().to_string(),
            session_id: session_id.to_string(),
            memory_type: MemoryType::Practice,
            content: "practiced scales daily".to_string(),
            embedding,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn add_then_list_round_trips() {
        let store = store().await;
        store.add(entry("s1", vec![1.0, 0.0])).await.unwrap();
        let listed = store.list("s1").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].content, "practiced scales daily");
    }

    #[tokio::test]
    async fn search_ranks_by_cosine_similarity() {
        let store = store().await;
        store.add(entry("s1", vec![1.0, 0.0])).await.unwrap();
        store.add(entry("s1", vec![0.0, 1.0])).await.unwrap();
        let results = store.search("s1", &[1.0, 0.0], 5).await.unwrap();
        assert_eq!(results.len(), 2);
        assert!(results[0].decayed_score > results[1].decayed_score);
    }

    #[tokio::test]
    async fn search_isolates_by_session() {
        let store = store().await;
        store.add(entry("s1", vec![1.0, 0.0])).await.unwrap();
        store.add(entry("s2", vec![1.0, 0.0])).await.unwrap();
        let results = store.search("s1", &[1.0, 0.0], 5).await.unwrap();
        assert_eq!(results.len(), 1);
    }
}
