//! Time-decayed memory retrieval and prompt-block formatting (§4.15).
//!
//! Grounded on `core.rs::AgenticMemory::get_context_for_query`'s
//! priority-budgeted injection into the prompt, narrowed to the spec's exact
//! three-step procedure: search, decay + threshold, group-and-format.

use std::collections::BTreeMap;
use std::sync::Arc;

use askd_core::domain::MemoryType;
use askd_core::traits::{Clock, MemoryStore};

#[derive(Debug, Clone)]
pub struct MemoryInjectorConfig {
    pub decay_lambda_per_day: f32,
    pub trigger_threshold: f32,
    pub top_k: usize,
}

impl Default for MemoryInjectorConfig {
    fn default() -> Self {
        Self {
            decay_lambda_per_day: askd_config::constants::rag::MEMORY_DECAY_LAMBDA_PER_DAY,
            trigger_threshold: askd_config::constants::rag::MEMORY_TRIGGER_THRESHOLD,
            top_k: askd_config::constants::rag::MEMORY_TOP_K,
        }
    }
}

pub struct MemoryInjector {
    store: Arc<dyn MemoryStore>,
    clock: Arc<dyn Clock>,
    config: MemoryInjectorConfig,
}

struct DecayedEntry {
    memory_type: MemoryType,
    content: String,
    score: f32,
}

impl MemoryInjector {
    pub fn new(store: Arc<dyn MemoryStore>, clock: Arc<dyn Clock>, config: MemoryInjectorConfig) -> Self {
        Self { store, clock, config }
    }

    /// Returns `None` when every candidate decays below the trigger
    /// threshold, or the store returned nothing — in both cases injection
    /// is simply skipped, never an error by itself (store failures are
    /// surfaced by the caller catching the `Result` from `search`).
    pub async fn inject(&self, session_id: &str, query_vector: &[f32]) -> askd_core::error::Result<Option<String>> {
        let matches = self.store.search(session_id, query_vector, self.config.top_k).await?;
        let now = self.clock.now();

        let mut decayed: Vec<DecayedEntry> = matches
            .into_iter()
            .filter_map(|m| {
                let days = (now - m.entry.created_at).num_seconds() as f32 / 86_400.0;
                let score = m.decayed_score * (-self.config.decay_lambda_per_day * days.max(0.0)).exp();
                if score < self.config.trigger_threshold {
                    None
                } else {
                    Some(DecayedEntry { memory_type: m.entry.memory_type, content: m.entry.content, score })
                }
            })
            .collect();

        if decayed.is_empty() {
            return Ok(None);
        }

        decayed.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        Ok(Some(format_block(&decayed)))
    }
}

fn format_block(entries: &[DecayedEntry]) -> String {
    let mut grouped: BTreeMap<&'static str, Vec<&DecayedEntry>> = BTreeMap::new();
    for entry in entries {
        grouped.entry(memory_type_label(entry.memory_type)).or_default().push(entry);
    }

    let mut block = String::from("Relevant memories:\n");
    for (label, entries) in grouped {
        block.push_str(&format!("{label}:\n"));
        for entry in entries {
            block.push_str(&format!("- {}\n", entry.content));
        }
    }
    block
}

fn memory_type_label(kind: MemoryType) -> &'static str {
    match kind {
        MemoryType::Practice => "Practice",
        MemoryType::Preference => "Preference",
        MemoryType::Achievement => "Achievement",
        MemoryType::Context => "Context",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use askd_core::domain::MemoryEntry;
    use askd_core::error::Result;
    use askd_core::traits::ScoredMemory;
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};

    struct FixedClock(DateTime<Utc>);
    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.0
        }
    }

    struct FakeStore(Vec<ScoredMemory>);
    #[async_trait]
    impl MemoryStore for FakeStore {
        async fn add(&self, _entry: MemoryEntry) -> Result<()> {
            Ok(())
        }
        async fn list(&self, _session_id: &str) -> Result<Vec<MemoryEntry>> {
            Ok(self.0.iter().map(|m| m.entry.clone()).collect())
        }
        async fn search(&self, _session_id: &str, _query_vector: &[f32], k: usize) -> Result<Vec<ScoredMemory>> {
            Ok(self.0.iter().take(k).cloned().collect())
        }
    }

    fn entry(score: f32, days_old: i64, content: &str, now: DateTime<Utc>) -> ScoredMemory {
        ScoredMemory {
            entry: MemoryEntry {
                id: "m1".to_string(),
                session_id: "s1".to_string(),
                memory_type: MemoryType::Practice,
                content: content.to_string(),
                embedding: vec![1.0],
                created_at: now - chrono::Duration::days(days_old),
            },
            decayed_score: score,
        }
    }

    #[tokio::test]
    async fn entries_below_trigger_threshold_are_dropped() {
        let now = Utc::now();
        let store = Arc::new(FakeStore(vec![entry(0.5, 100, "old memory", now)]));
        let injector = MemoryInjector::new(store, Arc::new(FixedClock(now)), MemoryInjectorConfig::default());
        let result = injector.inject("s1", &[1.0]).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn fresh_high_similarity_entry_survives_and_is_formatted() {
        let now = Utc::now();
        let store = Arc::new(FakeStore(vec![entry(0.9, 0, "likes punchy kicks", now)]));
        let injector = MemoryInjector::new(store, Arc::new(FixedClock(now)), MemoryInjectorConfig::default());
        let result = injector.inject("s1", &[1.0]).await.unwrap().unwrap();
        assert!(result.contains("likes punchy kicks"));
        assert!(result.contains("Practice"));
    }
}
