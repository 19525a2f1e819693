//! Bounded map with LRU-on-write eviction and TTL-on-read expiry.
//!
//! Shared by `askd-rag`'s `EmbeddingCache` (§4.1) and `askd-server`'s
//! `ResponseCache` (§4.4) — both specs call for "the same LRU+TTL" shape, so
//! it lives here once rather than being duplicated per call site. No teacher
//! file survives for this exact shape (`rag/src/cache.rs` is referenced by
//! the teacher's own `lib.rs` but missing from the pack); built fresh,
//! following the `parking_lot::Mutex`-guarded-struct idiom seen throughout
//! the teacher (`reranker.rs::Mutex<RerankerStats>`,
//! `sparse_search.rs::RwLock<Option<IndexWriter>>`).

use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};

struct Entry<V> {
    value: V,
    inserted_at: Instant,
}

struct Inner<V> {
    map: HashMap<String, Entry<V>>,
    /// Most-recently-used key at the back.
    recency: Vec<String>,
}

pub struct TtlCache<V> {
    max_size: usize,
    ttl: Duration,
    inner: Mutex<Inner<V>>,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(max_size: usize, ttl: Duration) -> Self {
        Self {
            max_size,
            ttl,
            inner: Mutex::new(Inner {
                map: HashMap::new(),
                recency: Vec::new(),
            }),
        }
    }

    /// Expired entries are treated as a miss and removed (TTL-on-read).
    /// A hit bumps the key's recency.
    pub fn get(&self, key: &str) -> Option<V> {
        let mut inner = self.inner.lock();
        let expired = match inner.map.get(key) {
            Some(e) => e.inserted_at.elapsed() > self.ttl,
            None => return None,
        };
        if expired {
            inner.map.remove(key);
            inner.recency.retain(|k| k != key);
            return None;
        }
        Self::touch(&mut inner.recency, key);
        inner.map.get(key).map(|e| e.value.clone())
    }

    /// Evicts the least-recently-used entry if at capacity (LRU-on-write).
    pub fn put(&self, key: String, value: V) {
        let mut inner = self.inner.lock();
        if !inner.map.contains_key(&key) && inner.map.len() >= self.max_size {
            if let Some(lru_key) = (!inner.recency.is_empty()).then(|| inner.recency.remove(0)) {
                inner.map.remove(&lru_key);
            }
        }
        inner.map.insert(
            key.clone(),
            Entry {
                value,
                inserted_at: Instant::now(),
            },
        );
        Self::touch(&mut inner.recency, &key);
    }

    fn touch(recency: &mut Vec<String>, key: &str) {
        recency.retain(|k| k != key);
        recency.push(key.to_string());
    }

    /// Sweeps expired entries without waiting for a `get` to discover them.
    pub fn evict_expired(&self) {
        let mut inner = self.inner.lock();
        let ttl = self.ttl;
        let expired: Vec<String> = inner
            .map
            .iter()
            .filter(|(_, e)| e.inserted_at.elapsed() > ttl)
            .map(|(k, _)| k.clone())
            .collect();
        for k in expired {
            inner.map.remove(&k);
            inner.recency.retain(|x| x != &k);
        }
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.map.clear();
        inner.recency.clear();
    }

    pub fn size(&self) -> usize {
        self.inner.lock().map.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_put_get() {
        let c = TtlCache::new(10, Duration::from_secs(60));
        c.put("a".into(), 1);
        assert_eq!(c.get("a"), Some(1));
        assert_eq!(c.size(), 1);
    }

    #[test]
    fn expired_entry_is_a_miss_and_removed() {
        let c = TtlCache::new(10, Duration::from_millis(5));
        c.put("a".into(), 1);
        std::thread::sleep(Duration::from_millis(15));
        assert_eq!(c.get("a"), None);
        assert_eq!(c.size(), 0);
    }

    #[test]
    fn lru_eviction_on_write_at_capacity() {
        let c = TtlCache::new(2, Duration::from_secs(60));
        c.put("a".into(), 1);
        c.put("b".into(), 2);
        // touch "a" so "b" becomes LRU
        c.get("a");
        c.put("c".into(), 3);
        assert_eq!(c.get("b"), None);
        assert_eq!(c.get("a"), Some(1));
        assert_eq!(c.get("c"), Some(3));
    }

    #[test]
    fn clear_empties_cache() {
        let c = TtlCache::new(10, Duration::from_secs(60));
        c.put("a".into(), 1);
        c.clear();
        assert_eq!(c.size(), 0);
    }
}
