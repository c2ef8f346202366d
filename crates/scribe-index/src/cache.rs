//! Retrieval result cache.
//!
//! Keys are the blake3 hash of the canonical JSON of the whole retrieval
//! context plus the distance metric, so two contexts differing in any
//! parameter never share an entry. Entries expire after a TTL and the least
//! recently accessed entry is evicted when the cache is full. The cache has
//! its own lock and never waits on the vector store.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use scribe_store::{DistanceMetric, RetrievalResult};
use serde::Serialize;
use tokio::time::Instant;

use crate::error::Result;
use crate::retriever::RetrievalContext;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub len: usize,
}

#[derive(Debug)]
struct CacheEntry {
    results: Vec<RetrievalResult>,
    created_at: Instant,
    accessed_at: Instant,
}

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<String, CacheEntry>,
    /// Bumped by every `clear`, so results computed against an older index
    /// are not stored after the index changed.
    generation: u64,
}

#[derive(Debug)]
pub struct RetrievalCache {
    ttl: Duration,
    capacity: usize,
    state: Mutex<CacheState>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

#[derive(Serialize)]
struct KeyParts<'a> {
    context: &'a RetrievalContext,
    metric: &'a str,
}

impl RetrievalCache {
    /// A `capacity` of zero disables caching.
    #[must_use]
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            ttl,
            capacity,
            state: Mutex::new(CacheState::default()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Deterministic key over every field of `context` and the metric.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Json`](crate::IndexError::Json) if the context
    /// cannot be serialized.
    pub fn key(context: &RetrievalContext, metric: DistanceMetric) -> Result<String> {
        let canonical = serde_json::to_vec(&KeyParts {
            context,
            metric: metric.as_str(),
        })?;
        Ok(blake3::hash(&canonical).to_hex().to_string())
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current generation, to be passed back to [`insert`](Self::insert).
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<Vec<RetrievalResult>> {
        let now = Instant::now();
        let mut state = self.lock();
        let expired = match state.entries.get_mut(key) {
            Some(entry) if now.duration_since(entry.created_at) < self.ttl => {
                entry.accessed_at = now;
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Some(entry.results.clone());
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            state.entries.remove(key);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Store `results` unless the cache was cleared since `generation` was read.
    pub fn insert(&self, key: String, results: Vec<RetrievalResult>, generation: u64) {
        if self.capacity == 0 || self.ttl.is_zero() {
            return;
        }
        let now = Instant::now();
        let mut state = self.lock();
        if state.generation != generation {
            tracing::debug!("index changed during retrieval, result not cached");
            return;
        }

        if !state.entries.contains_key(&key) {
            state
                .entries
                .retain(|_, e| now.duration_since(e.created_at) < self.ttl);
            while state.entries.len() >= self.capacity {
                let Some(oldest) = state
                    .entries
                    .iter()
                    .min_by_key(|(_, e)| e.accessed_at)
                    .map(|(k, _)| k.clone())
                else {
                    break;
                };
                state.entries.remove(&oldest);
                self.evictions.fetch_add(1, Ordering::Relaxed);
            }
        }

        state.entries.insert(
            key,
            CacheEntry {
                results,
                created_at: now,
                accessed_at: now,
            },
        );
    }

    /// Drop every entry. Called whenever the index is mutated.
    pub fn clear(&self) {
        let mut state = self.lock();
        state.entries.clear();
        state.generation = state.generation.wrapping_add(1);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            len: self.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use scribe_store::{Metadata, MetadataFilter};

    use super::*;
    use crate::retriever::QueryType;

    fn result(id: &str) -> RetrievalResult {
        RetrievalResult {
            id: id.into(),
            file_path: "a.rs".into(),
            content: String::new(),
            score: 1.0,
            metadata: Metadata::new(),
        }
    }

    fn key(ctx: &RetrievalContext) -> String {
        RetrievalCache::key(ctx, DistanceMetric::Cosine).unwrap()
    }

    #[test]
    fn key_covers_every_parameter() {
        let base = RetrievalContext::new("find the parser");
        let variants = [
            RetrievalContext::new("find the lexer"),
            base.clone().with_query_type(QueryType::Keyword),
            base.clone().with_max_results(3),
            base.clone().with_min_score(0.2),
            base.clone().with_filters(MetadataFilter::file("a.rs")),
        ];
        for v in &variants {
            assert_ne!(key(&base), key(v));
        }
        assert_eq!(key(&base), key(&base.clone()));
        assert_ne!(
            key(&base),
            RetrievalCache::key(&base, DistanceMetric::DotProduct).unwrap()
        );
    }

    #[test]
    fn filter_order_does_not_change_key() {
        let a = RetrievalContext::new("q").with_filters(
            MetadataFilter::new().with("language", "rust").with("file_path", "a.rs"),
        );
        let b = RetrievalContext::new("q").with_filters(
            MetadataFilter::new().with("file_path", "a.rs").with("language", "rust"),
        );
        assert_eq!(key(&a), key(&b));
    }

    #[test]
    fn hit_and_miss_are_counted() {
        let cache = RetrievalCache::new(Duration::from_secs(60), 4);
        assert!(cache.get("k").is_none());
        cache.insert("k".into(), vec![result("1")], cache.generation());
        assert_eq!(cache.get("k").unwrap()[0].id, "1");
        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses, stats.len), (1, 1, 1));
    }

    #[tokio::test(start_paused = true)]
    async fn entries_expire() {
        let cache = RetrievalCache::new(Duration::from_secs(5), 4);
        cache.insert("k".into(), vec![result("1")], cache.generation());
        tokio::time::advance(Duration::from_secs(4)).await;
        assert!(cache.get("k").is_some());
        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(cache.get("k").is_none());
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn evicts_least_recently_accessed() {
        let cache = RetrievalCache::new(Duration::from_secs(60), 2);
        let generation = cache.generation();
        cache.insert("a".into(), vec![result("a")], generation);
        tokio::time::advance(Duration::from_millis(10)).await;
        cache.insert("b".into(), vec![result("b")], generation);
        tokio::time::advance(Duration::from_millis(10)).await;
        assert!(cache.get("a").is_some());
        tokio::time::advance(Duration::from_millis(10)).await;
        cache.insert("c".into(), vec![result("c")], generation);

        assert!(cache.get("a").is_some());
        assert!(cache.get("b").is_none());
        assert!(cache.get("c").is_some());
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn clear_discards_in_flight_results() {
        let cache = RetrievalCache::new(Duration::from_secs(60), 4);
        let stale = cache.generation();
        cache.insert("k".into(), vec![result("1")], stale);
        cache.clear();
        assert!(cache.is_empty());
        cache.insert("k".into(), vec![result("1")], stale);
        assert!(cache.is_empty());
        cache.insert("k".into(), vec![result("1")], cache.generation());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn zero_capacity_disables_caching() {
        let cache = RetrievalCache::new(Duration::from_secs(60), 0);
        cache.insert("k".into(), vec![result("1")], cache.generation());
        assert!(cache.get("k").is_none());
    }
}
