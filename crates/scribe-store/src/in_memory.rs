use std::collections::HashMap;
use std::sync::RwLock;

use crate::distance::{DistanceMetric, top_k};
use crate::error::{Result, StoreError};
use crate::types::{EntryRecord, IndexEntry, MetadataFilter, RetrievalResult};
use crate::vector_store::{BoxFuture, VectorStore, validate_entry, validate_query};

/// Map-backed store for ephemeral indexes and tests.
pub struct InMemoryVectorStore {
    dimension: usize,
    entries: RwLock<HashMap<String, IndexEntry>>,
}

impl InMemoryVectorStore {
    #[must_use]
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            entries: RwLock::new(HashMap::new()),
        }
    }
}

impl std::fmt::Debug for InMemoryVectorStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryVectorStore")
            .field("dimension", &self.dimension)
            .finish_non_exhaustive()
    }
}

impl VectorStore for InMemoryVectorStore {
    fn put(&self, entry: IndexEntry) -> BoxFuture<'_, Result<()>> {
        self.put_many(vec![entry])
    }

    fn put_many(&self, entries: Vec<IndexEntry>) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            for entry in &entries {
                validate_entry(entry, self.dimension)?;
            }
            let mut map = self.entries.write().map_err(|_| StoreError::LockPoisoned)?;
            for entry in entries {
                map.insert(entry.id.clone(), entry);
            }
            Ok(())
        })
    }

    fn get<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<Option<IndexEntry>>> {
        Box::pin(async move {
            let map = self.entries.read().map_err(|_| StoreError::LockPoisoned)?;
            Ok(map.get(id).cloned())
        })
    }

    fn delete<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async move {
            let mut map = self.entries.write().map_err(|_| StoreError::LockPoisoned)?;
            Ok(map.remove(id).is_some())
        })
    }

    fn delete_matching<'a>(&'a self, filter: &'a MetadataFilter) -> BoxFuture<'a, Result<u64>> {
        Box::pin(async move {
            let mut map = self.entries.write().map_err(|_| StoreError::LockPoisoned)?;
            let before = map.len();
            map.retain(|_, e| !filter.matches(&e.metadata));
            Ok((before - map.len()) as u64)
        })
    }

    fn replace_matching(
        &self,
        filter: MetadataFilter,
        entries: Vec<IndexEntry>,
    ) -> BoxFuture<'_, Result<u64>> {
        Box::pin(async move {
            for entry in &entries {
                validate_entry(entry, self.dimension)?;
            }
            let mut map = self.entries.write().map_err(|_| StoreError::LockPoisoned)?;
            let before = map.len();
            map.retain(|_, e| !filter.matches(&e.metadata));
            let removed = (before - map.len()) as u64;
            for entry in entries {
                map.insert(entry.id.clone(), entry);
            }
            Ok(removed)
        })
    }

    fn search<'a>(
        &'a self,
        query: &'a [f32],
        k: usize,
        metric: DistanceMetric,
        filter: &'a MetadataFilter,
    ) -> BoxFuture<'a, Result<Vec<RetrievalResult>>> {
        Box::pin(async move {
            validate_query(query, self.dimension)?;
            let map = self.entries.read().map_err(|_| StoreError::LockPoisoned)?;
            let scored: Vec<(f32, String)> = map
                .values()
                .filter(|e| filter.matches(&e.metadata))
                .map(|e| (metric.score(query, &e.vector), e.id.clone()))
                .collect();

            Ok(top_k(scored, k)
                .into_iter()
                .filter_map(|(score, id)| {
                    let e = map.get(&id)?;
                    Some(RetrievalResult::from_parts(
                        id,
                        score,
                        e.metadata.clone(),
                        e.content.clone(),
                    ))
                })
                .collect())
        })
    }

    fn scan<'a>(&'a self, filter: &'a MetadataFilter) -> BoxFuture<'a, Result<Vec<EntryRecord>>> {
        Box::pin(async move {
            let map = self.entries.read().map_err(|_| StoreError::LockPoisoned)?;
            let mut records: Vec<EntryRecord> = map
                .values()
                .filter(|e| filter.matches(&e.metadata))
                .map(|e| EntryRecord {
                    id: e.id.clone(),
                    metadata: e.metadata.clone(),
                    content: e.content.clone(),
                })
                .collect();
            records.sort_by(|a, b| a.id.cmp(&b.id));
            Ok(records)
        })
    }

    fn count(&self) -> BoxFuture<'_, Result<u64>> {
        Box::pin(async move {
            let map = self.entries.read().map_err(|_| StoreError::LockPoisoned)?;
            Ok(map.len() as u64)
        })
    }

    fn clear(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.entries
                .write()
                .map_err(|_| StoreError::LockPoisoned)?
                .clear();
            Ok(())
        })
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
