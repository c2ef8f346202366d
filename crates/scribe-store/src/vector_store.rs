use std::future::Future;
use std::pin::Pin;

use crate::distance::DistanceMetric;
use crate::error::{Result, StoreError};
use crate::types::{EntryRecord, IndexEntry, MetadataFilter, RetrievalResult};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Storage of `(id, vector, metadata, content)` entries with exact top-k
/// similarity search.
///
/// Mutations are serialised against each other and against searches;
/// searches and reads may run concurrently.
pub trait VectorStore: Send + Sync {
    /// Insert or fully overwrite one entry.
    fn put(&self, entry: IndexEntry) -> BoxFuture<'_, Result<()>>;

    /// Insert or overwrite many entries in one transaction.
    fn put_many(&self, entries: Vec<IndexEntry>) -> BoxFuture<'_, Result<()>>;

    /// `Ok(None)` when the id is unknown.
    fn get<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<Option<IndexEntry>>>;

    /// Returns whether an entry was removed.
    fn delete<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<bool>>;

    /// Remove every entry matching `filter`. Returns the number removed.
    fn delete_matching<'a>(&'a self, filter: &'a MetadataFilter) -> BoxFuture<'a, Result<u64>>;

    /// Atomically remove every entry matching `filter` and insert `entries`.
    fn replace_matching(
        &self,
        filter: MetadataFilter,
        entries: Vec<IndexEntry>,
    ) -> BoxFuture<'_, Result<u64>>;

    /// Best `k` entries by `metric`, pre-filtered by `filter`, sorted
    /// descending with ties broken by id. Empty store yields an empty list.
    fn search<'a>(
        &'a self,
        query: &'a [f32],
        k: usize,
        metric: DistanceMetric,
        filter: &'a MetadataFilter,
    ) -> BoxFuture<'a, Result<Vec<RetrievalResult>>>;

    /// Entries matching `filter`, without vectors.
    fn scan<'a>(&'a self, filter: &'a MetadataFilter) -> BoxFuture<'a, Result<Vec<EntryRecord>>>;

    fn count(&self) -> BoxFuture<'_, Result<u64>>;

    /// Remove every entry. The recorded dimension and model are kept.
    fn clear(&self) -> BoxFuture<'_, Result<()>>;

    /// Length every stored and query vector must have.
    fn dimension(&self) -> usize;
}

pub(crate) fn check_dimension(expected: usize, actual: usize) -> Result<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(StoreError::DimensionMismatch { expected, actual })
    }
}

fn first_non_finite(vector: &[f32]) -> Option<usize> {
    vector.iter().position(|x| !x.is_finite())
}

/// Stored vectors must have the store's dimension and finite components.
pub(crate) fn validate_entry(entry: &IndexEntry, dimension: usize) -> Result<()> {
    if entry.id.is_empty() {
        return Err(StoreError::InvalidEntry("empty id".into()));
    }
    check_dimension(dimension, entry.vector.len())?;
    if let Some(i) = first_non_finite(&entry.vector) {
        return Err(StoreError::InvalidEntry(format!(
            "{}: component {i} is not finite",
            entry.id
        )));
    }
    Ok(())
}

pub(crate) fn validate_query(query: &[f32], dimension: usize) -> Result<()> {
    check_dimension(dimension, query.len())?;
    match first_non_finite(query) {
        Some(i) => Err(StoreError::InvalidQuery(format!("component {i} is not finite"))),
        None => Ok(()),
    }
}
