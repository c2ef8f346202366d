//! Semantic, keyword and hybrid retrieval with result caching.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future;
use scribe_embed::{Embedder, EmbeddingProvider};
use scribe_store::{DistanceMetric, MetadataFilter, RetrievalResult, VectorStore};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::cache::RetrievalCache;
use crate::error::{IndexError, Result};
use crate::keyword::keyword_search;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryType {
    /// Embed the query and rank by vector similarity.
    Semantic,
    /// Match query terms against chunk text and metadata tags.
    Keyword,
    /// Weighted combination of both.
    #[default]
    Hybrid,
}

/// One retrieval request. Every field takes part in the cache key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalContext {
    pub query: String,
    #[serde(default)]
    pub query_type: QueryType,
    pub max_results: usize,
    /// Results scoring below this are dropped before truncation.
    #[serde(default)]
    pub min_score: f32,
    #[serde(default)]
    pub filters: MetadataFilter,
}

impl RetrievalContext {
    #[must_use]
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            query_type: QueryType::default(),
            max_results: 10,
            min_score: 0.0,
            filters: MetadataFilter::default(),
        }
    }

    #[must_use]
    pub fn with_query_type(mut self, query_type: QueryType) -> Self {
        self.query_type = query_type;
        self
    }

    #[must_use]
    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results;
        self
    }

    #[must_use]
    pub fn with_min_score(mut self, min_score: f32) -> Self {
        self.min_score = min_score;
        self
    }

    #[must_use]
    pub fn with_filters(mut self, filters: MetadataFilter) -> Self {
        self.filters = filters;
        self
    }

    /// # Errors
    ///
    /// Returns [`IndexError::InvalidQuery`] for a blank query, a zero result
    /// limit or a non-finite threshold.
    pub fn validate(&self) -> Result<()> {
        if self.query.trim().is_empty() {
            return Err(IndexError::InvalidQuery("query text is empty".into()));
        }
        if self.max_results == 0 {
            return Err(IndexError::InvalidQuery("max_results must be positive".into()));
        }
        if !self.min_score.is_finite() {
            return Err(IndexError::InvalidQuery("min_score must be finite".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HybridWeights {
    pub semantic: f32,
    pub keyword: f32,
}

impl Default for HybridWeights {
    fn default() -> Self {
        Self {
            semantic: 0.7,
            keyword: 0.3,
        }
    }
}

impl HybridWeights {
    /// # Errors
    ///
    /// Returns [`IndexError::Config`] for negative weights or a zero sum.
    pub fn validate(&self) -> Result<()> {
        let valid = |w: f32| w.is_finite() && w >= 0.0;
        if !valid(self.semantic) || !valid(self.keyword) {
            return Err(IndexError::Config(format!(
                "hybrid weights must be non-negative, got semantic={} keyword={}",
                self.semantic, self.keyword
            )));
        }
        if self.semantic + self.keyword <= 0.0 {
            return Err(IndexError::Config("hybrid weights must not both be zero".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// `max_results` of contexts built by [`Retriever::context`].
    pub default_max_results: usize,
    pub weights: HybridWeights,
    /// Candidates fetched per sub-search, as a multiple of `max_results`.
    pub candidate_multiplier: usize,
    pub metric: DistanceMetric,
    pub cache_ttl_secs: u64,
    pub cache_capacity: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_max_results: 10,
            weights: HybridWeights::default(),
            candidate_multiplier: 3,
            metric: DistanceMetric::Cosine,
            cache_ttl_secs: 300,
            cache_capacity: 256,
        }
    }
}

impl RetrievalConfig {
    /// # Errors
    ///
    /// Returns [`IndexError::Config`] when a field is out of range.
    pub fn validate(&self) -> Result<()> {
        self.weights.validate()?;
        if self.default_max_results == 0 {
            return Err(IndexError::Config("default_max_results must be positive".into()));
        }
        if self.candidate_multiplier == 0 {
            return Err(IndexError::Config("candidate_multiplier must be positive".into()));
        }
        Ok(())
    }

    #[must_use]
    pub fn build_cache(&self) -> RetrievalCache {
        RetrievalCache::new(Duration::from_secs(self.cache_ttl_secs), self.cache_capacity)
    }
}

/// Read path over a shared vector store.
pub struct Retriever<P> {
    store: Arc<dyn VectorStore>,
    embedder: Arc<Embedder<P>>,
    cache: Arc<RetrievalCache>,
    config: RetrievalConfig,
}

impl<P: EmbeddingProvider> Retriever<P> {
    /// # Errors
    ///
    /// Returns [`IndexError::Config`] if `config` is invalid or the store and
    /// embedder disagree on the vector dimension.
    pub fn new(
        store: Arc<dyn VectorStore>,
        embedder: Arc<Embedder<P>>,
        config: RetrievalConfig,
    ) -> Result<Self> {
        config.validate()?;
        if store.dimension() != embedder.dimensions() {
            return Err(IndexError::Config(format!(
                "store dimension {} differs from embedding dimension {}",
                store.dimension(),
                embedder.dimensions()
            )));
        }
        let cache = Arc::new(config.build_cache());
        Ok(Self {
            store,
            embedder,
            cache,
            config,
        })
    }

    /// Share `cache` with an [`Indexer`](crate::Indexer) so index mutations
    /// invalidate it.
    #[must_use]
    pub fn with_cache(mut self, cache: Arc<RetrievalCache>) -> Self {
        self.cache = cache;
        self
    }

    #[must_use]
    pub fn cache(&self) -> &Arc<RetrievalCache> {
        &self.cache
    }

    #[must_use]
    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Hybrid context for `query` with the configured result limit.
    #[must_use]
    pub fn context(&self, query: impl Into<String>) -> RetrievalContext {
        RetrievalContext::new(query).with_max_results(self.config.default_max_results)
    }

    /// # Errors
    ///
    /// See [`retrieve_cancellable`](Self::retrieve_cancellable).
    pub async fn retrieve(&self, ctx: &RetrievalContext) -> Result<Vec<RetrievalResult>> {
        self.retrieve_cancellable(ctx, &CancellationToken::new())
            .await
    }

    /// Ranked results for `ctx`, best first. The order is significant.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::InvalidQuery`] for an invalid context, embedding
    /// errors for semantic queries, store errors, or [`IndexError::Cancelled`].
    /// Hybrid queries fall back to keyword results when embedding the query
    /// fails with a non-fatal error and keyword matching found something.
    pub async fn retrieve_cancellable(
        &self,
        ctx: &RetrievalContext,
        cancel: &CancellationToken,
    ) -> Result<Vec<RetrievalResult>> {
        ctx.validate()?;
        if cancel.is_cancelled() {
            return Err(IndexError::Cancelled);
        }

        let key = RetrievalCache::key(ctx, self.config.metric)?;
        if let Some(hit) = self.cache.get(&key) {
            tracing::debug!(query = %ctx.query, results = hit.len(), "retrieval cache hit");
            return Ok(hit);
        }
        let generation = self.cache.generation();

        let (candidates, complete) = match ctx.query_type {
            QueryType::Semantic => (self.semantic_candidates(ctx, cancel).await?, true),
            QueryType::Keyword => (self.keyword_candidates(ctx).await?, true),
            QueryType::Hybrid => self.hybrid_candidates(ctx, cancel).await?,
        };
        let results = finalize(candidates, ctx);

        tracing::debug!(
            query = %ctx.query,
            query_type = ?ctx.query_type,
            results = results.len(),
            "retrieval complete"
        );
        if complete {
            self.cache.insert(key, results.clone(), generation);
        }
        Ok(results)
    }

    fn candidate_count(&self, ctx: &RetrievalContext) -> usize {
        ctx.max_results
            .saturating_mul(self.config.candidate_multiplier)
    }

    async fn semantic_candidates(
        &self,
        ctx: &RetrievalContext,
        cancel: &CancellationToken,
    ) -> Result<Vec<RetrievalResult>> {
        let vector = self.embedder.embed_query(&ctx.query, cancel).await?;
        let results = self
            .store
            .search(
                &vector,
                self.candidate_count(ctx),
                self.config.metric,
                &ctx.filters,
            )
            .await?;
        Ok(results)
    }

    async fn keyword_candidates(&self, ctx: &RetrievalContext) -> Result<Vec<RetrievalResult>> {
        let records = self.store.scan(&ctx.filters).await?;
        Ok(keyword_search(&ctx.query, records))
    }

    /// Merged candidates, and whether both sub-searches succeeded. Degraded
    /// results are not cached.
    async fn hybrid_candidates(
        &self,
        ctx: &RetrievalContext,
        cancel: &CancellationToken,
    ) -> Result<(Vec<RetrievalResult>, bool)> {
        let (semantic, keyword) = future::join(
            self.semantic_candidates(ctx, cancel),
            self.keyword_candidates(ctx),
        )
        .await;
        let keyword = keyword?;

        let semantic = match semantic {
            Ok(results) => results,
            Err(e @ IndexError::Embed(_)) if !e.is_fatal() && !keyword.is_empty() => {
                tracing::warn!(
                    query = %ctx.query,
                    "query embedding failed, using keyword results only: {e}"
                );
                return Ok((keyword, false));
            }
            Err(e) => return Err(e),
        };

        Ok((merge(semantic, keyword, self.config.weights), true))
    }
}

/// Normalize `results` into `[0, 1]` by the best score, clamping negatives.
fn normalize(results: &mut [RetrievalResult]) {
    let max = results.iter().map(|r| r.score.max(0.0)).fold(0.0_f32, f32::max);
    for r in results.iter_mut() {
        r.score = if max > 0.0 { r.score.max(0.0) / max } else { 0.0 };
    }
}

/// Weighted merge by entry id. Keyword scores are already normalized.
fn merge(
    mut semantic: Vec<RetrievalResult>,
    keyword: Vec<RetrievalResult>,
    weights: HybridWeights,
) -> Vec<RetrievalResult> {
    normalize(&mut semantic);
    let mut merged: Vec<RetrievalResult> = Vec::with_capacity(semantic.len() + keyword.len());
    let mut position: HashMap<String, usize> = HashMap::with_capacity(merged.capacity());

    for mut r in semantic {
        r.score *= weights.semantic;
        position.insert(r.id.clone(), merged.len());
        merged.push(r);
    }
    for mut k in keyword {
        let weighted = k.score * weights.keyword;
        if let Some(&i) = position.get(&k.id) {
            merged[i].score += weighted;
        } else {
            k.score = weighted;
            position.insert(k.id.clone(), merged.len());
            merged.push(k);
        }
    }
    merged
}

fn rank(a: &RetrievalResult, b: &RetrievalResult) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.file_path.cmp(&b.file_path))
        .then_with(|| a.chunk_index().cmp(&b.chunk_index()))
        .then_with(|| a.id.cmp(&b.id))
}

/// Threshold, sort and truncate. The threshold applies before truncation.
fn finalize(mut results: Vec<RetrievalResult>, ctx: &RetrievalContext) -> Vec<RetrievalResult> {
    results.retain(|r| r.score >= ctx.min_score);
    results.sort_by(rank);
    results.truncate(ctx.max_results);
    results
}
