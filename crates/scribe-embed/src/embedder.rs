//! Batching, throttling and retry on top of a single-request provider.

use std::ops::Range;
use std::time::Duration;

use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::EmbedError;
use crate::provider::{EmbedOptions, EmbeddingProvider, RawEmbeddings, Usage};
use crate::rate_limit::RateLimiter;
use crate::retry::RetryPolicy;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbedderConfig {
    pub max_retries: u32,
    #[serde(with = "millis")]
    pub retry_delay: Duration,
    #[serde(with = "millis")]
    pub max_retry_delay: Duration,
    /// Deadline for one HTTP request. Exceeding it is a transient failure.
    #[serde(with = "millis")]
    pub request_timeout: Duration,
    pub requests_per_second: f64,
    pub burst: u32,
    /// Batches in flight at once. `1` sends batches strictly in sequence.
    pub concurrency: usize,
}

impl Default for EmbedderConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay: Duration::from_millis(500),
            max_retry_delay: Duration::from_secs(30),
            request_timeout: Duration::from_secs(30),
            requests_per_second: 10.0,
            burst: 10,
            concurrency: 1,
        }
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

/// Vector for one chunk, tagged with the model that produced it.
#[derive(Clone, Debug, PartialEq)]
pub struct EmbeddingVector {
    pub chunk_id: String,
    pub vector: Vec<f32>,
    pub dimension: usize,
    pub model: String,
}

/// Result of [`Embedder::embed`]: `vectors[i]` belongs to `texts[i]`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Embeddings {
    pub vectors: Vec<Vec<f32>>,
    pub usage: Usage,
    pub model: String,
    pub dimension: usize,
}

impl Embeddings {
    /// Pair vectors with the chunk ids of the texts they were computed from.
    ///
    /// # Errors
    ///
    /// Returns [`EmbedError::Config`] if the id count differs from the vector count.
    pub fn into_labeled(self, ids: Vec<String>) -> Result<Vec<EmbeddingVector>, EmbedError> {
        if ids.len() != self.vectors.len() {
            return Err(EmbedError::Config(format!(
                "{} ids for {} vectors",
                ids.len(),
                self.vectors.len()
            )));
        }
        let Self {
            vectors,
            model,
            dimension,
            ..
        } = self;
        Ok(ids
            .into_iter()
            .zip(vectors)
            .map(|(chunk_id, vector)| EmbeddingVector {
                chunk_id,
                vector,
                dimension,
                model: model.clone(),
            })
            .collect())
    }
}

/// Wraps a provider with batching, rate limiting, retry, per-request
/// timeouts and order tracking.
pub struct Embedder<P> {
    provider: P,
    retry: RetryPolicy,
    request_timeout: Duration,
    limiter: RateLimiter,
    concurrency: usize,
}

impl<P: std::fmt::Debug> std::fmt::Debug for Embedder<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Embedder")
            .field("provider", &self.provider)
            .field("retry", &self.retry)
            .field("request_timeout", &self.request_timeout)
            .field("limiter", &self.limiter)
            .field("concurrency", &self.concurrency)
            .finish()
    }
}

impl<P: EmbeddingProvider> Embedder<P> {
    /// # Errors
    ///
    /// Returns [`EmbedError::Config`] for a non-positive rate or zero timeout.
    pub fn new(provider: P, config: &EmbedderConfig) -> Result<Self, EmbedError> {
        if config.request_timeout.is_zero() {
            return Err(EmbedError::Config("request_timeout must be positive".into()));
        }
        Ok(Self {
            provider,
            retry: RetryPolicy {
                max_retries: config.max_retries,
                retry_delay: config.retry_delay,
                max_delay: config.max_retry_delay,
            },
            request_timeout: config.request_timeout,
            limiter: RateLimiter::new(config.requests_per_second, config.burst)?,
            concurrency: config.concurrency.max(1),
        })
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn dimensions(&self) -> usize {
        self.provider.dimensions()
    }

    pub fn model(&self) -> &str {
        self.provider.model()
    }

    /// Embed `texts`, preserving input order.
    ///
    /// Inputs larger than the provider's batch limit are split into batches;
    /// batch `N`'s item `i` lands at `offset + i`. Any batch failure aborts the
    /// whole call and nothing from earlier batches is returned.
    ///
    /// # Errors
    ///
    /// Returns [`EmbedError::Batch`] naming the failed range, or
    /// [`EmbedError::Cancelled`] if `cancel` fires.
    pub async fn embed(
        &self,
        texts: &[String],
        opts: &EmbedOptions,
        cancel: &CancellationToken,
    ) -> Result<Embeddings, EmbedError> {
        let dimension = self.provider.dimensions();
        let model = self.provider.model().to_owned();
        if texts.is_empty() {
            return Ok(Embeddings {
                vectors: Vec::new(),
                usage: Usage::default(),
                model,
                dimension,
            });
        }

        let batch_size = self.provider.max_batch_size().max(1);
        let ranges: Vec<Range<usize>> = (0..texts.len())
            .step_by(batch_size)
            .map(|start| start..(start + batch_size).min(texts.len()))
            .collect();
        tracing::debug!(
            provider = self.provider.name(),
            texts = texts.len(),
            batches = ranges.len(),
            "embedding texts"
        );

        let mut slots: Vec<Option<Vec<f32>>> = vec![None; texts.len()];
        let mut usage = Usage::default();
        let mut batches = futures::stream::iter(ranges)
            .map(|range| self.embed_range(texts, range, opts, cancel))
            .buffer_unordered(self.concurrency);

        while let Some(result) = batches.next().await {
            let (range, vectors, batch_usage) = result?;
            usage += batch_usage;
            for (slot, vector) in slots[range].iter_mut().zip(vectors) {
                *slot = Some(vector);
            }
        }

        let vectors = slots
            .into_iter()
            .enumerate()
            .map(|(i, v)| {
                v.ok_or_else(|| EmbedError::MalformedResponse {
                    provider: self.provider.name().to_owned(),
                    message: format!("no vector for input {i}"),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Embeddings {
            vectors,
            usage,
            model,
            dimension,
        })
    }

    /// Embed a single search query.
    ///
    /// # Errors
    ///
    /// Same as [`embed`](Self::embed).
    pub async fn embed_query(
        &self,
        text: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<f32>, EmbedError> {
        let out = self
            .embed(&[text.to_owned()], &EmbedOptions::query(), cancel)
            .await?;
        out.vectors
            .into_iter()
            .next()
            .ok_or_else(|| EmbedError::MalformedResponse {
                provider: self.provider.name().to_owned(),
                message: "empty response for query".into(),
            })
    }

    async fn embed_range(
        &self,
        texts: &[String],
        range: Range<usize>,
        opts: &EmbedOptions,
        cancel: &CancellationToken,
    ) -> Result<(Range<usize>, Vec<Vec<f32>>, Usage), EmbedError> {
        let wrap = |source: EmbedError| {
            if source.is_cancelled() {
                source
            } else {
                EmbedError::Batch {
                    start: range.start,
                    end: range.end,
                    source: Box::new(source),
                }
            }
        };

        let raw = self
            .request_with_retry(&texts[range.clone()], opts, cancel)
            .await
            .map_err(wrap)?;
        let usage = raw.usage;
        let vectors = self.order_batch(range.len(), raw).map_err(wrap)?;
        Ok((range, vectors, usage))
    }

    /// Place each item at its reported index and validate the batch.
    fn order_batch(&self, len: usize, raw: RawEmbeddings) -> Result<Vec<Vec<f32>>, EmbedError> {
        let expected = self.provider.dimensions();
        let malformed = |message: String| EmbedError::MalformedResponse {
            provider: self.provider.name().to_owned(),
            message,
        };

        let mut ordered: Vec<Option<Vec<f32>>> = vec![None; len];
        for item in raw.items {
            if item.vector.len() != expected {
                return Err(EmbedError::DimensionMismatch {
                    expected,
                    actual: item.vector.len(),
                });
            }
            let slot = ordered
                .get_mut(item.index)
                .ok_or_else(|| malformed(format!("index {} outside batch of {len}", item.index)))?;
            if slot.is_some() {
                return Err(malformed(format!("duplicate index {}", item.index)));
            }
            *slot = Some(item.vector);
        }

        ordered
            .into_iter()
            .enumerate()
            .map(|(i, v)| v.ok_or_else(|| malformed(format!("missing index {i}"))))
            .collect()
    }

    async fn request_with_retry(
        &self,
        batch: &[String],
        opts: &EmbedOptions,
        cancel: &CancellationToken,
    ) -> Result<RawEmbeddings, EmbedError> {
        let provider = self.provider.name();
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            self.limiter.acquire(cancel).await?;

            let outcome = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(EmbedError::Cancelled),
                r = tokio::time::timeout(self.request_timeout, self.provider.embed_batch(batch, opts)) => r,
            };
            let err = match outcome {
                Ok(Ok(raw)) => return Ok(raw),
                Ok(Err(e)) => e,
                Err(_) => EmbedError::Timeout {
                    provider: provider.to_owned(),
                    timeout: self.request_timeout,
                },
            };

            if !err.is_transient() {
                return Err(err);
            }
            if !self.retry.should_retry(attempt) {
                tracing::error!(provider, attempt, error = %err, "embedding retries exhausted");
                return Err(EmbedError::Unavailable {
                    provider: provider.to_owned(),
                    attempts: attempt,
                    last_error: err.to_string(),
                });
            }

            let delay = self.retry.delay_for(attempt, err.retry_after());
            tracing::warn!(provider, attempt, ?delay, error = %err, "transient embedding failure, retrying");
            tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(EmbedError::Cancelled),
                () = tokio::time::sleep(delay) => {}
            }
        }
    }
}

/// Element-wise mean of equally sized vectors, L2-normalised.
///
/// Returns `None` for an empty input.
#[must_use]
pub fn mean_pool(vectors: &[Vec<f32>]) -> Option<Vec<f32>> {
    let first = vectors.first()?;
    let mut out = vec![0.0f32; first.len()];
    for v in vectors {
        for (acc, x) in out.iter_mut().zip(v) {
            *acc += x;
        }
    }
    #[allow(clippy::cast_precision_loss)]
    let n = vectors.len() as f32;
    for x in &mut out {
        *x /= n;
    }
    let norm = out.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in &mut out {
            *x /= norm;
        }
    }
    Some(out)
}
