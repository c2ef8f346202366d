//! Deterministic in-process embedding provider for tests.
//!
//! Vectors are bag-of-words: every lowercase alphanumeric token is hashed into
//! one of `dimensions` buckets and the result is L2-normalised, so texts that
//! share words score higher under cosine similarity.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crate::error::EmbedError;
use crate::provider::{EmbedOptions, EmbeddingProvider, IndexedEmbedding, RawEmbeddings, Usage};

/// Failure injected into the next call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFailure {
    /// 503, retried by the embedder.
    Transient,
    /// 429 with a one-second `Retry-After`.
    RateLimited,
    /// 400, never retried.
    Rejected,
    /// Returns vectors one element short.
    WrongDimension,
}

#[derive(Debug, Clone)]
pub struct MockEmbeddingProvider {
    pub dimensions: usize,
    pub max_batch_size: usize,
    pub max_tokens: usize,
    /// Answer items in reverse index order.
    pub reverse_order: bool,
    pub fail_always: bool,
    /// Milliseconds to sleep before every response.
    pub delay_ms: u64,
    calls: Arc<AtomicUsize>,
    embedded: Arc<AtomicUsize>,
    batch_sizes: Arc<Mutex<Vec<usize>>>,
    failures: Arc<Mutex<VecDeque<MockFailure>>>,
    overrides: Arc<Mutex<HashMap<String, Vec<f32>>>>,
}

impl Default for MockEmbeddingProvider {
    fn default() -> Self {
        Self::new(64)
    }
}

impl MockEmbeddingProvider {
    #[must_use]
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
            max_batch_size: 16,
            max_tokens: 8192,
            reverse_order: false,
            fail_always: false,
            delay_ms: 0,
            calls: Arc::new(AtomicUsize::new(0)),
            embedded: Arc::new(AtomicUsize::new(0)),
            batch_sizes: Arc::new(Mutex::new(Vec::new())),
            failures: Arc::new(Mutex::new(VecDeque::new())),
            overrides: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    #[must_use]
    pub fn failing() -> Self {
        Self {
            fail_always: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_max_batch_size(mut self, max_batch_size: usize) -> Self {
        self.max_batch_size = max_batch_size.max(1);
        self
    }

    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens.max(1);
        self
    }

    #[must_use]
    pub fn with_reverse_order(mut self) -> Self {
        self.reverse_order = true;
        self
    }

    #[must_use]
    pub fn with_delay(mut self, ms: u64) -> Self {
        self.delay_ms = ms;
        self
    }

    /// Queue failures consumed one per call before normal answers resume.
    pub fn push_failures(&self, failures: impl IntoIterator<Item = MockFailure>) {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(failures);
    }

    /// Return `vector` verbatim whenever `text` is embedded.
    pub fn set_vector(&self, text: impl Into<String>, vector: Vec<f32>) {
        self.overrides
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(text.into(), vector);
    }

    /// Number of `embed_batch` calls, failed ones included.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Number of texts embedded successfully.
    #[must_use]
    pub fn embedded_texts(&self) -> usize {
        self.embedded.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn batch_sizes(&self) -> Vec<usize> {
        self.batch_sizes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The vector this provider produces for `text`.
    #[must_use]
    pub fn vector_for(&self, text: &str) -> Vec<f32> {
        if let Some(v) = self
            .overrides
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(text)
        {
            return v.clone();
        }
        bag_of_words(text, self.dimensions)
    }

    fn failure(&self, kind: MockFailure) -> EmbedError {
        match kind {
            MockFailure::Transient => EmbedError::Status {
                provider: "mock".into(),
                status: 503,
                message: "mock overloaded".into(),
                retry_after: None,
            },
            MockFailure::RateLimited => EmbedError::Status {
                provider: "mock".into(),
                status: 429,
                message: "mock rate limited".into(),
                retry_after: Some(Duration::from_secs(1)),
            },
            MockFailure::Rejected => EmbedError::Rejected {
                provider: "mock".into(),
                status: 400,
                message: "mock rejected input".into(),
            },
            MockFailure::WrongDimension => EmbedError::MalformedResponse {
                provider: "mock".into(),
                message: "mock wrong dimension".into(),
            },
        }
    }
}

fn bag_of_words(text: &str, dimensions: usize) -> Vec<f32> {
    let mut vector = vec![0.0f32; dimensions];
    let mut any = false;
    for token in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
    {
        let token = token.to_lowercase();
        let hash = blake3::hash(token.as_bytes());
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&hash.as_bytes()[..8]);
        #[allow(clippy::cast_possible_truncation)]
        let bucket = (u64::from_le_bytes(bytes) % dimensions as u64) as usize;
        vector[bucket] += 1.0;
        any = true;
    }
    if !any {
        vector[0] = 1.0;
        return vector;
    }
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    for x in &mut vector {
        *x /= norm;
    }
    vector
}

impl EmbeddingProvider for MockEmbeddingProvider {
    async fn embed_batch(
        &self,
        texts: &[String],
        _opts: &EmbedOptions,
    ) -> Result<RawEmbeddings, EmbedError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.batch_sizes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(texts.len());

        if self.delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
        }
        if self.fail_always {
            return Err(self.failure(MockFailure::Transient));
        }

        let injected = self
            .failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        let truncate = match injected {
            Some(MockFailure::WrongDimension) => true,
            Some(kind) => return Err(self.failure(kind)),
            None => false,
        };

        let mut items: Vec<IndexedEmbedding> = texts
            .iter()
            .enumerate()
            .map(|(index, text)| {
                let mut vector = self.vector_for(text);
                if truncate {
                    vector.pop();
                }
                IndexedEmbedding { index, vector }
            })
            .collect();
        if self.reverse_order {
            items.reverse();
        }

        self.embedded.fetch_add(texts.len(), Ordering::SeqCst);
        let tokens: u64 = texts
            .iter()
            .map(|t| crate::provider::estimate_tokens(t) as u64)
            .sum();
        Ok(RawEmbeddings {
            items,
            usage: Usage {
                prompt_tokens: tokens,
                total_tokens: tokens,
            },
        })
    }

    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "mock"
    }

    #[allow(clippy::unnecessary_literal_bound)]
    fn model(&self) -> &str {
        "mock-embedding"
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }

    fn max_tokens(&self) -> usize {
        self.max_tokens
    }
}
