use std::future::Future;
use std::ops::AddAssign;

use serde::{Deserialize, Serialize};

use crate::error::EmbedError;

/// Whether a text is embedded for storage or as a search query.
///
/// Some backends produce asymmetric embeddings and want to know.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputType {
    #[default]
    Document,
    Query,
}

impl InputType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Document => "document",
            Self::Query => "query",
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EmbedOptions {
    pub input_type: InputType,
}

impl EmbedOptions {
    #[must_use]
    pub fn query() -> Self {
        Self {
            input_type: InputType::Query,
        }
    }
}

/// Token accounting reported by the backend.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub total_tokens: u64,
}

impl AddAssign for Usage {
    fn add_assign(&mut self, rhs: Self) {
        self.prompt_tokens += rhs.prompt_tokens;
        self.total_tokens += rhs.total_tokens;
    }
}

/// One vector tagged with the position of its input inside the request.
#[derive(Clone, Debug, PartialEq)]
pub struct IndexedEmbedding {
    pub index: usize,
    pub vector: Vec<f32>,
}

/// Raw outcome of a single backend request, in whatever order the backend
/// chose to answer.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RawEmbeddings {
    pub items: Vec<IndexedEmbedding>,
    pub usage: Usage,
}

pub trait EmbeddingProvider: Send + Sync {
    /// Embed one batch of texts with a single request.
    ///
    /// Callers must not pass more than [`max_batch_size`](Self::max_batch_size)
    /// texts. No retry happens at this level.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the response cannot be parsed.
    fn embed_batch(
        &self,
        texts: &[String],
        opts: &EmbedOptions,
    ) -> impl Future<Output = Result<RawEmbeddings, EmbedError>> + Send;

    fn name(&self) -> &str;

    fn model(&self) -> &str;

    /// Length of every vector this provider configuration produces.
    fn dimensions(&self) -> usize;

    /// Per-request item limit of the backend.
    fn max_batch_size(&self) -> usize;

    /// Longest input, in tokens, the model accepts.
    fn max_tokens(&self) -> usize;

    fn estimate_tokens(&self, text: &str) -> usize {
        estimate_tokens(text)
    }

    /// Split a text that would overflow [`max_tokens`](Self::max_tokens)
    /// into pieces that fit.
    fn split_text_for_embedding(&self, text: &str) -> Vec<String> {
        split_text(text, self.max_tokens())
    }
}

/// Estimate token count using chars/4 heuristic.
#[must_use]
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

/// Split `text` into whitespace-aligned pieces of at most `max_tokens`
/// estimated tokens. Words longer than the limit are cut at char boundaries.
#[must_use]
pub fn split_text(text: &str, max_tokens: usize) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }
    let max_chars = max_tokens.max(1).saturating_mul(4);
    if text.chars().count() <= max_chars {
        return vec![text.to_owned()];
    }

    let mut pieces = Vec::new();
    let mut current = String::new();
    let mut current_chars = 0usize;

    for segment in text.split_inclusive(char::is_whitespace) {
        let seg_chars = segment.chars().count();
        if current_chars + seg_chars > max_chars && !current.is_empty() {
            pieces.push(std::mem::take(&mut current));
            current_chars = 0;
        }
        if seg_chars > max_chars {
            let chars: Vec<char> = segment.chars().collect();
            for part in chars.chunks(max_chars) {
                pieces.push(part.iter().collect());
            }
            continue;
        }
        current.push_str(segment);
        current_chars += seg_chars;
    }

    if !current.is_empty() {
        pieces.push(current);
    }
    pieces
}
