use std::fmt;

use crate::error::EmbedError;
use crate::openai::OpenAiEmbeddingProvider;
use crate::provider::{EmbedOptions, EmbeddingProvider, RawEmbeddings};

/// Any service speaking the `OpenAI` embeddings wire format (Voyage,
/// Together, vLLM, LM Studio, ...).
///
/// When `send_input_type` is set, the request carries `input_type` so
/// backends with asymmetric models can tell queries from documents.
#[derive(Clone)]
pub struct CompatibleEmbeddingProvider {
    inner: OpenAiEmbeddingProvider,
    provider_name: String,
    send_input_type: bool,
}

impl CompatibleEmbeddingProvider {
    /// # Errors
    ///
    /// Propagates construction errors from [`OpenAiEmbeddingProvider::new`].
    pub fn new(
        provider_name: String,
        api_key: String,
        base_url: String,
        model: String,
        dimensions: usize,
    ) -> Result<Self, EmbedError> {
        Ok(Self {
            inner: OpenAiEmbeddingProvider::new(api_key, base_url, model, dimensions)?,
            provider_name,
            send_input_type: false,
        })
    }

    #[must_use]
    pub fn with_input_type(mut self, enabled: bool) -> Self {
        self.send_input_type = enabled;
        self
    }

    #[must_use]
    pub fn with_max_batch_size(mut self, max_batch_size: usize) -> Self {
        self.inner = self.inner.with_max_batch_size(max_batch_size);
        self
    }

    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.inner = self.inner.with_max_tokens(max_tokens);
        self
    }

    #[must_use]
    pub fn with_request_dimensions(mut self, enabled: bool) -> Self {
        self.inner = self.inner.with_request_dimensions(enabled);
        self
    }
}

impl fmt::Debug for CompatibleEmbeddingProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompatibleEmbeddingProvider")
            .field("provider_name", &self.provider_name)
            .field("send_input_type", &self.send_input_type)
            .field("inner", &self.inner)
            .finish()
    }
}

impl EmbeddingProvider for CompatibleEmbeddingProvider {
    async fn embed_batch(
        &self,
        texts: &[String],
        opts: &EmbedOptions,
    ) -> Result<RawEmbeddings, EmbedError> {
        let input_type = self.send_input_type.then(|| opts.input_type.as_str());
        self.inner
            .post_embeddings(&self.provider_name, texts, input_type)
            .await
    }

    fn name(&self) -> &str {
        &self.provider_name
    }

    fn model(&self) -> &str {
        self.inner.model()
    }

    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }

    fn max_batch_size(&self) -> usize {
        self.inner.max_batch_size()
    }

    fn max_tokens(&self) -> usize {
        self.inner.max_tokens()
    }
}
