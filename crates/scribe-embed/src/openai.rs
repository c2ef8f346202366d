use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::EmbedError;
use crate::provider::{EmbedOptions, EmbeddingProvider, IndexedEmbedding, RawEmbeddings, Usage};

const DEFAULT_MAX_BATCH_SIZE: usize = 2048;
const DEFAULT_MAX_TOKENS: usize = 8191;

/// Client for `POST {base_url}/embeddings` in the `OpenAI` wire format.
#[derive(Clone)]
pub struct OpenAiEmbeddingProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    dimensions: usize,
    request_dimensions: bool,
    max_batch_size: usize,
    max_tokens: usize,
}

impl fmt::Debug for OpenAiEmbeddingProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiEmbeddingProvider")
            .field("client", &"<reqwest::Client>")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("dimensions", &self.dimensions)
            .field("request_dimensions", &self.request_dimensions)
            .field("max_batch_size", &self.max_batch_size)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

impl OpenAiEmbeddingProvider {
    /// # Errors
    ///
    /// Returns [`EmbedError::Config`] if `dimensions` is zero or the HTTP
    /// client cannot be built.
    pub fn new(
        api_key: String,
        mut base_url: String,
        model: String,
        dimensions: usize,
    ) -> Result<Self, EmbedError> {
        if dimensions == 0 {
            return Err(EmbedError::Config("dimensions must be positive".into()));
        }
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Ok(Self {
            client: crate::http::default_client()?,
            api_key,
            base_url,
            model,
            dimensions,
            request_dimensions: false,
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            max_tokens: DEFAULT_MAX_TOKENS,
        })
    }

    #[must_use]
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    /// Send `dimensions` in the request body so models that support
    /// shortening (`text-embedding-3-*`) return vectors of that length.
    #[must_use]
    pub fn with_request_dimensions(mut self, enabled: bool) -> Self {
        self.request_dimensions = enabled;
        self
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
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub(crate) async fn post_embeddings(
        &self,
        provider: &str,
        texts: &[String],
        input_type: Option<&str>,
    ) -> Result<RawEmbeddings, EmbedError> {
        let body = EmbeddingRequest {
            model: &self.model,
            input: texts,
            dimensions: self.request_dimensions.then_some(self.dimensions),
            input_type,
        };

        let mut request = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .json(&body);
        if !self.api_key.is_empty() {
            request = request.bearer_auth(&self.api_key);
        }
        let response = request.send().await?;
        let text = crate::http::read_body(provider, response).await?;

        let resp: EmbeddingResponse = serde_json::from_str(&text)?;
        tracing::debug!(
            provider,
            model = %self.model,
            items = resp.data.len(),
            "embedding response received"
        );

        Ok(RawEmbeddings {
            items: resp
                .data
                .into_iter()
                .map(|d| IndexedEmbedding {
                    index: d.index,
                    vector: d.embedding,
                })
                .collect(),
            usage: resp.usage.map(Usage::from).unwrap_or_default(),
        })
    }
}

impl EmbeddingProvider for OpenAiEmbeddingProvider {
    async fn embed_batch(
        &self,
        texts: &[String],
        _opts: &EmbedOptions,
    ) -> Result<RawEmbeddings, EmbedError> {
        self.post_embeddings("openai", texts, None).await
    }

    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.model
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

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    input_type: Option<&'a str>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
    #[serde(default)]
    usage: Option<OpenAiUsage>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

#[derive(Deserialize)]
struct OpenAiUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    total_tokens: u64,
}

impl From<OpenAiUsage> for Usage {
    fn from(u: OpenAiUsage) -> Self {
        Self {
            prompt_tokens: u.prompt_tokens,
            total_tokens: u.total_tokens,
        }
    }
}
