use serde::{Deserialize, Serialize};

use crate::error::EmbedError;
use crate::provider::{EmbedOptions, EmbeddingProvider, IndexedEmbedding, RawEmbeddings, Usage};

pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";

/// Local Ollama server, `POST {base_url}/api/embed`.
#[derive(Debug, Clone)]
pub struct OllamaEmbeddingProvider {
    client: reqwest::Client,
    base_url: String,
    model: String,
    dimensions: usize,
    max_batch_size: usize,
    max_tokens: usize,
}

impl OllamaEmbeddingProvider {
    /// # Errors
    ///
    /// Returns [`EmbedError::Config`] if `dimensions` is zero or the HTTP
    /// client cannot be built.
    pub fn new(base_url: &str, model: String, dimensions: usize) -> Result<Self, EmbedError> {
        if dimensions == 0 {
            return Err(EmbedError::Config("dimensions must be positive".into()));
        }
        Ok(Self {
            client: crate::http::default_client()?,
            base_url: base_url.trim_end_matches('/').to_owned(),
            model,
            dimensions,
            max_batch_size: 256,
            max_tokens: 2048,
        })
    }

    #[must_use]
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
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
}

impl EmbeddingProvider for OllamaEmbeddingProvider {
    async fn embed_batch(
        &self,
        texts: &[String],
        _opts: &EmbedOptions,
    ) -> Result<RawEmbeddings, EmbedError> {
        let body = EmbedRequest {
            model: &self.model,
            input: texts,
        };
        let response = self
            .client
            .post(format!("{}/api/embed", self.base_url))
            .json(&body)
            .send()
            .await?;
        let text = crate::http::read_body("ollama", response).await?;
        let resp: EmbedResponse = serde_json::from_str(&text)?;

        if resp.embeddings.len() != texts.len() {
            return Err(EmbedError::MalformedResponse {
                provider: "ollama".into(),
                message: format!(
                    "expected {} embeddings, got {}",
                    texts.len(),
                    resp.embeddings.len()
                ),
            });
        }

        let tokens = resp.prompt_eval_count.unwrap_or(0);
        Ok(RawEmbeddings {
            items: resp
                .embeddings
                .into_iter()
                .enumerate()
                .map(|(index, vector)| IndexedEmbedding { index, vector })
                .collect(),
            usage: Usage {
                prompt_tokens: tokens,
                total_tokens: tokens,
            },
        })
    }

    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "ollama"
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
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
    #[serde(default)]
    prompt_eval_count: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_trims_base_url() {
        let p = OllamaEmbeddingProvider::new("http://localhost:11434/", "nomic".into(), 768)
            .unwrap();
        assert_eq!(p.base_url, "http://localhost:11434");
        assert_eq!(p.name(), "ollama");
        assert_eq!(p.model(), "nomic");
    }

    #[test]
    fn request_shape() {
        let input = vec!["a".to_owned()];
        let json = serde_json::to_string(&EmbedRequest {
            model: "nomic",
            input: &input,
        })
        .unwrap();
        assert_eq!(json, r#"{"model":"nomic","input":["a"]}"#);
    }

    #[test]
    fn parse_response() {
        let json = r#"{"model":"nomic","embeddings":[[0.1,0.2],[0.3,0.4]],"prompt_eval_count":7}"#;
        let resp: EmbedResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.embeddings.len(), 2);
        assert_eq!(resp.prompt_eval_count, Some(7));
    }

    #[test]
    fn builders_clamp_to_one() {
        let p = OllamaEmbeddingProvider::new(DEFAULT_BASE_URL, "m".into(), 4)
            .unwrap()
            .with_max_batch_size(0)
            .with_max_tokens(0);
        assert_eq!(p.max_batch_size(), 1);
        assert_eq!(p.max_tokens(), 1);
    }

    #[tokio::test]
    async fn unreachable_endpoint_errors() {
        let p = OllamaEmbeddingProvider::new("http://127.0.0.1:1", "m".into(), 4).unwrap();
        let result = p
            .embed_batch(&["x".to_owned()], &EmbedOptions::default())
            .await;
        assert!(matches!(result, Err(EmbedError::Http(_))));
    }
}
