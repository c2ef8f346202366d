use crate::compatible::CompatibleEmbeddingProvider;
use crate::error::EmbedError;
#[cfg(feature = "mock")]
use crate::mock::MockEmbeddingProvider;
use crate::ollama::OllamaEmbeddingProvider;
use crate::openai::OpenAiEmbeddingProvider;
use crate::provider::{EmbedOptions, EmbeddingProvider, RawEmbeddings};

/// Generates a match over all `AnyEmbeddingProvider` variants, binding the
/// inner provider and evaluating the given expression for each arm.
macro_rules! delegate_provider {
    ($self:expr, |$p:ident| $expr:expr) => {
        match $self {
            AnyEmbeddingProvider::OpenAi($p) => $expr,
            AnyEmbeddingProvider::Ollama($p) => $expr,
            AnyEmbeddingProvider::Compatible($p) => $expr,
            #[cfg(feature = "mock")]
            AnyEmbeddingProvider::Mock($p) => $expr,
        }
    };
}

/// Provider chosen at runtime from configuration.
#[derive(Debug, Clone)]
pub enum AnyEmbeddingProvider {
    OpenAi(OpenAiEmbeddingProvider),
    Ollama(OllamaEmbeddingProvider),
    Compatible(CompatibleEmbeddingProvider),
    #[cfg(feature = "mock")]
    Mock(MockEmbeddingProvider),
}

impl EmbeddingProvider for AnyEmbeddingProvider {
    async fn embed_batch(
        &self,
        texts: &[String],
        opts: &EmbedOptions,
    ) -> Result<RawEmbeddings, EmbedError> {
        delegate_provider!(self, |p| p.embed_batch(texts, opts).await)
    }

    fn name(&self) -> &str {
        delegate_provider!(self, |p| p.name())
    }

    fn model(&self) -> &str {
        delegate_provider!(self, |p| p.model())
    }

    fn dimensions(&self) -> usize {
        delegate_provider!(self, |p| p.dimensions())
    }

    fn max_batch_size(&self) -> usize {
        delegate_provider!(self, |p| p.max_batch_size())
    }

    fn max_tokens(&self) -> usize {
        delegate_provider!(self, |p| p.max_tokens())
    }

    fn split_text_for_embedding(&self, text: &str) -> Vec<String> {
        delegate_provider!(self, |p| p.split_text_for_embedding(text))
    }
}
