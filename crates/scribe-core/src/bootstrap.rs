//! Provider factory and pipeline assembly.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use scribe_embed::compatible::CompatibleEmbeddingProvider;
use scribe_embed::ollama::OllamaEmbeddingProvider;
use scribe_embed::openai::OpenAiEmbeddingProvider;
use scribe_embed::{AnyEmbeddingProvider, EmbedError, Embedder, EmbeddingProvider};
use scribe_index::{
    IndexError, IndexReport, Indexer, RetrievalCache, RetrievalContext, Retriever,
};
use scribe_store::{RetrievalResult, SqliteVectorStore, StoreOptions, VectorStore};
use tokio_util::sync::CancellationToken;

use crate::config::{Config, EmbeddingConfig, ProviderKind};

/// Priority: CLI `--config` > `SCRIBE_CONFIG` env > `scribe.toml`.
#[must_use]
pub fn resolve_config_path() -> PathBuf {
    let args: Vec<String> = std::env::args().collect();
    if let Some(path) = args.windows(2).find(|w| w[0] == "--config").map(|w| &w[1]) {
        return PathBuf::from(path);
    }
    if let Ok(path) = std::env::var("SCRIBE_CONFIG") {
        return PathBuf::from(path);
    }
    PathBuf::from("scribe.toml")
}

/// Build the embedding backend selected by `config.provider`.
///
/// # Errors
///
/// Returns [`EmbedError::Config`] when a required setting (API key,
/// provider name) is missing or the HTTP client cannot be built.
pub fn build_provider(config: &EmbeddingConfig) -> Result<AnyEmbeddingProvider, EmbedError> {
    let api_key = config
        .api_key
        .as_ref()
        .map(|k| k.expose().to_owned())
        .unwrap_or_default();

    let provider = match config.provider {
        ProviderKind::OpenAi => {
            if api_key.is_empty() {
                return Err(EmbedError::Config(
                    "SCRIBE_EMBEDDING_API_KEY is required for the openai provider".into(),
                ));
            }
            let mut p = OpenAiEmbeddingProvider::new(
                api_key,
                config.base_url.clone(),
                config.model.clone(),
                config.dimensions,
            )?
            .with_request_dimensions(config.request_dimensions);
            if let Some(n) = config.max_batch_size {
                p = p.with_max_batch_size(n);
            }
            if let Some(n) = config.max_tokens {
                p = p.with_max_tokens(n);
            }
            AnyEmbeddingProvider::OpenAi(p)
        }
        ProviderKind::Ollama => {
            let mut p = OllamaEmbeddingProvider::new(
                &config.base_url,
                config.model.clone(),
                config.dimensions,
            )?;
            if let Some(n) = config.max_batch_size {
                p = p.with_max_batch_size(n);
            }
            if let Some(n) = config.max_tokens {
                p = p.with_max_tokens(n);
            }
            AnyEmbeddingProvider::Ollama(p)
        }
        ProviderKind::Compatible => {
            let name = config
                .name
                .clone()
                .filter(|n| !n.trim().is_empty())
                .ok_or_else(|| {
                    EmbedError::Config("a compatible provider needs a name".into())
                })?;
            let mut p = CompatibleEmbeddingProvider::new(
                name,
                api_key,
                config.base_url.clone(),
                config.model.clone(),
                config.dimensions,
            )?
            .with_input_type(config.send_input_type)
            .with_request_dimensions(config.request_dimensions);
            if let Some(n) = config.max_batch_size {
                p = p.with_max_batch_size(n);
            }
            if let Some(n) = config.max_tokens {
                p = p.with_max_tokens(n);
            }
            AnyEmbeddingProvider::Compatible(p)
        }
        #[cfg(feature = "mock")]
        ProviderKind::Mock => {
            let mut p = scribe_embed::mock::MockEmbeddingProvider::new(config.dimensions);
            if let Some(n) = config.max_batch_size {
                p = p.with_max_batch_size(n);
            }
            if let Some(n) = config.max_tokens {
                p = p.with_max_tokens(n);
            }
            AnyEmbeddingProvider::Mock(p)
        }
        #[cfg(not(feature = "mock"))]
        ProviderKind::Mock => {
            return Err(EmbedError::Config(
                "the mock provider requires the `mock` feature".into(),
            ));
        }
    };

    tracing::debug!(
        provider = provider.name(),
        model = provider.model(),
        dimensions = provider.dimensions(),
        "embedding provider ready"
    );
    Ok(provider)
}

/// Assembled pipeline: one store, one embedder, and an indexer and retriever
/// sharing a single result cache.
pub struct Scribe {
    config: Config,
    store: Arc<dyn VectorStore>,
    embedder: Arc<Embedder<AnyEmbeddingProvider>>,
    indexer: Indexer<AnyEmbeddingProvider>,
    retriever: Retriever<AnyEmbeddingProvider>,
}

impl Scribe {
    /// Validate `config`, open the `SQLite` store and wire the pipeline.
    ///
    /// # Errors
    ///
    /// Returns an error if the config is invalid, the provider cannot be
    /// built, or the store cannot be opened (including a dimension or model
    /// mismatch with an existing index).
    pub async fn open(config: Config) -> anyhow::Result<Self> {
        config.validate()?;
        let provider =
            build_provider(&config.embedding).context("failed to build embedding provider")?;
        Self::open_store(config, provider).await
    }

    /// Like [`open`](Self::open) with a provider built by the caller.
    ///
    /// # Errors
    ///
    /// Same as [`open`](Self::open), minus provider construction.
    pub async fn open_with_provider(
        config: Config,
        provider: AnyEmbeddingProvider,
    ) -> anyhow::Result<Self> {
        config.validate()?;
        Self::open_store(config, provider).await
    }

    async fn open_store(config: Config, provider: AnyEmbeddingProvider) -> anyhow::Result<Self> {
        if config.store.path != ":memory:"
            && let Some(parent) = Path::new(&config.store.path).parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }

        let mut options =
            StoreOptions::new(config.embedding.dimensions).with_model(provider.model());
        options.max_connections = config.store.max_connections;
        let store = SqliteVectorStore::open(&config.store.path, &options)
            .await
            .with_context(|| format!("failed to open vector store at {}", config.store.path))?;

        Self::with_store(config, provider, Arc::new(store))
    }

    /// Wire the pipeline over an already opened store.
    ///
    /// # Errors
    ///
    /// Returns an error if the embedder, indexer or retriever rejects the
    /// configuration.
    pub fn with_store(
        config: Config,
        provider: AnyEmbeddingProvider,
        store: Arc<dyn VectorStore>,
    ) -> anyhow::Result<Self> {
        let embedder = Arc::new(
            Embedder::new(provider, &config.embedding.client)
                .context("invalid embedding client settings")?,
        );
        let retriever = Retriever::new(store.clone(), embedder.clone(), config.retrieval.clone())?;
        let indexer = Indexer::new(store.clone(), embedder.clone(), config.indexer_config())?
            .with_cache(retriever.cache().clone());

        tracing::info!(
            provider = embedder.provider().name(),
            model = embedder.model(),
            dimensions = embedder.dimensions(),
            store = %config.store.path,
            "scribe ready"
        );

        Ok(Self {
            config,
            store,
            embedder,
            indexer,
            retriever,
        })
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn VectorStore> {
        &self.store
    }

    #[must_use]
    pub fn embedder(&self) -> &Arc<Embedder<AnyEmbeddingProvider>> {
        &self.embedder
    }

    #[must_use]
    pub fn indexer(&self) -> &Indexer<AnyEmbeddingProvider> {
        &self.indexer
    }

    #[must_use]
    pub fn retriever(&self) -> &Retriever<AnyEmbeddingProvider> {
        &self.retriever
    }

    #[must_use]
    pub fn cache(&self) -> &Arc<RetrievalCache> {
        self.retriever.cache()
    }

    /// # Errors
    ///
    /// See [`Indexer::index_directory`].
    pub async fn index_directory(
        &self,
        root: &Path,
        cancel: &CancellationToken,
    ) -> Result<IndexReport, IndexError> {
        self.indexer.index_directory(root, cancel).await
    }

    /// # Errors
    ///
    /// See [`Retriever::retrieve`].
    pub async fn retrieve(&self, ctx: &RetrievalContext) -> Result<Vec<RetrievalResult>, IndexError> {
        self.retriever.retrieve(ctx).await
    }

    /// Hybrid retrieval with the configured result limit.
    ///
    /// # Errors
    ///
    /// See [`Retriever::retrieve`].
    pub async fn search(&self, query: &str) -> Result<Vec<RetrievalResult>, IndexError> {
        self.retriever.retrieve(&self.retriever.context(query)).await
    }
}

#[cfg(test)]
mod tests {
    use scribe_embed::mock::MockEmbeddingProvider;
    use scribe_index::Document;
    use scribe_store::InMemoryVectorStore;

    use super::*;
    use crate::config::Secret;

    const DIM: usize = 32;

    fn mock_config(dir: &Path) -> Config {
        let mut config = Config::default();
        config.embedding.provider = ProviderKind::Mock;
        config.embedding.dimensions = DIM;
        config.embedding.client.max_retries = 0;
        config.store.path = dir.join("nested/index.db").to_string_lossy().into_owned();
        config
    }

    fn mock_provider(dimensions: usize) -> AnyEmbeddingProvider {
        AnyEmbeddingProvider::Mock(MockEmbeddingProvider::new(dimensions))
    }

    #[test]
    fn openai_requires_api_key() {
        let mut config = EmbeddingConfig {
            provider: ProviderKind::OpenAi,
            base_url: "https://api.openai.com/v1".into(),
            ..EmbeddingConfig::default()
        };
        assert!(matches!(build_provider(&config), Err(EmbedError::Config(_))));

        config.api_key = Some(Secret::new("sk-test"));
        let provider = build_provider(&config).unwrap();
        assert_eq!(provider.name(), "openai");
        assert_eq!(provider.dimensions(), 768);
    }

    #[test]
    fn ollama_is_default() {
        let provider = build_provider(&EmbeddingConfig::default()).unwrap();
        assert_eq!(provider.name(), "ollama");
        assert_eq!(provider.model(), "nomic-embed-text");
    }

    #[test]
    fn compatible_uses_its_name_and_limits() {
        let config = EmbeddingConfig {
            provider: ProviderKind::Compatible,
            name: Some("voyage".into()),
            base_url: "https://api.voyageai.com/v1".into(),
            max_batch_size: Some(128),
            ..EmbeddingConfig::default()
        };
        let provider = build_provider(&config).unwrap();
        assert_eq!(provider.name(), "voyage");
        assert_eq!(provider.max_batch_size(), 128);
    }

    #[tokio::test]
    async fn open_index_and_search() {
        let dir = tempfile::tempdir().unwrap();
        let project = dir.path().join("project");
        std::fs::create_dir_all(&project).unwrap();
        std::fs::write(project.join("notes.md"), "# Cache\n\nThe cache expires entries.\n").unwrap();

        let scribe = Scribe::open_with_provider(mock_config(dir.path()), mock_provider(DIM))
            .await
            .unwrap();
        assert!(dir.path().join("nested/index.db").exists());
        let report = scribe
            .index_directory(&project, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.files_indexed, 1);

        let results = scribe.search("cache expires").await.unwrap();
        assert_eq!(results[0].file_path, "notes.md");
        assert_eq!(scribe.cache().len(), 1);

        scribe
            .indexer()
            .index_documents(vec![Document::new("extra.md", "more text")], &CancellationToken::new())
            .await
            .unwrap();
        assert!(scribe.cache().is_empty());
    }

    #[tokio::test]
    async fn reopening_with_other_dimension_fails() {
        let dir = tempfile::tempdir().unwrap();
        let config = mock_config(dir.path());
        let first = Scribe::open_with_provider(config.clone(), mock_provider(DIM))
            .await
            .unwrap();
        drop(first);

        let mut other = config;
        other.embedding.dimensions = 16;
        let err = Scribe::open_with_provider(other, mock_provider(16))
            .await
            .err()
            .unwrap();
        assert!(format!("{err:#}").contains("dimension"));
    }

    #[test]
    fn store_and_provider_must_agree() {
        let config = Config::default();
        let store: Arc<dyn VectorStore> = Arc::new(InMemoryVectorStore::new(DIM));
        assert!(Scribe::with_store(config, mock_provider(8), store).is_err());
    }

    #[tokio::test]
    async fn invalid_config_is_rejected_before_opening() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = mock_config(dir.path());
        config.chunker.overlap = config.chunker.target_size;
        assert!(
            Scribe::open_with_provider(config, mock_provider(DIM))
                .await
                .is_err()
        );
        assert!(!dir.path().join("nested").exists());
    }
}
