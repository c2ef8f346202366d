use std::fmt;

use scribe_embed::EmbedderConfig;
use scribe_index::{ChunkerConfig, IndexerConfig, RetrievalConfig};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub chunker: ChunkerConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub indexer: IndexerSettings,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Indexer settings combined with the `[chunker]` section.
    #[must_use]
    pub fn indexer_config(&self) -> IndexerConfig {
        IndexerConfig {
            chunker: self.chunker.clone(),
            max_file_bytes: self.indexer.max_file_bytes,
            chunk_workers: self.indexer.chunk_workers,
            contextualize: self.indexer.contextualize,
            include_hidden: self.indexer.include_hidden,
        }
    }
}

/// Embedding backend selector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    OpenAi,
    #[default]
    Ollama,
    /// Any OpenAI-compatible service.
    Compatible,
    /// Deterministic in-process provider, available with the `mock` feature.
    Mock,
}

impl ProviderKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Ollama => "ollama",
            Self::Compatible => "compatible",
            Self::Mock => "mock",
        }
    }

    /// Reached over the network.
    #[must_use]
    pub fn is_remote(self) -> bool {
        !matches!(self, Self::Mock)
    }
}

/// API key. Never serialized and never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

fn default_base_url() -> String {
    scribe_embed::ollama::DEFAULT_BASE_URL.to_owned()
}

fn default_model() -> String {
    "nomic-embed-text".into()
}

fn default_dimensions() -> usize {
    768
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct EmbeddingConfig {
    #[serde(default)]
    pub provider: ProviderKind,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,
    /// Display name of a `compatible` provider.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Send `dimensions` in requests (OpenAI `text-embedding-3-*`).
    #[serde(default)]
    pub request_dimensions: bool,
    /// Send `input_type` (document/query) to a `compatible` provider.
    #[serde(default)]
    pub send_input_type: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_batch_size: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<usize>,
    #[serde(flatten)]
    pub client: EmbedderConfig,
    /// Only ever read from `SCRIBE_EMBEDDING_API_KEY`.
    #[serde(skip)]
    pub api_key: Option<Secret>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::default(),
            base_url: default_base_url(),
            model: default_model(),
            dimensions: default_dimensions(),
            name: None,
            request_dimensions: false,
            send_input_type: false,
            max_batch_size: None,
            max_tokens: None,
            client: EmbedderConfig::default(),
            api_key: None,
        }
    }
}

fn default_store_path() -> String {
    ".scribe/index.db".into()
}

fn default_max_connections() -> u32 {
    5
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct StoreConfig {
    /// `SQLite` file holding the index. `":memory:"` keeps it in memory.
    #[serde(default = "default_store_path")]
    pub path: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
            max_connections: default_max_connections(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct IndexerSettings {
    pub max_file_bytes: u64,
    pub chunk_workers: usize,
    pub contextualize: bool,
    pub include_hidden: bool,
}

impl Default for IndexerSettings {
    fn default() -> Self {
        let defaults = IndexerConfig::default();
        Self {
            max_file_bytes: defaults.max_file_bytes,
            chunk_workers: defaults.chunk_workers,
            contextualize: defaults.contextualize,
            include_hidden: defaults.include_hidden,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub level: String,
    pub compact: bool,
    pub with_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            compact: false,
            with_target: true,
        }
    }
}
