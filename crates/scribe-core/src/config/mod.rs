mod env;
mod types;


pub use types::*;

use std::path::{Path, PathBuf};

/// Errors produced while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl Config {
    /// Load configuration from a TOML file with env var overrides.
    ///
    /// Falls back to defaults when the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;
            toml::from_str::<Self>(&content)?
        } else {
            tracing::debug!(path = %path.display(), "config file not found, using defaults");
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Check cross-field constraints that serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] describing the first violation.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |e: scribe_index::IndexError| ConfigError::Invalid(e.to_string());
        self.chunker.validate().map_err(invalid)?;
        self.retrieval.validate().map_err(invalid)?;

        let embedding = &self.embedding;
        if embedding.dimensions == 0 {
            return Err(ConfigError::Invalid(
                "embedding.dimensions must be positive".into(),
            ));
        }
        if embedding.model.trim().is_empty() {
            return Err(ConfigError::Invalid("embedding.model must not be empty".into()));
        }
        if embedding.provider.is_remote() && embedding.base_url.trim().is_empty() {
            return Err(ConfigError::Invalid(format!(
                "embedding.base_url is required for the {} provider",
                embedding.provider.as_str()
            )));
        }
        if embedding.provider == ProviderKind::Compatible
            && embedding.name.as_deref().is_none_or(|n| n.trim().is_empty())
        {
            return Err(ConfigError::Invalid(
                "embedding.name is required for the compatible provider".into(),
            ));
        }
        if !(embedding.client.requests_per_second.is_finite()
            && embedding.client.requests_per_second > 0.0)
        {
            return Err(ConfigError::Invalid(
                "embedding.requests_per_second must be positive".into(),
            ));
        }
        if embedding.client.request_timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "embedding.request_timeout must be positive".into(),
            ));
        }
        if embedding.max_batch_size == Some(0) || embedding.max_tokens == Some(0) {
            return Err(ConfigError::Invalid(
                "embedding.max_batch_size and max_tokens must be positive when set".into(),
            ));
        }

        if self.store.path.trim().is_empty() {
            return Err(ConfigError::Invalid("store.path must not be empty".into()));
        }
        if self.store.max_connections == 0 {
            return Err(ConfigError::Invalid(
                "store.max_connections must be positive".into(),
            ));
        }
        if self.indexer.chunk_workers == 0 {
            return Err(ConfigError::Invalid(
                "indexer.chunk_workers must be positive".into(),
            ));
        }
        Ok(())
    }
}
