use std::str::FromStr;
use std::time::Duration;

use super::{Config, Secret};

/// Parsed value of `key`, or `None` with a warning when it does not parse.
fn parse_var<T: FromStr>(key: &str) -> Option<T> {
    let v = std::env::var(key).ok()?;
    if let Ok(parsed) = v.trim().parse() {
        Some(parsed)
    } else {
        tracing::warn!("ignoring invalid {key} value: {v}");
        None
    }
}

impl Config {
    pub(crate) fn apply_env_overrides(&mut self) {
        self.apply_env_overrides_embedding();
        self.apply_env_overrides_index();
    }

    fn apply_env_overrides_embedding(&mut self) {
        if let Ok(v) = std::env::var("SCRIBE_EMBEDDING_PROVIDER") {
            if let Ok(kind) = serde_json::from_value(serde_json::Value::String(v.to_lowercase())) {
                self.embedding.provider = kind;
            } else {
                tracing::warn!("ignoring invalid SCRIBE_EMBEDDING_PROVIDER value: {v}");
            }
        }
        if let Ok(v) = std::env::var("SCRIBE_EMBEDDING_BASE_URL") {
            self.embedding.base_url = v;
        }
        if let Ok(v) = std::env::var("SCRIBE_EMBEDDING_MODEL") {
            self.embedding.model = v;
        }
        if let Ok(v) = std::env::var("SCRIBE_EMBEDDING_NAME") {
            self.embedding.name = Some(v);
        }
        if let Some(dimensions) = parse_var("SCRIBE_EMBEDDING_DIMENSIONS") {
            self.embedding.dimensions = dimensions;
        }
        if let Ok(v) = std::env::var("SCRIBE_EMBEDDING_API_KEY")
            && !v.is_empty()
        {
            self.embedding.api_key = Some(Secret::new(v));
        }
        if let Some(n) = parse_var("SCRIBE_EMBEDDING_MAX_RETRIES") {
            self.embedding.client.max_retries = n;
        }
        if let Some(ms) = parse_var("SCRIBE_EMBEDDING_TIMEOUT_MS") {
            self.embedding.client.request_timeout = Duration::from_millis(ms);
        }
        if let Some(rps) = parse_var("SCRIBE_EMBEDDING_REQUESTS_PER_SECOND") {
            self.embedding.client.requests_per_second = rps;
        }
        if let Some(n) = parse_var("SCRIBE_EMBEDDING_CONCURRENCY") {
            self.embedding.client.concurrency = n;
        }
    }

    fn apply_env_overrides_index(&mut self) {
        if let Ok(v) = std::env::var("SCRIBE_STORE_PATH") {
            self.store.path = v;
        }
        if let Some(n) = parse_var("SCRIBE_CHUNKER_TARGET_SIZE") {
            self.chunker.target_size = n;
        }
        if let Some(n) = parse_var("SCRIBE_CHUNKER_OVERLAP") {
            self.chunker.overlap = n;
        }
        if let Some(n) = parse_var("SCRIBE_INDEX_MAX_FILE_BYTES") {
            self.indexer.max_file_bytes = n;
        }
        if let Some(n) = parse_var("SCRIBE_RETRIEVAL_MAX_RESULTS") {
            self.retrieval.default_max_results = n;
        }
        if let Some(w) = parse_var("SCRIBE_RETRIEVAL_SEMANTIC_WEIGHT") {
            self.retrieval.weights.semantic = w;
        }
        if let Some(w) = parse_var("SCRIBE_RETRIEVAL_KEYWORD_WEIGHT") {
            self.retrieval.weights.keyword = w;
        }
        if let Some(metric) = parse_var("SCRIBE_RETRIEVAL_METRIC") {
            self.retrieval.metric = metric;
        }
        if let Some(secs) = parse_var("SCRIBE_RETRIEVAL_CACHE_TTL_SECS") {
            self.retrieval.cache_ttl_secs = secs;
        }
        if let Ok(v) = std::env::var("SCRIBE_LOG_LEVEL") {
            self.logging.level = v;
        }
    }
}
