use std::time::Duration;

/// Errors produced while generating embeddings.
#[derive(Debug, thiserror::Error)]
pub enum EmbedError {
    /// Transport-level failure (connect, reset, body read).
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse failed: {0}")]
    Json(#[from] serde_json::Error),

    /// 429 or 5xx response. Retried by the [`Embedder`](crate::Embedder).
    #[error("{provider} returned status {status}: {message}")]
    Status {
        provider: String,
        status: u16,
        message: String,
        retry_after: Option<Duration>,
    },

    /// Any other 4xx response: bad key, unknown model, oversized input.
    #[error("{provider} rejected the request (status {status}): {message}")]
    Rejected {
        provider: String,
        status: u16,
        message: String,
    },

    #[error("{provider} request timed out after {timeout:?}")]
    Timeout { provider: String, timeout: Duration },

    /// Transient failures persisted past the retry budget.
    #[error("{provider} unavailable after {attempts} attempts: {last_error}")]
    Unavailable {
        provider: String,
        attempts: u32,
        last_error: String,
    },

    #[error("embedding batch {start}..{end} failed: {source}")]
    Batch {
        start: usize,
        end: usize,
        #[source]
        source: Box<EmbedError>,
    },

    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("malformed response from {provider}: {message}")]
    MalformedResponse { provider: String, message: String },

    #[error("invalid embedding configuration: {0}")]
    Config(String),

    #[error("embedding cancelled")]
    Cancelled,
}

impl EmbedError {
    /// Whether the failure is worth another attempt.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(e) => !e.is_builder() && !e.is_redirect(),
            Self::Status { .. } | Self::Timeout { .. } => true,
            _ => false,
        }
    }

    /// Server-provided delay hint, when the response carried one.
    #[must_use]
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Status { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Strip [`EmbedError::Batch`] wrappers.
    #[must_use]
    pub fn root(&self) -> &EmbedError {
        match self {
            Self::Batch { source, .. } => source.root(),
            other => other,
        }
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self.root(), Self::Cancelled)
    }
}

pub type Result<T> = std::result::Result<T, EmbedError>;
