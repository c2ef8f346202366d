use scribe_embed::EmbedError;
use scribe_store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("embedding failed: {0}")]
    Embed(#[from] EmbedError),

    #[error("vector store error: {0}")]
    Store(#[from] StoreError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("worker task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("operation cancelled")]
    Cancelled,
}

impl IndexError {
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        match self {
            Self::Cancelled => true,
            Self::Embed(e) => e.is_cancelled(),
            _ => false,
        }
    }

    /// Errors that will recur for every file, so an indexing run stops
    /// instead of recording them per file.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Embed(e) => matches!(
                e.root(),
                EmbedError::DimensionMismatch { .. }
                    | EmbedError::Config(_)
                    | EmbedError::Cancelled
                    | EmbedError::Rejected {
                        status: 401 | 403,
                        ..
                    }
            ),
            Self::Store(e) => matches!(
                e,
                StoreError::DimensionMismatch { .. }
                    | StoreError::Unavailable { .. }
                    | StoreError::LockPoisoned
            ),
            Self::Config(_) | Self::Cancelled | Self::Join(_) => true,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, IndexError>;
