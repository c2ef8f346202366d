#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] sqlx::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The store could not be opened or failed its integrity check.
    /// Never repaired automatically.
    #[error("vector store at {path} unavailable: {reason}")]
    Unavailable { path: String, reason: String },

    #[error("dimension mismatch: store holds {expected}-d vectors, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("model mismatch: store was built with {expected}, configured {actual}")]
    ModelMismatch { expected: String, actual: String },

    #[error("invalid store configuration: {0}")]
    Config(String),

    #[error("invalid entry: {0}")]
    InvalidEntry(String),

    #[error("invalid query vector: {0}")]
    InvalidQuery(String),

    #[error("store lock poisoned")]
    LockPoisoned,
}

pub type Result<T> = std::result::Result<T, StoreError>;
