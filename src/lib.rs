//! Index a codebase into vector embeddings and answer relevance queries with
//! ranked, deduplicated chunks.
//!
//! ```no_run
//! # async fn run() -> anyhow::Result<()> {
//! use scribe::{CancellationToken, Config, Scribe};
//!
//! let config = Config::load(&scribe::resolve_config_path())?;
//! let scribe = Scribe::open(config).await?;
//! scribe
//!     .index_directory("src".as_ref(), &CancellationToken::new())
//!     .await?;
//! for hit in scribe.search("retry policy").await? {
//!     println!("{:.3} {}", hit.score, hit.file_path);
//! }
//! # Ok(())
//! # }
//! ```

pub use scribe_embed as embed;
pub use scribe_index as index;
pub use scribe_store as store;

pub use scribe_core::{bootstrap, config};
pub use scribe_core::logging::init_tracing;
pub use scribe_core::{Config, ConfigError, Scribe, build_provider, resolve_config_path};
pub use scribe_embed::{AnyEmbeddingProvider, EmbedError, Embedder, EmbeddingProvider};
pub use scribe_index::{
    Chunk, Chunker, ChunkerConfig, Document, IndexError, IndexReport, Indexer, QueryType,
    RetrievalContext, Retriever,
};
pub use scribe_store::{DistanceMetric, MetadataFilter, RetrievalResult, StoreError, VectorStore};
pub use tokio_util::sync::CancellationToken;
