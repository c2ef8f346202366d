//! Chunking, indexing and hybrid retrieval.
//!
//! Write path: [`Document`] → [`Chunker`] → [`Embedder`](scribe_embed::Embedder)
//! → [`VectorStore`](scribe_store::VectorStore), driven by [`Indexer`].
//! Read path: [`RetrievalContext`] → [`Retriever`], with results cached in a
//! shared [`RetrievalCache`].

pub mod cache;
pub mod chunker;
pub mod context;
pub mod document;
pub mod error;
pub mod indexer;
pub mod keyword;
pub mod languages;
pub mod retriever;

pub use cache::{CacheStats, RetrievalCache};
pub use chunker::{Chunk, Chunker, ChunkerConfig, chunk_id, reconstruct};
pub use document::Document;
pub use error::{IndexError, Result};
pub use indexer::{IndexReport, Indexer, IndexerConfig};
pub use languages::{Lang, detect_language};
pub use retriever::{HybridWeights, QueryType, RetrievalConfig, RetrievalContext, Retriever};
