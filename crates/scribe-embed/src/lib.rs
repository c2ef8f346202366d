//! Embedding provider abstraction and backend implementations.
//!
//! Backends implement [`EmbeddingProvider`] for a single request. The
//! [`Embedder`] layers batching, rate limiting, retry, timeouts and order
//! tracking on top of any provider.

pub mod any;
pub mod compatible;
pub mod embedder;
pub mod error;
pub(crate) mod http;
#[cfg(feature = "mock")]
pub mod mock;
pub mod ollama;
pub mod openai;
pub mod provider;
pub mod rate_limit;
pub mod retry;

pub use any::AnyEmbeddingProvider;
pub use embedder::{Embedder, EmbedderConfig, EmbeddingVector, Embeddings};
pub use error::{EmbedError, Result};
pub use provider::{EmbedOptions, EmbeddingProvider, IndexedEmbedding, InputType, RawEmbeddings, Usage};
