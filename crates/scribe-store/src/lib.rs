//! Exact nearest-neighbour vector storage.
//!
//! [`SqliteVectorStore`] persists entries in a single `SQLite` file;
//! [`InMemoryVectorStore`] keeps them in a map. Both implement
//! [`VectorStore`] and search by brute-force scan with a top-k partial sort.

pub mod distance;
pub mod error;
pub mod in_memory;
pub mod sqlite;
pub mod types;
pub mod vector_store;

pub use distance::DistanceMetric;
pub use error::{Result, StoreError};
pub use in_memory::InMemoryVectorStore;
pub use sqlite::{SqliteVectorStore, StoreOptions};
pub use types::{EntryRecord, IndexEntry, Metadata, MetadataFilter, RetrievalResult, keys};
pub use vector_store::VectorStore;
