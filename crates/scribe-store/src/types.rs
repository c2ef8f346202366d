use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// String metadata attached to an entry. Ordered so its JSON form is stable.
pub type Metadata = BTreeMap<String, String>;

/// Well-known metadata keys written by the indexer.
pub mod keys {
    pub const FILE_PATH: &str = "file_path";
    pub const CHUNK_INDEX: &str = "chunk_index";
    pub const LANGUAGE: &str = "language";
    pub const START_LINE: &str = "start_line";
    pub const END_LINE: &str = "end_line";
    /// blake3 of the whole file, recorded on chunk 0 only.
    pub const FILE_HASH: &str = "file_hash";
}

/// Persisted record. Entries are only ever overwritten whole or deleted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub id: String,
    pub vector: Vec<f32>,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default)]
    pub content: Option<String>,
}

impl IndexEntry {
    #[must_use]
    pub fn new(id: impl Into<String>, vector: Vec<f32>) -> Self {
        Self {
            id: id.into(),
            vector,
            metadata: Metadata::new(),
            content: None,
        }
    }

    #[must_use]
    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }
}

/// Entry without its vector, as returned by [`VectorStore::scan`](crate::VectorStore::scan).
#[derive(Clone, Debug, PartialEq)]
pub struct EntryRecord {
    pub id: String,
    pub metadata: Metadata,
    pub content: Option<String>,
}

impl EntryRecord {
    #[must_use]
    pub fn file_path(&self) -> &str {
        self.metadata
            .get(keys::FILE_PATH)
            .map_or("", String::as_str)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub id: String,
    pub file_path: String,
    pub content: String,
    pub score: f32,
    pub metadata: Metadata,
}

impl RetrievalResult {
    /// Sequence number of the chunk inside its file, `u64::MAX` when absent.
    #[must_use]
    pub fn chunk_index(&self) -> u64 {
        self.metadata
            .get(keys::CHUNK_INDEX)
            .and_then(|v| v.parse().ok())
            .unwrap_or(u64::MAX)
    }

    /// Score a record produced by [`VectorStore::scan`](crate::VectorStore::scan).
    #[must_use]
    pub fn from_record(record: EntryRecord, score: f32) -> Self {
        Self::from_parts(record.id, score, record.metadata, record.content)
    }

    pub(crate) fn from_parts(id: String, score: f32, metadata: Metadata, content: Option<String>) -> Self {
        Self {
            file_path: metadata.get(keys::FILE_PATH).cloned().unwrap_or_default(),
            content: content.unwrap_or_default(),
            id,
            score,
            metadata,
        }
    }
}

/// AND of exact `key = value` matches against entry metadata.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetadataFilter(BTreeMap<String, String>);

impl MetadataFilter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn file(path: impl Into<String>) -> Self {
        Self::new().with(keys::FILE_PATH, path)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    #[must_use]
    pub fn matches(&self, metadata: &Metadata) -> bool {
        self.0
            .iter()
            .all(|(k, v)| metadata.get(k).is_some_and(|m| m == v))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for MetadataFilter {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}
