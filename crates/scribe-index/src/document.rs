use std::path::Path;

use crate::languages::{Lang, detect_language};

/// One source file handed to the indexer. Read-only here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// Project-relative path with `/` separators. Keys every chunk id.
    pub path: String,
    pub content: String,
    pub language: Option<Lang>,
}

impl Document {
    /// Build a document, detecting the language from the path's extension.
    #[must_use]
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        let path = path.into();
        let language = detect_language(Path::new(&path));
        Self {
            path,
            content: content.into(),
            language,
        }
    }

    #[must_use]
    pub fn with_language(mut self, language: Option<Lang>) -> Self {
        self.language = language;
        self
    }

    /// Content length in bytes.
    #[must_use]
    pub fn size(&self) -> usize {
        self.content.len()
    }

    /// blake3 of the content, used for incremental re-indexing.
    #[must_use]
    pub fn content_hash(&self) -> String {
        blake3::hash(self.content.as_bytes()).to_hex().to_string()
    }
}
