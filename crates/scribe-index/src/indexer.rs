//! Indexing orchestrator: walk → chunk → embed → store.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::StreamExt;
use scribe_embed::embedder::mean_pool;
use scribe_embed::{EmbedError, EmbedOptions, Embedder, EmbeddingProvider, Usage};
use scribe_store::{IndexEntry, MetadataFilter, VectorStore, keys};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::cache::RetrievalCache;
use crate::chunker::{Chunk, Chunker, ChunkerConfig};
use crate::context::contextualize_for_embedding;
use crate::document::Document;
use crate::error::{IndexError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexerConfig {
    pub chunker: ChunkerConfig,
    /// Files above this size are skipped in directory mode.
    pub max_file_bytes: u64,
    /// Blocking workers chunking files ahead of the embedder.
    pub chunk_workers: usize,
    /// Prefix embedded text with path, language and line range.
    pub contextualize: bool,
    pub include_hidden: bool,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            chunker: ChunkerConfig::default(),
            max_file_bytes: 1024 * 1024,
            chunk_workers: 4,
            contextualize: true,
            include_hidden: false,
        }
    }
}

/// Summary of an indexing run.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct IndexReport {
    pub files_scanned: usize,
    pub files_indexed: usize,
    /// Unchanged, too large or not UTF-8.
    pub files_skipped: usize,
    pub files_removed: usize,
    pub chunks_written: usize,
    /// One `"path: error"` line per file that failed.
    pub errors: Vec<String>,
    pub usage: Usage,
    pub duration_ms: u64,
}

enum Source {
    Loaded(Document),
    OnDisk { abs: PathBuf, rel: String },
}

impl Source {
    fn path(&self) -> &str {
        match self {
            Self::Loaded(doc) => &doc.path,
            Self::OnDisk { rel, .. } => rel,
        }
    }
}

enum Prepared {
    Unchanged,
    NotText,
    Chunked { hash: String, chunks: Vec<Chunk> },
}

struct WalkedFile {
    abs: PathBuf,
    rel: String,
    len: u64,
}

/// Writes documents into a vector store, one file at a time.
///
/// A file's entries are replaced atomically and only after all of its
/// embeddings succeeded, so a failure leaves the previous version intact.
pub struct Indexer<P> {
    store: Arc<dyn VectorStore>,
    embedder: Arc<Embedder<P>>,
    chunker: Chunker,
    config: IndexerConfig,
    cache: Option<Arc<RetrievalCache>>,
}

impl<P: EmbeddingProvider> Indexer<P> {
    /// # Errors
    ///
    /// Returns [`IndexError::Config`] for an invalid chunker config or when
    /// the store and embedder disagree on the vector dimension.
    pub fn new(
        store: Arc<dyn VectorStore>,
        embedder: Arc<Embedder<P>>,
        config: IndexerConfig,
    ) -> Result<Self> {
        if store.dimension() != embedder.dimensions() {
            return Err(IndexError::Config(format!(
                "store dimension {} differs from embedding dimension {}",
                store.dimension(),
                embedder.dimensions()
            )));
        }
        Ok(Self {
            store,
            embedder,
            chunker: Chunker::new(config.chunker.clone())?,
            config,
            cache: None,
        })
    }

    /// Cache cleared after every mutation of the store.
    #[must_use]
    pub fn with_cache(mut self, cache: Arc<RetrievalCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn VectorStore> {
        &self.store
    }

    #[must_use]
    pub fn config(&self) -> &IndexerConfig {
        &self.config
    }

    /// Index in-memory documents. Unchanged documents are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error only for failures that would repeat for every file
    /// (see [`IndexError::is_fatal`]) or cancellation. Per-file failures are
    /// listed in [`IndexReport::errors`].
    pub async fn index_documents(
        &self,
        docs: Vec<Document>,
        cancel: &CancellationToken,
    ) -> Result<IndexReport> {
        let start = std::time::Instant::now();
        let mut report = IndexReport {
            files_scanned: docs.len(),
            ..IndexReport::default()
        };
        tracing::info!(total = docs.len(), "indexing documents");

        let sources = docs.into_iter().map(Source::Loaded).collect();
        let result = self.run(sources, &mut report, cancel).await;
        report.duration_ms = elapsed_ms(start);
        result.map(|()| report)
    }

    /// Index every file under `root` (honouring `.gitignore`) and remove
    /// entries of files that no longer exist or are no longer indexable.
    ///
    /// Stored paths are relative to `root` with `/` separators.
    ///
    /// # Errors
    ///
    /// Same as [`index_documents`](Self::index_documents), plus I/O errors
    /// when `root` is not a readable directory.
    pub async fn index_directory(
        &self,
        root: &Path,
        cancel: &CancellationToken,
    ) -> Result<IndexReport> {
        let start = std::time::Instant::now();
        if !tokio::fs::metadata(root).await?.is_dir() {
            return Err(IndexError::Config(format!(
                "{} is not a directory",
                root.display()
            )));
        }

        let walked = {
            let root = root.to_path_buf();
            let include_hidden = self.config.include_hidden;
            tokio::task::spawn_blocking(move || walk(&root, include_hidden)).await?
        };

        let mut report = IndexReport {
            files_scanned: walked.len(),
            ..IndexReport::default()
        };
        tracing::info!(root = %root.display(), total = walked.len(), "indexing started");

        let mut present = HashSet::with_capacity(walked.len());
        let mut sources = Vec::with_capacity(walked.len());
        for file in walked {
            if file.len > self.config.max_file_bytes {
                tracing::debug!(file = %file.rel, bytes = file.len, "file too large, skipped");
                report.files_skipped += 1;
                continue;
            }
            present.insert(file.rel.clone());
            sources.push(Source::OnDisk {
                abs: file.abs,
                rel: file.rel,
            });
        }

        let result = self.run(sources, &mut report, cancel).await;
        if result.is_ok() {
            self.remove_missing(&present, &mut report).await?;
        }
        report.duration_ms = elapsed_ms(start);
        result.map(|()| report)
    }

    /// Clear the store, then index `root` from scratch.
    ///
    /// # Errors
    ///
    /// Same as [`index_directory`](Self::index_directory).
    pub async fn rebuild(&self, root: &Path, cancel: &CancellationToken) -> Result<IndexReport> {
        tracing::info!(root = %root.display(), "rebuilding index");
        self.store.clear().await?;
        self.invalidate();
        self.index_directory(root, cancel).await
    }

    /// Delete every entry of `path`. Returns the number removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the store rejects the deletion.
    pub async fn remove_file(&self, path: &str) -> Result<u64> {
        let removed = self
            .store
            .delete_matching(&MetadataFilter::file(path))
            .await?;
        if removed > 0 {
            self.invalidate();
        }
        Ok(removed)
    }

    fn invalidate(&self) {
        if let Some(cache) = &self.cache {
            cache.clear();
        }
    }

    async fn run(
        &self,
        sources: Vec<Source>,
        report: &mut IndexReport,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let total = sources.len();
        let mut prepared = futures::stream::iter(sources)
            .map(|source| self.prepare(source))
            .buffered(self.config.chunk_workers.max(1));

        let mut mutated = false;
        let mut done = 0usize;
        let outcome = loop {
            let Some((path, result)) = prepared.next().await else {
                break Ok(());
            };
            done += 1;
            if cancel.is_cancelled() {
                break Err(IndexError::Cancelled);
            }

            let step = match result {
                Ok(Prepared::Unchanged) => {
                    report.files_skipped += 1;
                    Ok(())
                }
                Ok(Prepared::NotText) => {
                    tracing::debug!(file = %path, "not UTF-8, skipped");
                    report.files_skipped += 1;
                    Ok(())
                }
                Ok(Prepared::Chunked { hash, chunks }) => {
                    match self.persist(&path, &hash, chunks, cancel).await {
                        Ok((written, usage)) => {
                            mutated = true;
                            report.files_indexed += 1;
                            report.chunks_written += written;
                            report.usage += usage;
                            tracing::info!(
                                file = %path,
                                progress = format_args!("{done}/{total}"),
                                chunk_count = written,
                            );
                            Ok(())
                        }
                        Err(e) => Err(e),
                    }
                }
                Err(e) => Err(e),
            };

            if let Err(e) = step {
                if e.is_fatal() {
                    break Err(e);
                }
                tracing::warn!(file = %path, "indexing failed: {e}");
                report.errors.push(format!("{path}: {e}"));
            }
        };

        if mutated {
            self.invalidate();
        }
        outcome
    }

    /// Load, hash-check and chunk one source.
    async fn prepare(&self, source: Source) -> (String, Result<Prepared>) {
        let path = source.path().to_owned();
        let result = self.prepare_inner(source).await;
        (path, result)
    }

    async fn prepare_inner(&self, source: Source) -> Result<Prepared> {
        let doc = match source {
            Source::Loaded(doc) => doc,
            Source::OnDisk { abs, rel } => {
                let bytes = tokio::fs::read(&abs).await?;
                let Ok(content) = String::from_utf8(bytes) else {
                    return Ok(Prepared::NotText);
                };
                Document::new(rel, content)
            }
        };

        let hash = doc.content_hash();
        if self.stored_hash(&doc.path).await?.as_deref() == Some(hash.as_str()) {
            tracing::debug!(file = %doc.path, "unchanged");
            return Ok(Prepared::Unchanged);
        }

        let chunker = self.chunker.clone();
        let chunks = tokio::task::spawn_blocking(move || chunker.chunk_document(&doc)).await?;
        Ok(Prepared::Chunked { hash, chunks })
    }

    async fn stored_hash(&self, path: &str) -> Result<Option<String>> {
        let filter = MetadataFilter::file(path).with(keys::CHUNK_INDEX, "0");
        let records = self.store.scan(&filter).await?;
        Ok(records
            .into_iter()
            .find_map(|r| r.metadata.get(keys::FILE_HASH).cloned()))
    }

    /// Embed `chunks` and atomically replace the stored entries of `path`.
    async fn persist(
        &self,
        path: &str,
        hash: &str,
        chunks: Vec<Chunk>,
        cancel: &CancellationToken,
    ) -> Result<(usize, Usage)> {
        let provider = self.embedder.provider();
        let mut texts = Vec::with_capacity(chunks.len());
        let mut owners = Vec::with_capacity(chunks.len());
        for chunk in &chunks {
            let text = if self.config.contextualize {
                contextualize_for_embedding(chunk)
            } else {
                chunk.text.clone()
            };
            let pieces = provider.split_text_for_embedding(&text);
            if pieces.len() > 1 {
                tracing::debug!(file = %path, chunk = chunk.index, pieces = pieces.len(), "chunk split for embedding");
                owners.extend(std::iter::repeat_n(chunk.id.clone(), pieces.len()));
                texts.extend(pieces);
            } else {
                owners.push(chunk.id.clone());
                texts.push(text);
            }
        }

        let embeddings = self
            .embedder
            .embed(&texts, &EmbedOptions::default(), cancel)
            .await?;
        let usage = embeddings.usage;
        let mut labeled = embeddings.into_labeled(owners)?.into_iter().peekable();

        // Pieces of one chunk are adjacent and in chunk order.
        let entries = chunks
            .into_iter()
            .map(|chunk| {
                let mut vectors = Vec::new();
                while let Some(piece) = labeled.next_if(|v| v.chunk_id == chunk.id) {
                    vectors.push(piece.vector);
                }
                let vector = if vectors.len() == 1 {
                    vectors.pop()
                } else {
                    mean_pool(&vectors)
                };
                let vector = vector.ok_or_else(|| EmbedError::MalformedResponse {
                    provider: provider.name().to_owned(),
                    message: format!("no vector for chunk {} of {path}", chunk.index),
                })?;
                Ok(chunk_to_entry(chunk, vector, hash))
            })
            .collect::<Result<Vec<_>>>()?;

        let written = entries.len();
        self.store
            .replace_matching(MetadataFilter::file(path), entries)
            .await?;
        Ok((written, usage))
    }

    async fn remove_missing(
        &self,
        present: &HashSet<String>,
        report: &mut IndexReport,
    ) -> Result<()> {
        let indexed = self
            .store
            .scan(&MetadataFilter::new().with(keys::CHUNK_INDEX, "0"))
            .await?;
        let stale: HashSet<String> = indexed
            .iter()
            .map(|r| r.file_path().to_owned())
            .filter(|p| !present.contains(p))
            .collect();

        for path in &stale {
            match self.store.delete_matching(&MetadataFilter::file(path)).await {
                Ok(n) => {
                    tracing::info!(file = %path, chunk_count = n, "removed deleted file");
                    report.files_removed += 1;
                }
                Err(e) => report.errors.push(format!("cleanup {path}: {e}")),
            }
        }
        if report.files_removed > 0 {
            self.invalidate();
        }
        Ok(())
    }
}

fn chunk_to_entry(chunk: Chunk, vector: Vec<f32>, file_hash: &str) -> IndexEntry {
    let mut entry = IndexEntry::new(chunk.id, vector)
        .with_meta(keys::FILE_PATH, chunk.file_path)
        .with_meta(keys::CHUNK_INDEX, chunk.index.to_string())
        .with_meta(keys::START_LINE, chunk.start_line.to_string())
        .with_meta(keys::END_LINE, chunk.end_line.to_string())
        .with_content(chunk.text);
    if let Some(lang) = chunk.language {
        entry = entry.with_meta(keys::LANGUAGE, lang.id());
    }
    if chunk.index == 0 {
        entry = entry.with_meta(keys::FILE_HASH, file_hash);
    }
    entry
}

fn walk(root: &Path, include_hidden: bool) -> Vec<WalkedFile> {
    ignore::WalkBuilder::new(root)
        .hidden(!include_hidden)
        .git_ignore(true)
        .require_git(false)
        .build()
        .flatten()
        .filter(|e| e.file_type().is_some_and(|ft| ft.is_file()))
        .map(|e| {
            let rel = e
                .path()
                .strip_prefix(root)
                .unwrap_or(e.path())
                .to_string_lossy()
                .replace('\\', "/");
            let len = e.metadata().map_or(0, |m| m.len());
            WalkedFile {
                abs: e.into_path(),
                rel,
                len,
            }
        })
        .collect()
}

fn elapsed_ms(start: std::time::Instant) -> u64 {
    start.elapsed().as_millis().try_into().unwrap_or(u64::MAX)
}
