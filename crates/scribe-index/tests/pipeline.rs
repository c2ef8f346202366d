use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use scribe_embed::mock::MockEmbeddingProvider;
use scribe_embed::{Embedder, EmbedderConfig};
use scribe_index::{
    Document, Indexer, IndexerConfig, QueryType, RetrievalConfig, RetrievalContext, Retriever,
};
use scribe_store::vector_store::BoxFuture;
use scribe_store::{
    DistanceMetric, EntryRecord, IndexEntry, MetadataFilter, RetrievalResult, SqliteVectorStore,
    StoreOptions, VectorStore, keys,
};
use tokio_util::sync::CancellationToken;

const DIM: usize = 64;

/// Delegating store that counts read calls.
struct CountingStore {
    inner: Arc<dyn VectorStore>,
    searches: AtomicUsize,
    scans: AtomicUsize,
}

impl CountingStore {
    fn new(inner: Arc<dyn VectorStore>) -> Self {
        Self {
            inner,
            searches: AtomicUsize::new(0),
            scans: AtomicUsize::new(0),
        }
    }

    fn reads(&self) -> usize {
        self.searches.load(Ordering::SeqCst) + self.scans.load(Ordering::SeqCst)
    }
}

impl VectorStore for CountingStore {
    fn put(&self, entry: IndexEntry) -> BoxFuture<'_, scribe_store::Result<()>> {
        self.inner.put(entry)
    }

    fn put_many(&self, entries: Vec<IndexEntry>) -> BoxFuture<'_, scribe_store::Result<()>> {
        self.inner.put_many(entries)
    }

    fn get<'a>(&'a self, id: &'a str) -> BoxFuture<'a, scribe_store::Result<Option<IndexEntry>>> {
        self.inner.get(id)
    }

    fn delete<'a>(&'a self, id: &'a str) -> BoxFuture<'a, scribe_store::Result<bool>> {
        self.inner.delete(id)
    }

    fn delete_matching<'a>(
        &'a self,
        filter: &'a MetadataFilter,
    ) -> BoxFuture<'a, scribe_store::Result<u64>> {
        self.inner.delete_matching(filter)
    }

    fn replace_matching(
        &self,
        filter: MetadataFilter,
        entries: Vec<IndexEntry>,
    ) -> BoxFuture<'_, scribe_store::Result<u64>> {
        self.inner.replace_matching(filter, entries)
    }

    fn search<'a>(
        &'a self,
        query: &'a [f32],
        k: usize,
        metric: DistanceMetric,
        filter: &'a MetadataFilter,
    ) -> BoxFuture<'a, scribe_store::Result<Vec<RetrievalResult>>> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        self.inner.search(query, k, metric, filter)
    }

    fn scan<'a>(
        &'a self,
        filter: &'a MetadataFilter,
    ) -> BoxFuture<'a, scribe_store::Result<Vec<EntryRecord>>> {
        self.scans.fetch_add(1, Ordering::SeqCst);
        self.inner.scan(filter)
    }

    fn count(&self) -> BoxFuture<'_, scribe_store::Result<u64>> {
        self.inner.count()
    }

    fn clear(&self) -> BoxFuture<'_, scribe_store::Result<()>> {
        self.inner.clear()
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }
}

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, content).unwrap();
}

fn project(root: &Path) {
    write(
        root,
        "src/limiter.rs",
        "/// Token bucket limiter.\npub struct Limiter { tokens: f64 }\n\nimpl Limiter {\n    pub fn refill(&mut self) { self.tokens += 1.0; }\n}\n",
    );
    write(
        root,
        "src/parser.py",
        "def parse(text):\n    return text.split()\n\nclass Grammar:\n    pass\n",
    );
    write(
        root,
        "docs/guide.md",
        "# Guide\n\nThe limiter refills tokens at a fixed rate.\n\n## Parsing\n\nThe parser splits text.\n",
    );
}

struct Harness {
    store: Arc<CountingStore>,
    provider: MockEmbeddingProvider,
    indexer: Indexer<MockEmbeddingProvider>,
    retriever: Retriever<MockEmbeddingProvider>,
    _dir: tempfile::TempDir,
}

async fn harness(root: &Path) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("index.db");
    let sqlite = SqliteVectorStore::open(
        db.to_str().unwrap(),
        &StoreOptions::new(DIM).with_model("mock"),
    )
    .await
    .unwrap();
    let store = Arc::new(CountingStore::new(Arc::new(sqlite)));

    let provider = MockEmbeddingProvider::new(DIM);
    let embedder = Arc::new(
        Embedder::new(
            provider.clone(),
            &EmbedderConfig {
                max_retries: 0,
                ..EmbedderConfig::default()
            },
        )
        .unwrap(),
    );

    let retriever = Retriever::new(store.clone(), embedder.clone(), RetrievalConfig::default()).unwrap();
    let indexer = Indexer::new(store.clone(), embedder, IndexerConfig::default())
        .unwrap()
        .with_cache(retriever.cache().clone());

    indexer
        .index_directory(root, &CancellationToken::new())
        .await
        .unwrap();

    Harness {
        store,
        provider,
        indexer,
        retriever,
        _dir: dir,
    }
}

#[tokio::test]
async fn indexed_project_is_searchable() {
    let project_dir = tempfile::tempdir().unwrap();
    project(project_dir.path());
    let h = harness(project_dir.path()).await;

    let results = h
        .retriever
        .retrieve(&RetrievalContext::new("limiter refill tokens"))
        .await
        .unwrap();
    assert!(!results.is_empty());
    assert!(
        results[0].file_path == "src/limiter.rs" || results[0].file_path == "docs/guide.md",
        "unexpected top hit {}",
        results[0].file_path
    );
    for pair in results.windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }

    let python_only = h
        .retriever
        .retrieve(
            &RetrievalContext::new("parse text")
                .with_query_type(QueryType::Keyword)
                .with_filters(MetadataFilter::new().with(keys::LANGUAGE, "python")),
        )
        .await
        .unwrap();
    assert!(python_only.iter().all(|r| r.file_path == "src/parser.py"));
    assert!(!python_only.is_empty());
}

#[tokio::test]
async fn repeated_query_hits_cache_until_index_changes() {
    let project_dir = tempfile::tempdir().unwrap();
    project(project_dir.path());
    let h = harness(project_dir.path()).await;
    let ctx = RetrievalContext::new("grammar parser");

    let first = h.retriever.retrieve(&ctx).await.unwrap();
    let reads = h.store.reads();
    let calls = h.provider.calls();

    let second = h.retriever.retrieve(&ctx).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(h.store.reads(), reads);
    assert_eq!(h.provider.calls(), calls);

    h.indexer
        .index_documents(
            vec![Document::new("src/extra.rs", "fn grammar_parser() {}")],
            &CancellationToken::new(),
        )
        .await
        .unwrap();
    let third = h.retriever.retrieve(&ctx).await.unwrap();
    assert!(h.store.reads() > reads);
    assert!(third.iter().any(|r| r.file_path == "src/extra.rs"));
}

#[tokio::test]
async fn reindexing_unchanged_project_embeds_nothing() {
    let project_dir = tempfile::tempdir().unwrap();
    project(project_dir.path());
    let h = harness(project_dir.path()).await;
    let calls = h.provider.calls();

    let report = h
        .indexer
        .index_directory(project_dir.path(), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(report.files_indexed, 0);
    assert_eq!(report.files_skipped, 3);
    assert_eq!(h.provider.calls(), calls);
}

#[tokio::test]
async fn chunk_ids_survive_reopen() {
    let project_dir = tempfile::tempdir().unwrap();
    project(project_dir.path());
    let h = harness(project_dir.path()).await;

    let before = h.store.scan(&MetadataFilter::file("docs/guide.md")).await.unwrap();
    h.indexer
        .rebuild(project_dir.path(), &CancellationToken::new())
        .await
        .unwrap();
    let after = h.store.scan(&MetadataFilter::file("docs/guide.md")).await.unwrap();

    let ids = |records: &[EntryRecord]| {
        let mut ids: Vec<String> = records.iter().map(|r| r.id.clone()).collect();
        ids.sort();
        ids
    };
    assert_eq!(ids(&before), ids(&after));
}
