use std::sync::Arc;

use proptest::prelude::*;
use scribe_store::{
    DistanceMetric, InMemoryVectorStore, IndexEntry, MetadataFilter, SqliteVectorStore,
    StoreOptions, VectorStore, keys,
};
use tempfile::TempDir;

fn entry(id: String, vector: Vec<f32>) -> IndexEntry {
    IndexEntry::new(id, vector).with_meta(keys::FILE_PATH, "f.rs")
}

async fn check_top_k(store: &dyn VectorStore, vectors: &[Vec<f32>], query: &[f32], k: usize) {
    let entries = vectors
        .iter()
        .enumerate()
        .map(|(i, v)| entry(format!("e{i:03}"), v.clone()))
        .collect();
    store.put_many(entries).await.unwrap();

    for metric in [
        DistanceMetric::Cosine,
        DistanceMetric::Euclidean,
        DistanceMetric::DotProduct,
    ] {
        let results = store
            .search(query, k, metric, &MetadataFilter::new())
            .await
            .unwrap();
        assert_eq!(results.len(), k.min(vectors.len()));
        for pair in results.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
        if let Some(worst) = results.last() {
            for (i, v) in vectors.iter().enumerate() {
                let id = format!("e{i:03}");
                if results.iter().all(|r| r.id != id) {
                    assert!(metric.score(query, v) <= worst.score);
                }
            }
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn in_memory_top_k_is_exact(
        vectors in prop::collection::vec(prop::collection::vec(-1.0f32..1.0, 4), 0..40),
        query in prop::collection::vec(-1.0f32..1.0, 4),
        k in 0usize..12,
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let store = InMemoryVectorStore::new(4);
            check_top_k(&store, &vectors, &query, k).await;
        });
    }

    #[test]
    fn sqlite_top_k_is_exact(
        vectors in prop::collection::vec(prop::collection::vec(-1.0f32..1.0, 4), 0..40),
        query in prop::collection::vec(-1.0f32..1.0, 4),
        k in 0usize..12,
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let store = SqliteVectorStore::open(":memory:", &StoreOptions::new(4)).await.unwrap();
            check_top_k(&store, &vectors, &query, k).await;
        });
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_writers_and_readers() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("index.db");
    let store = Arc::new(
        SqliteVectorStore::open(path.to_str().unwrap(), &StoreOptions::new(2))
            .await
            .unwrap(),
    );

    let mut handles = Vec::new();
    for w in 0..4 {
        let store = Arc::clone(&store);
        handles.push(tokio::spawn(async move {
            for i in 0..25 {
                #[allow(clippy::cast_precision_loss)]
                let x = i as f32;
                store
                    .put(
                        IndexEntry::new(format!("w{w}-{i}"), vec![x, 1.0])
                            .with_meta(keys::FILE_PATH, format!("file{w}.rs")),
                    )
                    .await
                    .unwrap();
            }
        }));
    }
    for _ in 0..4 {
        let store = Arc::clone(&store);
        handles.push(tokio::spawn(async move {
            for _ in 0..25 {
                store
                    .search(&[1.0, 0.0], 5, DistanceMetric::Cosine, &MetadataFilter::new())
                    .await
                    .unwrap();
            }
        }));
    }
    for h in handles {
        h.await.unwrap();
    }

    assert_eq!(store.count().await.unwrap(), 100);
    let per_file = store.scan(&MetadataFilter::file("file2.rs")).await.unwrap();
    assert_eq!(per_file.len(), 25);
}

#[tokio::test]
async fn both_stores_agree() {
    let sqlite = SqliteVectorStore::open(":memory:", &StoreOptions::new(3))
        .await
        .unwrap();
    let memory = InMemoryVectorStore::new(3);
    let entries: Vec<IndexEntry> = (0..30u8)
        .map(|i| {
            let f = f32::from(i);
            IndexEntry::new(format!("id{i:02}"), vec![f.sin(), f.cos(), f / 30.0])
                .with_meta(keys::FILE_PATH, if i % 2 == 0 { "even.rs" } else { "odd.rs" })
                .with_content(format!("chunk {i}"))
        })
        .collect();
    sqlite.put_many(entries.clone()).await.unwrap();
    memory.put_many(entries).await.unwrap();

    let filter = MetadataFilter::file("odd.rs");
    let a = sqlite
        .search(&[0.2, 0.9, 0.1], 7, DistanceMetric::Cosine, &filter)
        .await
        .unwrap();
    let b = memory
        .search(&[0.2, 0.9, 0.1], 7, DistanceMetric::Cosine, &filter)
        .await
        .unwrap();
    assert_eq!(a, b);
}
