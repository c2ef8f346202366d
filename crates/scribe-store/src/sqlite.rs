use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;

use futures::TryStreamExt;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use tokio::sync::RwLock;

use crate::distance::{DistanceMetric, top_k};
use crate::error::{Result, StoreError};
use crate::types::{EntryRecord, IndexEntry, Metadata, MetadataFilter, RetrievalResult};
use crate::vector_store::{
    BoxFuture, VectorStore, check_dimension, validate_entry, validate_query,
};

/// Ids bound per detail query, well under `SQLite`'s host parameter limit.
const DETAIL_BATCH: usize = 500;

const UPSERT: &str = "INSERT INTO entries (id, vector, metadata, content, updated_at) \
     VALUES (?, ?, ?, ?, CAST(strftime('%s', 'now') AS INTEGER)) \
     ON CONFLICT(id) DO UPDATE SET \
        vector = excluded.vector, \
        metadata = excluded.metadata, \
        content = excluded.content, \
        updated_at = excluded.updated_at";

#[derive(Clone, Debug)]
pub struct StoreOptions {
    /// Vector length of this index. Recorded on first open, enforced after.
    pub dimension: usize,
    /// Embedding model name. Recorded on first open when set.
    pub model: Option<String>,
    pub max_connections: u32,
}

impl StoreOptions {
    #[must_use]
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            model: None,
            max_connections: 5,
        }
    }

    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }
}

/// Single-file `SQLite` vector store.
///
/// Vectors are little-endian `f32` blobs, metadata is a JSON object, and
/// metadata filters run in SQL before any vector is decoded.
pub struct SqliteVectorStore {
    pool: SqlitePool,
    path: String,
    dimension: usize,
    model: Option<String>,
    lock: RwLock<()>,
}

impl std::fmt::Debug for SqliteVectorStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteVectorStore")
            .field("path", &self.path)
            .field("dimension", &self.dimension)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl SqliteVectorStore {
    /// Open (or create) the store at `path` and run migrations.
    ///
    /// `":memory:"` opens a private in-memory database.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] if the file cannot be opened, fails
    /// `PRAGMA quick_check`, or cannot be migrated, and
    /// [`StoreError::DimensionMismatch`] / [`StoreError::ModelMismatch`] if the
    /// store was built with a different embedding configuration.
    pub async fn open(path: &str, options: &StoreOptions) -> Result<Self> {
        if options.dimension == 0 {
            return Err(StoreError::Config("dimension must be positive".into()));
        }
        let unavailable = |reason: String| StoreError::Unavailable {
            path: path.to_owned(),
            reason,
        };

        let in_memory = path == ":memory:";
        let url = if in_memory {
            "sqlite::memory:".to_string()
        } else {
            if let Some(parent) = Path::new(path).parent()
                && !parent.as_os_str().is_empty()
            {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| unavailable(e.to_string()))?;
            }
            format!("sqlite:{path}?mode=rwc")
        };

        let opts = SqliteConnectOptions::from_str(&url)
            .map_err(|e| unavailable(e.to_string()))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .max_connections(if in_memory { 1 } else { options.max_connections.max(1) })
            .connect_with(opts)
            .await
            .map_err(|e| unavailable(e.to_string()))?;

        let check: Vec<(String,)> = sqlx::query_as("PRAGMA quick_check")
            .fetch_all(&pool)
            .await
            .map_err(|e| unavailable(e.to_string()))?;
        if check.len() != 1 || check[0].0 != "ok" {
            let problems: Vec<String> = check.into_iter().map(|(msg,)| msg).collect();
            return Err(unavailable(format!(
                "integrity check failed: {}",
                problems.join("; ")
            )));
        }

        sqlx::migrate!()
            .run(&pool)
            .await
            .map_err(|e| unavailable(e.to_string()))?;

        let store = Self {
            pool,
            path: path.to_owned(),
            dimension: options.dimension,
            model: options.model.clone(),
            lock: RwLock::new(()),
        };
        store.check_meta().await?;

        tracing::debug!(path, dimension = store.dimension, "vector store opened");
        Ok(store)
    }

    async fn check_meta(&self) -> Result<()> {
        let rows: Vec<(String, String)> = sqlx::query_as("SELECT key, value FROM store_meta")
            .fetch_all(&self.pool)
            .await?;
        let meta: HashMap<String, String> = rows.into_iter().collect();

        match meta.get("dimension") {
            Some(recorded) => {
                let recorded: usize = recorded.parse().map_err(|_| StoreError::Unavailable {
                    path: self.path.clone(),
                    reason: format!("corrupt recorded dimension: {recorded}"),
                })?;
                check_dimension(recorded, self.dimension)?;
            }
            None => self.set_meta("dimension", &self.dimension.to_string()).await?,
        }

        match (meta.get("model"), &self.model) {
            (Some(recorded), Some(configured)) if recorded != configured => {
                return Err(StoreError::ModelMismatch {
                    expected: recorded.clone(),
                    actual: configured.clone(),
                });
            }
            (None, Some(configured)) => self.set_meta("model", configured).await?,
            _ => {}
        }
        Ok(())
    }

    async fn set_meta(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO store_meta (key, value) VALUES (?, ?) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    #[must_use]
    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn write_entries(
        &self,
        filter: Option<&MetadataFilter>,
        entries: &[IndexEntry],
    ) -> Result<u64> {
        let mut rows = Vec::with_capacity(entries.len());
        for entry in entries {
            validate_entry(entry, self.dimension)?;
            rows.push((
                entry.id.as_str(),
                encode_vector(&entry.vector),
                serde_json::to_string(&entry.metadata)?,
                entry.content.as_deref(),
            ));
        }

        let _guard = self.lock.write().await;
        let mut tx = self.pool.begin().await?;

        let mut removed = 0;
        if let Some(filter) = filter {
            let mut qb = QueryBuilder::<Sqlite>::new("DELETE FROM entries");
            push_filter(&mut qb, filter)?;
            removed = qb.build().execute(&mut *tx).await?.rows_affected();
        }

        for (id, vector, metadata, content) in rows {
            sqlx::query(UPSERT)
                .bind(id)
                .bind(vector)
                .bind(metadata)
                .bind(content)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(removed)
    }
}

impl VectorStore for SqliteVectorStore {
    fn put(&self, entry: IndexEntry) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.write_entries(None, std::slice::from_ref(&entry)).await?;
            Ok(())
        })
    }

    fn put_many(&self, entries: Vec<IndexEntry>) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.write_entries(None, &entries).await?;
            Ok(())
        })
    }

    fn get<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<Option<IndexEntry>>> {
        Box::pin(async move {
            let _guard = self.lock.read().await;
            let row: Option<(String, Vec<u8>, String, Option<String>)> = sqlx::query_as(
                "SELECT id, vector, metadata, content FROM entries WHERE id = ?",
            )
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

            row.map(|(id, blob, metadata, content)| {
                Ok(IndexEntry {
                    id,
                    vector: decode_vector(&blob)?,
                    metadata: serde_json::from_str(&metadata)?,
                    content,
                })
            })
            .transpose()
        })
    }

    fn delete<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async move {
            let _guard = self.lock.write().await;
            let result = sqlx::query("DELETE FROM entries WHERE id = ?")
                .bind(id)
                .execute(&self.pool)
                .await?;
            Ok(result.rows_affected() > 0)
        })
    }

    fn delete_matching<'a>(&'a self, filter: &'a MetadataFilter) -> BoxFuture<'a, Result<u64>> {
        Box::pin(async move {
            let mut qb = QueryBuilder::<Sqlite>::new("DELETE FROM entries");
            push_filter(&mut qb, filter)?;
            let _guard = self.lock.write().await;
            Ok(qb.build().execute(&self.pool).await?.rows_affected())
        })
    }

    fn replace_matching(
        &self,
        filter: MetadataFilter,
        entries: Vec<IndexEntry>,
    ) -> BoxFuture<'_, Result<u64>> {
        Box::pin(async move { self.write_entries(Some(&filter), &entries).await })
    }

    fn search<'a>(
        &'a self,
        query: &'a [f32],
        k: usize,
        metric: DistanceMetric,
        filter: &'a MetadataFilter,
    ) -> BoxFuture<'a, Result<Vec<RetrievalResult>>> {
        Box::pin(async move {
            validate_query(query, self.dimension)?;
            if k == 0 {
                return Ok(Vec::new());
            }
            let _guard = self.lock.read().await;

            let mut qb = QueryBuilder::<Sqlite>::new("SELECT id, vector FROM entries");
            push_filter(&mut qb, filter)?;
            let mut scored: Vec<(f32, String)> = Vec::new();
            {
                let mut rows = qb.build_query_as::<(String, Vec<u8>)>().fetch(&self.pool);
                while let Some((id, blob)) = rows.try_next().await? {
                    let vector = decode_vector(&blob)?;
                    check_dimension(self.dimension, vector.len())?;
                    scored.push((metric.score(query, &vector), id));
                }
            }
            let scanned = scored.len();
            let top = top_k(scored, k);
            tracing::debug!(scanned, returned = top.len(), metric = metric.as_str(), "vector search");
            if top.is_empty() {
                return Ok(Vec::new());
            }

            let mut details: HashMap<String, (Metadata, Option<String>)> =
                HashMap::with_capacity(top.len());
            for batch in top.chunks(DETAIL_BATCH) {
                let mut qb = QueryBuilder::<Sqlite>::new(
                    "SELECT id, metadata, content FROM entries WHERE id IN (",
                );
                let mut ids = qb.separated(", ");
                for (_, id) in batch {
                    ids.push_bind(id.as_str());
                }
                ids.push_unseparated(")");
                let rows: Vec<(String, String, Option<String>)> =
                    qb.build_query_as().fetch_all(&self.pool).await?;
                for (id, metadata, content) in rows {
                    details.insert(id, (serde_json::from_str(&metadata)?, content));
                }
            }

            Ok(top
                .into_iter()
                .filter_map(|(score, id)| {
                    let (metadata, content) = details.remove(&id)?;
                    Some(RetrievalResult::from_parts(id, score, metadata, content))
                })
                .collect())
        })
    }

    fn scan<'a>(&'a self, filter: &'a MetadataFilter) -> BoxFuture<'a, Result<Vec<EntryRecord>>> {
        Box::pin(async move {
            let mut qb = QueryBuilder::<Sqlite>::new("SELECT id, metadata, content FROM entries");
            push_filter(&mut qb, filter)?;
            qb.push(" ORDER BY id");

            let _guard = self.lock.read().await;
            let rows: Vec<(String, String, Option<String>)> =
                qb.build_query_as().fetch_all(&self.pool).await?;
            rows.into_iter()
                .map(|(id, metadata, content)| {
                    Ok(EntryRecord {
                        id,
                        metadata: serde_json::from_str(&metadata)?,
                        content,
                    })
                })
                .collect()
        })
    }

    fn count(&self) -> BoxFuture<'_, Result<u64>> {
        Box::pin(async move {
            let _guard = self.lock.read().await;
            let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM entries")
                .fetch_one(&self.pool)
                .await?;
            Ok(u64::try_from(n).unwrap_or_default())
        })
    }

    fn clear(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let _guard = self.lock.write().await;
            sqlx::query("DELETE FROM entries").execute(&self.pool).await?;
            tracing::info!(path = %self.path, "vector store cleared");
            Ok(())
        })
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Append `WHERE json_extract(...) = ? AND ...` for every filter pair.
///
/// Keys are inlined into the JSON path so the expression index on
/// `file_path` applies; only `[A-Za-z0-9_]` keys are accepted.
fn push_filter<'a>(qb: &mut QueryBuilder<'a, Sqlite>, filter: &'a MetadataFilter) -> Result<()> {
    for (i, (key, value)) in filter.iter().enumerate() {
        if key.is_empty() || !key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(StoreError::InvalidEntry(format!(
                "unsupported metadata filter key: {key:?}"
            )));
        }
        qb.push(if i == 0 { " WHERE " } else { " AND " });
        qb.push(format!("json_extract(metadata, '$.\"{key}\"') = "));
        qb.push_bind(value);
    }
    Ok(())
}

fn encode_vector(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|x| x.to_le_bytes()).collect()
}

fn decode_vector(blob: &[u8]) -> Result<Vec<f32>> {
    if blob.len() % 4 != 0 {
        return Err(StoreError::InvalidEntry(format!(
            "vector blob of {} bytes is not a whole number of f32",
            blob.len()
        )));
    }
    Ok(blob
        .chunks_exact(4)
        .map(|c| {
            let mut bytes = [0u8; 4];
            bytes.copy_from_slice(c);
            f32::from_le_bytes(bytes)
        })
        .collect())
}
