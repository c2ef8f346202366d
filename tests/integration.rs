use std::collections::HashSet;
use std::path::Path;

use scribe::{
    CancellationToken, Config, MetadataFilter, QueryType, RetrievalContext, Scribe, VectorStore,
};

const LIB_RS: &str = r#"
/// Splits source text into tokens.
pub struct Tokenizer {
    input: String,
}

impl Tokenizer {
    pub fn new(input: impl Into<String>) -> Self {
        Self { input: input.into() }
    }

    pub fn tokens(&self) -> Vec<&str> {
        self.input.split_whitespace().collect()
    }
}
"#;

const BUILD_PY: &str = r#"
def compile_assets(paths):
    """Bundle stylesheet assets for the release build."""
    return [p for p in paths if p.endswith(".css")]


def clean():
    return None
"#;

const README: &str = "# Widget\n\nThe widget renders dashboards.\n\n## Install\n\nRun the installer script.\n";

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

fn project(root: &Path) {
    write(root, "src/lib.rs", LIB_RS);
    write(root, "tools/build.py", BUILD_PY);
    write(root, "README.md", README);
    write(root, ".gitignore", "target/\n");
    write(root, "target/debug/out.txt", "tokenizer build artefact");
}

fn load_config(dir: &Path) -> Config {
    let toml = format!(
        r"
[embedding]
provider = 'mock'
dimensions = 16
max_retries = 0

[store]
path = '{}'

[chunker]
target_size = 40
overlap = 5

[retrieval]
default_max_results = 5
",
        dir.join("state/index.db").display()
    );
    let path = dir.join("scribe.toml");
    std::fs::write(&path, toml).unwrap();
    Config::load(&path).unwrap()
}

#[tokio::test]
async fn config_file_drives_index_and_search() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("project");
    project(&root);

    let scribe = Scribe::open(load_config(dir.path())).await.unwrap();
    assert_eq!(scribe.config().chunker.target_size, 40);

    let report = scribe
        .index_directory(&root, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(report.files_indexed, 3, "{report:?}");
    assert!(report.errors.is_empty());
    assert!(report.chunks_written >= 3);

    let hits = scribe.search("tokenizer").await.unwrap();
    assert!(!hits.is_empty());
    assert!(hits.len() <= 5);

    let keyword = RetrievalContext::new("tokenizer").with_query_type(QueryType::Keyword);
    let hits = scribe.retrieve(&keyword).await.unwrap();
    assert_eq!(hits[0].file_path, "src/lib.rs");
    assert!(hits.iter().all(|h| h.file_path == "src/lib.rs"));
}

#[tokio::test]
async fn results_are_unique_ranked_and_filtered() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("project");
    project(&root);
    let scribe = Scribe::open(load_config(dir.path())).await.unwrap();
    scribe
        .index_directory(&root, &CancellationToken::new())
        .await
        .unwrap();

    let ctx = RetrievalContext::new("build assets widget").with_max_results(20);
    let hits = scribe.retrieve(&ctx).await.unwrap();
    let ids: HashSet<_> = hits.iter().map(|h| h.id.as_str()).collect();
    assert_eq!(ids.len(), hits.len());
    assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));

    let python = RetrievalContext::new("assets")
        .with_query_type(QueryType::Keyword)
        .with_filters(MetadataFilter::new().with("language", "python"));
    let hits = scribe.retrieve(&python).await.unwrap();
    assert!(!hits.is_empty());
    assert!(hits.iter().all(|h| h.file_path == "tools/build.py"));
}

#[tokio::test]
async fn reindex_picks_up_removed_files() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("project");
    project(&root);
    let scribe = Scribe::open(load_config(dir.path())).await.unwrap();
    let cancel = CancellationToken::new();
    scribe.index_directory(&root, &cancel).await.unwrap();

    let ctx = RetrievalContext::new("dashboards").with_query_type(QueryType::Keyword);
    assert_eq!(scribe.retrieve(&ctx).await.unwrap()[0].file_path, "README.md");

    std::fs::remove_file(root.join("README.md")).unwrap();
    let report = scribe.index_directory(&root, &cancel).await.unwrap();
    assert_eq!(report.files_removed, 1);
    assert_eq!(report.files_skipped, 2);
    assert_eq!(report.files_indexed, 0);

    assert!(scribe.retrieve(&ctx).await.unwrap().is_empty());
}

#[tokio::test]
async fn index_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("project");
    project(&root);
    let config = load_config(dir.path());

    let written = {
        let scribe = Scribe::open(config.clone()).await.unwrap();
        scribe
            .index_directory(&root, &CancellationToken::new())
            .await
            .unwrap()
            .chunks_written
    };

    let scribe = Scribe::open(config).await.unwrap();
    let count = scribe.store().count().await.unwrap();
    assert_eq!(count, u64::try_from(written).unwrap());

    let ctx = RetrievalContext::new("installer").with_query_type(QueryType::Keyword);
    let hits = scribe.retrieve(&ctx).await.unwrap();
    assert_eq!(hits[0].file_path, "README.md");
}

#[tokio::test]
async fn cancelled_indexing_stops() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("project");
    project(&root);
    let scribe = Scribe::open(load_config(dir.path())).await.unwrap();

    let cancel = CancellationToken::new();
    cancel.cancel();
    assert!(scribe.index_directory(&root, &cancel).await.is_err());
}
