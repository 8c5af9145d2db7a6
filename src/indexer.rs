//! Indexing orchestration and project-scoped retrieval.
//!
//! Each file moves through
//! `Discovered → Classified → (skip | Chunked → Embedded → Persisted → MetadataUpdated)`.
//!
//! # Modes
//!
//! - **Full** ([`Indexer::reindex_full`]): ignores stored state, chunks and
//!   embeds every discovered file, and atomically replaces the project's
//!   chunk set.
//! - **Incremental** ([`Indexer::reindex_incremental`]): classifies every
//!   file first, then embeds only NEW and MODIFIED files in one batch.
//!   Chunks of modified and removed files are deleted in the same
//!   transaction that inserts the new ones.
//!
//! In both modes metadata is written only after the chunk write commits, so
//! a failed run leaves the index and the metadata exactly as they were and
//! the next incremental run retries the same files.
//!
//! Unreadable or non-UTF-8 files are logged and skipped. An embedding or
//! persistence failure aborts the run with [`IndexError::Run`].

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use crate::chunk::Chunker;
use crate::classify::{read_snapshot, snapshot_text, Classifier};
use crate::config::{Config, RetrievalConfig};
use crate::discovery::Discovery;
use crate::embedding::EmbeddingGenerator;
use crate::error::{IndexError, Result};
use crate::models::{Chunk, FileSnapshot, FileStatus, ProcessingResult};
use crate::store::sqlite::SqliteStore;
use crate::store::{FileRecordStore, VectorIndex};

/// Which reindex workflow [`Indexer::index`] runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexMode {
    Full,
    Incremental,
}

/// A file that passed classification and was chunked this run.
struct PendingFile {
    snapshot: FileSnapshot,
    status: FileStatus,
    chunks: Vec<Chunk>,
}

/// Drives discovery, classification, chunking, embedding and persistence.
pub struct Indexer {
    discovery: Discovery,
    chunker: Chunker,
    classifier: Classifier,
    generator: EmbeddingGenerator,
    index: Arc<dyn VectorIndex>,
    retrieval: RetrievalConfig,
}

impl Indexer {
    pub fn new(
        config: &Config,
        generator: EmbeddingGenerator,
        index: Arc<dyn VectorIndex>,
        records: Arc<dyn FileRecordStore>,
    ) -> Result<Self> {
        config
            .validate()
            .map_err(|e| IndexError::Config(format!("{:#}", e)))?;

        Ok(Self {
            discovery: Discovery::new(&config.discovery)?,
            chunker: Chunker::from_config(&config.chunking),
            classifier: Classifier::new(records),
            generator,
            index,
            retrieval: config.retrieval.clone(),
        })
    }

    /// Build an indexer over one store that backs both chunks and metadata.
    pub fn with_store<S>(
        config: &Config,
        generator: EmbeddingGenerator,
        store: Arc<S>,
    ) -> Result<Self>
    where
        S: VectorIndex + FileRecordStore + 'static,
    {
        let index: Arc<dyn VectorIndex> = store.clone();
        let records: Arc<dyn FileRecordStore> = store;
        Self::new(config, generator, index, records)
    }

    /// Open the configured SQLite database and embedding provider.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let store = Arc::new(SqliteStore::open(&config.db).await?);
        let generator = EmbeddingGenerator::from_config(&config.embedding)?;
        Self::with_store(config, generator, store)
    }

    pub fn discovery(&self) -> &Discovery {
        &self.discovery
    }

    pub fn chunker(&self) -> &Chunker {
        &self.chunker
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    pub fn generator(&self) -> &EmbeddingGenerator {
        &self.generator
    }

    pub fn vector_index(&self) -> &Arc<dyn VectorIndex> {
        &self.index
    }

    /// Run the reindex workflow selected by `mode`.
    pub async fn index(
        &self,
        root: &Path,
        project_id: &str,
        mode: IndexMode,
    ) -> Result<ProcessingResult> {
        match mode {
            IndexMode::Full => self.reindex_full(root, Some(project_id)).await,
            IndexMode::Incremental => self.reindex_incremental(root, project_id).await,
        }
    }

    /// Chunk and embed every discovered file, replacing the project's index.
    ///
    /// Without a `project_id` a fresh UUID v4 is used; it is returned in
    /// [`ProcessingResult::project_id`]. Every indexed file is reported in
    /// `new_files`.
    pub async fn reindex_full(
        &self,
        root: &Path,
        project_id: Option<&str>,
    ) -> Result<ProcessingResult> {
        let project_id = project_id
            .map(str::to_string)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        self.run_full(root, &project_id)
            .await
            .map_err(|e| self.fail(root, &project_id, e))
    }

    /// Re-embed only files that are new or changed since the last run.
    pub async fn reindex_incremental(
        &self,
        root: &Path,
        project_id: &str,
    ) -> Result<ProcessingResult> {
        self.run_incremental(root, project_id)
            .await
            .map_err(|e| self.fail(root, project_id, e))
    }

    fn fail(&self, root: &Path, project_id: &str, err: IndexError) -> IndexError {
        tracing::error!(
            root = %root.display(),
            project_id,
            error = %err,
            "indexing run failed"
        );
        IndexError::run(root, project_id, err)
    }

    async fn run_full(&self, root: &Path, project_id: &str) -> Result<ProcessingResult> {
        ensure_root(root)?;
        let started = Instant::now();
        tracing::info!(root = %root.display(), project_id, "Starting full indexing");

        let mut pending = Vec::new();
        for file in self.discovery.discover(root) {
            let Some(snapshot) = read_or_skip(&file) else {
                continue;
            };
            if let Some(chunks) = self.chunk_or_skip(project_id, &snapshot) {
                pending.push(PendingFile {
                    snapshot,
                    status: FileStatus::New,
                    chunks,
                });
            }
        }

        let chunks: Vec<Chunk> = pending.iter().flat_map(|f| f.chunks.clone()).collect();
        let embedded = self.generator.embed_batch(chunks).await?;
        self.index.replace_project(project_id, &embedded).await?;
        tracing::info!(project_id, chunks = embedded.len(), "Persisted project chunks");

        self.classifier.delete_project_metadata(project_id).await?;
        for file in &pending {
            self.classifier.save_metadata(project_id, &file.snapshot).await?;
        }

        let result = ProcessingResult {
            project_id: project_id.to_string(),
            new_chunks: embedded.into_iter().map(|e| e.chunk).collect(),
            new_files: pending
                .into_iter()
                .map(|f| f.snapshot.relative_path)
                .collect(),
            ..Default::default()
        };

        tracing::info!(
            project_id,
            files = result.new_files.len(),
            chunks = result.new_chunks.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Full indexing complete"
        );
        Ok(result)
    }

    async fn run_incremental(&self, root: &Path, project_id: &str) -> Result<ProcessingResult> {
        ensure_root(root)?;
        let started = Instant::now();
        tracing::info!(root = %root.display(), project_id, "Starting incremental indexing");

        let known = self.classifier.known_paths(project_id).await?;
        let mut seen = HashSet::new();
        let mut unreadable = Vec::new();
        let mut pending = Vec::new();
        let mut result = ProcessingResult {
            project_id: project_id.to_string(),
            ..Default::default()
        };

        for item in self.discovery.walk(root) {
            let file = match item {
                Ok(file) => file,
                Err(e) => {
                    tracing::warn!("Skipping unreadable subtree: {}", e);
                    unreadable.push(failed_prefix(root, &e));
                    continue;
                }
            };
            // Discovered files are never reported as removed, even if unreadable.
            seen.insert(file.relative_path.clone());

            let Some(snapshot) = read_or_skip(&file) else {
                continue;
            };
            let status = self.classifier.status_of(project_id, &snapshot).await?;
            if status == FileStatus::Unchanged {
                result.unchanged_files.push(snapshot.relative_path);
                continue;
            }
            if let Some(chunks) = self.chunk_or_skip(project_id, &snapshot) {
                pending.push(PendingFile {
                    snapshot,
                    status,
                    chunks,
                });
            }
        }

        result.removed_files = known
            .into_iter()
            .filter(|p| !seen.contains(p) && !is_under_any(p, &unreadable))
            .collect();

        if pending.is_empty() && result.removed_files.is_empty() {
            tracing::info!(
                project_id,
                unchanged = result.unchanged_files.len(),
                "No changes detected"
            );
            return Ok(result);
        }

        let chunks: Vec<Chunk> = pending.iter().flat_map(|f| f.chunks.clone()).collect();
        let embedded = self.generator.embed_batch(chunks).await?;

        // NEW paths are included so leftovers of an interrupted run never duplicate.
        let stale_paths: Vec<String> = pending
            .iter()
            .map(|f| f.snapshot.relative_path.clone())
            .chain(result.removed_files.iter().cloned())
            .collect();
        self.index
            .replace_chunks(project_id, &stale_paths, &embedded)
            .await?;
        tracing::info!(
            project_id,
            chunks = embedded.len(),
            stale_files = stale_paths.len(),
            "Persisted chunks"
        );

        for file in &pending {
            self.classifier.save_metadata(project_id, &file.snapshot).await?;
        }
        for path in &result.removed_files {
            tracing::info!(project_id, file = %path, "Removed file dropped from index");
            self.classifier.delete_metadata(project_id, path).await?;
        }

        result.new_chunks = embedded.into_iter().map(|e| e.chunk).collect();
        for file in pending {
            match file.status {
                FileStatus::Modified => result.modified_files.push(file.snapshot.relative_path),
                _ => result.new_files.push(file.snapshot.relative_path),
            }
        }

        tracing::info!(
            project_id,
            new = result.new_files.len(),
            modified = result.modified_files.len(),
            unchanged = result.unchanged_files.len(),
            removed = result.removed_files.len(),
            chunks = result.new_chunks.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Incremental indexing complete"
        );
        Ok(result)
    }

    fn chunk_or_skip(&self, project_id: &str, snapshot: &FileSnapshot) -> Option<Vec<Chunk>> {
        match snapshot_text(snapshot) {
            Ok(text) => Some(self.chunker.chunk_file(
                project_id,
                &snapshot.relative_path,
                text,
                &snapshot.checksum,
            )),
            Err(e) => {
                tracing::warn!("Skipping file: {}", e);
                None
            }
        }
    }

    /// Embed `text` and return the nearest chunks in the project.
    ///
    /// Embedding failures are errors; store failures yield no results.
    pub async fn query_text(
        &self,
        project_id: &str,
        text: &str,
        limit: usize,
    ) -> Result<Vec<Chunk>> {
        let vector = self.generator.embed(text).await?;
        Ok(self.query_vector(project_id, &vector, limit).await)
    }

    /// [`query_text`](Self::query_text) with `retrieval.default_limit`.
    pub async fn query_text_default(&self, project_id: &str, text: &str) -> Result<Vec<Chunk>> {
        self.query_text(project_id, text, self.retrieval.default_limit)
            .await
    }

    /// Nearest chunks within `retrieval.similarity_threshold`; never fails.
    pub async fn query_vector(&self, project_id: &str, vector: &[f32], limit: usize) -> Vec<Chunk> {
        self.index
            .query_nearest(
                project_id,
                vector,
                self.retrieval.similarity_threshold,
                limit,
            )
            .await
    }

    /// Remove every chunk and file record of a project.
    pub async fn delete_project(&self, project_id: &str) -> Result<u64> {
        let chunks = self.index.delete_project(project_id).await?;
        let files = self.classifier.delete_project_metadata(project_id).await?;
        tracing::info!(project_id, chunks, files, "Project deleted");
        Ok(chunks)
    }
}

fn ensure_root(root: &Path) -> Result<()> {
    if root.is_dir() {
        Ok(())
    } else {
        Err(IndexError::Discovery {
            path: root.to_path_buf(),
            message: "root is not a readable directory".to_string(),
        })
    }
}

/// Root-relative prefix of the subtree a walk error covers; empty means all.
fn failed_prefix(root: &Path, err: &IndexError) -> String {
    match err {
        IndexError::Discovery { path, .. } => path
            .strip_prefix(root)
            .map(crate::discovery::to_slash)
            .unwrap_or_default(),
        _ => String::new(),
    }
}

fn is_under_any(path: &str, prefixes: &[String]) -> bool {
    prefixes.iter().any(|prefix| {
        prefix.is_empty()
            || path == prefix
            || path
                .strip_prefix(prefix.as_str())
                .is_some_and(|rest| rest.starts_with('/'))
    })
}

fn read_or_skip(file: &crate::discovery::DiscoveredFile) -> Option<FileSnapshot> {
    match read_snapshot(file) {
        Ok(snapshot) => Some(snapshot),
        Err(e) => {
            tracing::warn!("Skipping file: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::Embedder;
    use crate::error::ErrorKind;
    use crate::store::memory::InMemoryStore;
    use async_trait::async_trait;
    use std::fs;
    use crate::classify::checksum;
    use crate::models::{EmbeddedChunk, ScoredChunk};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// Deterministic letter-frequency embedder that counts its calls.
    #[derive(Default)]
    struct LetterEmbedder {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl Embedder for LetterEmbedder {
        fn model_name(&self) -> &str {
            "letters"
        }
        fn dims(&self) -> usize {
            26
        }
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(IndexError::Embedding("model offline".to_string()));
            }
            let mut v = vec![0.0f32; 26];
            for b in text.bytes().filter(u8::is_ascii_alphabetic) {
                v[(b.to_ascii_lowercase() - b'a') as usize] += 1.0;
            }
            v[0] += 0.01;
            Ok(v)
        }
    }

    /// Delegates to an in-memory store; chunk writes fail while `fail` is set.
    struct FlakyIndex {
        inner: Arc<InMemoryStore>,
        fail: AtomicBool,
    }

    impl FlakyIndex {
        fn check(&self) -> Result<()> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(IndexError::Persistence("disk I/O error".to_string()));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl VectorIndex for FlakyIndex {
        async fn upsert_chunks(&self, project_id: &str, chunks: &[EmbeddedChunk]) -> Result<()> {
            self.check()?;
            self.inner.upsert_chunks(project_id, chunks).await
        }

        async fn delete_chunks(&self, project_id: &str, file_path: &str) -> Result<u64> {
            self.check()?;
            self.inner.delete_chunks(project_id, file_path).await
        }

        async fn delete_project(&self, project_id: &str) -> Result<u64> {
            self.check()?;
            self.inner.delete_project(project_id).await
        }

        async fn replace_chunks(
            &self,
            project_id: &str,
            stale_paths: &[String],
            chunks: &[EmbeddedChunk],
        ) -> Result<()> {
            self.check()?;
            self.inner.replace_chunks(project_id, stale_paths, chunks).await
        }

        async fn replace_project(&self, project_id: &str, chunks: &[EmbeddedChunk]) -> Result<()> {
            self.check()?;
            self.inner.replace_project(project_id, chunks).await
        }

        async fn search(
            &self,
            project_id: &str,
            query: &[f32],
            max_distance: f32,
            limit: usize,
        ) -> Result<Vec<ScoredChunk>> {
            self.inner.search(project_id, query, max_distance, limit).await
        }

        async fn chunks_for_file(&self, project_id: &str, file_path: &str) -> Result<Vec<Chunk>> {
            self.inner.chunks_for_file(project_id, file_path).await
        }

        async fn count_chunks(&self, project_id: &str) -> Result<u64> {
            self.inner.count_chunks(project_id).await
        }
    }

    fn indexer(store: Arc<InMemoryStore>, embedder: Arc<LetterEmbedder>) -> Indexer {
        let generator = EmbeddingGenerator::new(embedder, 2);
        Indexer::with_store(&Config::default(), generator, store).unwrap()
    }

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[tokio::test]
    async fn test_full_reindex_generates_project_id() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "src/a.rs", "fn alpha() {}\n");
        write(tmp.path(), "README.md", "# readme\n");

        let store = Arc::new(InMemoryStore::new());
        let indexer = indexer(store.clone(), Arc::new(LetterEmbedder::default()));
        let result = indexer.reindex_full(tmp.path(), None).await.unwrap();

        assert!(uuid::Uuid::parse_str(&result.project_id).is_ok());
        assert_eq!(result.new_files, vec!["README.md", "src/a.rs"]);
        assert_eq!(result.new_chunks.len(), 2);
        assert_eq!(store.count_chunks(&result.project_id).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_incremental_after_full_is_unchanged() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "a.rs", "fn a() {}\n");

        let store = Arc::new(InMemoryStore::new());
        let embedder = Arc::new(LetterEmbedder::default());
        let indexer = indexer(store, embedder.clone());

        indexer.index(tmp.path(), "p", IndexMode::Full).await.unwrap();
        let calls = embedder.calls.load(Ordering::SeqCst);

        let result = indexer.index(tmp.path(), "p", IndexMode::Incremental).await.unwrap();
        assert!(!result.has_changes());
        assert_eq!(result.unchanged_files, vec!["a.rs"]);
        assert_eq!(embedder.calls.load(Ordering::SeqCst), calls);
    }

    #[tokio::test]
    async fn test_modified_file_replaces_only_its_chunks() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "a.rs", "fn a() {}\n");
        write(tmp.path(), "b.rs", "fn b() {}\n");

        let store = Arc::new(InMemoryStore::new());
        let indexer = indexer(store.clone(), Arc::new(LetterEmbedder::default()));
        indexer.reindex_incremental(tmp.path(), "p").await.unwrap();
        let b_before = store.chunks_for_file("p", "b.rs").await.unwrap();

        write(tmp.path(), "a.rs", "fn a() { changed }\n");
        let result = indexer.reindex_incremental(tmp.path(), "p").await.unwrap();

        assert_eq!(result.modified_files, vec!["a.rs"]);
        assert_eq!(result.unchanged_files, vec!["b.rs"]);
        let a_chunks = store.chunks_for_file("p", "a.rs").await.unwrap();
        assert_eq!(a_chunks.len(), 1);
        assert!(a_chunks[0].content.contains("changed"));
        assert_eq!(store.chunks_for_file("p", "b.rs").await.unwrap(), b_before);
    }

    #[tokio::test]
    async fn test_removed_file_is_dropped() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "keep.rs", "keep\n");
        write(tmp.path(), "gone.rs", "gone\n");

        let store = Arc::new(InMemoryStore::new());
        let indexer = indexer(store.clone(), Arc::new(LetterEmbedder::default()));
        indexer.reindex_incremental(tmp.path(), "p").await.unwrap();

        fs::remove_file(tmp.path().join("gone.rs")).unwrap();
        let result = indexer.reindex_incremental(tmp.path(), "p").await.unwrap();

        assert_eq!(result.removed_files, vec!["gone.rs"]);
        assert!(!result.has_changes());
        assert!(result.has_removals());
        assert!(store.chunks_for_file("p", "gone.rs").await.unwrap().is_empty());
        assert!(store.get_record("p", "gone.rs").await.unwrap().is_none());
        assert_eq!(store.count_chunks("p").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_embedding_failure_persists_nothing() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "a.rs", "fn a() {}\n");

        let store = Arc::new(InMemoryStore::new());
        let failing = Arc::new(LetterEmbedder {
            fail: true,
            ..Default::default()
        });
        let indexer = indexer(store.clone(), failing);

        let err = indexer.reindex_incremental(tmp.path(), "p").await.unwrap_err();
        assert!(matches!(err, IndexError::Run { .. }));
        assert_eq!(err.kind(), ErrorKind::Embedding);
        assert_eq!(store.count_chunks("p").await.unwrap(), 0);
        assert!(store.list_records("p").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_non_utf8_file_is_skipped_not_removed() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "ok.txt", "hello\n");
        fs::write(tmp.path().join("blob.txt"), [0xffu8, 0xfe, 0x00]).unwrap();

        let store = Arc::new(InMemoryStore::new());
        let indexer = indexer(store, Arc::new(LetterEmbedder::default()));
        let result = indexer.reindex_incremental(tmp.path(), "p").await.unwrap();

        assert_eq!(result.new_files, vec!["ok.txt"]);
        assert!(result.removed_files.is_empty());
    }

    #[tokio::test]
    async fn test_missing_root_fails_run() {
        let store = Arc::new(InMemoryStore::new());
        let indexer = indexer(store, Arc::new(LetterEmbedder::default()));
        let err = indexer
            .reindex_incremental(Path::new("/nonexistent/codevec"), "p")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Discovery);
        assert!(err.to_string().contains("/nonexistent/codevec"));
    }

    #[tokio::test]
    async fn test_query_text_and_delete_project() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "a.md", "aaaa aaaa\n");
        write(tmp.path(), "z.md", "zzzz zzzz\n");

        let store = Arc::new(InMemoryStore::new());
        let indexer = indexer(store.clone(), Arc::new(LetterEmbedder::default()));
        indexer.reindex_full(tmp.path(), Some("p")).await.unwrap();

        let hits = indexer.query_text("p", "zzz", 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].file_path, "z.md");
        assert!(indexer.query_text_default("other", "zzz").await.unwrap().is_empty());

        assert_eq!(indexer.delete_project("p").await.unwrap(), 2);
        assert!(indexer.query_text("p", "zzz", 10).await.unwrap().is_empty());
        assert!(store.list_records("p").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_persistence_failure_keeps_old_metadata() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "a.rs", "fn a() {}\n");

        let store = Arc::new(InMemoryStore::new());
        let flaky = Arc::new(FlakyIndex {
            inner: store.clone(),
            fail: AtomicBool::new(false),
        });
        let generator = EmbeddingGenerator::new(Arc::new(LetterEmbedder::default()), 2);
        let indexer = Indexer::new(&Config::default(), generator, flaky.clone(), store.clone())
            .unwrap();
        indexer.reindex_incremental(tmp.path(), "p").await.unwrap();

        write(tmp.path(), "a.rs", "fn a() { changed }\n");
        write(tmp.path(), "b.rs", "fn b() {}\n");
        flaky.fail.store(true, Ordering::SeqCst);

        let err = indexer.reindex_incremental(tmp.path(), "p").await.unwrap_err();
        assert!(matches!(err, IndexError::Run { .. }));
        assert_eq!(err.kind(), ErrorKind::Persistence);
        assert!(store.get_record("p", "b.rs").await.unwrap().is_none());
        assert_eq!(
            store.get_record("p", "a.rs").await.unwrap().unwrap().checksum,
            checksum(b"fn a() {}\n")
        );
        let a_chunks = store.chunks_for_file("p", "a.rs").await.unwrap();
        assert_eq!(a_chunks.len(), 1);
        assert!(!a_chunks[0].content.contains("changed"));

        let err = indexer.reindex_full(tmp.path(), Some("p")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Persistence);
        assert_eq!(store.list_records("p").await.unwrap().len(), 1);

        // The next run retries the same files.
        flaky.fail.store(false, Ordering::SeqCst);
        let result = indexer.reindex_incremental(tmp.path(), "p").await.unwrap();
        assert_eq!(result.new_files, vec!["b.rs"]);
        assert_eq!(result.modified_files, vec!["a.rs"]);
    }

    #[test]
    fn test_is_under_any() {
        let prefixes = vec!["sub".to_string()];
        assert!(is_under_any("sub", &prefixes));
        assert!(is_under_any("sub/a.rs", &prefixes));
        assert!(is_under_any("sub/deep/b.rs", &prefixes));
        assert!(!is_under_any("subway.rs", &prefixes));
        assert!(!is_under_any("other/sub/a.rs", &prefixes));
        assert!(!is_under_any("a.rs", &[]));
        assert!(is_under_any("a.rs", &[String::new()]));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_unreadable_subtree_is_not_removed() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "keep.rs", "fn keep() {}\n");
        write(tmp.path(), "sub/a.rs", "fn a() {}\n");

        let store = Arc::new(InMemoryStore::new());
        let indexer = indexer(store.clone(), Arc::new(LetterEmbedder::default()));
        indexer.reindex_incremental(tmp.path(), "p").await.unwrap();

        let sub = tmp.path().join("sub");
        fs::set_permissions(&sub, fs::Permissions::from_mode(0o000)).unwrap();
        if fs::read_dir(&sub).is_ok() {
            // Permission bits do not apply to this user.
            fs::set_permissions(&sub, fs::Permissions::from_mode(0o755)).unwrap();
            return;
        }
        let result = indexer.reindex_incremental(tmp.path(), "p").await;
        fs::set_permissions(&sub, fs::Permissions::from_mode(0o755)).unwrap();

        let result = result.unwrap();
        assert!(result.removed_files.is_empty());
        assert_eq!(result.unchanged_files, vec!["keep.rs"]);
        assert_eq!(store.chunks_for_file("p", "sub/a.rs").await.unwrap().len(), 1);
        assert!(store.get_record("p", "sub/a.rs").await.unwrap().is_some());
    }
}
