#![allow(dead_code)]

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use codevec::config::{Config, DbConfig};
use codevec::embedding::{Embedder, EmbeddingGenerator};
use codevec::error::{IndexError, Result};
use codevec::store::sqlite::SqliteStore;
use codevec::Indexer;
use tempfile::TempDir;

pub const DIMS: usize = 64;

/// Route library logs to the test output; `RUST_LOG=codevec=debug` for detail.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("codevec=warn")),
        )
        .with_test_writer()
        .try_init();
}

/// Deterministic bag-of-words embedder: each lower-cased word is hashed
/// into one of `DIMS` buckets.
#[derive(Default)]
pub struct BagOfWords {
    pub calls: AtomicUsize,
    pub fail: AtomicBool,
}

impl BagOfWords {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

fn bucket(word: &str) -> usize {
    // FNV-1a
    let mut hash: u64 = 0xcbf29ce484222325;
    for b in word.bytes() {
        hash ^= b as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    (hash % DIMS as u64) as usize
}

#[async_trait]
impl Embedder for BagOfWords {
    fn model_name(&self) -> &str {
        "bag-of-words"
    }

    fn dims(&self) -> usize {
        DIMS
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(IndexError::Embedding("embedding service unavailable".to_string()));
        }

        let mut v = vec![0.0f32; DIMS];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            v[bucket(&word.to_lowercase())] += 1.0;
        }
        if v.iter().all(|x| *x == 0.0) {
            v[0] = 1.0;
        }
        Ok(v)
    }
}

pub struct Harness {
    pub tmp: TempDir,
    pub store: Arc<SqliteStore>,
    pub embedder: Arc<BagOfWords>,
    pub indexer: Indexer,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_config(Config::default()).await
    }

    pub async fn with_config(mut config: Config) -> Self {
        init_tracing();
        let tmp = TempDir::new().unwrap();
        config.db = DbConfig {
            path: tmp.path().join("db").join("codevec.sqlite"),
        };

        let store = Arc::new(SqliteStore::open(&config.db).await.unwrap());
        let embedder = Arc::new(BagOfWords::default());
        let generator = EmbeddingGenerator::new(embedder.clone(), 4);
        let indexer = Indexer::with_store(&config, generator, store.clone()).unwrap();

        fs::create_dir_all(tmp.path().join("repo")).unwrap();
        Self {
            tmp,
            store,
            embedder,
            indexer,
        }
    }

    pub fn root(&self) -> std::path::PathBuf {
        self.tmp.path().join("repo")
    }

    pub fn write(&self, rel: &str, content: &str) {
        write_file(&self.root(), rel, content);
    }

    pub fn remove(&self, rel: &str) {
        fs::remove_file(self.root().join(rel)).unwrap();
    }
}

pub fn write_file(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

pub fn numbered_lines(prefix: &str, n: usize) -> String {
    (1..=n).map(|i| format!("{} line {}\n", prefix, i)).collect()
}
