//! TOML configuration.
//!
//! Every section and key has a default, so an empty file (or
//! [`Config::default`]) is a valid configuration with embeddings disabled.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub db: DbConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./data/codevec.sqlite")
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size_lines")]
    pub chunk_size_lines: usize,
    #[serde(default = "default_overlap_percent")]
    pub overlap_percent: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size_lines: default_chunk_size_lines(),
            overlap_percent: default_overlap_percent(),
        }
    }
}

fn default_chunk_size_lines() -> usize {
    50
}
fn default_overlap_percent() -> usize {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct DiscoveryConfig {
    /// Replaces the built-in extension allow-list when set.
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
    /// Replaces the built-in ignore list when set.
    #[serde(default = "default_ignore_patterns")]
    pub ignore_patterns: Vec<String>,
    /// Appended to `ignore_patterns`.
    #[serde(default)]
    pub extra_ignore_patterns: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            extensions: default_extensions(),
            ignore_patterns: default_ignore_patterns(),
            extra_ignore_patterns: Vec::new(),
            follow_symlinks: false,
        }
    }
}

impl DiscoveryConfig {
    /// The effective ignore list: base patterns followed by the extras.
    pub fn all_ignore_patterns(&self) -> Vec<String> {
        let mut patterns = self.ignore_patterns.clone();
        patterns.extend(self.extra_ignore_patterns.iter().cloned());
        patterns
    }
}

const DEFAULT_EXTENSIONS: &[&str] = &[
    ".java", ".kt", ".js", ".ts", ".py", ".rb", ".go", ".rs", ".c", ".cpp", ".h", ".hpp", ".cs",
    ".php", ".html", ".css", ".md", ".txt", ".json", ".xml", ".yaml", ".yml",
];

const DEFAULT_IGNORE_PATTERNS: &[&str] = &[
    // version control
    ".git", ".svn", ".hg", "CVS",
    // dependencies
    "node_modules", "bower_components", "vendor", "Pods", "packages",
    // build output
    "build", "dist", "target", "out", "bin", "obj", "gen",
    // IDE
    ".idea", ".vscode", ".project", ".classpath", ".settings", ".DS_Store",
    "*.iml", "*.suo", "*.user", "*.tmproj", "*.sublime-project", "*.sublime-workspace",
    // caches, logs, temp files
    "logs", "tmp", "temp", ".cache", ".npm", ".yarn", ".gradle", ".mvn",
    "*.log", "*.swp", "*~",
    // python
    "__pycache__", ".pytest_cache", ".tox", ".venv", "venv", "env", "*.pyc",
    // coverage and tooling
    "coverage", ".nyc_output", ".aider",
    // lockfiles
    "package-lock.json", "pnpm-lock.yaml", "*.lock", "go.sum",
];

fn default_extensions() -> Vec<String> {
    DEFAULT_EXTENSIONS.iter().map(|s| s.to_string()).collect()
}

fn default_ignore_patterns() -> Vec<String> {
    DEFAULT_IGNORE_PATTERNS.iter().map(|s| s.to_string()).collect()
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL for the Ollama provider.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Concurrent embedding calls; `None` means `max(2, cores - 1)`.
    #[serde(default)]
    pub pool_size: Option<usize>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            url: None,
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
            pool_size: None,
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }

    pub fn effective_pool_size(&self) -> usize {
        self.pool_size.unwrap_or_else(default_pool_size)
    }
}

/// `max(2, available_parallelism - 1)`.
pub fn default_pool_size() -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    cores.saturating_sub(1).max(2)
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// Maximum cosine distance for a chunk to be returned.
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,
    #[serde(default = "default_limit")]
    pub default_limit: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: default_similarity_threshold(),
            default_limit: default_limit(),
        }
    }
}

fn default_similarity_threshold() -> f32 {
    0.7
}
fn default_limit() -> usize {
    10
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.chunking.chunk_size_lines < 2 {
            anyhow::bail!("chunking.chunk_size_lines must be >= 2");
        }
        if self.chunking.overlap_percent >= 100 {
            anyhow::bail!("chunking.overlap_percent must be < 100");
        }

        if self.discovery.extensions.is_empty() {
            anyhow::bail!("discovery.extensions must not be empty");
        }

        if !(0.0..=2.0).contains(&self.retrieval.similarity_threshold) {
            anyhow::bail!("retrieval.similarity_threshold must be in [0.0, 2.0]");
        }
        if self.retrieval.default_limit < 1 {
            anyhow::bail!("retrieval.default_limit must be >= 1");
        }

        if self.embedding.pool_size == Some(0) {
            anyhow::bail!("embedding.pool_size must be >= 1");
        }

        match self.embedding.provider.as_str() {
            "disabled" | "openai" | "ollama" | "local" => {}
            other => anyhow::bail!(
                "Unknown embedding provider: '{}'. Must be disabled, openai, ollama, or local.",
                other
            ),
        }

        // The local provider can infer dims from its model name.
        if self.embedding.is_enabled() && self.embedding.provider != "local" {
            if self.embedding.dims.is_none() || self.embedding.dims == Some(0) {
                anyhow::bail!(
                    "embedding.dims must be > 0 when provider is '{}'",
                    self.embedding.provider
                );
            }
            if self.embedding.model.is_none() {
                anyhow::bail!(
                    "embedding.model must be specified when provider is '{}'",
                    self.embedding.provider
                );
            }
        }

        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    config.validate()?;

    Ok(config)
}
