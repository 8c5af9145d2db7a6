//! Error kinds for the indexing and retrieval pipeline.
//!
//! Every component reports failures through [`IndexError`]. The variants
//! form a closed set so callers can match on the kind of failure instead
//! of inspecting messages:
//!
//! | Variant | Raised by | Run policy |
//! |---------|-----------|------------|
//! | [`Discovery`](IndexError::Discovery) | walking / decoding files | file skipped, run continues |
//! | [`Checksum`](IndexError::Checksum) | reading bytes for hashing | file excluded, run continues |
//! | [`Embedding`](IndexError::Embedding) | embedding model calls | batch aborted, run fails |
//! | [`Persistence`](IndexError::Persistence) | store inserts / deletes | run fails |
//! | [`Query`](IndexError::Query) | nearest-neighbor search | degraded to empty results |
//! | [`Config`](IndexError::Config) | invalid settings | construction fails |
//! | [`Run`](IndexError::Run) | orchestrator | aggregate failure of one run |

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, IndexError>;

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Discovery error at {path}: {message}")]
    Discovery { path: PathBuf, message: String },

    #[error("Checksum error for {path}: {source}")]
    Checksum {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Indexing failed for project '{project_id}' at {root}: {source}")]
    Run {
        root: PathBuf,
        project_id: String,
        #[source]
        source: Box<IndexError>,
    },
}

/// Coarse classification of an [`IndexError`], unwrapping [`IndexError::Run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Discovery,
    Checksum,
    Embedding,
    Persistence,
    Query,
    Config,
}

impl IndexError {
    /// Wrap a fatal error with the root and project of the failing run.
    pub fn run(root: impl Into<PathBuf>, project_id: &str, source: IndexError) -> Self {
        IndexError::Run {
            root: root.into(),
            project_id: project_id.to_string(),
            source: Box::new(source),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            IndexError::Discovery { .. } => ErrorKind::Discovery,
            IndexError::Checksum { .. } => ErrorKind::Checksum,
            IndexError::Embedding(_) => ErrorKind::Embedding,
            IndexError::Persistence(_) => ErrorKind::Persistence,
            IndexError::Query(_) => ErrorKind::Query,
            IndexError::Config(_) => ErrorKind::Config,
            IndexError::Run { source, .. } => source.kind(),
        }
    }

    /// Whether this error ends an indexing run rather than a single file.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Embedding | ErrorKind::Persistence | ErrorKind::Config
        )
    }
}

impl From<sqlx::Error> for IndexError {
    fn from(err: sqlx::Error) -> Self {
        IndexError::Persistence(err.to_string())
    }
}
