//! # codevec
//!
//! Incremental, checksum-aware chunking and embedding index for source trees.
//!
//! codevec walks a source tree, splits each text file into overlapping
//! line-addressed chunks, embeds every chunk, and stores the vectors scoped
//! to a project id. Later runs hash each file and only re-embed what is new
//! or changed. Queries return the nearest chunks of one project.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐   ┌────────────┐   ┌─────────┐   ┌───────────┐   ┌──────────┐
//! │ Discovery │──▶│ Classifier │──▶│ Chunker │──▶│ Embedding │──▶│  Store   │
//! │ walk+skip │   │  SHA-256   │   │ windows │   │ pool (N)  │   │ SQLite / │
//! └───────────┘   └─────┬──────┘   └─────────┘   └───────────┘   │ in-mem   │
//!                       │ metadata                               └────┬─────┘
//!                       └────────────────────◀────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::path::Path;
//! use codevec::{config::Config, Indexer};
//!
//! # async fn run() -> codevec::error::Result<()> {
//! let config = Config::default();
//! let indexer = Indexer::from_config(&config).await?;
//! let result = indexer.reindex_incremental(Path::new("./my-repo"), "my-repo").await?;
//! println!("{} new, {} modified", result.new_files.len(), result.modified_files.len());
//! let hits = indexer.query_text_default("my-repo", "where is the config parsed?").await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`error`] | Error kinds |
//! | [`discovery`] | Source file walking and filtering |
//! | [`classify`] | Checksums and change classification |
//! | [`chunk`] | Overlapping line-window chunking |
//! | [`embedding`] | Embedding providers and batch generator |
//! | [`store`] | Vector index and file metadata storage |
//! | [`indexer`] | Full / incremental reindex and retrieval |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod chunk;
pub mod classify;
pub mod config;
pub mod db;
pub mod discovery;
pub mod embedding;
pub mod error;
pub mod indexer;
pub mod migrate;
pub mod models;
pub mod store;

pub use error::{IndexError, Result};
pub use indexer::{IndexMode, Indexer};
pub use models::{Chunk, ProcessingResult};
