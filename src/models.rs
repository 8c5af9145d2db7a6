//! Core data models used throughout codevec.
//!
//! These types represent the files, chunks, and query results that flow
//! through the indexing and retrieval pipeline.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Stored metadata for one indexed file, unique per `(project_id, relative_path)`.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceFileRecord {
    pub project_id: String,
    pub relative_path: String,
    pub checksum: String,
    pub size_bytes: u64,
    pub last_modified: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A line-addressed slice of a file; the unit of embedding and retrieval.
///
/// `start_line` and `end_line` are 1-based and inclusive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Chunk {
    pub project_id: String,
    pub file_path: String,
    pub start_line: usize,
    pub end_line: usize,
    pub content: String,
    pub file_checksum: String,
}

/// A [`Chunk`] with its embedding vector.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddedChunk {
    pub chunk: Chunk,
    pub embedding: Vec<f32>,
}

/// A query hit: the chunk plus its cosine distance to the query vector.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub distance: f32,
}

impl ScoredChunk {
    /// Drop the score, keeping only the retrievable chunk.
    pub fn into_chunk(self) -> Chunk {
        self.chunk
    }
}

/// Change classification of a file relative to its stored record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileStatus {
    /// No record exists for the file.
    New,
    /// A record exists and its checksum matches.
    Unchanged,
    /// A record exists but its checksum differs.
    Modified,
}

/// A file read once for a run.
///
/// Classification, chunk checksums, and the metadata record are all derived
/// from the same bytes, so they cannot disagree if the file changes mid-run.
#[derive(Debug, Clone)]
pub struct FileSnapshot {
    pub absolute_path: PathBuf,
    pub relative_path: String,
    pub bytes: Vec<u8>,
    pub checksum: String,
    pub size_bytes: u64,
    pub last_modified: DateTime<Utc>,
}

/// Outcome of one indexing run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProcessingResult {
    /// Project the run indexed into.
    pub project_id: String,
    pub new_chunks: Vec<Chunk>,
    pub new_files: Vec<String>,
    pub modified_files: Vec<String>,
    pub unchanged_files: Vec<String>,
    /// Previously indexed paths that were not found in this run.
    pub removed_files: Vec<String>,
}

impl ProcessingResult {
    pub fn has_changes(&self) -> bool {
        !self.new_files.is_empty() || !self.modified_files.is_empty()
    }

    pub fn has_removals(&self) -> bool {
        !self.removed_files.is_empty()
    }

    pub fn total_processed_files(&self) -> usize {
        self.new_files.len() + self.modified_files.len() + self.unchanged_files.len()
    }
}
