//! Storage abstraction for chunk vectors and file metadata.
//!
//! Two traits split the persisted state the way it is laid out on disk:
//!
//! | Trait | Rows | Used by |
//! |-------|------|---------|
//! | [`VectorIndex`] | one per embedded chunk | indexer, retrieval |
//! | [`FileRecordStore`] | one per `(project_id, relative_path)` | classifier |
//!
//! Both backends ([`SqliteStore`](sqlite::SqliteStore) and
//! [`InMemoryStore`](memory::InMemoryStore)) implement both traits.
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{Chunk, EmbeddedChunk, ScoredChunk, SourceFileRecord};

/// Project-scoped vector storage with nearest-neighbor queries.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`upsert_chunks`](VectorIndex::upsert_chunks) | Insert embedded chunks (no dedup) |
/// | [`delete_chunks`](VectorIndex::delete_chunks) | Remove one file's chunks |
/// | [`delete_project`](VectorIndex::delete_project) | Remove all chunks of a project |
/// | [`replace_chunks`](VectorIndex::replace_chunks) | Atomic delete-then-insert |
/// | [`search`](VectorIndex::search) | Fallible scored nearest-neighbor search |
/// | [`query_nearest`](VectorIndex::query_nearest) | Search that degrades to empty on error |
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Insert chunks. Callers delete stale rows first; nothing is deduplicated.
    async fn upsert_chunks(&self, project_id: &str, chunks: &[EmbeddedChunk]) -> Result<()>;

    /// Remove every chunk of `file_path` in the project. Returns the number removed.
    async fn delete_chunks(&self, project_id: &str, file_path: &str) -> Result<u64>;

    /// Remove every chunk of the project. Returns the number removed.
    async fn delete_project(&self, project_id: &str) -> Result<u64>;

    /// Delete the chunks of `stale_paths`, then insert `chunks`, as one unit.
    ///
    /// Readers observe either the old chunk set or the new one, never a mix.
    async fn replace_chunks(
        &self,
        project_id: &str,
        stale_paths: &[String],
        chunks: &[EmbeddedChunk],
    ) -> Result<()>;

    /// Like [`replace_chunks`](VectorIndex::replace_chunks) but drops every
    /// chunk of the project first.
    async fn replace_project(&self, project_id: &str, chunks: &[EmbeddedChunk]) -> Result<()>;

    /// Chunks within `max_distance` (cosine) of `query`, nearest first.
    async fn search(
        &self,
        project_id: &str,
        query: &[f32],
        max_distance: f32,
        limit: usize,
    ) -> Result<Vec<ScoredChunk>>;

    /// Stored chunks of one file, ordered by start line.
    async fn chunks_for_file(&self, project_id: &str, file_path: &str) -> Result<Vec<Chunk>>;

    async fn count_chunks(&self, project_id: &str) -> Result<u64>;

    /// Nearest chunks for a project; failures are logged and yield no results.
    async fn query_nearest(
        &self,
        project_id: &str,
        query: &[f32],
        similarity_threshold: f32,
        limit: usize,
    ) -> Vec<Chunk> {
        match self
            .search(project_id, query, similarity_threshold, limit)
            .await
        {
            Ok(hits) => {
                tracing::debug!(project_id, hits = hits.len(), "nearest-neighbor query");
                hits.into_iter().map(ScoredChunk::into_chunk).collect()
            }
            Err(e) => {
                tracing::error!(project_id, error = %e, "nearest-neighbor query failed");
                Vec::new()
            }
        }
    }
}

/// Per-file metadata used for change detection.
#[async_trait]
pub trait FileRecordStore: Send + Sync {
    async fn get_record(
        &self,
        project_id: &str,
        relative_path: &str,
    ) -> Result<Option<SourceFileRecord>>;

    /// Insert the record or update checksum, size and mtime in place.
    ///
    /// The original `created_at` is kept on update.
    async fn upsert_record(&self, record: &SourceFileRecord) -> Result<()>;

    async fn delete_record(&self, project_id: &str, relative_path: &str) -> Result<()>;

    async fn delete_project_records(&self, project_id: &str) -> Result<u64>;

    /// All records of a project, ordered by path.
    async fn list_records(&self, project_id: &str) -> Result<Vec<SourceFileRecord>>;
}

/// Sort hits nearest first, breaking ties by path then start line, and cap at `limit`.
pub(crate) fn rank_hits(hits: &mut Vec<ScoredChunk>, limit: usize) {
    hits.sort_by(|a, b| {
        a.distance
            .partial_cmp(&b.distance)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.chunk.file_path.cmp(&b.chunk.file_path))
            .then_with(|| a.chunk.start_line.cmp(&b.chunk.start_line))
    });
    hits.truncate(limit);
}
