//! In-memory [`VectorIndex`] and [`FileRecordStore`] for tests and embedding.
//!
//! All state lives in one `RwLock`, so every operation (including the
//! replace operations) is applied atomically with respect to readers.
//! Vector search is brute-force cosine distance over the project's chunks.

use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use crate::embedding::cosine_distance;
use crate::error::{IndexError, Result};
use crate::models::{Chunk, EmbeddedChunk, ScoredChunk, SourceFileRecord};

use super::{rank_hits, FileRecordStore, VectorIndex};

#[derive(Default)]
struct State {
    /// Chunks keyed by project id, in insertion order.
    chunks: HashMap<String, Vec<EmbeddedChunk>>,
    /// Records keyed by project id, then relative path.
    records: HashMap<String, BTreeMap<String, SourceFileRecord>>,
}

/// In-memory store backing both storage traits.
#[derive(Default)]
pub struct InMemoryStore {
    state: RwLock<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, State>> {
        self.state
            .read()
            .map_err(|_| IndexError::Persistence("in-memory store lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, State>> {
        self.state
            .write()
            .map_err(|_| IndexError::Persistence("in-memory store lock poisoned".to_string()))
    }
}

fn stamped<'a>(
    project_id: &str,
    chunks: &'a [EmbeddedChunk],
) -> impl Iterator<Item = EmbeddedChunk> + 'a {
    let project_id = project_id.to_string();
    chunks.iter().map(move |c| {
        let mut c = c.clone();
        c.chunk.project_id = project_id.clone();
        c
    })
}

#[async_trait]
impl VectorIndex for InMemoryStore {
    async fn upsert_chunks(&self, project_id: &str, chunks: &[EmbeddedChunk]) -> Result<()> {
        let mut state = self.write()?;
        state
            .chunks
            .entry(project_id.to_string())
            .or_default()
            .extend(stamped(project_id, chunks));
        Ok(())
    }

    async fn delete_chunks(&self, project_id: &str, file_path: &str) -> Result<u64> {
        let mut state = self.write()?;
        let Some(stored) = state.chunks.get_mut(project_id) else {
            return Ok(0);
        };
        let before = stored.len();
        stored.retain(|c| c.chunk.file_path != file_path);
        Ok((before - stored.len()) as u64)
    }

    async fn delete_project(&self, project_id: &str) -> Result<u64> {
        let mut state = self.write()?;
        Ok(state
            .chunks
            .remove(project_id)
            .map(|v| v.len() as u64)
            .unwrap_or(0))
    }

    async fn replace_chunks(
        &self,
        project_id: &str,
        stale_paths: &[String],
        chunks: &[EmbeddedChunk],
    ) -> Result<()> {
        let mut state = self.write()?;
        let stored = state.chunks.entry(project_id.to_string()).or_default();
        stored.retain(|c| !stale_paths.contains(&c.chunk.file_path));
        stored.extend(stamped(project_id, chunks));
        Ok(())
    }

    async fn replace_project(&self, project_id: &str, chunks: &[EmbeddedChunk]) -> Result<()> {
        let mut state = self.write()?;
        state
            .chunks
            .insert(project_id.to_string(), stamped(project_id, chunks).collect());
        Ok(())
    }

    async fn search(
        &self,
        project_id: &str,
        query: &[f32],
        max_distance: f32,
        limit: usize,
    ) -> Result<Vec<ScoredChunk>> {
        let state = self.read()?;
        let mut hits: Vec<ScoredChunk> = state
            .chunks
            .get(project_id)
            .into_iter()
            .flatten()
            .filter_map(|c| {
                let distance = cosine_distance(query, &c.embedding)?;
                (distance <= max_distance).then(|| ScoredChunk {
                    chunk: c.chunk.clone(),
                    distance,
                })
            })
            .collect();

        rank_hits(&mut hits, limit);
        Ok(hits)
    }

    async fn chunks_for_file(&self, project_id: &str, file_path: &str) -> Result<Vec<Chunk>> {
        let state = self.read()?;
        let mut chunks: Vec<Chunk> = state
            .chunks
            .get(project_id)
            .into_iter()
            .flatten()
            .filter(|c| c.chunk.file_path == file_path)
            .map(|c| c.chunk.clone())
            .collect();
        chunks.sort_by_key(|c| c.start_line);
        Ok(chunks)
    }

    async fn count_chunks(&self, project_id: &str) -> Result<u64> {
        let state = self.read()?;
        Ok(state.chunks.get(project_id).map(|v| v.len() as u64).unwrap_or(0))
    }
}

#[async_trait]
impl FileRecordStore for InMemoryStore {
    async fn get_record(
        &self,
        project_id: &str,
        relative_path: &str,
    ) -> Result<Option<SourceFileRecord>> {
        let state = self.read()?;
        Ok(state
            .records
            .get(project_id)
            .and_then(|files| files.get(relative_path))
            .cloned())
    }

    async fn upsert_record(&self, record: &SourceFileRecord) -> Result<()> {
        let mut state = self.write()?;
        let files = state.records.entry(record.project_id.clone()).or_default();
        match files.get_mut(&record.relative_path) {
            Some(existing) => {
                existing.checksum = record.checksum.clone();
                existing.size_bytes = record.size_bytes;
                existing.last_modified = record.last_modified;
                existing.updated_at = record.updated_at;
            }
            None => {
                files.insert(record.relative_path.clone(), record.clone());
            }
        }
        Ok(())
    }

    async fn delete_record(&self, project_id: &str, relative_path: &str) -> Result<()> {
        let mut state = self.write()?;
        if let Some(files) = state.records.get_mut(project_id) {
            files.remove(relative_path);
        }
        Ok(())
    }

    async fn delete_project_records(&self, project_id: &str) -> Result<u64> {
        let mut state = self.write()?;
        Ok(state
            .records
            .remove(project_id)
            .map(|files| files.len() as u64)
            .unwrap_or(0))
    }

    async fn list_records(&self, project_id: &str) -> Result<Vec<SourceFileRecord>> {
        let state = self.read()?;
        Ok(state
            .records
            .get(project_id)
            .map(|files| files.values().cloned().collect())
            .unwrap_or_default())
    }
}
