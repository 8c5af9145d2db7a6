//! SQLite-backed [`VectorIndex`] and [`FileRecordStore`].
//!
//! Chunks and their embeddings live in the `chunks` table (embedding as a
//! little-endian f32 BLOB), file metadata in `source_files`. Multi-statement
//! writes run inside one transaction. Nearest-neighbor search loads the
//! project's vectors and ranks them by cosine distance in Rust.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};

use crate::config::DbConfig;
use crate::db;
use crate::embedding::{blob_to_vec, cosine_distance, vec_to_blob};
use crate::error::{IndexError, Result};
use crate::migrate;
use crate::models::{Chunk, EmbeddedChunk, ScoredChunk, SourceFileRecord};

use super::{rank_hits, FileRecordStore, VectorIndex};

/// SQLite implementation of both storage traits over one [`SqlitePool`].
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to the configured database and apply migrations.
    pub async fn open(config: &DbConfig) -> Result<Self> {
        let pool = db::connect(config).await?;
        migrate::run_migrations(&pool).await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn ts_to_datetime(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap_or_default()
}

fn row_to_chunk(project_id: &str, row: &SqliteRow) -> Chunk {
    Chunk {
        project_id: project_id.to_string(),
        file_path: row.get("file_path"),
        start_line: row.get::<i64, _>("start_line") as usize,
        end_line: row.get::<i64, _>("end_line") as usize,
        content: row.get("content"),
        file_checksum: row.get("file_checksum"),
    }
}

fn row_to_record(row: &SqliteRow) -> SourceFileRecord {
    SourceFileRecord {
        project_id: row.get("project_id"),
        relative_path: row.get("relative_path"),
        checksum: row.get("checksum"),
        size_bytes: row.get::<i64, _>("size_bytes") as u64,
        last_modified: ts_to_datetime(row.get("last_modified")),
        created_at: ts_to_datetime(row.get("created_at")),
        updated_at: ts_to_datetime(row.get("updated_at")),
    }
}

async fn insert_chunks(
    conn: &mut SqliteConnection,
    project_id: &str,
    chunks: &[EmbeddedChunk],
) -> Result<()> {
    let now = Utc::now().timestamp_millis();
    for embedded in chunks {
        let chunk = &embedded.chunk;
        sqlx::query(
            r#"
            INSERT INTO chunks (id, project_id, file_path, start_line, end_line,
                                content, file_checksum, embedding, dims, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(uuid::Uuid::new_v4().to_string())
        .bind(project_id)
        .bind(&chunk.file_path)
        .bind(chunk.start_line as i64)
        .bind(chunk.end_line as i64)
        .bind(&chunk.content)
        .bind(&chunk.file_checksum)
        .bind(vec_to_blob(&embedded.embedding))
        .bind(embedded.embedding.len() as i64)
        .bind(now)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

#[async_trait]
impl VectorIndex for SqliteStore {
    async fn upsert_chunks(&self, project_id: &str, chunks: &[EmbeddedChunk]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        insert_chunks(&mut tx, project_id, chunks).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn delete_chunks(&self, project_id: &str, file_path: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM chunks WHERE project_id = ? AND file_path = ?")
            .bind(project_id)
            .bind(file_path)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn delete_project(&self, project_id: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM chunks WHERE project_id = ?")
            .bind(project_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn replace_chunks(
        &self,
        project_id: &str,
        stale_paths: &[String],
        chunks: &[EmbeddedChunk],
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for path in stale_paths {
            sqlx::query("DELETE FROM chunks WHERE project_id = ? AND file_path = ?")
                .bind(project_id)
                .bind(path)
                .execute(&mut *tx)
                .await?;
        }
        insert_chunks(&mut tx, project_id, chunks).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn replace_project(&self, project_id: &str, chunks: &[EmbeddedChunk]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM chunks WHERE project_id = ?")
            .bind(project_id)
            .execute(&mut *tx)
            .await?;
        insert_chunks(&mut tx, project_id, chunks).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn search(
        &self,
        project_id: &str,
        query: &[f32],
        max_distance: f32,
        limit: usize,
    ) -> Result<Vec<ScoredChunk>> {
        let rows = sqlx::query(
            r#"
            SELECT file_path, start_line, end_line, content, file_checksum, embedding
            FROM chunks
            WHERE project_id = ?
            "#,
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| IndexError::Query(e.to_string()))?;

        let mut hits: Vec<ScoredChunk> = rows
            .iter()
            .filter_map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let distance = cosine_distance(query, &blob_to_vec(&blob))?;
                (distance <= max_distance).then(|| ScoredChunk {
                    chunk: row_to_chunk(project_id, row),
                    distance,
                })
            })
            .collect();

        rank_hits(&mut hits, limit);
        Ok(hits)
    }

    async fn chunks_for_file(&self, project_id: &str, file_path: &str) -> Result<Vec<Chunk>> {
        let rows = sqlx::query(
            r#"
            SELECT file_path, start_line, end_line, content, file_checksum
            FROM chunks
            WHERE project_id = ? AND file_path = ?
            ORDER BY start_line ASC
            "#,
        )
        .bind(project_id)
        .bind(file_path)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(|row| row_to_chunk(project_id, row)).collect())
    }

    async fn count_chunks(&self, project_id: &str) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks WHERE project_id = ?")
            .bind(project_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }
}

#[async_trait]
impl FileRecordStore for SqliteStore {
    async fn get_record(
        &self,
        project_id: &str,
        relative_path: &str,
    ) -> Result<Option<SourceFileRecord>> {
        let row = sqlx::query(
            r#"
            SELECT project_id, relative_path, checksum, size_bytes,
                   last_modified, created_at, updated_at
            FROM source_files
            WHERE project_id = ? AND relative_path = ?
            "#,
        )
        .bind(project_id)
        .bind(relative_path)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(row_to_record))
    }

    async fn upsert_record(&self, record: &SourceFileRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO source_files (project_id, relative_path, checksum, size_bytes,
                                      last_modified, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(project_id, relative_path) DO UPDATE SET
                checksum = excluded.checksum,
                size_bytes = excluded.size_bytes,
                last_modified = excluded.last_modified,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&record.project_id)
        .bind(&record.relative_path)
        .bind(&record.checksum)
        .bind(record.size_bytes as i64)
        .bind(record.last_modified.timestamp_millis())
        .bind(record.created_at.timestamp_millis())
        .bind(record.updated_at.timestamp_millis())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete_record(&self, project_id: &str, relative_path: &str) -> Result<()> {
        sqlx::query("DELETE FROM source_files WHERE project_id = ? AND relative_path = ?")
            .bind(project_id)
            .bind(relative_path)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_project_records(&self, project_id: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM source_files WHERE project_id = ?")
            .bind(project_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn list_records(&self, project_id: &str) -> Result<Vec<SourceFileRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT project_id, relative_path, checksum, size_bytes,
                   last_modified, created_at, updated_at
            FROM source_files
            WHERE project_id = ?
            ORDER BY relative_path ASC
            "#,
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(row_to_record).collect())
    }
}
