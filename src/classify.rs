//! Checksum-based change classification and file metadata bookkeeping.
//!
//! A file is hashed once per run (SHA-256 over its raw bytes, lowercase
//! hex) and compared against the stored [`SourceFileRecord`]:
//!
//! | Stored record | Checksum | Status |
//! |---------------|----------|--------|
//! | none | any | [`FileStatus::New`] |
//! | present | equal | [`FileStatus::Unchanged`] |
//! | present | different | [`FileStatus::Modified`] |

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

use crate::discovery::DiscoveredFile;
use crate::error::{IndexError, Result};
use crate::models::{FileSnapshot, FileStatus, SourceFileRecord};
use crate::store::FileRecordStore;

/// SHA-256 of `bytes` as lowercase hex.
pub fn checksum(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Read a discovered file once, capturing its bytes, checksum, size and mtime.
pub fn read_snapshot(file: &DiscoveredFile) -> Result<FileSnapshot> {
    let checksum_err = |source| IndexError::Checksum {
        path: file.absolute_path.clone(),
        source,
    };

    let bytes = std::fs::read(&file.absolute_path).map_err(checksum_err)?;
    let metadata = std::fs::metadata(&file.absolute_path).map_err(checksum_err)?;
    let last_modified = metadata
        .modified()
        .map(DateTime::<Utc>::from)
        .unwrap_or_else(|_| Utc::now());

    Ok(FileSnapshot {
        absolute_path: file.absolute_path.clone(),
        relative_path: file.relative_path.clone(),
        checksum: checksum(&bytes),
        size_bytes: bytes.len() as u64,
        last_modified,
        bytes,
    })
}

/// Decode a snapshot as UTF-8 text. Binary content is a discovery error.
pub fn snapshot_text(snapshot: &FileSnapshot) -> Result<&str> {
    std::str::from_utf8(&snapshot.bytes).map_err(|e| IndexError::Discovery {
        path: snapshot.absolute_path.clone(),
        message: format!("not valid UTF-8 text: {}", e),
    })
}

/// Classifies files against stored metadata and records new metadata.
#[derive(Clone)]
pub struct Classifier {
    records: Arc<dyn FileRecordStore>,
}

impl Classifier {
    pub fn new(records: Arc<dyn FileRecordStore>) -> Self {
        Self { records }
    }

    /// Status of a file given its current bytes.
    pub async fn status(
        &self,
        project_id: &str,
        relative_path: &str,
        bytes: &[u8],
    ) -> Result<FileStatus> {
        self.status_for_checksum(project_id, relative_path, &checksum(bytes))
            .await
    }

    /// Status of an already-read snapshot, reusing its checksum.
    pub async fn status_of(&self, project_id: &str, snapshot: &FileSnapshot) -> Result<FileStatus> {
        self.status_for_checksum(project_id, &snapshot.relative_path, &snapshot.checksum)
            .await
    }

    async fn status_for_checksum(
        &self,
        project_id: &str,
        relative_path: &str,
        current: &str,
    ) -> Result<FileStatus> {
        let status = match self.stored_checksum(project_id, relative_path).await? {
            None => FileStatus::New,
            Some(stored) if stored == current => FileStatus::Unchanged,
            Some(_) => FileStatus::Modified,
        };
        tracing::debug!(project_id, file = relative_path, ?status, "classified");
        Ok(status)
    }

    pub async fn stored_checksum(
        &self,
        project_id: &str,
        relative_path: &str,
    ) -> Result<Option<String>> {
        Ok(self
            .records
            .get_record(project_id, relative_path)
            .await?
            .map(|r| r.checksum))
    }

    /// Record the snapshot's checksum, size and mtime.
    ///
    /// Call only after the file's chunks are persisted.
    pub async fn save_metadata(&self, project_id: &str, snapshot: &FileSnapshot) -> Result<()> {
        let now = Utc::now();
        self.records
            .upsert_record(&SourceFileRecord {
                project_id: project_id.to_string(),
                relative_path: snapshot.relative_path.clone(),
                checksum: snapshot.checksum.clone(),
                size_bytes: snapshot.size_bytes,
                last_modified: snapshot.last_modified,
                created_at: now,
                updated_at: now,
            })
            .await
    }

    pub async fn delete_metadata(&self, project_id: &str, relative_path: &str) -> Result<()> {
        self.records.delete_record(project_id, relative_path).await
    }

    pub async fn delete_project_metadata(&self, project_id: &str) -> Result<u64> {
        self.records.delete_project_records(project_id).await
    }

    /// Every path with a stored record in the project, sorted.
    pub async fn known_paths(&self, project_id: &str) -> Result<Vec<String>> {
        Ok(self
            .records
            .list_records(project_id)
            .await?
            .into_iter()
            .map(|r| r.relative_path)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::InMemoryStore;
    use std::path::PathBuf;

    fn snapshot(path: &str, content: &str) -> FileSnapshot {
        FileSnapshot {
            absolute_path: PathBuf::from("/repo").join(path),
            relative_path: path.to_string(),
            bytes: content.as_bytes().to_vec(),
            checksum: checksum(content.as_bytes()),
            size_bytes: content.len() as u64,
            last_modified: Utc::now(),
        }
    }

    #[test]
    fn test_checksum_is_sha256_hex() {
        assert_eq!(
            checksum(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(
            checksum(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[tokio::test]
    async fn test_new_unchanged_modified() {
        let classifier = Classifier::new(Arc::new(InMemoryStore::new()));
        let first = snapshot("src/a.rs", "fn a() {}\n");

        assert_eq!(classifier.status_of("p", &first).await.unwrap(), FileStatus::New);

        classifier.save_metadata("p", &first).await.unwrap();
        assert_eq!(
            classifier.status("p", "src/a.rs", &first.bytes).await.unwrap(),
            FileStatus::Unchanged
        );
        assert_eq!(
            classifier.status("p", "src/a.rs", b"fn a() { 1 }\n").await.unwrap(),
            FileStatus::Modified
        );

        // Same path in another project is unrelated.
        assert_eq!(classifier.status_of("q", &first).await.unwrap(), FileStatus::New);
    }

    #[tokio::test]
    async fn test_metadata_lifecycle() {
        let classifier = Classifier::new(Arc::new(InMemoryStore::new()));
        classifier.save_metadata("p", &snapshot("b.rs", "b")).await.unwrap();
        classifier.save_metadata("p", &snapshot("a.rs", "a")).await.unwrap();

        assert_eq!(classifier.known_paths("p").await.unwrap(), vec!["a.rs", "b.rs"]);
        assert_eq!(
            classifier.stored_checksum("p", "a.rs").await.unwrap(),
            Some(checksum(b"a"))
        );

        classifier.delete_metadata("p", "a.rs").await.unwrap();
        assert_eq!(classifier.known_paths("p").await.unwrap(), vec!["b.rs"]);
        assert_eq!(classifier.delete_project_metadata("p").await.unwrap(), 1);
        assert!(classifier.known_paths("p").await.unwrap().is_empty());
    }

    #[test]
    fn test_read_snapshot() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("main.rs");
        std::fs::write(&path, "fn main() {}\n").unwrap();

        let snap = read_snapshot(&DiscoveredFile {
            absolute_path: path.clone(),
            relative_path: "main.rs".to_string(),
        })
        .unwrap();
        assert_eq!(snap.size_bytes, 13);
        assert_eq!(snap.checksum, checksum(b"fn main() {}\n"));
        assert_eq!(snapshot_text(&snap).unwrap(), "fn main() {}\n");
    }

    #[test]
    fn test_read_snapshot_missing_file_is_checksum_error() {
        let err = read_snapshot(&DiscoveredFile {
            absolute_path: PathBuf::from("/nonexistent/file.rs"),
            relative_path: "file.rs".to_string(),
        })
        .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Checksum);
    }

    #[test]
    fn test_binary_content_is_not_text() {
        let mut snap = snapshot("blob.txt", "");
        snap.bytes = vec![0xff, 0xfe, 0x00];
        assert!(snapshot_text(&snap).is_err());
    }
}
