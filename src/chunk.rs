//! Overlapping line-window chunker.
//!
//! Splits file text into [`Chunk`]s of `chunk_size_lines` lines. Consecutive
//! chunks share `overlap_size = max(1, ceil(chunk_size_lines * overlap_percent / 100))`
//! lines. When fewer than `overlap_size` lines would remain after a chunk,
//! that chunk is extended to the end of the file instead of emitting a tiny
//! trailing chunk.
//!
//! Chunking is pure: the same input always yields the same output.

use crate::config::ChunkingConfig;
use crate::models::Chunk;

/// A contiguous 1-based inclusive line range and its text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineSpan {
    pub start_line: usize,
    pub end_line: usize,
    pub text: String,
}

/// Number of lines shared by consecutive chunks.
pub fn overlap_size(chunk_size_lines: usize, overlap_percent: usize) -> usize {
    let overlap = chunk_size_lines.saturating_mul(overlap_percent).div_ceil(100);
    overlap.max(1)
}

/// Split `content` into overlapping line spans.
///
/// A file of at most `chunk_size_lines` lines yields a single span whose
/// text is the original content. A file with no lines yields nothing.
pub fn split(content: &str, chunk_size_lines: usize, overlap_percent: usize) -> Vec<LineSpan> {
    let mut lines: Vec<&str> = content.split('\n').collect();
    // A trailing newline does not start another line.
    while lines.last().is_some_and(|l| l.is_empty()) {
        lines.pop();
    }

    let total_lines = lines.len();
    if total_lines == 0 {
        return Vec::new();
    }

    if total_lines <= chunk_size_lines {
        return vec![LineSpan {
            start_line: 1,
            end_line: total_lines,
            text: content.to_string(),
        }];
    }

    let overlap = overlap_size(chunk_size_lines, overlap_percent);
    let step = chunk_size_lines.saturating_sub(overlap).max(1);

    let mut spans = Vec::new();
    let mut start = 0;
    while start < total_lines {
        let mut end = (start + chunk_size_lines).min(total_lines);
        if total_lines - end < overlap {
            end = total_lines;
        }

        let mut text = String::new();
        for line in &lines[start..end] {
            text.push_str(line);
            text.push('\n');
        }

        spans.push(LineSpan {
            start_line: start + 1,
            end_line: end,
            text,
        });

        if end == total_lines {
            break;
        }
        start += step;
    }

    spans
}

/// Line-window chunker bound to a [`ChunkingConfig`].
#[derive(Debug, Clone)]
pub struct Chunker {
    chunk_size_lines: usize,
    overlap_percent: usize,
}

impl Chunker {
    pub fn new(chunk_size_lines: usize, overlap_percent: usize) -> Self {
        Self {
            chunk_size_lines,
            overlap_percent,
        }
    }

    pub fn from_config(config: &ChunkingConfig) -> Self {
        Self::new(config.chunk_size_lines, config.overlap_percent)
    }

    pub fn overlap_size(&self) -> usize {
        overlap_size(self.chunk_size_lines, self.overlap_percent)
    }

    /// Chunk one file's text, stamping every chunk with its project, path and checksum.
    pub fn chunk_file(
        &self,
        project_id: &str,
        file_path: &str,
        content: &str,
        file_checksum: &str,
    ) -> Vec<Chunk> {
        tracing::debug!(
            file = file_path,
            chunk_size = self.chunk_size_lines,
            overlap_percent = self.overlap_percent,
            overlap_lines = self.overlap_size(),
            "splitting file into chunks"
        );

        split(content, self.chunk_size_lines, self.overlap_percent)
            .into_iter()
            .map(|span| Chunk {
                project_id: project_id.to_string(),
                file_path: file_path.to_string(),
                start_line: span.start_line,
                end_line: span.end_line,
                content: span.text,
                file_checksum: file_checksum.to_string(),
            })
            .collect()
    }
}

impl Default for Chunker {
    fn default() -> Self {
        Self::from_config(&ChunkingConfig::default())
    }
}
