//! Source file discovery.
//!
//! Walks a root directory and yields every file whose lower-cased name ends
//! with a supported extension and whose root-relative path matches no
//! ignore pattern. Ignore patterns come in two forms:
//!
//! - **Plain patterns** (`node_modules`, `.git`) match as a substring of the
//!   root-relative, `/`-joined path, so `env` also excludes
//!   `src/environment.ts`.
//! - **Globs** (`*.log`, `*~`) are compiled with `globset` and matched
//!   against each path component.
//!
//! Matching only the root-relative path keeps the root's own location
//! (`/tmp/build/repo`) from excluding everything beneath it.
//!
//! Ignored directories are pruned, so the walk never descends into them.
//! Directories that cannot be read surface as `Err` items from
//! [`Discovery::walk`]; [`Discovery::discover`] logs and drops them.
//! Entries are visited in file-name order, which keeps discovery output
//! deterministic across runs.

use std::path::{Component, Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};
use walkdir::{DirEntry, WalkDir};

use crate::config::DiscoveryConfig;
use crate::error::{IndexError, Result};

/// A file selected for indexing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredFile {
    pub absolute_path: PathBuf,
    /// Root-relative path with `/` separators.
    pub relative_path: String,
}

/// Compiled discovery filter.
#[derive(Debug, Clone)]
pub struct Discovery {
    extensions: Vec<String>,
    ignored_substrings: Vec<String>,
    ignored_globs: GlobSet,
    follow_symlinks: bool,
}

fn is_glob(pattern: &str) -> bool {
    pattern.contains(['*', '?', '['])
}

impl Discovery {
    pub fn new(config: &DiscoveryConfig) -> Result<Self> {
        let mut ignored_substrings = Vec::new();
        let mut builder = GlobSetBuilder::new();

        for pattern in config.all_ignore_patterns() {
            if is_glob(&pattern) {
                let glob = Glob::new(&pattern).map_err(|e| {
                    IndexError::Config(format!("Invalid ignore pattern '{}': {}", pattern, e))
                })?;
                builder.add(glob);
            } else {
                ignored_substrings.push(pattern);
            }
        }

        let ignored_globs = builder
            .build()
            .map_err(|e| IndexError::Config(format!("Failed to build ignore set: {}", e)))?;

        Ok(Self {
            extensions: config
                .extensions
                .iter()
                .map(|e| e.to_lowercase())
                .collect(),
            ignored_substrings,
            ignored_globs,
            follow_symlinks: config.follow_symlinks,
        })
    }

    /// Whether the file name ends with one of the supported extensions.
    pub fn is_supported(&self, path: &Path) -> bool {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            return false;
        };
        let name = name.to_lowercase();
        self.extensions.iter().any(|ext| name.ends_with(ext.as_str()))
    }

    /// Whether the root-relative path contains a plain pattern or has a
    /// component matching a glob.
    pub fn is_ignored(&self, relative: &Path) -> bool {
        let slashed = to_slash(relative);
        if self
            .ignored_substrings
            .iter()
            .any(|pattern| slashed.contains(pattern.as_str()))
        {
            return true;
        }
        relative.components().any(|component| match component {
            Component::Normal(name) => self.ignored_globs.is_match(name),
            _ => false,
        })
    }

    /// Walk `root` and yield every indexable file.
    ///
    /// The iterator is lazy and each call starts a fresh walk. Unreadable
    /// entries are logged and skipped.
    pub fn discover<'a>(&'a self, root: &'a Path) -> impl Iterator<Item = DiscoveredFile> + 'a {
        self.walk(root).filter_map(|item| match item {
            Ok(file) => Some(file),
            Err(e) => {
                tracing::warn!("Walk error: {}", e);
                None
            }
        })
    }

    /// Like [`discover`](Self::discover), but unreadable entries are yielded
    /// as [`IndexError::Discovery`] carrying the path that failed.
    pub fn walk<'a>(
        &'a self,
        root: &'a Path,
    ) -> impl Iterator<Item = Result<DiscoveredFile>> + 'a {
        WalkDir::new(root)
            .follow_links(self.follow_symlinks)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(move |entry| self.keep_entry(root, entry))
            .filter_map(move |entry| {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(e) => {
                        return Some(Err(IndexError::Discovery {
                            path: e.path().unwrap_or(root).to_path_buf(),
                            message: e.to_string(),
                        }));
                    }
                };
                if !entry.file_type().is_file() || !self.is_supported(entry.path()) {
                    return None;
                }
                let relative = entry.path().strip_prefix(root).ok()?;
                Some(Ok(DiscoveredFile {
                    relative_path: to_slash(relative),
                    absolute_path: entry.into_path(),
                }))
            })
    }

    fn keep_entry(&self, root: &Path, entry: &DirEntry) -> bool {
        if entry.depth() == 0 {
            return true;
        }
        let Ok(relative) = entry.path().strip_prefix(root) else {
            return true;
        };
        let ignored = self.is_ignored(relative);
        if ignored {
            tracing::debug!(path = %relative.display(), "ignored");
        }
        !ignored
    }
}

/// Render a relative path with `/` separators.
pub fn to_slash(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(name) => Some(name.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}
