//! Directory scanning
//!
//! `Scanner` walks a tree depth-first and yields one item per regular file.
//! Entries within a directory are sorted by name, so two scans of the same
//! tree produce the same order. Unreadable entries and symlink cycles are
//! yielded as errors instead of being dropped.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use walkdir::{DirEntry, WalkDir};

use crate::error::ScanError;
use crate::models::FileRecord;

type Walk = Box<dyn Iterator<Item = walkdir::Result<DirEntry>>>;

/// Builder for a single pass over one root directory.
pub struct Scanner {
    root: PathBuf,
    follow_symlinks: bool,
    skip_dirs: Vec<PathBuf>,
}

impl Scanner {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            follow_symlinks: false,
            skip_dirs: Vec::new(),
        }
    }

    /// Descend through directory symlinks. Off by default. File symlinks are
    /// never yielded either way, so a move can only ever touch the real file.
    pub fn follow_symlinks(mut self, follow: bool) -> Self {
        self.follow_symlinks = follow;
        self
    }

    /// Never descend into `dir` (e.g. the destination or log directory).
    pub fn skip_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.skip_dirs.push(resolve(dir.as_ref()));
        self
    }

    /// Start the walk. Each call begins again from the root.
    pub fn scan(&self) -> ScanIter {
        let root = resolve(&self.root);
        let skip_dirs = self.skip_dirs.clone();
        let follow = self.follow_symlinks;
        let mut visited: HashSet<PathBuf> = HashSet::new();

        let walk = WalkDir::new(&root)
            .follow_links(follow)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(move |entry| {
                if !entry.file_type().is_dir() {
                    return true;
                }
                if skip_dirs.iter().any(|skip| entry.path() == skip) {
                    tracing::debug!(path = %entry.path().display(), "Skipping excluded directory");
                    return false;
                }
                if follow {
                    let identity = fs::canonicalize(entry.path())
                        .unwrap_or_else(|_| entry.path().to_path_buf());
                    if skip_dirs.iter().any(|skip| identity == *skip) {
                        return false;
                    }
                    if !visited.insert(identity) {
                        tracing::warn!(
                            path = %entry.path().display(),
                            "Directory already scanned through another link, skipping"
                        );
                        return false;
                    }
                }
                true
            });

        ScanIter {
            root,
            walk: Box::new(walk),
        }
    }
}

/// Lazy sequence of scanned files for one root.
pub struct ScanIter {
    root: PathBuf,
    walk: Walk,
}

impl Iterator for ScanIter {
    type Item = Result<FileRecord, ScanError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let entry = match self.walk.next()? {
                Ok(entry) => entry,
                Err(err) => return Some(Err(scan_error(&self.root, err))),
            };

            if !entry.file_type().is_file() {
                continue;
            }
            if entry.path_is_symlink() {
                tracing::debug!(path = %entry.path().display(), "Skipping file symlink");
                continue;
            }

            let record = entry
                .metadata()
                .map_err(|err| scan_error(&self.root, err))
                .and_then(|meta| {
                    FileRecord::from_metadata(entry.path(), &self.root, &meta).map_err(|err| {
                        ScanError::Access {
                            path: entry.path().to_path_buf(),
                            message: err.to_string(),
                        }
                    })
                });
            return Some(record);
        }
    }
}

fn scan_error(root: &Path, err: walkdir::Error) -> ScanError {
    let path = err.path().map(Path::to_path_buf).unwrap_or_else(|| root.to_path_buf());
    if let Some(ancestor) = err.loop_ancestor() {
        return ScanError::Cycle {
            path,
            ancestor: ancestor.to_path_buf(),
        };
    }
    let message = match err.io_error() {
        Some(io) => io.to_string(),
        None => err.to_string(),
    };
    ScanError::Access { path, message }
}

/// Absolute, symlink-resolved form of `path` when it exists.
pub fn resolve(path: &Path) -> PathBuf {
    if let Ok(canonical) = fs::canonicalize(path) {
        return canonical;
    }
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    }
}
