//! Error taxonomy
//!
//! Configuration problems are fatal and surface before any file is touched.
//! Scan and archive errors are per-file and end up in the audit trail.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Fatal errors detected while resolving settings, before a run starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read { path: PathBuf, source: io::Error },

    #[error("Malformed config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Invalid regex '{pattern}': {source}")]
    InvalidRegex {
        pattern: String,
        source: regex::Error,
    },

    #[error("Invalid exclude pattern '{pattern}': {source}")]
    InvalidExclude {
        pattern: String,
        source: regex::Error,
    },

    #[error("Invalid size '{0}' (expected e.g. 500KB, 10MB, 1GB)")]
    InvalidSize(String),

    #[error("No folders to process")]
    NoFolders,

    #[error("Destination {0} is the same as the source folder")]
    DestinationIsSource(PathBuf),
}

/// Per-file failures while walking the tree.
#[derive(Debug, Clone, Error)]
pub enum ScanError {
    #[error("Cannot access {path}: {message}")]
    Access { path: PathBuf, message: String },

    #[error("Symlink cycle at {path} (loops back to {ancestor})")]
    Cycle { path: PathBuf, ancestor: PathBuf },
}

impl ScanError {
    pub fn path(&self) -> &PathBuf {
        match self {
            ScanError::Access { path, .. } | ScanError::Cycle { path, .. } => path,
        }
    }
}

/// Per-file failures while moving a matched file.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("destination exists")]
    DestinationExists { path: PathBuf },

    #[error("Failed to create directory {path}: {source}")]
    CreateDir { path: PathBuf, source: io::Error },

    #[error("Failed to rename to {path}: {source}")]
    Rename { path: PathBuf, source: io::Error },

    #[error("Failed to copy to {path}: {source}")]
    Copy { path: PathBuf, source: io::Error },

    #[error("Copied to {path} but failed to remove source: {source}")]
    RemoveSource { path: PathBuf, source: io::Error },

    #[error("{0} is not under the scanned folder")]
    OutsideRoot(PathBuf),
}

/// Top-level errors that stop the program before or around a run.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to open log in {path}: {source}")]
    LogOpen { path: PathBuf, source: io::Error },

    #[error("Audit directory {0} is in use by another run")]
    AuditLocked(PathBuf),

    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
