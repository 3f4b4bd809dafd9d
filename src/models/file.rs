use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs::Metadata;
use std::io;
use std::path::{Path, PathBuf};

/// Where a record's creation time came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CreatedSource {
    /// True birth time reported by the filesystem
    Birth,
    /// Inode change time, used when birth time is unavailable
    ChangeTime,
    /// Neither is available; modification time stands in
    Modified,
}

impl CreatedSource {
    pub fn is_approximate(&self) -> bool {
        !matches!(self, CreatedSource::Birth)
    }
}

/// Snapshot of one regular file, taken once at scan time
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    /// Absolute path
    pub path: PathBuf,
    /// Path relative to the scanned root
    pub relative_path: PathBuf,
    /// File name (lossy UTF-8)
    pub name: String,
    /// File size in bytes
    pub size: u64,
    pub modified_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub created_source: CreatedSource,
    /// Lower-cased extension with leading dot, empty when there is none
    pub extension: String,
}

impl FileRecord {
    /// Build a record from a path under `root`, reading its metadata.
    pub fn from_path(path: &Path, root: &Path) -> io::Result<Self> {
        let metadata = std::fs::metadata(path)?;
        Self::from_metadata(path, root, &metadata)
    }

    /// Build a record from already-read metadata.
    pub fn from_metadata(path: &Path, root: &Path, metadata: &Metadata) -> io::Result<Self> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        let extension = path
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
            .unwrap_or_default();

        let modified_at = DateTime::<Utc>::from(metadata.modified()?);
        let (created_at, created_source) = creation_time(metadata, modified_at);

        let relative_path = path
            .strip_prefix(root)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| PathBuf::from(&name));

        Ok(Self {
            path: path.to_path_buf(),
            relative_path,
            name,
            size: metadata.len(),
            modified_at,
            created_at,
            created_source,
            extension,
        })
    }
}

fn creation_time(metadata: &Metadata, modified_at: DateTime<Utc>) -> (DateTime<Utc>, CreatedSource) {
    if let Ok(created) = metadata.created() {
        return (DateTime::<Utc>::from(created), CreatedSource::Birth);
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;
        if let Some(ctime) = DateTime::<Utc>::from_timestamp(metadata.ctime(), metadata.ctime_nsec() as u32) {
            return (ctime, CreatedSource::ChangeTime);
        }
    }

    (modified_at, CreatedSource::Modified)
}
