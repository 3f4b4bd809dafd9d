//! Archive execution
//!
//! Moves matched files into the destination tree. A no-clobber rename is
//! tried first; when source and destination live on different volumes the
//! file is copied durably and the source removed only after the copy is in
//! place.

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::time::Instant;

use crate::error::ArchiveError;
use crate::models::{ArchiveOutcome, ArchiveResult, FileRecord};
use crate::utils::fs::{copy_file_durable, is_cross_device, rename_no_clobber};

/// How destination paths are derived from source paths
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Layout {
    /// Keep the file's position relative to the scanned root
    #[default]
    Mirror,
    /// Put every file directly under the destination root
    Flat,
}

/// Archive executor for one source root
#[derive(Debug, Clone)]
pub struct Archiver {
    source_root: PathBuf,
    destination_root: PathBuf,
    layout: Layout,
    dry_run: bool,
}

impl Archiver {
    pub fn new(
        source_root: impl Into<PathBuf>,
        destination_root: impl Into<PathBuf>,
        layout: Layout,
        dry_run: bool,
    ) -> Self {
        Self {
            source_root: source_root.into(),
            destination_root: destination_root.into(),
            layout,
            dry_run,
        }
    }

    /// Where `record` goes under the destination root.
    pub fn destination_for(&self, record: &FileRecord) -> Result<PathBuf, ArchiveError> {
        match self.layout {
            Layout::Flat => {
                let name = record
                    .path
                    .file_name()
                    .ok_or_else(|| ArchiveError::OutsideRoot(record.path.clone()))?;
                Ok(self.destination_root.join(name))
            }
            Layout::Mirror => {
                let relative = if record.relative_path.as_os_str().is_empty() {
                    record
                        .path
                        .strip_prefix(&self.source_root)
                        .map_err(|_| ArchiveError::OutsideRoot(record.path.clone()))?
                } else {
                    record.relative_path.as_path()
                };
                if relative.is_absolute()
                    || relative.components().any(|c| c == Component::ParentDir)
                {
                    return Err(ArchiveError::OutsideRoot(record.path.clone()));
                }
                Ok(self.destination_root.join(relative))
            }
        }
    }

    /// Move `record` into the destination tree, or report where it would go.
    ///
    /// Never overwrites: an existing destination fails the move and leaves
    /// the source where it is.
    pub fn archive(&self, record: &FileRecord) -> ArchiveResult {
        let started = Instant::now();
        let destination = match self.destination_for(record) {
            Ok(path) => path,
            Err(err) => {
                return ArchiveResult {
                    outcome: ArchiveOutcome::Failed(err),
                    destination: PathBuf::new(),
                    elapsed_ms: elapsed_ms(started),
                }
            }
        };

        let outcome = if self.dry_run {
            ArchiveOutcome::Simulated
        } else {
            match move_file(&record.path, &destination) {
                Ok(()) => ArchiveOutcome::Success,
                Err(err) => ArchiveOutcome::Failed(err),
            }
        };

        ArchiveResult {
            outcome,
            destination,
            elapsed_ms: elapsed_ms(started),
        }
    }
}

/// Move one file, creating the destination's parent directories.
///
/// A destination that appears after the first check still fails the move
/// with `DestinationExists` instead of being replaced.
pub fn move_file(source: &Path, destination: &Path) -> Result<(), ArchiveError> {
    if fs::symlink_metadata(destination).is_ok() {
        return Err(ArchiveError::DestinationExists {
            path: destination.to_path_buf(),
        });
    }

    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent).map_err(|source| ArchiveError::CreateDir {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    match rename_no_clobber(source, destination) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
            Err(ArchiveError::DestinationExists {
                path: destination.to_path_buf(),
            })
        }
        Err(err) if is_cross_device(&err) => {
            tracing::debug!(
                source = %source.display(),
                destination = %destination.display(),
                "Rename crosses volumes, copying instead"
            );
            copy_then_remove(source, destination)
        }
        Err(source_err) => Err(ArchiveError::Rename {
            path: destination.to_path_buf(),
            source: source_err,
        }),
    }
}

/// Copy `source` to `destination`, then delete `source`.
///
/// If the copy fails the source is untouched. If deleting the source fails
/// both copies remain and the move is reported as failed.
pub fn copy_then_remove(source: &Path, destination: &Path) -> Result<(), ArchiveError> {
    copy_file_durable(source, destination).map_err(|err| {
        if err.kind() == io::ErrorKind::AlreadyExists {
            ArchiveError::DestinationExists {
                path: destination.to_path_buf(),
            }
        } else {
            ArchiveError::Copy {
                path: destination.to_path_buf(),
                source: err,
            }
        }
    })?;

    fs::remove_file(source).map_err(|err| ArchiveError::RemoveSource {
        path: destination.to_path_buf(),
        source: err,
    })
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}
