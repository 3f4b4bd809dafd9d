//! Durable file copy for cross-volume moves
//!
//! A copy is staged in a hidden temporary file next to the target, synced,
//! and then renamed into place, so the target path either holds the complete
//! file or nothing at all.
//!
//! Renames here never replace an existing target. Where the filesystem
//! supports hard links the check and the rename are one atomic step;
//! elsewhere a target created between the check and the rename is
//! still replaced.

use filetime::FileTime;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

/// Temporary sibling used while a copy is in flight.
pub fn staging_path(target: &Path) -> PathBuf {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "file".to_string());
    let temp_name = format!(".{}.partial.{}", name, std::process::id());
    match target.parent() {
        Some(parent) => parent.join(temp_name),
        None => PathBuf::from(temp_name),
    }
}

/// Copy `source` to `target` atomically, preserving the modification time.
///
/// Fails without touching an existing `target`. On any error the staging
/// file is removed; `source` is never modified.
pub fn copy_file_durable(source: &Path, target: &Path) -> io::Result<u64> {
    let temp_path = staging_path(target);

    let copy_result = (|| -> io::Result<u64> {
        let mut reader = File::open(source)?;
        let mut writer = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&temp_path)?;
        let copied = io::copy(&mut reader, &mut writer)?;
        writer.sync_all()?;
        drop(writer);

        let source_meta = fs::metadata(source)?;
        let mtime = FileTime::from_last_modification_time(&source_meta);
        filetime::set_file_mtime(&temp_path, mtime)?;
        fs::set_permissions(&temp_path, source_meta.permissions())?;

        rename_no_clobber(&temp_path, target)?;
        Ok(copied)
    })();

    if copy_result.is_err() {
        let _ = fs::remove_file(&temp_path);
        return copy_result;
    }

    if let Some(parent) = target.parent() {
        sync_directory(parent)?;
    }
    copy_result
}

/// Rename `from` to `to`, failing with `AlreadyExists` if `to` is taken.
///
/// Links `to` first and then unlinks `from`, so an existing target is never
/// replaced. Cross-device errors are returned as is. On filesystems without
/// hard links this falls back to check-then-rename.
pub fn rename_no_clobber(from: &Path, to: &Path) -> io::Result<()> {
    match fs::hard_link(from, to) {
        Ok(()) => {
            if let Err(err) = fs::remove_file(from) {
                let _ = fs::remove_file(to);
                return Err(err);
            }
            Ok(())
        }
        Err(err) if err.kind() == io::ErrorKind::AlreadyExists || is_cross_device(&err) => Err(err),
        Err(err) => {
            tracing::debug!(path = %to.display(), error = %err, "Hard link unavailable, renaming");
            if fs::symlink_metadata(to).is_ok() {
                return Err(io::Error::new(
                    io::ErrorKind::AlreadyExists,
                    format!("{} already exists", to.display()),
                ));
            }
            fs::rename(from, to)
        }
    }
}

// EXDEV on unix, ERROR_NOT_SAME_DEVICE on windows
pub fn is_cross_device(err: &io::Error) -> bool {
    let code = if cfg!(windows) { 17 } else { 18 };
    err.raw_os_error() == Some(code)
}

/// Sync a directory so that a rename inside it is durable.
///
/// No-op where directories cannot be opened for syncing.
pub fn sync_directory(path: &Path) -> io::Result<()> {
    #[cfg(unix)]
    {
        File::open(path)?.sync_all()?;
    }

    #[cfg(not(unix))]
    {
        let _ = path;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_copy_file_durable() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("report.pdf");
        let target = dir.path().join("out").join("report.pdf");
        fs::write(&source, b"quarterly numbers").unwrap();
        fs::create_dir_all(target.parent().unwrap()).unwrap();

        let old = FileTime::from_unix_time(1_600_000_000, 0);
        filetime::set_file_mtime(&source, old).unwrap();

        let copied = copy_file_durable(&source, &target).unwrap();

        assert_eq!(copied, 17);
        assert!(source.exists());
        assert_eq!(fs::read(&target).unwrap(), b"quarterly numbers");
        let meta = fs::metadata(&target).unwrap();
        assert_eq!(FileTime::from_last_modification_time(&meta), old);
        assert!(!staging_path(&target).exists());
    }

    #[test]
    fn test_copy_refuses_existing_target() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("a.txt");
        let target = dir.path().join("b.txt");
        fs::write(&source, b"new").unwrap();
        fs::write(&target, b"old").unwrap();

        let err = copy_file_durable(&source, &target).unwrap_err();

        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
        assert_eq!(fs::read(&target).unwrap(), b"old");
        assert!(!staging_path(&target).exists());
    }

    #[test]
    fn test_rename_no_clobber_moves() {
        let dir = tempdir().unwrap();
        let from = dir.path().join("a.txt");
        let to = dir.path().join("b.txt");
        fs::write(&from, b"data").unwrap();

        rename_no_clobber(&from, &to).unwrap();

        assert!(!from.exists());
        assert_eq!(fs::read(&to).unwrap(), b"data");
    }

    #[test]
    fn test_rename_no_clobber_keeps_existing_target() {
        let dir = tempdir().unwrap();
        let from = dir.path().join("a.txt");
        let to = dir.path().join("b.txt");
        fs::write(&from, b"new").unwrap();
        fs::write(&to, b"old").unwrap();

        let err = rename_no_clobber(&from, &to).unwrap_err();

        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
        assert_eq!(fs::read(&from).unwrap(), b"new");
        assert_eq!(fs::read(&to).unwrap(), b"old");
    }

    #[test]
    fn test_copy_missing_source_leaves_nothing() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("b.txt");

        assert!(copy_file_durable(&dir.path().join("missing"), &target).is_err());
        assert!(!target.exists());
        assert!(!staging_path(&target).exists());
    }
}
