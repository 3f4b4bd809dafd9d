use chrono::{Duration, NaiveDate};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use super::clock::{Clock, SystemClock};
use super::entry::{AuditEntry, AuditRecord};
use crate::error::{Error, Result};

const FILE_PREFIX: &str = "archive_audit.";
const FILE_SUFFIX: &str = ".log";
const LOCK_FILE: &str = ".archiver.lock";

pub const DEFAULT_RETENTION_DAYS: u32 = 30;

/// Append-only audit writer with daily file rotation.
///
/// Holds an exclusive lock on the audit directory for its whole lifetime.
pub struct AuditLog {
    dir: PathBuf,
    clock: Box<dyn Clock>,
    host: String,
    user: String,
    current: Option<(NaiveDate, BufWriter<File>)>,
    lock: File,
}

impl AuditLog {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        Self::with_clock(dir, Box::new(SystemClock))
    }

    pub fn with_clock(dir: impl Into<PathBuf>, clock: Box<dyn Clock>) -> Result<Self> {
        let dir = dir.into();
        let log_open = |source| Error::LogOpen {
            path: dir.clone(),
            source,
        };
        fs::create_dir_all(&dir).map_err(log_open)?;

        let lock = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(dir.join(LOCK_FILE))
            .map_err(log_open)?;
        if FileExt::try_lock_exclusive(&lock).is_err() {
            return Err(Error::AuditLocked(dir));
        }

        Ok(Self {
            host: host_name(),
            user: user_name(),
            dir,
            clock,
            current: None,
            lock,
        })
    }

    /// Override the host and user stamped on every line.
    pub fn with_identity(mut self, host: impl Into<String>, user: impl Into<String>) -> Self {
        self.host = host.into();
        self.user = user.into();
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// The file the next write goes to, if one has been opened.
    pub fn current_path(&self) -> Option<PathBuf> {
        self.current
            .as_ref()
            .map(|(date, _)| audit_file_path(&self.dir, *date))
    }

    /// Append one event and flush it.
    pub fn write(&mut self, record: &AuditRecord) -> io::Result<()> {
        let now = self.clock.now();
        let today = now.date_naive();

        let reuse = matches!(&self.current, Some((date, _)) if *date == today);
        if !reuse {
            if let Some((_, mut previous)) = self.current.take() {
                previous.flush()?;
                previous.get_ref().sync_all()?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(audit_file_path(&self.dir, today))?;
            tracing::debug!(date = %today, "Opened audit file");
            self.current = Some((today, BufWriter::new(file)));
        }
        let (_, writer) = self
            .current
            .as_mut()
            .ok_or_else(|| io::Error::other("audit file not open"))?;

        let entry = AuditEntry {
            timestamp: now,
            host: &self.host,
            user: &self.user,
            record,
        };
        writeln!(writer, "{}", entry.to_line())?;
        writer.flush()
    }

    /// Flush and fsync the active file.
    pub fn sync(&mut self) -> io::Result<()> {
        if let Some((_, writer)) = &mut self.current {
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }
        Ok(())
    }

    pub fn close(mut self) -> io::Result<()> {
        self.sync()
    }
}

impl Drop for AuditLog {
    fn drop(&mut self) {
        if let Some((_, writer)) = &mut self.current {
            let _ = writer.flush();
        }
        let _ = FileExt::unlock(&self.lock);
    }
}

pub fn audit_file_path(dir: &Path, date: NaiveDate) -> PathBuf {
    dir.join(format!("{}{}{}", FILE_PREFIX, date.format("%Y-%m-%d"), FILE_SUFFIX))
}

/// Date embedded in an audit file name, if `name` is one.
pub fn audit_file_date(name: &str) -> Option<NaiveDate> {
    let date = name.strip_prefix(FILE_PREFIX)?.strip_suffix(FILE_SUFFIX)?;
    NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()
}

/// Delete audit files dated more than `retention_days` before `today`.
///
/// Returns the removed paths. Files that are not audit files are left alone.
/// A missing directory has nothing to prune.
pub fn prune_audit_logs(dir: &Path, retention_days: u32, today: NaiveDate) -> io::Result<Vec<PathBuf>> {
    let Some(cutoff) = today.checked_sub_signed(Duration::days(i64::from(retention_days))) else {
        return Ok(Vec::new());
    };
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(err),
    };
    let mut removed = Vec::new();

    for entry in entries {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().to_string();
        let Some(date) = audit_file_date(&name) else {
            continue;
        };
        if date < cutoff {
            let path = entry.path();
            fs::remove_file(&path)?;
            tracing::info!(path = %path.display(), "Pruned audit file");
            removed.push(path);
        }
    }

    removed.sort();
    Ok(removed)
}

fn host_name() -> String {
    sysinfo::System::host_name().unwrap_or_else(|| "unknown".to_string())
}

fn user_name() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{EventKind, ManualClock, Outcome};
    use chrono::{Local, TimeZone};
    use tempfile::tempdir;

    fn clock_at(y: i32, m: u32, d: u32, h: u32, min: u32) -> ManualClock {
        ManualClock::new(Local.with_ymd_and_hms(y, m, d, h, min, 0).unwrap())
    }

    fn skip(path: &str) -> AuditRecord {
        AuditRecord::new(EventKind::FileSkip, Outcome::Skipped)
            .path(Path::new(path))
            .detail("modified within the last 30 days")
    }

    #[test]
    fn test_writes_one_line_per_event() {
        let dir = tempdir().unwrap();
        let clock = clock_at(2024, 3, 9, 10, 0);
        let mut log = AuditLog::with_clock(dir.path(), Box::new(clock))
            .unwrap()
            .with_identity("ws-01", "maria");

        log.write(&skip("/data/a.txt")).unwrap();
        log.write(&skip("/data/b.txt")).unwrap();
        let path = log.current_path().unwrap();
        log.close().unwrap();

        assert_eq!(path, dir.path().join("archive_audit.2024-03-09.log"));
        let content = fs::read_to_string(path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(
            lines[0],
            "2024-03-09 10:00:00 | ws-01 | maria | FILE_SKIP | /data/a.txt | SKIPPED | 0ms | modified within the last 30 days"
        );
    }

    #[test]
    fn test_switches_file_at_midnight() {
        let dir = tempdir().unwrap();
        let clock = clock_at(2024, 3, 9, 23, 59);
        let mut log = AuditLog::with_clock(dir.path(), Box::new(clock.clone())).unwrap();

        log.write(&skip("/data/before.txt")).unwrap();
        clock.advance(chrono::Duration::minutes(2));
        log.write(&skip("/data/after.txt")).unwrap();
        log.close().unwrap();

        let first = fs::read_to_string(dir.path().join("archive_audit.2024-03-09.log")).unwrap();
        let second = fs::read_to_string(dir.path().join("archive_audit.2024-03-10.log")).unwrap();
        assert_eq!(first.lines().count(), 1);
        assert!(first.contains("before.txt"));
        assert_eq!(second.lines().count(), 1);
        assert!(second.contains("after.txt"));
    }

    #[test]
    fn test_appends_to_existing_day_file() {
        let dir = tempdir().unwrap();
        for name in ["/one", "/two"] {
            let mut log =
                AuditLog::with_clock(dir.path(), Box::new(clock_at(2024, 1, 2, 8, 0))).unwrap();
            log.write(&skip(name)).unwrap();
            log.close().unwrap();
        }

        let content = fs::read_to_string(dir.path().join("archive_audit.2024-01-02.log")).unwrap();
        assert_eq!(content.lines().count(), 2);
    }

    #[test]
    fn test_second_writer_is_locked_out() {
        let dir = tempdir().unwrap();
        let _first = AuditLog::open(dir.path()).unwrap();

        let second = AuditLog::open(dir.path());
        assert!(matches!(second, Err(Error::AuditLocked(_))));
    }

    #[test]
    fn test_lock_released_on_drop() {
        let dir = tempdir().unwrap();
        drop(AuditLog::open(dir.path()).unwrap());
        assert!(AuditLog::open(dir.path()).is_ok());
    }

    #[test]
    fn test_prune_respects_retention() {
        let dir = tempdir().unwrap();
        for name in [
            "archive_audit.2024-01-01.log",
            "archive_audit.2024-02-01.log",
            "archive_audit.2024-03-01.log",
            "archive_audit.notadate.log",
            "archive.log",
        ] {
            fs::write(dir.path().join(name), "x").unwrap();
        }
        let today = NaiveDate::from_ymd_opt(2024, 3, 10).unwrap();

        let removed = prune_audit_logs(dir.path(), 30, today).unwrap();

        assert_eq!(
            removed,
            vec![
                dir.path().join("archive_audit.2024-01-01.log"),
                dir.path().join("archive_audit.2024-02-01.log"),
            ]
        );
        assert!(dir.path().join("archive_audit.2024-03-01.log").exists());
        assert!(dir.path().join("archive_audit.notadate.log").exists());
        assert!(dir.path().join("archive.log").exists());
    }

    #[test]
    fn test_prune_with_huge_retention_keeps_everything() {
        let dir = tempdir().unwrap();
        let old = dir.path().join("archive_audit.2000-01-01.log");
        fs::write(&old, "x").unwrap();
        let today = NaiveDate::from_ymd_opt(2024, 3, 10).unwrap();

        let removed = prune_audit_logs(dir.path(), u32::MAX, today).unwrap();

        assert!(removed.is_empty());
        assert!(old.exists());
    }

    #[test]
    fn test_prune_missing_dir_is_empty() {
        let dir = tempdir().unwrap();
        let today = NaiveDate::from_ymd_opt(2024, 3, 10).unwrap();

        let removed = prune_audit_logs(&dir.path().join("never-created"), 30, today).unwrap();

        assert!(removed.is_empty());
    }

    #[test]
    fn test_audit_file_date() {
        assert_eq!(
            audit_file_date("archive_audit.2024-03-09.log"),
            NaiveDate::from_ymd_opt(2024, 3, 9)
        );
        assert_eq!(audit_file_date("archive_audit.2024-03-09.log.1"), None);
        assert_eq!(audit_file_date("notes.txt"), None);
    }
}
