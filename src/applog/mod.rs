//! Application log
//!
//! Operational messages go through `tracing` to stderr and, unless disabled,
//! to `archive.log` in the log directory. The file is rotated by size with a
//! bounded number of numbered backups (`archive.log.1` is the newest).
//!
//! Nothing here installs a global subscriber. `AppLog::install` activates the
//! dispatcher on the calling thread until the returned guard is dropped.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::dispatcher::{self, DefaultGuard, Dispatch};
use tracing_subscriber::fmt::{self, time::ChronoLocal, MakeWriter};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;
use crate::error::{Error, Result};

pub const LOG_FILE_NAME: &str = "archive.log";
const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Size-rotated log file
pub struct RotatingFile {
    path: PathBuf,
    /// 0 disables rotation
    max_bytes: u64,
    backup_count: usize,
    file: File,
    written: u64,
}

impl RotatingFile {
    pub fn open(path: impl Into<PathBuf>, max_bytes: u64, backup_count: usize) -> io::Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = open_append(&path)?;
        let written = file.metadata()?.len();
        Ok(Self {
            path,
            max_bytes,
            backup_count,
            file,
            written,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `archive.log.N`
    pub fn backup_path(&self, n: usize) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(format!(".{}", n));
        PathBuf::from(name)
    }

    fn rotate(&mut self) -> io::Result<()> {
        self.file.flush()?;

        if self.backup_count == 0 {
            self.file = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&self.path)?;
            self.written = 0;
            return Ok(());
        }

        let oldest = self.backup_path(self.backup_count);
        if oldest.exists() {
            fs::remove_file(&oldest)?;
        }
        for n in (1..self.backup_count).rev() {
            let from = self.backup_path(n);
            if from.exists() {
                fs::rename(&from, self.backup_path(n + 1))?;
            }
        }
        fs::rename(&self.path, self.backup_path(1))?;

        self.file = open_append(&self.path)?;
        self.written = 0;
        Ok(())
    }
}

impl Write for RotatingFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.max_bytes > 0 && self.written > 0 && self.written + buf.len() as u64 > self.max_bytes {
            self.rotate()?;
        }
        let n = self.file.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

fn open_append(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

/// Shared handle to a `RotatingFile`, usable as a tracing writer
#[derive(Clone)]
pub struct RotatingFileWriter {
    inner: Arc<Mutex<RotatingFile>>,
}

impl RotatingFileWriter {
    pub fn new(file: RotatingFile) -> Self {
        Self {
            inner: Arc::new(Mutex::new(file)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RotatingFile> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Exclusive access to the file for one formatted event
pub struct RotatingFileGuard<'a>(MutexGuard<'a, RotatingFile>);

impl Write for RotatingFileGuard<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.flush()
    }
}

impl<'a> MakeWriter<'a> for RotatingFileWriter {
    type Writer = RotatingFileGuard<'a>;

    fn make_writer(&'a self) -> Self::Writer {
        RotatingFileGuard(self.lock())
    }
}

/// Owned logging setup for one run
pub struct AppLog {
    dispatch: Dispatch,
    file_path: Option<PathBuf>,
}

impl AppLog {
    /// Build the stderr and file layers from `config`.
    ///
    /// `RUST_LOG` overrides the level; otherwise INFO, or DEBUG when verbose.
    pub fn open(config: &LoggingConfig, verbose: bool) -> Result<Self> {
        let file = if config.enable_file_logging {
            let path = config.log_dir.join(LOG_FILE_NAME);
            let max_bytes = if config.enable_rotate {
                config.max_size_bytes()
            } else {
                0
            };
            let file = RotatingFile::open(&path, max_bytes, config.backup_count).map_err(|source| {
                Error::LogOpen {
                    path: path.clone(),
                    source,
                }
            })?;
            Some(RotatingFileWriter::new(file))
        } else {
            None
        };

        Ok(Self::with_writers(
            file,
            env_filter(verbose || config.verbose),
            io::stderr,
        ))
    }

    fn with_writers<W>(file: Option<RotatingFileWriter>, filter: EnvFilter, console: W) -> Self
    where
        W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
    {
        let file_path = file.as_ref().map(|w| w.lock().path().to_path_buf());

        let console_layer = fmt::layer()
            .with_writer(console)
            .with_target(false)
            .with_timer(ChronoLocal::new(TIME_FORMAT.to_string()));
        let file_layer = file.map(|writer| {
            fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(false)
                .with_timer(ChronoLocal::new(TIME_FORMAT.to_string()))
        });

        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(console_layer)
            .with(file_layer);

        Self {
            dispatch: Dispatch::new(subscriber),
            file_path,
        }
    }

    /// Path of the active log file, when file logging is on.
    pub fn file_path(&self) -> Option<&Path> {
        self.file_path.as_deref()
    }

    /// Route this thread's events here until the guard is dropped.
    pub fn install(&self) -> DefaultGuard {
        dispatcher::set_default(&self.dispatch)
    }
}

/// `RUST_LOG` when set, else INFO or DEBUG.
fn env_filter(verbose: bool) -> EnvFilter {
    let default_level = if verbose { "debug" } else { "info" };
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write_lines(file: &mut RotatingFile, count: usize) {
        for i in 0..count {
            writeln!(file, "line {:04} padding padding", i).unwrap();
        }
        file.flush().unwrap();
    }

    #[test]
    fn test_rotates_with_bounded_backups() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(LOG_FILE_NAME);
        let mut file = RotatingFile::open(&path, 100, 2).unwrap();

        write_lines(&mut file, 40);

        assert!(path.exists());
        assert!(file.backup_path(1).exists());
        assert!(file.backup_path(2).exists());
        assert!(!file.backup_path(3).exists());
        for p in [path.clone(), file.backup_path(1), file.backup_path(2)] {
            assert!(fs::metadata(&p).unwrap().len() <= 100);
        }
    }

    #[test]
    fn test_newest_backup_is_one() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(LOG_FILE_NAME);
        let mut file = RotatingFile::open(&path, 30, 3).unwrap();

        file.write_all(b"first entry of the log\n").unwrap();
        file.write_all(b"second entry of the log\n").unwrap();
        file.write_all(b"third entry of the log\n").unwrap();
        file.flush().unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "third entry of the log\n");
        assert_eq!(
            fs::read_to_string(file.backup_path(1)).unwrap(),
            "second entry of the log\n"
        );
        assert_eq!(
            fs::read_to_string(file.backup_path(2)).unwrap(),
            "first entry of the log\n"
        );
    }

    #[test]
    fn test_zero_backups_truncates() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(LOG_FILE_NAME);
        let mut file = RotatingFile::open(&path, 100, 0).unwrap();

        write_lines(&mut file, 20);

        assert!(fs::metadata(&path).unwrap().len() <= 100);
        assert!(!file.backup_path(1).exists());
    }

    #[test]
    fn test_zero_max_size_never_rotates() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(LOG_FILE_NAME);
        let mut file = RotatingFile::open(&path, 0, 3).unwrap();

        write_lines(&mut file, 50);

        assert!(fs::metadata(&path).unwrap().len() > 1000);
        assert!(!file.backup_path(1).exists());
    }

    #[test]
    fn test_resumes_size_of_existing_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(LOG_FILE_NAME);
        fs::write(&path, vec![b'x'; 90]).unwrap();

        let mut file = RotatingFile::open(&path, 100, 1).unwrap();
        file.write_all(b"this does not fit\n").unwrap();
        file.flush().unwrap();

        assert_eq!(fs::metadata(file.backup_path(1)).unwrap().len(), 90);
        assert_eq!(fs::read_to_string(&path).unwrap(), "this does not fit\n");
    }

    #[test]
    fn test_events_reach_log_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("logs").join(LOG_FILE_NAME);
        let file = RotatingFileWriter::new(RotatingFile::open(&path, 0, 0).unwrap());
        let log = AppLog::with_writers(Some(file), EnvFilter::new("info"), io::sink);

        {
            let _guard = log.install();
            tracing::info!("Archiving started");
            tracing::debug!("not at info level");
        }

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("INFO"));
        assert!(content.contains("Archiving started"));
        assert!(!content.contains("not at info level"));
    }

    #[test]
    fn test_file_logging_can_be_disabled() {
        let dir = tempdir().unwrap();
        let config = LoggingConfig {
            log_dir: dir.path().join("logs"),
            enable_file_logging: false,
            ..Default::default()
        };

        let log = AppLog::open(&config, true).unwrap();

        assert!(log.file_path().is_none());
        assert!(!dir.path().join("logs").exists());
    }
}
