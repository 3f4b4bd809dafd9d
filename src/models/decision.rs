use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::file::FileRecord;
use crate::error::ArchiveError;
use crate::utils::format_size;

/// Why a record was not selected for archiving
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    Excluded { pattern: String },
    Extension { extension: String },
    TooLarge { size: u64, limit: u64 },
    TooSmall { size: u64, min: u64 },
    ModifiedRecently { days: u32 },
    CreatedRecently { days: u32, approximate: bool },
    NameMismatch { pattern: String },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Excluded { pattern } => write!(f, "excluded by pattern '{}'", pattern),
            SkipReason::Extension { extension } if extension.is_empty() => {
                write!(f, "no extension, not in allowed list")
            }
            SkipReason::Extension { extension } => {
                write!(f, "extension {} not in allowed list", extension)
            }
            SkipReason::TooLarge { size, limit } => write!(
                f,
                "size {} exceeds limit {}",
                format_size(*size),
                format_size(*limit)
            ),
            SkipReason::TooSmall { size, min } => write!(
                f,
                "size {} below minimum {}",
                format_size(*size),
                format_size(*min)
            ),
            SkipReason::ModifiedRecently { days } => {
                write!(f, "modified within the last {} days", days)
            }
            SkipReason::CreatedRecently { days, approximate } => {
                write!(f, "created within the last {} days", days)?;
                if *approximate {
                    write!(f, " (approximate creation time)")?;
                }
                Ok(())
            }
            SkipReason::NameMismatch { pattern } => {
                write!(f, "name does not match regex {}", pattern)
            }
        }
    }
}

/// Terminal classification of one scanned entry
#[derive(Debug, Clone)]
pub enum Decision {
    Match(FileRecord),
    Skip(FileRecord, SkipReason),
    Error { path: PathBuf, reason: String },
}

impl Decision {
    pub fn path(&self) -> &Path {
        match self {
            Decision::Match(record) | Decision::Skip(record, _) => &record.path,
            Decision::Error { path, .. } => path,
        }
    }

    pub fn reason(&self) -> String {
        match self {
            Decision::Match(_) => "all rules satisfied".to_string(),
            Decision::Skip(_, reason) => reason.to_string(),
            Decision::Error { reason, .. } => reason.clone(),
        }
    }

    pub fn is_match(&self) -> bool {
        matches!(self, Decision::Match(_))
    }

    pub fn is_skip(&self) -> bool {
        matches!(self, Decision::Skip(..))
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Decision::Error { .. })
    }
}

/// Outcome of attempting to archive a matched record
#[derive(Debug)]
pub enum ArchiveOutcome {
    Success,
    Failed(ArchiveError),
    Simulated,
}

#[derive(Debug)]
pub struct ArchiveResult {
    pub outcome: ArchiveOutcome,
    /// Path used, or the path a dry run would have used
    pub destination: PathBuf,
    pub elapsed_ms: u64,
}

impl ArchiveResult {
    pub fn is_failed(&self) -> bool {
        matches!(self.outcome, ArchiveOutcome::Failed(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Completed,
    /// Strict mode stopped the run at the first failure
    Aborted,
    Interrupted,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunStatus::Completed => "COMPLETED",
            RunStatus::Aborted => "ABORTED",
            RunStatus::Interrupted => "INTERRUPTED",
        };
        f.write_str(s)
    }
}

/// Aggregate counts for one invocation
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub run_id: String,
    pub folders: usize,
    pub scanned: usize,
    pub matched: usize,
    pub skipped: usize,
    pub archived: usize,
    pub simulated: usize,
    /// ERROR decisions plus FAILED archive attempts
    pub failed: usize,
    pub elapsed: Duration,
    pub status: RunStatus,
    pub fatal_errors: Vec<String>,
}

impl RunSummary {
    pub fn new(run_id: String) -> Self {
        Self {
            run_id,
            folders: 0,
            scanned: 0,
            matched: 0,
            skipped: 0,
            archived: 0,
            simulated: 0,
            failed: 0,
            elapsed: Duration::ZERO,
            status: RunStatus::Completed,
            fatal_errors: Vec::new(),
        }
    }

    /// Process exit status: 0 clean, 1 any failure, 2 interrupted.
    pub fn exit_code(&self) -> u8 {
        match self.status {
            RunStatus::Interrupted => 2,
            RunStatus::Aborted => 1,
            RunStatus::Completed if self.failed > 0 => 1,
            RunStatus::Completed => 0,
        }
    }

    /// One-line summary printed at exit
    pub fn line(&self) -> String {
        format!(
            "scanned={} matched={} archived={} simulated={} skipped={} failed={} elapsed={}ms status={}",
            self.scanned,
            self.matched,
            self.archived,
            self.simulated,
            self.skipped,
            self.failed,
            self.elapsed.as_millis(),
            self.status
        )
    }
}
