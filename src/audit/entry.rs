use chrono::{DateTime, Local};
use std::fmt;
use std::path::Path;

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    RunStart,
    RunEnd,
    FolderStart,
    FolderEnd,
    FileMove,
    FileSkip,
    FileError,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::RunStart => "RUN_START",
            EventKind::RunEnd => "RUN_END",
            EventKind::FolderStart => "FOLDER_START",
            EventKind::FolderEnd => "FOLDER_END",
            EventKind::FileMove => "FILE_MOVE",
            EventKind::FileSkip => "FILE_SKIP",
            EventKind::FileError => "FILE_ERROR",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failed,
    Simulated,
    Skipped,
    Error,
    Started,
    Completed,
    Aborted,
    Interrupted,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Success => "SUCCESS",
            Outcome::Failed => "FAILED",
            Outcome::Simulated => "SIMULATED",
            Outcome::Skipped => "SKIPPED",
            Outcome::Error => "ERROR",
            Outcome::Started => "STARTED",
            Outcome::Completed => "COMPLETED",
            Outcome::Aborted => "ABORTED",
            Outcome::Interrupted => "INTERRUPTED",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Event as reported by the runner; the log stamps time, host and user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditRecord {
    pub kind: EventKind,
    pub path: String,
    pub outcome: Outcome,
    pub duration_ms: u64,
    pub detail: String,
}

impl AuditRecord {
    pub fn new(kind: EventKind, outcome: Outcome) -> Self {
        Self {
            kind,
            path: String::new(),
            outcome,
            duration_ms: 0,
            detail: String::new(),
        }
    }

    pub fn path(mut self, path: &Path) -> Self {
        self.path = path.to_string_lossy().to_string();
        self
    }

    pub fn duration_ms(mut self, ms: u64) -> Self {
        self.duration_ms = ms;
        self
    }

    pub fn detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = detail.into();
        self
    }
}

/// One line of the audit trail
#[derive(Debug, Clone)]
pub struct AuditEntry<'a> {
    pub timestamp: DateTime<Local>,
    pub host: &'a str,
    pub user: &'a str,
    pub record: &'a AuditRecord,
}

impl AuditEntry<'_> {
    /// `timestamp | hostname | username | event_kind | path | outcome | duration_ms | detail`
    pub fn to_line(&self) -> String {
        let r = self.record;
        format!(
            "{} | {} | {} | {} | {} | {} | {}ms | {}",
            self.timestamp.format(TIMESTAMP_FORMAT),
            escape_field(self.host),
            escape_field(self.user),
            r.kind,
            escape_field(&r.path),
            r.outcome,
            r.duration_ms,
            escape_field(&r.detail)
        )
    }
}

/// Escape the field separator and line breaks so one event stays on one line.
pub fn escape_field(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '|' => out.push_str("\\|"),
            '\r' => out.push_str("\\r"),
            '\n' => out.push_str("\\n"),
            other => out.push(other),
        }
    }
    out
}
