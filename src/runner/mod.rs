//! Run orchestration
//!
//! A run walks each job's folder, evaluates every scanned entry, archives the
//! matches and writes one audit line per decision and archive attempt.
//! Records are handled one at a time: a record is evaluated and, if it
//! matched, archived before the next one is pulled from the scanner.
//!
//! Strict mode stops the whole run at the first ERROR or FAILED entry.
//! Otherwise failures are counted and the run carries on. A cancel request
//! is honored between records; the record in flight always completes.

use chrono::{DateTime, Utc};
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::audit::{AuditLog, AuditRecord, EventKind, Outcome};
use crate::config::ArchiveJob;
use crate::error::ScanError;
use crate::execution::{Archiver, Layout};
use crate::models::{ArchiveOutcome, Decision, FileRecord, RunStatus, RunSummary};
use crate::rules::Evaluator;
use crate::scanner::Scanner;

/// Behavior switches for a run
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    pub strict: bool,
    pub dry_run: bool,
    pub layout: Layout,
    pub follow_symlinks: bool,
    /// Report every decision to the reporter
    pub verbose: bool,
}

/// Shared cancellation request, set from a signal handler.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Init,
    Scanning,
    Evaluating,
    Archiving,
    Skipping,
    ErrorHandling,
    Summarizing,
    Done,
}

/// Bookkeeping for the run in progress
struct RunState {
    summary: RunSummary,
    started: Instant,
    now: DateTime<Utc>,
}

impl RunState {
    fn stopped(&self) -> bool {
        self.summary.status != RunStatus::Completed
    }
}

pub struct Runner {
    options: RunOptions,
    audit: AuditLog,
    cancel: CancelFlag,
    reporter: Option<Box<dyn Write + Send>>,
    skip_dirs: Vec<PathBuf>,
    state: State,
}

impl Runner {
    pub fn new(audit: AuditLog, options: RunOptions) -> Self {
        let audit_dir = audit.dir().to_path_buf();
        Self {
            options,
            audit,
            cancel: CancelFlag::new(),
            reporter: None,
            skip_dirs: vec![audit_dir],
            state: State::Init,
        }
    }

    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Where per-decision lines go in verbose mode.
    pub fn with_reporter(mut self, reporter: Box<dyn Write + Send>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    /// Never scan `dir`, in any job.
    pub fn skip_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.skip_dirs.push(dir.into());
        self
    }

    /// Process every job in order, scanning each job's root.
    pub fn run(&mut self, jobs: &[ArchiveJob]) -> RunSummary {
        let mut run = self.begin(jobs.len());
        for job in jobs {
            if run.stopped() {
                break;
            }
            if self.cancel.is_cancelled() {
                run.summary.status = RunStatus::Interrupted;
                break;
            }
            let items = self.scanner_for(job).scan();
            self.process_folder(&mut run, job, items);
        }
        self.finish(run)
    }

    /// Process one job over an arbitrary sequence of scanned entries.
    pub fn process<I>(&mut self, job: &ArchiveJob, items: I) -> RunSummary
    where
        I: IntoIterator<Item = Result<FileRecord, ScanError>>,
    {
        let mut run = self.begin(1);
        self.process_folder(&mut run, job, items);
        self.finish(run)
    }

    fn scanner_for(&self, job: &ArchiveJob) -> Scanner {
        self.skip_dirs.iter().fold(
            Scanner::new(&job.root)
                .follow_symlinks(self.options.follow_symlinks)
                .skip_dir(&job.destination),
            |scanner, dir| scanner.skip_dir(dir),
        )
    }

    fn begin(&mut self, folders: usize) -> RunState {
        self.state = State::Init;
        let run_id = uuid::Uuid::new_v4().to_string();
        let mut run = RunState {
            summary: RunSummary::new(run_id),
            started: Instant::now(),
            now: Utc::now(),
        };
        run.summary.folders = folders;

        tracing::info!(
            run_id = %run.summary.run_id,
            folders,
            strict = self.options.strict,
            dry_run = self.options.dry_run,
            "Archive run started"
        );
        let detail = format!(
            "run_id={} folders={} strict={} dry_run={}",
            run.summary.run_id, folders, self.options.strict, self.options.dry_run
        );
        self.log_event(&mut run, AuditRecord::new(EventKind::RunStart, Outcome::Started).detail(detail));
        run
    }

    fn process_folder<I>(&mut self, run: &mut RunState, job: &ArchiveJob, items: I)
    where
        I: IntoIterator<Item = Result<FileRecord, ScanError>>,
    {
        if run.stopped() {
            return;
        }
        let folder_started = Instant::now();
        let before = run.summary.clone();

        tracing::info!(
            folder = %job.root.display(),
            destination = %job.destination.display(),
            rules = %job.filters.describe(),
            "Processing folder"
        );
        self.log_event(
            run,
            AuditRecord::new(EventKind::FolderStart, Outcome::Started)
                .path(&job.root)
                .detail(format!(
                    "destination={} rules={}",
                    job.destination.display(),
                    job.filters.describe()
                )),
        );

        let evaluator = Evaluator::new(&job.filters, run.now);
        let archiver = Archiver::new(&job.root, &job.destination, self.options.layout, self.options.dry_run);

        self.transition(State::Scanning);
        for item in items {
            if self.cancel.is_cancelled() {
                tracing::warn!("Interrupted, leaving remaining files in place");
                run.summary.status = RunStatus::Interrupted;
                break;
            }

            self.transition(State::Evaluating);
            let evaluated = Instant::now();
            run.summary.scanned += 1;
            let decision = evaluator.decide(item);
            let eval_ms = evaluated.elapsed().as_millis() as u64;

            match decision {
                Decision::Match(record) => {
                    run.summary.matched += 1;
                    self.transition(State::Archiving);
                    self.archive(run, &archiver, &record);
                }
                Decision::Skip(record, reason) => {
                    run.summary.skipped += 1;
                    self.transition(State::Skipping);
                    let reason = reason.to_string();
                    tracing::debug!(path = %record.path.display(), %reason, "Skipped");
                    self.report(&format!("SKIP    {} ({})", record.path.display(), reason));
                    self.log_event(
                        run,
                        AuditRecord::new(EventKind::FileSkip, Outcome::Skipped)
                            .path(&record.path)
                            .duration_ms(eval_ms)
                            .detail(reason),
                    );
                }
                Decision::Error { path, reason } => {
                    run.summary.failed += 1;
                    self.transition(State::ErrorHandling);
                    tracing::warn!(path = %path.display(), %reason, "Cannot evaluate entry");
                    self.report(&format!("ERROR   {} ({})", path.display(), reason));
                    self.log_event(
                        run,
                        AuditRecord::new(EventKind::FileError, Outcome::Error)
                            .path(&path)
                            .duration_ms(eval_ms)
                            .detail(reason.clone()),
                    );
                    self.strict_abort(run, &format!("{}: {}", path.display(), reason));
                }
            }

            if run.stopped() {
                break;
            }
            self.transition(State::Scanning);
        }

        let archived = run.summary.archived - before.archived;
        let simulated = run.summary.simulated - before.simulated;
        let skipped = run.summary.skipped - before.skipped;
        let failed = run.summary.failed - before.failed;
        tracing::info!(
            folder = %job.root.display(),
            archived,
            simulated,
            skipped,
            failed,
            "Folder done"
        );
        let outcome = status_outcome(run.summary.status);
        self.log_event(
            run,
            AuditRecord::new(EventKind::FolderEnd, outcome)
                .path(&job.root)
                .duration_ms(folder_started.elapsed().as_millis() as u64)
                .detail(format!(
                    "archived={} simulated={} skipped={} failed={}",
                    archived, simulated, skipped, failed
                )),
        );
    }

    fn archive(&mut self, run: &mut RunState, archiver: &Archiver, record: &FileRecord) {
        let result = archiver.archive(record);
        let base = AuditRecord::new(EventKind::FileMove, Outcome::Success)
            .path(&record.path)
            .duration_ms(result.elapsed_ms);

        match &result.outcome {
            ArchiveOutcome::Success => {
                run.summary.archived += 1;
                tracing::debug!(
                    path = %record.path.display(),
                    destination = %result.destination.display(),
                    "Archived"
                );
                self.report(&format!(
                    "MOVE    {} -> {}",
                    record.path.display(),
                    result.destination.display()
                ));
                let entry = base.detail(format!("moved to {}", result.destination.display()));
                self.log_event(run, entry);
            }
            ArchiveOutcome::Simulated => {
                run.summary.simulated += 1;
                self.report(&format!(
                    "DRY-RUN {} -> {}",
                    record.path.display(),
                    result.destination.display()
                ));
                let mut entry =
                    base.detail(format!("would move to {}", result.destination.display()));
                entry.outcome = Outcome::Simulated;
                self.log_event(run, entry);
            }
            ArchiveOutcome::Failed(err) => {
                run.summary.failed += 1;
                self.transition(State::ErrorHandling);
                tracing::error!(path = %record.path.display(), error = %err, "Archive failed");
                self.report(&format!("FAILED  {} ({})", record.path.display(), err));
                let mut entry = base.detail(err.to_string());
                entry.outcome = Outcome::Failed;
                self.log_event(run, entry);
                self.strict_abort(run, &format!("{}: {}", record.path.display(), err));
            }
        }
    }

    fn strict_abort(&mut self, run: &mut RunState, failure: &str) {
        if !self.options.strict {
            return;
        }
        tracing::error!(failure, "Strict mode, aborting run");
        run.summary.status = RunStatus::Aborted;
        run.summary.fatal_errors.push(format!("strict mode: {}", failure));
    }

    fn finish(&mut self, mut run: RunState) -> RunSummary {
        self.transition(State::Summarizing);
        run.summary.elapsed = run.started.elapsed();

        let outcome = status_outcome(run.summary.status);
        let elapsed_ms = run.summary.elapsed.as_millis() as u64;
        let detail = format!("run_id={} {}", run.summary.run_id, run.summary.line());
        self.log_event(
            &mut run,
            AuditRecord::new(EventKind::RunEnd, outcome)
                .duration_ms(elapsed_ms)
                .detail(detail),
        );
        if let Err(err) = self.audit.sync() {
            tracing::error!(error = %err, "Failed to sync audit log");
            run.summary.fatal_errors.push(format!("audit sync failed: {}", err));
        }

        tracing::info!(summary = %run.summary.line(), "Archive run finished");
        self.transition(State::Done);
        run.summary
    }

    /// A lost audit line ends the run: the trail must stay complete.
    fn log_event(&mut self, run: &mut RunState, record: AuditRecord) {
        if let Err(err) = self.audit.write(&record) {
            tracing::error!(error = %err, event = %record.kind, "Failed to write audit entry");
            run.summary
                .fatal_errors
                .push(format!("audit write failed: {}", err));
            if run.summary.status == RunStatus::Completed {
                run.summary.status = RunStatus::Aborted;
            }
        }
    }

    fn report(&mut self, line: &str) {
        if !self.options.verbose {
            return;
        }
        if let Some(reporter) = &mut self.reporter {
            let _ = writeln!(reporter, "{}", line);
        }
    }

    fn transition(&mut self, next: State) {
        if self.state != next {
            tracing::trace!(from = ?self.state, to = ?next, "Runner state");
            self.state = next;
        }
    }
}

fn status_outcome(status: RunStatus) -> Outcome {
    match status {
        RunStatus::Completed => Outcome::Completed,
        RunStatus::Aborted => Outcome::Aborted,
        RunStatus::Interrupted => Outcome::Interrupted,
    }
}
