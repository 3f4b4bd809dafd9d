//! End-to-end runs through the public API: settings file, job resolution,
//! runner, audit trail.

use std::fs;
use std::path::Path;

use chrono::{Local, TimeZone};
use file_archiver_lib::audit::{AuditLog, ManualClock};
use file_archiver_lib::config::{resolve_jobs, Overrides, Settings};
use file_archiver_lib::models::RunStatus;
use file_archiver_lib::rules::FilterRules;
use file_archiver_lib::runner::{RunOptions, Runner};
use tempfile::tempdir;

fn write_settings(dir: &Path, inbox: &Path, dest: &Path) -> std::path::PathBuf {
    let settings = serde_json::json!({
        "logging": { "audit_dir": dir.join("audit"), "log_dir": dir.join("logs") },
        "default_filters": { "extensions": [".pdf"], "exclude": ["~$"] },
        "folders": [
            { "path": inbox, "destination": dest, "filters": { "min_size": "1KB" } }
        ]
    });
    let path = dir.join("settings.json");
    fs::write(&path, serde_json::to_string_pretty(&settings).unwrap()).unwrap();
    path
}

#[test]
fn settings_file_drives_a_full_run() {
    let dir = tempdir().unwrap();
    let inbox = dir.path().join("inbox");
    let dest = dir.path().join("archive");
    fs::create_dir_all(inbox.join("2024")).unwrap();
    fs::write(inbox.join("2024/report.pdf"), vec![0u8; 4096]).unwrap();
    fs::write(inbox.join("tiny.pdf"), b"x").unwrap();
    fs::write(inbox.join("~$draft.pdf"), vec![0u8; 4096]).unwrap();
    fs::write(inbox.join("notes.txt"), vec![0u8; 4096]).unwrap();

    let settings_path = write_settings(dir.path(), &inbox, &dest);
    let settings = Settings::load(&settings_path, true).unwrap();
    let jobs = resolve_jobs(&settings, &Overrides::default(), Local::now()).unwrap();

    let clock = ManualClock::new(Local.with_ymd_and_hms(2024, 6, 1, 9, 30, 0).unwrap());
    let audit = AuditLog::with_clock(&settings.logging.audit_dir, Box::new(clock))
        .unwrap()
        .with_identity("ws-01", "ops");
    let mut runner = Runner::new(audit, RunOptions::default());
    let summary = runner.run(&jobs);

    assert_eq!(summary.status, RunStatus::Completed);
    assert_eq!(summary.scanned, 4);
    assert_eq!(summary.archived, 1);
    assert_eq!(summary.skipped, 3);
    assert_eq!(summary.exit_code(), 0);
    assert!(dest.join("2024/report.pdf").exists());
    assert!(inbox.join("tiny.pdf").exists());
    assert!(inbox.join("~$draft.pdf").exists());

    drop(runner);
    let trail = fs::read_to_string(
        settings
            .logging
            .audit_dir
            .join("archive_audit.2024-06-01.log"),
    )
    .unwrap();
    let lines: Vec<&str> = trail.lines().collect();
    // RUN_START, FOLDER_START, four decisions, FOLDER_END, RUN_END
    assert_eq!(lines.len(), 8);
    assert!(lines.iter().all(|l| l.starts_with("2024-06-01 09:30:00 | ws-01 | ops | ")));
    assert!(lines
        .iter()
        .any(|l| l.contains("| FILE_SKIP |") && l.contains("excluded by pattern '~$'")));
    assert!(lines
        .iter()
        .any(|l| l.contains("| FILE_SKIP |") && l.contains("below minimum")));
}

#[test]
fn dry_run_then_real_run() {
    let dir = tempdir().unwrap();
    let inbox = dir.path().join("inbox");
    fs::create_dir_all(&inbox).unwrap();
    fs::write(inbox.join("a.pdf"), b"a").unwrap();
    fs::write(inbox.join("b.pdf"), b"b").unwrap();
    let overrides = Overrides {
        folders: vec![inbox.clone()],
        destination: Some(dir.path().join("archive")),
        filters: FilterRules::default(),
    };
    let jobs = resolve_jobs(&Settings::default(), &overrides, Local::now()).unwrap();
    let audit_dir = dir.path().join("audit");

    let dry = RunOptions {
        dry_run: true,
        ..Default::default()
    };
    let preview = Runner::new(AuditLog::open(&audit_dir).unwrap(), dry).run(&jobs);
    let real = Runner::new(AuditLog::open(&audit_dir).unwrap(), RunOptions::default()).run(&jobs);

    assert_eq!(preview.simulated, 2);
    assert_eq!(real.archived, preview.simulated);
    assert!(dir.path().join("archive/a.pdf").exists());
    assert!(!inbox.join("a.pdf").exists());
}

#[test]
fn default_destination_is_not_rescanned() {
    let dir = tempdir().unwrap();
    let inbox = dir.path().join("inbox");
    fs::create_dir_all(&inbox).unwrap();
    fs::write(inbox.join("a.pdf"), b"a").unwrap();
    let overrides = Overrides {
        folders: vec![inbox.clone()],
        ..Default::default()
    };
    let started = Local.with_ymd_and_hms(2024, 6, 1, 9, 30, 0).unwrap();
    let jobs = resolve_jobs(&Settings::default(), &overrides, started).unwrap();
    let audit_dir = dir.path().join("audit");

    let first = Runner::new(AuditLog::open(&audit_dir).unwrap(), RunOptions::default()).run(&jobs);
    let second = Runner::new(AuditLog::open(&audit_dir).unwrap(), RunOptions::default()).run(&jobs);

    assert_eq!(first.archived, 1);
    assert_eq!(second.scanned, 0);
    assert!(jobs[0].destination.join("a.pdf").exists());
    assert!(jobs[0].destination.ends_with("2024-06-01_09-30-00"));
}

#[cfg(unix)]
#[test]
fn followed_file_links_are_left_in_place() {
    let dir = tempdir().unwrap();
    let inbox = dir.path().join("inbox");
    fs::create_dir_all(inbox.join("a")).unwrap();
    fs::create_dir_all(inbox.join("zz")).unwrap();
    fs::write(inbox.join("zz.pdf"), b"late target").unwrap();
    fs::write(inbox.join("b.pdf"), b"early target").unwrap();
    std::os::unix::fs::symlink("../zz.pdf", inbox.join("a/link.pdf")).unwrap();
    std::os::unix::fs::symlink("../b.pdf", inbox.join("zz/link.pdf")).unwrap();
    let overrides = Overrides {
        folders: vec![inbox.clone()],
        destination: Some(dir.path().join("archive")),
        filters: FilterRules::default(),
    };
    let jobs = resolve_jobs(&Settings::default(), &overrides, Local::now()).unwrap();
    let options = RunOptions {
        follow_symlinks: true,
        ..Default::default()
    };

    let summary = Runner::new(AuditLog::open(dir.path().join("audit")).unwrap(), options).run(&jobs);

    assert_eq!(summary.status, RunStatus::Completed);
    assert_eq!(summary.archived, 2);
    assert_eq!(summary.failed, 0);
    assert!(dir.path().join("archive/zz.pdf").exists());
    assert!(dir.path().join("archive/b.pdf").exists());
    assert!(fs::symlink_metadata(inbox.join("a/link.pdf")).unwrap().file_type().is_symlink());
    assert!(fs::symlink_metadata(inbox.join("zz/link.pdf")).unwrap().file_type().is_symlink());
    assert!(!dir.path().join("archive/a").exists());
}
