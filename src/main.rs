use std::io;
use std::process::ExitCode;

use chrono::Local;
use clap::Parser;

use file_archiver_lib::applog::AppLog;
use file_archiver_lib::audit::{prune_audit_logs, AuditLog};
use file_archiver_lib::cli::Cli;
use file_archiver_lib::config::{resolve_jobs, Settings};
use file_archiver_lib::runner::{CancelFlag, Runner};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let settings = if cli.no_config {
        Settings::default()
    } else {
        let (path, explicit) = cli.config_file();
        match Settings::load(&path, explicit) {
            Ok(settings) => settings,
            Err(err) => {
                eprintln!("Error: {}", err);
                return ExitCode::from(1);
            }
        }
    };

    let app_log = match AppLog::open(&settings.logging, cli.verbose) {
        Ok(log) => log,
        Err(err) => {
            eprintln!("Error: {}", err);
            return ExitCode::from(1);
        }
    };

    if cli.prune_audit {
        let _guard = app_log.install();
        let logging = &settings.logging;
        return match prune_audit_logs(
            &logging.audit_dir,
            logging.audit_retention_days,
            Local::now().date_naive(),
        ) {
            Ok(removed) => {
                tracing::info!(removed = removed.len(), "Audit pruning finished");
                println!("pruned={}", removed.len());
                ExitCode::SUCCESS
            }
            Err(err) => {
                tracing::error!(error = %err, "Audit pruning failed");
                ExitCode::from(1)
            }
        };
    }

    let jobs = match resolve_jobs(&settings, &cli.overrides(), Local::now()) {
        Ok(jobs) => jobs,
        Err(err) => {
            let _guard = app_log.install();
            tracing::error!(error = %err, "Invalid configuration");
            eprintln!("Error: {}", err);
            return ExitCode::from(1);
        }
    };

    let cancel = CancelFlag::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_signal.cancel();
        }
    });

    let options = cli.run_options();
    let logging = settings.logging.clone();
    let run = tokio::task::spawn_blocking(move || {
        let _guard = app_log.install();

        let audit = match AuditLog::open(&logging.audit_dir) {
            Ok(audit) => audit,
            Err(err) => {
                tracing::error!(error = %err, "Cannot open audit log");
                return Err(err);
            }
        };

        let mut runner = Runner::new(audit, options)
            .with_cancel(cancel)
            .with_reporter(Box::new(io::stdout()))
            .skip_dir(&logging.log_dir);
        let summary = runner.run(&jobs);
        for fatal in &summary.fatal_errors {
            tracing::error!("{}", fatal);
        }
        Ok(summary)
    })
    .await;

    match run {
        Ok(Ok(summary)) => {
            println!("{}", summary.line());
            ExitCode::from(summary.exit_code())
        }
        Ok(Err(err)) => {
            eprintln!("Error: {}", err);
            ExitCode::from(1)
        }
        Err(err) => {
            eprintln!("Error: archive run panicked: {}", err);
            ExitCode::from(1)
        }
    }
}
