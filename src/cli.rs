//! Command-line argument definitions using clap.

use clap::Parser;
use std::path::PathBuf;

use crate::config::{Overrides, DEFAULT_CONFIG_FILE};
use crate::execution::Layout;
use crate::rules::{FilterRules, SizeSetting};
use crate::runner::RunOptions;

/// Rule-driven file archiver
///
/// Moves files that satisfy every configured rule out of the given folders
/// and records each decision in a daily audit log.
///
/// Creation time uses the file's birth time when the filesystem reports one;
/// otherwise the inode change time stands in and is flagged approximate.
#[derive(Parser, Debug)]
#[command(name = "file-archiver")]
#[command(author, version, about)]
pub struct Cli {
    /// Folders to archive, processed after those in the config file
    pub folders: Vec<PathBuf>,

    /// Settings file [default: settings.json]
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Ignore the settings file entirely
    #[arg(long)]
    pub no_config: bool,

    /// Comma-separated allowed extensions (e.g. .pdf,.docx)
    #[arg(long)]
    pub extensions: Option<String>,

    /// Maximum file size (e.g. 10MB, 500KB)
    #[arg(long)]
    pub size_limit: Option<String>,

    /// Minimum file size (e.g. 1MB, 100KB)
    #[arg(long)]
    pub min_size: Option<String>,

    /// Only archive files last modified at least this many days ago
    #[arg(long)]
    pub modified_days: Option<u32>,

    /// Only archive files created at least this many days ago
    #[arg(long)]
    pub created_days: Option<u32>,

    /// Regex the file name must match
    #[arg(long)]
    pub regex: Option<String>,

    /// Comma-separated exclusion patterns (substring, or * and ? wildcards)
    #[arg(long)]
    pub exclude: Option<String>,

    /// Stop at the first error
    #[arg(long)]
    pub strict: bool,

    /// Report what would be archived without moving anything
    #[arg(long)]
    pub dry_run: bool,

    /// Debug logging and one line per decision on stdout
    #[arg(short, long)]
    pub verbose: bool,

    /// Destination root (default: a timestamped folder inside each source)
    #[arg(long)]
    pub dest: Option<PathBuf>,

    /// Put archived files directly under the destination, without subfolders
    #[arg(long)]
    pub flat: bool,

    /// Follow symbolic links while scanning
    #[arg(long)]
    pub follow_symlinks: bool,

    /// Delete audit files older than the retention period and exit
    #[arg(long)]
    pub prune_audit: bool,
}

impl Cli {
    /// Settings path, and whether it was named explicitly. Only an explicit
    /// file is required to exist.
    pub fn config_file(&self) -> (PathBuf, bool) {
        match &self.config {
            Some(path) => (path.clone(), true),
            None => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
        }
    }

    /// Filter keys given on the command line; unset flags stay `None`.
    pub fn filter_rules(&self) -> FilterRules {
        FilterRules {
            extensions: self.extensions.as_deref().map(split_list),
            size_limit: self.size_limit.clone().map(SizeSetting::Text),
            min_size: self.min_size.clone().map(SizeSetting::Text),
            modified_days: self.modified_days,
            created_days: self.created_days,
            regex: self.regex.clone(),
            exclude: self.exclude.as_deref().map(split_list),
        }
    }

    pub fn overrides(&self) -> Overrides {
        Overrides {
            filters: self.filter_rules(),
            folders: self.folders.clone(),
            destination: self.dest.clone(),
        }
    }

    pub fn run_options(&self) -> RunOptions {
        RunOptions {
            strict: self.strict,
            dry_run: self.dry_run,
            layout: if self.flat { Layout::Flat } else { Layout::Mirror },
            follow_symlinks: self.follow_symlinks,
            verbose: self.verbose,
        }
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::parse_from(std::iter::once("file-archiver").chain(args.iter().copied()))
    }

    #[test]
    fn test_defaults() {
        let cli = parse(&[]);
        assert_eq!(cli.config_file(), (PathBuf::from("settings.json"), false));
        assert!(cli.folders.is_empty());
        assert_eq!(cli.filter_rules(), FilterRules::default());
        assert_eq!(cli.run_options().layout, Layout::Mirror);
    }

    #[test]
    fn test_filter_flags() {
        let cli = parse(&[
            "/data/inbox",
            "--extensions",
            ".pdf, .docx,",
            "--size-limit",
            "10MB",
            "--modified-days",
            "30",
            "--exclude",
            "~$,draft",
            "--strict",
            "--flat",
        ]);
        let rules = cli.filter_rules();

        assert_eq!(cli.folders, vec![PathBuf::from("/data/inbox")]);
        assert_eq!(
            rules.extensions,
            Some(vec![".pdf".to_string(), ".docx".to_string()])
        );
        assert_eq!(rules.size_limit, Some(SizeSetting::Text("10MB".to_string())));
        assert_eq!(rules.modified_days, Some(30));
        assert_eq!(
            rules.exclude,
            Some(vec!["~$".to_string(), "draft".to_string()])
        );
        let options = cli.run_options();
        assert!(options.strict);
        assert_eq!(options.layout, Layout::Flat);
    }

    #[test]
    fn test_explicit_config_is_required() {
        let cli = parse(&["-c", "settings.json"]);
        assert_eq!(cli.config_file(), (PathBuf::from("settings.json"), true));
    }

    #[test]
    fn test_rejects_negative_days() {
        let result = Cli::try_parse_from(["file-archiver", "--modified-days", "-3"]);
        assert!(result.is_err());
    }
}
