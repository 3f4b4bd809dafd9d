//! Settings file and run resolution
//!
//! Settings come from a JSON file (default `settings.json`) and from command
//! line flags. For each folder the filter keys are layered as
//! flag > folder > defaults and compiled into a `FilterSpec` before anything
//! is scanned, so a bad regex or size never reaches the run.

use chrono::{DateTime, Local};
use serde::Deserialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::rules::{FilterRules, FilterSpec};
use crate::scanner::resolve;

pub const DEFAULT_CONFIG_FILE: &str = "settings.json";

/// Folder name used for a destination when none is configured
pub const DESTINATION_STAMP: &str = "%Y-%m-%d_%H-%M-%S";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub log_dir: PathBuf,
    pub max_size_mb: u64,
    pub backup_count: usize,
    pub enable_file_logging: bool,
    /// Size-based rotation of the application log; off means one growing file
    pub enable_rotate: bool,
    pub verbose: bool,
    pub audit_dir: PathBuf,
    pub audit_retention_days: u32,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from("logs"),
            max_size_mb: 10,
            backup_count: 5,
            enable_file_logging: true,
            enable_rotate: true,
            verbose: false,
            audit_dir: PathBuf::from("audit_logs"),
            audit_retention_days: crate::audit::DEFAULT_RETENTION_DAYS,
        }
    }
}

impl LoggingConfig {
    pub fn max_size_bytes(&self) -> u64 {
        self.max_size_mb.saturating_mul(1024 * 1024)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FolderConfig {
    pub path: PathBuf,
    #[serde(default)]
    pub destination: Option<PathBuf>,
    #[serde(default)]
    pub filters: FilterRules,
}

/// Contents of the settings file
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub logging: LoggingConfig,
    pub default_filters: FilterRules,
    pub folders: Vec<FolderConfig>,
}

impl Settings {
    /// Load settings from `path`.
    ///
    /// With `required` false a missing file yields the defaults; any other
    /// read or parse failure is an error either way.
    pub fn load(path: &Path, required: bool) -> Result<Self, ConfigError> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) if err.kind() == io::ErrorKind::NotFound && !required => {
                tracing::debug!(path = %path.display(), "No settings file, using defaults");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        Self::parse(&content, path)
    }

    pub fn parse(content: &str, path: &Path) -> Result<Self, ConfigError> {
        serde_json::from_str(content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Where to archive and how to lay files out, as given on the command line
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub filters: FilterRules,
    pub folders: Vec<PathBuf>,
    pub destination: Option<PathBuf>,
}

/// One folder to process, fully resolved
#[derive(Debug, Clone)]
pub struct ArchiveJob {
    pub root: PathBuf,
    pub destination: PathBuf,
    pub filters: FilterSpec,
}

/// Resolve settings and overrides into the ordered list of jobs.
///
/// Config folders come first, then folders named on the command line.
/// `started` stamps default destinations, once for the whole run.
pub fn resolve_jobs(
    settings: &Settings,
    overrides: &Overrides,
    started: DateTime<Local>,
) -> Result<Vec<ArchiveJob>, ConfigError> {
    let stamp = started.format(DESTINATION_STAMP).to_string();

    let configured = settings.folders.iter().map(|folder| {
        (
            folder.path.clone(),
            folder.destination.clone(),
            folder.filters.clone(),
        )
    });
    let named = overrides
        .folders
        .iter()
        .map(|path| (path.clone(), None, FilterRules::default()));

    let mut jobs = Vec::new();
    for (path, destination, folder_filters) in configured.chain(named) {
        let root = resolve(&expand_home(&path));
        let rules = overrides
            .filters
            .over(&folder_filters.over(&settings.default_filters));
        let filters = FilterSpec::from_rules(&rules)?;

        let destination = match overrides.destination.as_ref().or(destination.as_ref()) {
            Some(dest) => resolve(&expand_home(dest)),
            None => root.join(&stamp),
        };
        if destination == root {
            return Err(ConfigError::DestinationIsSource(destination));
        }

        jobs.push(ArchiveJob {
            root,
            destination,
            filters,
        });
    }

    if jobs.is_empty() {
        return Err(ConfigError::NoFolders);
    }
    Ok(jobs)
}

/// Expand a leading `~` to the home directory.
pub fn expand_home(path: &Path) -> PathBuf {
    let Ok(rest) = path.strip_prefix("~") else {
        return path.to_path_buf();
    };
    match dirs::home_dir() {
        Some(home) => home.join(rest),
        None => path.to_path_buf(),
    }
}
