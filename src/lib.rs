//! Rule-driven file archiver
//!
//! Scans folders, selects files with a rule set, moves the selection into an
//! archive tree and keeps a per-day audit trail of every decision.

pub mod applog;
pub mod audit;
pub mod cli;
pub mod config;
pub mod error;
pub mod execution;
pub mod models;
pub mod rules;
pub mod runner;
pub mod scanner;
pub mod utils;

pub use error::{ArchiveError, ConfigError, Error, Result, ScanError};
