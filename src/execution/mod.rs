//! Execution Engine Module
//!
//! Applies archive decisions to the filesystem. Dry runs compute the same
//! destinations without touching anything.

pub mod archiver;

pub use archiver::*;
