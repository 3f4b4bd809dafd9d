//! Data carried through a run: scanned records, decisions, archive
//! outcomes and the run summary.

pub mod decision;
pub mod file;

pub use decision::*;
pub use file::*;
