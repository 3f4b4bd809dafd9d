//! Audit trail
//!
//! One pipe-delimited line per event, appended to a file per local calendar
//! day (`archive_audit.YYYY-MM-DD.log`). The trail is the compliance record
//! of a run: every decision and every archive attempt gets a line, and the
//! field order never changes.

pub mod clock;
pub mod entry;
pub mod log;

pub use clock::*;
pub use entry::*;
pub use log::*;
