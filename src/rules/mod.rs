//! Rule-based file matching.
//!
//! `FilterRules` is the loosely specified form read from settings and flags;
//! `FilterSpec` is the compiled, immutable rule set; `Evaluator` applies it.
//!
//! Rules, checked in this order (the first failing rule decides):
//! - `exclude`: any pattern matching the file name vetoes the file
//! - `extensions`: `.pdf`, `.docx`, ...
//! - `size_limit` / `min_size`: inclusive bounds in bytes
//! - `modified_days` / `created_days`: minimum age
//! - `regex`: searched in the file name

pub mod evaluator;
pub mod spec;

pub use evaluator::*;
pub use spec::*;
