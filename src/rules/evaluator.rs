//! Rule evaluation against scanned records.
//!
//! Rules are checked in a fixed order and the first failing rule decides the
//! skip reason, so audit messages are predictable for a given file.

use chrono::{DateTime, Duration, Utc};

use super::spec::FilterSpec;
use crate::error::ScanError;
use crate::models::{Decision, FileRecord, SkipReason};

/// Applies one rule set with a fixed reference time.
pub struct Evaluator<'a> {
    spec: &'a FilterSpec,
    now: DateTime<Utc>,
}

impl<'a> Evaluator<'a> {
    pub fn new(spec: &'a FilterSpec, now: DateTime<Utc>) -> Self {
        Self { spec, now }
    }

    /// Classify a record as MATCH or SKIP.
    pub fn evaluate(&self, record: FileRecord) -> Decision {
        match self.first_failing_rule(&record) {
            Some(reason) => Decision::Skip(record, reason),
            None => Decision::Match(record),
        }
    }

    /// Classify a scanner item; scan failures become ERROR decisions.
    pub fn decide(&self, item: Result<FileRecord, ScanError>) -> Decision {
        match item {
            Ok(record) => self.evaluate(record),
            Err(err) => Decision::Error {
                path: err.path().clone(),
                reason: err.to_string(),
            },
        }
    }

    fn first_failing_rule(&self, record: &FileRecord) -> Option<SkipReason> {
        let spec = self.spec;

        if let Some(pattern) = spec.exclude.iter().find(|p| p.matches(&record.name)) {
            return Some(SkipReason::Excluded {
                pattern: pattern.as_str().to_string(),
            });
        }

        if !spec.extensions.is_empty() && !spec.extensions.contains(&record.extension) {
            return Some(SkipReason::Extension {
                extension: record.extension.clone(),
            });
        }

        if let Some(limit) = spec.size_limit {
            if record.size > limit {
                return Some(SkipReason::TooLarge {
                    size: record.size,
                    limit,
                });
            }
        }
        if let Some(min) = spec.min_size {
            if record.size < min {
                return Some(SkipReason::TooSmall {
                    size: record.size,
                    min,
                });
            }
        }

        if let Some(days) = spec.modified_days {
            if !self.is_older_than(record.modified_at, days) {
                return Some(SkipReason::ModifiedRecently { days });
            }
        }

        if let Some(days) = spec.created_days {
            if !self.is_older_than(record.created_at, days) {
                return Some(SkipReason::CreatedRecently {
                    days,
                    approximate: record.created_source.is_approximate(),
                });
            }
        }

        if let Some(re) = &spec.regex {
            if !re.is_match(&record.name) {
                return Some(SkipReason::NameMismatch {
                    pattern: re.as_str().to_string(),
                });
            }
        }

        None
    }

    fn is_older_than(&self, time: DateTime<Utc>, days: u32) -> bool {
        self.now.signed_duration_since(time) >= Duration::days(i64::from(days))
    }
}

/// Evaluate a single record against `spec` using the current time.
pub fn evaluate(record: FileRecord, spec: &FilterSpec) -> Decision {
    Evaluator::new(spec, Utc::now()).evaluate(record)
}
