//! Filter settings as written by users, and the compiled rule set.

use regex::Regex;
use serde::Deserialize;
use std::collections::BTreeSet;

use crate::error::ConfigError;
use crate::utils::parse_size;

/// A byte size given either as a number of bytes or as text like "10MB".
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum SizeSetting {
    Bytes(u64),
    Text(String),
}

impl SizeSetting {
    pub fn bytes(&self) -> Result<u64, ConfigError> {
        match self {
            SizeSetting::Bytes(b) => Ok(*b),
            SizeSetting::Text(s) => parse_size(s),
        }
    }
}

/// Unresolved filter settings. `None` means "not set here", so a layer
/// can inherit the value from the layer below it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FilterRules {
    pub extensions: Option<Vec<String>>,
    pub size_limit: Option<SizeSetting>,
    pub min_size: Option<SizeSetting>,
    pub modified_days: Option<u32>,
    pub created_days: Option<u32>,
    pub regex: Option<String>,
    pub exclude: Option<Vec<String>>,
}

impl FilterRules {
    /// Layer `self` over `base`: keys set in `self` win, absent keys inherit.
    pub fn over(&self, base: &FilterRules) -> FilterRules {
        FilterRules {
            extensions: self.extensions.clone().or_else(|| base.extensions.clone()),
            size_limit: self.size_limit.clone().or_else(|| base.size_limit.clone()),
            min_size: self.min_size.clone().or_else(|| base.min_size.clone()),
            modified_days: self.modified_days.or(base.modified_days),
            created_days: self.created_days.or(base.created_days),
            regex: self.regex.clone().or_else(|| base.regex.clone()),
            exclude: self.exclude.clone().or_else(|| base.exclude.clone()),
        }
    }
}

/// One exclusion entry. Plain text matches as a substring of the file name;
/// text containing `*` or `?` must match the whole name as a wildcard.
#[derive(Debug, Clone)]
pub struct ExcludePattern {
    raw: String,
    wildcard: Option<Regex>,
}

impl ExcludePattern {
    pub fn new(raw: &str) -> Result<Self, ConfigError> {
        let wildcard = if raw.contains('*') || raw.contains('?') {
            let mut pattern = String::from("^");
            for c in raw.chars() {
                match c {
                    '*' => pattern.push_str(".*"),
                    '?' => pattern.push('.'),
                    other => pattern.push_str(&regex::escape(&other.to_string())),
                }
            }
            pattern.push('$');
            Some(Regex::new(&pattern).map_err(|source| ConfigError::InvalidExclude {
                pattern: raw.to_string(),
                source,
            })?)
        } else {
            None
        };
        Ok(Self {
            raw: raw.to_string(),
            wildcard,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn matches(&self, file_name: &str) -> bool {
        match &self.wildcard {
            Some(re) => re.is_match(file_name),
            None => file_name.contains(&self.raw),
        }
    }
}

/// Resolved, immutable rule set applied to every record of a folder.
#[derive(Debug, Clone, Default)]
pub struct FilterSpec {
    /// Lower-cased, each with a leading dot
    pub extensions: BTreeSet<String>,
    pub size_limit: Option<u64>,
    pub min_size: Option<u64>,
    pub modified_days: Option<u32>,
    pub created_days: Option<u32>,
    pub regex: Option<Regex>,
    pub exclude: Vec<ExcludePattern>,
}

impl FilterSpec {
    /// Compile settings into a rule set. Invalid sizes, regexes and
    /// wildcards fail here, before any file is scanned.
    pub fn from_rules(rules: &FilterRules) -> Result<Self, ConfigError> {
        let extensions = rules
            .extensions
            .iter()
            .flatten()
            .map(|e| normalize_extension(e))
            .filter(|e| e.len() > 1)
            .collect();

        let size_limit = rules.size_limit.as_ref().map(SizeSetting::bytes).transpose()?;
        let min_size = rules.min_size.as_ref().map(SizeSetting::bytes).transpose()?;

        let regex = rules
            .regex
            .as_deref()
            .map(|pattern| {
                Regex::new(pattern).map_err(|source| ConfigError::InvalidRegex {
                    pattern: pattern.to_string(),
                    source,
                })
            })
            .transpose()?;

        let exclude = rules
            .exclude
            .iter()
            .flatten()
            .map(|p| p.trim())
            .filter(|p| !p.is_empty())
            .map(ExcludePattern::new)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            extensions,
            size_limit,
            min_size,
            modified_days: rules.modified_days,
            created_days: rules.created_days,
            regex,
            exclude,
        })
    }

    /// Short description of the active rules, for the startup log.
    pub fn describe(&self) -> String {
        let mut parts = Vec::new();
        if !self.exclude.is_empty() {
            let patterns: Vec<&str> = self.exclude.iter().map(ExcludePattern::as_str).collect();
            parts.push(format!("exclude=[{}]", patterns.join(",")));
        }
        if !self.extensions.is_empty() {
            let exts: Vec<&str> = self.extensions.iter().map(String::as_str).collect();
            parts.push(format!("extensions=[{}]", exts.join(",")));
        }
        if let Some(limit) = self.size_limit {
            parts.push(format!("size_limit={}", limit));
        }
        if let Some(min) = self.min_size {
            parts.push(format!("min_size={}", min));
        }
        if let Some(days) = self.modified_days {
            parts.push(format!("modified_days={}", days));
        }
        if let Some(days) = self.created_days {
            parts.push(format!("created_days={}", days));
        }
        if let Some(re) = &self.regex {
            parts.push(format!("regex={}", re.as_str()));
        }
        if parts.is_empty() {
            "match all".to_string()
        } else {
            parts.join(" ")
        }
    }
}

/// "PDF", ".pdf" and " .Pdf " all become ".pdf".
pub fn normalize_extension(ext: &str) -> String {
    let trimmed = ext.trim().to_lowercase();
    if trimmed.starts_with('.') {
        trimmed
    } else {
        format!(".{}", trimmed)
    }
}
