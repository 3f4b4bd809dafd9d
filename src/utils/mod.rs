//! Shared utility functions
//!
//! Byte-size formatting and parsing plus the durable copy helpers the
//! archiver falls back to when a rename crosses volumes.

pub mod fs;

use crate::error::ConfigError;

const KB: u64 = 1024;
const MB: u64 = KB * 1024;
const GB: u64 = MB * 1024;
const TB: u64 = GB * 1024;

/// Format a byte size as human-readable string
///
/// Examples: "1.2MB", "450KB", "23B", "2.5TB"
pub fn format_size(bytes: u64) -> String {
    if bytes >= TB {
        format!("{:.1}TB", bytes as f64 / TB as f64)
    } else if bytes >= GB {
        format!("{:.1}GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1}MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.0}KB", bytes as f64 / KB as f64)
    } else {
        format!("{}B", bytes)
    }
}

/// Parse a human-readable size such as "10MB", "500 kb" or "2048".
///
/// Units are binary (1KB = 1024 bytes). A bare number is a byte count.
pub fn parse_size(input: &str) -> Result<u64, ConfigError> {
    let invalid = || ConfigError::InvalidSize(input.to_string());
    let normalized = input.trim().to_uppercase();
    if normalized.is_empty() {
        return Err(invalid());
    }

    let split = normalized
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(normalized.len());
    let (number, unit) = normalized.split_at(split);

    let multiplier = match unit.trim() {
        "" | "B" => 1,
        "K" | "KB" => KB,
        "M" | "MB" => MB,
        "G" | "GB" => GB,
        "T" | "TB" => TB,
        _ => return Err(invalid()),
    };

    if number.contains('.') {
        let value: f64 = number.parse().map_err(|_| invalid())?;
        Ok((value * multiplier as f64).round() as u64)
    } else {
        let value: u64 = number.parse().map_err(|_| invalid())?;
        value.checked_mul(multiplier).ok_or_else(invalid)
    }
}
