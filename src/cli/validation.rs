//! CLI argument validation functions
//!
//! This module provides custom validation functions for CLI arguments
//! that go beyond what clap can validate automatically.

use std::fs;
use std::path::PathBuf;

use jiff::Timestamp;

use crate::jobs::RecurrenceRule;

const MAX_TICK_INTERVAL_SECS: u64 = 3600;
const MAX_WORKERS: usize = 1024;
const MAX_PREVIEW_COUNT: usize = 1000;

fn validate_readable_file(path_str: &str, what: &str) -> Result<PathBuf, String> {
    let path = PathBuf::from(path_str);

    if !path.exists() {
        return Err(format!("{} does not exist: '{}'", what, path_str));
    }

    if !path.is_file() {
        return Err(format!("{} path is not a file: '{}'", what, path_str));
    }

    match fs::File::open(&path) {
        Ok(_) => Ok(path),
        Err(e) => Err(format!("Cannot read {} '{}': {}", what.to_lowercase(), path_str, e)),
    }
}

/// Validate that a file path is accessible (exists and is readable)
pub fn validate_config_file_path(path_str: &str) -> Result<PathBuf, String> {
    validate_readable_file(path_str, "Configuration file")
}

/// Validate that the seed jobs file is accessible
pub fn validate_jobs_file_path(path_str: &str) -> Result<PathBuf, String> {
    validate_readable_file(path_str, "Jobs file")
}

/// Validate tick interval is within 1-3600 seconds
pub fn validate_tick_interval(secs_str: &str) -> Result<u64, String> {
    let secs: u64 = secs_str.parse().map_err(|_| {
        format!("Tick interval must be a whole number of seconds, got: '{}'", secs_str)
    })?;

    if secs == 0 || secs > MAX_TICK_INTERVAL_SECS {
        return Err(format!(
            "Tick interval must be between 1 and {} seconds",
            MAX_TICK_INTERVAL_SECS
        ));
    }

    Ok(secs)
}

/// Validate worker count is within 1-1024
pub fn validate_worker_count(count_str: &str) -> Result<usize, String> {
    let count: usize = count_str
        .parse()
        .map_err(|_| format!("Worker count must be a positive number, got: '{}'", count_str))?;

    if count == 0 || count > MAX_WORKERS {
        return Err(format!("Worker count must be between 1 and {}", MAX_WORKERS));
    }

    Ok(count)
}

pub fn validate_preview_count(count_str: &str) -> Result<usize, String> {
    let count: usize = count_str
        .parse()
        .map_err(|_| format!("Count must be a positive number, got: '{}'", count_str))?;

    if count == 0 || count > MAX_PREVIEW_COUNT {
        return Err(format!("Count must be between 1 and {}", MAX_PREVIEW_COUNT));
    }

    Ok(count)
}

/// Parse an RFC 3339 instant such as `2024-01-01T09:00:00Z`
pub fn validate_timestamp(value: &str) -> Result<Timestamp, String> {
    value
        .trim()
        .parse()
        .map_err(|e| format!("Invalid timestamp '{}': {}", value, e))
}

/// Parse a recurrence rule from inline JSON or from a JSON file path.
///
/// Only the shape is checked here; rule semantics are reported by
/// `Cli::validate` so every issue shows up at once.
pub fn validate_rule_json(value: &str) -> Result<RecurrenceRule, String> {
    let trimmed = value.trim();
    let raw = if trimmed.starts_with('{') {
        trimmed.to_string()
    } else {
        let path = validate_readable_file(trimmed, "Rule file")?;
        fs::read_to_string(&path).map_err(|e| format!("Cannot read rule file '{}': {}", trimmed, e))?
    };
    serde_json::from_str(&raw).map_err(|e| format!("Invalid recurrence rule JSON: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    use crate::jobs::Frequency;

    #[test]
    fn test_tick_interval_validation() {
        for valid in ["1", "30", "3600"] {
            assert!(validate_tick_interval(valid).is_ok(), "{} should be valid", valid);
        }
        for invalid in ["0", "3601", "-1", "abc", ""] {
            assert!(validate_tick_interval(invalid).is_err(), "'{}' should be invalid", invalid);
        }
    }

    #[test]
    fn test_worker_count_validation() {
        for valid in ["1", "8", "1024"] {
            assert!(validate_worker_count(valid).is_ok(), "{} should be valid", valid);
        }
        for invalid in ["0", "1025", "-3", "many"] {
            assert!(validate_worker_count(invalid).is_err(), "'{}' should be invalid", invalid);
        }
    }

    #[test]
    fn test_preview_count_validation() {
        assert_eq!(validate_preview_count("10"), Ok(10));
        assert!(validate_preview_count("0").is_err());
        assert!(validate_preview_count("1001").is_err());
    }

    #[test]
    fn test_timestamp_validation() {
        let ts = validate_timestamp("2024-02-29T12:00:00Z").unwrap();
        assert_eq!(ts.to_string(), "2024-02-29T12:00:00Z");
        assert!(validate_timestamp("yesterday").is_err());
    }

    #[test]
    fn test_rule_json_validation() {
        let rule = validate_rule_json(r#"{"frequency":"weekly","days_of_week":[1,4]}"#).unwrap();
        assert_eq!(rule.frequency, Frequency::Weekly);
        assert_eq!(rule.days_of_week, vec![1, 4]);

        let err = validate_rule_json(r#"{"frequency":"fortnightly"}"#).unwrap_err();
        assert!(err.starts_with("Invalid recurrence rule JSON"));
    }

    #[test]
    fn test_rule_json_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"frequency":"monthly","days_of_month":[31]}}"#).unwrap();
        let rule = validate_rule_json(file.path().to_str().unwrap()).unwrap();
        assert_eq!(rule.frequency, Frequency::Monthly);

        let err = validate_rule_json("/no/such/rule.json").unwrap_err();
        assert!(err.starts_with("Rule file does not exist"));
    }

    #[test]
    fn test_file_path_validation() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[]").unwrap();
        let path = file.path().to_str().unwrap();
        assert!(validate_jobs_file_path(path).is_ok());
        assert!(validate_config_file_path(path).is_ok());

        let dir = tempfile::tempdir().unwrap();
        let err = validate_jobs_file_path(dir.path().to_str().unwrap()).unwrap_err();
        assert!(err.contains("is not a file"));

        let err = validate_config_file_path("/definitely/not/here.toml").unwrap_err();
        assert!(err.starts_with("Configuration file does not exist"));
    }
}
