//! Configuration validation logic
//!
//! Each section validates its own ranges; `Settings::validate` returns the
//! first failure it finds.

use crate::config::error::ConfigError;
use crate::config::settings::{
    FileSettings, HistoryConfig, LockBackend, LockConfig, LoggerSettings, SchedulerConfig,
    Settings,
};

const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

const VALID_LOG_FORMATS: &[&str] = &["full", "compact", "json"];

const VALID_REDIS_SCHEMES: &[&str] = &["redis://", "rediss://", "redis+unix://", "unix://"];

fn check_format(value: &str, field: &str) -> Result<(), ConfigError> {
    if VALID_LOG_FORMATS.contains(&value.to_lowercase().as_str()) {
        return Ok(());
    }
    Err(ConfigError::validation(
        field,
        format!(
            "Invalid log format '{}'. Valid formats are: {}",
            value,
            VALID_LOG_FORMATS.join(", ")
        ),
    ))
}

impl FileSettings {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.enabled && self.path.trim().is_empty() {
            return Err(ConfigError::validation(
                "logger.file.path",
                "File path is required when file logging is enabled.",
            ));
        }
        check_format(&self.format, "logger.file.format")
    }
}

impl LoggerSettings {
    /// Validate logger settings
    ///
    /// # Validation Rules
    /// - Log level must be one of: trace, debug, info, warn, error
    /// - Formats must be one of: full, compact, json
    /// - If file logging is enabled, path must not be empty
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !VALID_LOG_LEVELS.contains(&self.level.to_lowercase().as_str()) {
            return Err(ConfigError::validation(
                "logger.level",
                format!(
                    "Invalid log level '{}'. Valid levels are: {}",
                    self.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            ));
        }

        check_format(&self.console.format, "logger.console.format")?;
        self.file.validate()?;

        Ok(())
    }
}

impl SchedulerConfig {
    /// Validate scheduler tunables
    ///
    /// # Validation Rules
    /// - Tick interval, worker count, caps and batch limits must be at least 1
    /// - Catch-up limit must be at least 1
    /// - Lock TTL must be positive and strictly longer than the execution timeout
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("scheduler.tick_interval_secs", self.tick_interval_secs as usize),
            ("scheduler.worker_count", self.worker_count),
            ("scheduler.max_global_concurrency", self.max_global_concurrency),
            ("scheduler.max_per_owner_concurrency", self.max_per_owner_concurrency),
            ("scheduler.max_batch_size", self.max_batch_size),
            ("scheduler.due_batch_limit", self.due_batch_limit),
            ("scheduler.catch_up_limit", self.catch_up_limit),
            ("scheduler.lock_ttl_secs", self.lock_ttl_secs as usize),
        ];
        for (field, value) in positive {
            if value == 0 {
                return Err(ConfigError::validation(field, "Value must be greater than 0."));
            }
        }

        if self.execution_timeout_secs == Some(0) {
            return Err(ConfigError::validation(
                "scheduler.execution_timeout_secs",
                "Execution timeout must be greater than 0 seconds; omit it to disable.",
            ));
        }

        if let Some(timeout) = self.execution_timeout_secs.filter(|t| self.lock_ttl_secs <= *t) {
            return Err(ConfigError::validation(
                "scheduler.lock_ttl_secs",
                format!(
                    "Lock TTL ({}s) must exceed the execution timeout ({}s), otherwise a \
                     running job can lose its lock.",
                    self.lock_ttl_secs, timeout
                ),
            ));
        }

        Ok(())
    }
}

impl LockConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.backend != LockBackend::Redis {
            return Ok(());
        }

        let url = self.redis.url.trim();
        if url.is_empty() {
            return Err(ConfigError::validation(
                "lock.redis.url",
                "Redis URL is required when the redis lock backend is selected.",
            ));
        }
        if !VALID_REDIS_SCHEMES.iter().any(|scheme| url.starts_with(scheme)) {
            return Err(ConfigError::validation(
                "lock.redis.url",
                format!(
                    "Invalid Redis URL '{}'. Expected one of: {}",
                    url,
                    VALID_REDIS_SCHEMES.join(", ")
                ),
            ));
        }
        if self.redis.pool_size == 0 {
            return Err(ConfigError::validation(
                "lock.redis.pool_size",
                "Pool size must be greater than 0.",
            ));
        }

        Ok(())
    }
}

impl HistoryConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retention_days < 1 {
            return Err(ConfigError::validation(
                "history.retention_days",
                "Retention must be at least 1 day.",
            ));
        }
        if self.cleanup_enabled && self.cleanup_interval_minutes == 0 {
            return Err(ConfigError::validation(
                "history.cleanup_interval_minutes",
                "Cleanup interval must be greater than 0 minutes.",
            ));
        }
        Ok(())
    }
}

impl Settings {
    /// Validate all configuration settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.logger.validate()?;
        self.scheduler.validate()?;
        self.lock.validate()?;
        self.history.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_field(result: Result<(), ConfigError>, expected: &str) {
        match result {
            Err(ConfigError::ValidationError { field, .. }) => assert_eq!(field, expected),
            other => panic!("Expected ValidationError on {}, got {:?}", expected, other),
        }
    }

    #[test]
    fn test_default_settings_valid() {
        assert!(Settings::default().validate().is_ok());
    }

    #[test]
    fn test_logger_settings_invalid_level() {
        let settings = LoggerSettings {
            level: "chatty".to_string(),
            ..Default::default()
        };
        assert_field(settings.validate(), "logger.level");
    }

    #[test]
    fn test_logger_settings_file_enabled_empty_path() {
        let mut settings = LoggerSettings::default();
        settings.file.enabled = true;
        settings.file.path = "  ".to_string();
        assert_field(settings.validate(), "logger.file.path");
    }

    #[test]
    fn test_logger_settings_invalid_console_format() {
        let mut settings = LoggerSettings::default();
        settings.console.format = "pretty".to_string();
        assert_field(settings.validate(), "logger.console.format");
    }

    #[test]
    fn test_scheduler_zero_workers() {
        let config = SchedulerConfig {
            worker_count: 0,
            ..Default::default()
        };
        assert_field(config.validate(), "scheduler.worker_count");
    }

    #[test]
    fn test_scheduler_zero_catch_up_limit() {
        let config = SchedulerConfig {
            catch_up_limit: 0,
            ..Default::default()
        };
        assert_field(config.validate(), "scheduler.catch_up_limit");
    }

    #[test]
    fn test_scheduler_ttl_must_exceed_timeout() {
        let config = SchedulerConfig {
            execution_timeout_secs: Some(600),
            lock_ttl_secs: 600,
            ..Default::default()
        };
        assert_field(config.validate(), "scheduler.lock_ttl_secs");

        let config = SchedulerConfig {
            execution_timeout_secs: Some(300),
            lock_ttl_secs: 600,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_scheduler_zero_timeout_rejected() {
        let config = SchedulerConfig {
            execution_timeout_secs: Some(0),
            ..Default::default()
        };
        assert_field(config.validate(), "scheduler.execution_timeout_secs");
    }

    #[test]
    fn test_lock_config_memory_ignores_redis_section() {
        let mut config = LockConfig::default();
        config.redis.url = String::new();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_lock_config_redis_requires_url() {
        let mut config = LockConfig {
            backend: LockBackend::Redis,
            ..Default::default()
        };
        config.redis.url = String::new();
        assert_field(config.validate(), "lock.redis.url");

        config.redis.url = "http://localhost".to_string();
        assert_field(config.validate(), "lock.redis.url");

        config.redis.url = "rediss://cache.internal:6380".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_history_retention_must_be_positive() {
        let config = HistoryConfig {
            retention_days: 0,
            ..Default::default()
        };
        assert_field(config.validate(), "history.retention_days");
    }
}
