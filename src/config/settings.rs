//! Configuration settings structures for cadence-rs
//!
//! Every section deserializes with defaults so a partial `default.toml`
//! (or none at all in tests) still yields a usable `Settings`.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::error::ConfigError;
use crate::jobs::executor::MAX_CATCH_UP_RUNS;
use crate::logger::{ConsoleConfig, FileConfig, LogFormat, LoggerConfig};

// ============================================================================
// Default value functions
// ============================================================================

fn default_app_name() -> String {
    "cadence-rs".to_string()
}

fn default_app_version() -> String {
    crate::pkg_version().to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_log_path() -> String {
    "logs/cadence.log".to_string()
}

fn default_console_format() -> String {
    "full".to_string()
}

fn default_file_format() -> String {
    "json".to_string()
}

fn default_tick_interval_secs() -> u64 {
    30
}

fn default_worker_count() -> usize {
    8
}

fn default_max_global_concurrency() -> usize {
    16
}

fn default_max_per_owner_concurrency() -> usize {
    4
}

fn default_max_batch_size() -> usize {
    100
}

fn default_due_batch_limit() -> usize {
    500
}

fn default_catch_up_limit() -> usize {
    MAX_CATCH_UP_RUNS
}

fn default_lock_wait_ms() -> u64 {
    0
}

fn default_lock_ttl_secs() -> u64 {
    600
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

fn default_redis_pool_size() -> u32 {
    8
}

fn default_redis_connection_timeout() -> u64 {
    5
}

fn default_lock_key_prefix() -> String {
    "cadence:lock".to_string()
}

fn default_retention_days() -> i64 {
    30
}

fn default_cleanup_interval_minutes() -> u64 {
    60
}

// ============================================================================
// Application Configuration
// ============================================================================

/// Application basic information configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationConfig {
    #[serde(default = "default_app_name")]
    pub name: String,

    #[serde(default = "default_app_version")]
    pub version: String,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: default_app_name(),
            version: default_app_version(),
        }
    }
}

// ============================================================================
// Logger Settings
// ============================================================================

/// Console output settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsoleSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_true")]
    pub colored: bool,

    /// Log format: "full", "compact", or "json"
    #[serde(default = "default_console_format")]
    pub format: String,
}

impl Default for ConsoleSettings {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            colored: default_true(),
            format: default_console_format(),
        }
    }
}

/// File output settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSettings {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_log_path")]
    pub path: String,

    /// Append to an existing file instead of truncating it
    #[serde(default = "default_true")]
    pub append: bool,

    /// Log format: "full", "compact", or "json"
    #[serde(default = "default_file_format")]
    pub format: String,
}

impl Default for FileSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            path: default_log_path(),
            append: default_true(),
            format: default_file_format(),
        }
    }
}

/// Logger configuration settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggerSettings {
    /// Log level: "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub console: ConsoleSettings,

    #[serde(default)]
    pub file: FileSettings,
}

impl Default for LoggerSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            console: ConsoleSettings::default(),
            file: FileSettings::default(),
        }
    }
}

impl LoggerSettings {
    /// Convert the file representation into the runtime `LoggerConfig`
    pub fn into_logger_config(self) -> Result<LoggerConfig, ConfigError> {
        let console_format = parse_format(&self.console.format, "logger.console.format")?;
        let file_format = parse_format(&self.file.format, "logger.file.format")?;

        let console = ConsoleConfig::new(self.console.enabled, self.console.colored, console_format);
        let file = FileConfig::new(
            self.file.enabled,
            PathBuf::from(self.file.path),
            self.file.append,
            file_format,
        )
        .map_err(|e| ConfigError::validation("logger.file", e.to_string()))?;

        LoggerConfig::new(console, file, self.level)
            .map_err(|e| ConfigError::validation("logger", e.to_string()))
    }
}

fn parse_format(value: &str, field: &str) -> Result<LogFormat, ConfigError> {
    value
        .parse::<LogFormat>()
        .map_err(|e| ConfigError::validation(field, e.to_string()))
}

// ============================================================================
// Scheduler Configuration
// ============================================================================

/// Driver, executor and admission-control tunables
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Whether the daemon starts the tick loop at all
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Seconds between driver ticks; also the finest useful scheduling granularity
    #[serde(default = "default_tick_interval_secs")]
    pub tick_interval_secs: u64,

    /// Size of the bounded worker pool executing admitted jobs
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,

    #[serde(default = "default_max_global_concurrency")]
    pub max_global_concurrency: usize,

    #[serde(default = "default_max_per_owner_concurrency")]
    pub max_per_owner_concurrency: usize,

    /// Upper bound on ids accepted by bulk pause/resume/cancel
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,

    /// Maximum due jobs fetched per tick
    #[serde(default = "default_due_batch_limit")]
    pub due_batch_limit: usize,

    /// Catch-up runs allowed for RUN_ALL missed policy
    #[serde(default = "default_catch_up_limit")]
    pub catch_up_limit: usize,

    /// Execution timeout; unset means runs are never forced to FAILED
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_timeout_secs: Option<u64>,

    /// How long an executor waits for a contended lock before recording SKIPPED
    #[serde(default = "default_lock_wait_ms")]
    pub lock_wait_ms: u64,

    /// Lock TTL; must exceed the worst-case job runtime
    #[serde(default = "default_lock_ttl_secs")]
    pub lock_ttl_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            tick_interval_secs: default_tick_interval_secs(),
            worker_count: default_worker_count(),
            max_global_concurrency: default_max_global_concurrency(),
            max_per_owner_concurrency: default_max_per_owner_concurrency(),
            max_batch_size: default_max_batch_size(),
            due_batch_limit: default_due_batch_limit(),
            catch_up_limit: default_catch_up_limit(),
            execution_timeout_secs: None,
            lock_wait_ms: default_lock_wait_ms(),
            lock_ttl_secs: default_lock_ttl_secs(),
        }
    }
}

impl SchedulerConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs)
    }

    pub fn execution_timeout(&self) -> Option<Duration> {
        self.execution_timeout_secs.map(Duration::from_secs)
    }

    pub fn lock_wait(&self) -> Duration {
        Duration::from_millis(self.lock_wait_ms)
    }

    pub fn lock_ttl(&self) -> Duration {
        Duration::from_secs(self.lock_ttl_secs)
    }
}

// ============================================================================
// Lock Configuration
// ============================================================================

/// Lock store backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LockBackend {
    /// Single-process lock table
    #[default]
    Memory,
    /// Shared Redis instance, for multi-process deployments
    Redis,
}

/// Redis lock store configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedisLockConfig {
    #[serde(default = "default_redis_url")]
    pub url: String,

    #[serde(default = "default_redis_pool_size")]
    pub pool_size: u32,

    /// Connection timeout in seconds
    #[serde(default = "default_redis_connection_timeout")]
    pub connection_timeout: u64,

    #[serde(default = "default_lock_key_prefix")]
    pub key_prefix: String,
}

impl Default for RedisLockConfig {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
            pool_size: default_redis_pool_size(),
            connection_timeout: default_redis_connection_timeout(),
            key_prefix: default_lock_key_prefix(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct LockConfig {
    #[serde(default)]
    pub backend: LockBackend,

    #[serde(default)]
    pub redis: RedisLockConfig,
}

// ============================================================================
// Execution History Configuration
// ============================================================================

/// Retention of terminal execution records
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Register the built-in cleanup job at startup
    #[serde(default = "default_true")]
    pub cleanup_enabled: bool,

    #[serde(default = "default_retention_days")]
    pub retention_days: i64,

    #[serde(default = "default_cleanup_interval_minutes")]
    pub cleanup_interval_minutes: u64,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            cleanup_enabled: default_true(),
            retention_days: default_retention_days(),
            cleanup_interval_minutes: default_cleanup_interval_minutes(),
        }
    }
}

// ============================================================================
// Main Settings Structure
// ============================================================================

/// Complete application settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub application: ApplicationConfig,

    #[serde(default)]
    pub logger: LoggerSettings,

    #[serde(default)]
    pub scheduler: SchedulerConfig,

    #[serde(default)]
    pub lock: LockConfig,

    #[serde(default)]
    pub history: HistoryConfig,
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    // ========================================================================
    // Strategies for property-based testing
    // ========================================================================

    fn arb_application_config() -> impl Strategy<Value = ApplicationConfig> {
        ("[a-z][a-z0-9-]{0,20}", "[0-9]{1,2}\\.[0-9]{1,2}\\.[0-9]{1,2}")
            .prop_map(|(name, version)| ApplicationConfig { name, version })
    }

    fn arb_format() -> impl Strategy<Value = String> {
        prop_oneof![Just("full"), Just("compact"), Just("json")].prop_map(String::from)
    }

    fn arb_logger_settings() -> impl Strategy<Value = LoggerSettings> {
        (
            prop_oneof![Just("trace"), Just("debug"), Just("info"), Just("warn"), Just("error")],
            any::<bool>(),
            any::<bool>(),
            arb_format(),
            any::<bool>(),
            "[a-z]{1,10}/[a-z]{1,10}\\.log",
            any::<bool>(),
            arb_format(),
        )
            .prop_map(
                |(level, c_enabled, colored, c_format, f_enabled, path, append, f_format)| {
                    LoggerSettings {
                        level: level.to_string(),
                        console: ConsoleSettings {
                            enabled: c_enabled,
                            colored,
                            format: c_format,
                        },
                        file: FileSettings {
                            enabled: f_enabled,
                            path,
                            append,
                            format: f_format,
                        },
                    }
                },
            )
    }

    fn arb_scheduler_config() -> impl Strategy<Value = SchedulerConfig> {
        (
            any::<bool>(),
            1u64..3600,
            1usize..64,
            1usize..256,
            1usize..32,
            1usize..1000,
            1usize..5000,
            0usize..20,
            proptest::option::of(1u64..600),
            0u64..5000,
            601u64..7200,
        )
            .prop_map(
                |(
                    enabled,
                    tick_interval_secs,
                    worker_count,
                    max_global_concurrency,
                    max_per_owner_concurrency,
                    max_batch_size,
                    due_batch_limit,
                    catch_up_limit,
                    execution_timeout_secs,
                    lock_wait_ms,
                    lock_ttl_secs,
                )| SchedulerConfig {
                    enabled,
                    tick_interval_secs,
                    worker_count,
                    max_global_concurrency,
                    max_per_owner_concurrency,
                    max_batch_size,
                    due_batch_limit,
                    catch_up_limit,
                    execution_timeout_secs,
                    lock_wait_ms,
                    lock_ttl_secs,
                },
            )
    }

    fn arb_lock_config() -> impl Strategy<Value = LockConfig> {
        (
            prop_oneof![Just(LockBackend::Memory), Just(LockBackend::Redis)],
            "redis://[a-z]{1,10}:[0-9]{4}",
            1u32..64,
            1u64..60,
            "[a-z]{1,10}:[a-z]{1,10}",
        )
            .prop_map(|(backend, url, pool_size, connection_timeout, key_prefix)| LockConfig {
                backend,
                redis: RedisLockConfig {
                    url,
                    pool_size,
                    connection_timeout,
                    key_prefix,
                },
            })
    }

    fn arb_history_config() -> impl Strategy<Value = HistoryConfig> {
        (any::<bool>(), 1i64..3650, 1u64..1440).prop_map(
            |(cleanup_enabled, retention_days, cleanup_interval_minutes)| HistoryConfig {
                cleanup_enabled,
                retention_days,
                cleanup_interval_minutes,
            },
        )
    }

    fn arb_settings() -> impl Strategy<Value = Settings> {
        (
            arb_application_config(),
            arb_logger_settings(),
            arb_scheduler_config(),
            arb_lock_config(),
            arb_history_config(),
        )
            .prop_map(|(application, logger, scheduler, lock, history)| Settings {
                application,
                logger,
                scheduler,
                lock,
                history,
            })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_settings_round_trip_serialization(settings in arb_settings()) {
            let toml_str = toml::to_string(&settings)
                .expect("Settings should serialize to TOML");
            let deserialized: Settings = toml::from_str(&toml_str)
                .expect("TOML should deserialize back to Settings");
            prop_assert_eq!(settings, deserialized);
        }
    }

    #[test]
    fn test_scheduler_config_defaults() {
        let config = SchedulerConfig::default();
        assert!(config.enabled);
        assert_eq!(config.tick_interval_secs, 30);
        assert_eq!(config.catch_up_limit, 5);
        assert_eq!(config.execution_timeout(), None);
        assert_eq!(config.lock_ttl(), Duration::from_secs(600));
    }

    #[test]
    fn test_empty_toml_yields_defaults() {
        let settings: Settings = toml::from_str("").unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.lock.backend, LockBackend::Memory);
    }

    #[test]
    fn test_lock_backend_parses_lowercase() {
        let settings: Settings = toml::from_str("[lock]\nbackend = \"redis\"\n").unwrap();
        assert_eq!(settings.lock.backend, LockBackend::Redis);
        assert_eq!(settings.lock.redis.key_prefix, "cadence:lock");
    }

    #[test]
    fn test_into_logger_config() {
        let mut settings = LoggerSettings::default();
        settings.console.format = "compact".to_string();
        let config = settings.into_logger_config().unwrap();
        assert_eq!(config.console.format, LogFormat::Compact);
        assert_eq!(config.file.format, LogFormat::Json);
    }

    #[test]
    fn test_into_logger_config_rejects_bad_format() {
        let mut settings = LoggerSettings::default();
        settings.file.format = "yaml".to_string();
        let err = settings.into_logger_config().unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError { ref field, .. } if field == "logger.file.format"));
    }
}
