//! Configuration management module for cadence-rs
//!
//! Layered configuration loading from TOML files and environment variables.
//!
//! # Configuration Priority (lowest to highest)
//! 1. `default.toml` - Base default configuration
//! 2. `{environment}.toml` - Environment-specific configuration
//! 3. `local.toml` - Local overrides (not committed to version control)
//! 4. `CADENCE_*` environment variables
//! 5. Command line overrides (applied by the CLI)

pub mod environment;
pub mod error;
pub mod loader;
pub mod settings;
pub mod validation;

pub use environment::Environment;
pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use settings::{
    HistoryConfig, LockBackend, LockConfig, RedisLockConfig, SchedulerConfig, Settings,
};
