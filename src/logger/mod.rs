//! Logger Module
//!
//! Installs a `tracing-subscriber` registry with:
//! - Console output with color control
//! - File output (append or truncate)
//! - Full, Compact or JSON formatting per output
//!
//! `RUST_LOG` takes precedence over the configured level when it is set.

pub mod config;
pub mod error;

pub use config::*;
pub use error::LoggerError;

use std::fs::{File, OpenOptions};
use std::io::IsTerminal;
use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::{
    EnvFilter, Layer, Registry, fmt, layer::SubscriberExt, util::SubscriberInitExt,
};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Initialize the global subscriber with the given configuration
pub fn init_logger(config: LoggerConfig) -> anyhow::Result<()> {
    config.validate()?;

    let filter = build_filter(&config.level);
    let mut layers: Vec<BoxedLayer> = Vec::new();

    // File layer goes first so console ANSI settings never leak into file output.
    if config.file.enabled {
        let file = open_log_file(&config.file.path, config.file.append)?;
        layers.push(file_layer(config.file.format, file));
    }

    if config.console.enabled {
        let use_ansi = config.console.colored && std::io::stdout().is_terminal();
        layers.push(console_layer(config.console.format, use_ansi));
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()
        .map_err(|e| LoggerError::Init {
            message: e.to_string(),
        })?;

    Ok(())
}

fn build_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Open (and create parent directories for) the log file
pub(crate) fn open_log_file(path: &Path, append: bool) -> Result<File, LoggerError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .append(append)
        .truncate(!append)
        .open(path)?;
    Ok(file)
}

fn file_layer(format: LogFormat, file: File) -> BoxedLayer {
    let writer = Mutex::new(file);
    match format {
        LogFormat::Full => fmt::layer()
            .with_ansi(false)
            .with_target(true)
            .with_writer(writer)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .with_ansi(false)
            .with_target(true)
            .compact()
            .with_writer(writer)
            .boxed(),
        LogFormat::Json => fmt::layer()
            .with_ansi(false)
            .json()
            .with_writer(writer)
            .boxed(),
    }
}

fn console_layer(format: LogFormat, use_ansi: bool) -> BoxedLayer {
    match format {
        LogFormat::Full => fmt::layer()
            .with_ansi(use_ansi)
            .with_target(true)
            .with_level(true)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .with_ansi(use_ansi)
            .with_target(true)
            .compact()
            .boxed(),
        LogFormat::Json => fmt::layer().with_ansi(false).json().boxed(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_open_log_file_creates_parent_dirs() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested/dir/cadence.log");

        let file = open_log_file(&path, true);
        assert!(file.is_ok());
        assert!(path.exists());
    }

    #[test]
    fn test_open_log_file_truncates_when_not_appending() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("cadence.log");
        std::fs::write(&path, "old contents\n").unwrap();

        let mut file = open_log_file(&path, false).unwrap();
        file.write_all(b"new\n").unwrap();
        drop(file);

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "new\n");
    }

    #[test]
    fn test_open_log_file_appends() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("cadence.log");
        std::fs::write(&path, "first\n").unwrap();

        let mut file = open_log_file(&path, true).unwrap();
        file.write_all(b"second\n").unwrap();
        drop(file);

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "first\nsecond\n");
    }

    #[test]
    fn test_init_logger_rejects_invalid_config() {
        let config = LoggerConfig {
            level: "loud".to_string(),
            ..Default::default()
        };
        assert!(init_logger(config).is_err());
    }
}
