//! CLI argument parsing with clap
//!
//! This module defines the command-line interface structure using clap,
//! including all commands, arguments, and their documentation.

use clap::{Parser, Subcommand, ValueEnum};
use jiff::Timestamp;
use std::path::PathBuf;

use crate::jobs::RecurrenceRule;

// Include shadow-rs generated build information
use shadow_rs::shadow;
shadow!(build);

/// Recurring job scheduler
#[derive(Parser, Debug)]
#[command(name = "cadence-rs")]
#[command(about = "Recurring job scheduler with locked, bounded execution")]
#[command(long_about = "
Cadence-rs runs recurring and one-time jobs. Each tick it looks up due jobs,
admits them under global and per-owner concurrency caps, executes them under
a per-job lock and records every run in the execution history.

EXAMPLES:
    # Start the scheduler with default configuration
    cadence-rs run

    # Seed jobs from a JSON file and tick every 5 seconds
    cadence-rs run --jobs jobs.json --tick-interval 5

    # Use custom configuration file
    cadence-rs --config /path/to/config.toml run

    # Check configuration and seed jobs without starting
    cadence-rs run --jobs jobs.json --dry-run

    # Show the next 5 firings of a rule
    cadence-rs preview --rule '{\"frequency\":\"weekly\",\"days_of_week\":[1,4],\"time_of_day\":\"09:30\"}' --count 5

For more information about configuration options, see the documentation.
")]
#[command(version = build::CLAP_LONG_VERSION)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Configuration file path
    ///
    /// Specify a custom configuration file to use instead of the layered
    /// defaults. The file must be TOML, exist and be readable.
    ///
    /// Example: --config /etc/cadence-rs/production.toml
    #[arg(short, long, value_name = "FILE", value_parser = super::validation::validate_config_file_path)]
    pub config: Option<PathBuf>,

    /// Override environment detection
    ///
    /// Force the application to use a specific environment configuration.
    /// This affects which configuration files are loaded.
    ///
    /// Available values: development (dev), test, staging, production (prod)
    #[arg(short, long, value_enum)]
    pub env: Option<Environment>,

    /// Enable verbose logging
    ///
    /// Increases log output to debug level.
    /// Cannot be used with --quiet.
    #[arg(short, long)]
    pub verbose: bool,

    /// Suppress non-error output
    ///
    /// Reduces log output to error level only.
    /// Cannot be used with --verbose.
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the scheduler (default)
    ///
    /// Builds the job store and lock backend, creates seed jobs and ticks
    /// until Ctrl+C or SIGTERM, then waits for running jobs to finish.
    ///
    /// Examples:
    ///   cadence-rs run                         # Start with defaults
    ///   cadence-rs run --workers 16            # Allow 16 jobs in flight
    ///   cadence-rs run --dry-run               # Validate config without starting
    Run {
        /// Seconds between scheduler ticks
        ///
        /// Must be between 1 and 3600.
        #[arg(long, value_name = "SECONDS", value_parser = super::validation::validate_tick_interval)]
        tick_interval: Option<u64>,

        /// Number of jobs that may execute at the same time
        ///
        /// Must be between 1 and 1024.
        #[arg(short, long, value_name = "COUNT", value_parser = super::validation::validate_worker_count)]
        workers: Option<usize>,

        /// Log level override
        ///
        /// Overrides both configuration file settings and global --verbose/--quiet flags.
        ///
        /// Available levels: error, warn, info, debug, trace
        #[arg(long, value_enum)]
        log_level: Option<LogLevel>,

        /// JSON file with jobs to create at startup
        #[arg(short, long, value_name = "FILE", value_parser = super::validation::validate_jobs_file_path)]
        jobs: Option<PathBuf>,

        /// Validate configuration and seed jobs, then exit
        #[arg(long)]
        dry_run: bool,
    },
    /// Print upcoming occurrences of a recurrence rule
    ///
    /// Examples:
    ///   cadence-rs preview --rule '{"frequency":"daily","time_of_day":"08:00"}'
    ///   cadence-rs preview --rule '{"frequency":"monthly","days_of_month":[31]}' --count 12
    Preview {
        /// Recurrence rule as JSON text, or a path to a JSON file
        #[arg(short, long, value_name = "JSON", value_parser = super::validation::validate_rule_json)]
        rule: RecurrenceRule,

        /// Number of occurrences to print
        ///
        /// Must be between 1 and 1000.
        #[arg(short = 'n', long, default_value = "10", value_parser = super::validation::validate_preview_count)]
        count: usize,

        /// Start searching after this instant (RFC 3339, default: now)
        #[arg(long, value_name = "TIMESTAMP", value_parser = super::validation::validate_timestamp)]
        after: Option<Timestamp>,
    },
}

/// Environment options
#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum Environment {
    #[value(name = "development", alias = "dev")]
    Development,
    #[value(name = "test")]
    Test,
    #[value(name = "staging")]
    Staging,
    #[value(name = "production", alias = "prod")]
    Production,
}

/// Log level options
#[derive(ValueEnum, Clone, Debug)]
pub enum LogLevel {
    #[value(name = "error")]
    Error,
    #[value(name = "warn", alias = "warning")]
    Warn,
    #[value(name = "info")]
    Info,
    #[value(name = "debug")]
    Debug,
    #[value(name = "trace")]
    Trace,
}

impl Cli {
    /// Validate argument combinations clap cannot express
    pub fn validate(&self) -> Result<(), String> {
        if self.verbose && self.quiet {
            return Err("Cannot use --verbose and --quiet together".to_string());
        }

        if let Some(Commands::Preview { rule, .. }) = &self.command {
            let issues = rule.validate();
            if !issues.is_empty() {
                let reasons: Vec<String> = issues.iter().map(ToString::to_string).collect();
                return Err(format!("Invalid recurrence rule: {}", reasons.join("; ")));
            }
        }

        Ok(())
    }
}

impl From<LogLevel> for String {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => "error".to_string(),
            LogLevel::Warn => "warn".to_string(),
            LogLevel::Info => "info".to_string(),
            LogLevel::Debug => "debug".to_string(),
            LogLevel::Trace => "trace".to_string(),
        }
    }
}

impl From<Environment> for crate::config::Environment {
    fn from(env: Environment) -> Self {
        match env {
            Environment::Development => crate::config::Environment::Development,
            Environment::Test => crate::config::Environment::Test,
            Environment::Staging => crate::config::Environment::Staging,
            Environment::Production => crate::config::Environment::Production,
        }
    }
}
