//! Command executor for dispatching CLI commands
//!
//! This module provides the main entry point for executing CLI commands
//! after parsing and configuration loading.

use super::handlers::{PreviewCommandHandler, RunCommandHandler};
use super::parser::{Cli, Commands};
use crate::config::Environment;
use crate::config::settings::Settings;

/// Execute a CLI command with the given settings
///
/// A missing subcommand runs the scheduler with defaults.
///
/// # Errors
/// Returns errors from command handlers or argument validation failures
pub async fn execute_command(cli: Cli, settings: Settings) -> anyhow::Result<()> {
    cli.validate().map_err(anyhow::Error::msg)?;

    let environment = cli.env.map(Environment::from).unwrap_or_else(Environment::from_env);

    match cli.command {
        Some(Commands::Run { jobs, dry_run, .. }) => {
            RunCommandHandler::new(settings, environment)
                .with_jobs_file(jobs)
                .execute(dry_run)
                .await
        }
        None => RunCommandHandler::new(settings, environment).execute(false).await,
        Some(Commands::Preview { rule, count, after }) => {
            PreviewCommandHandler::new(rule, count, after).execute()
        }
    }
}
