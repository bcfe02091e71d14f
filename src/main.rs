use clap::Parser;

use cadence_rs::cli::{
    Cli, Commands, execute_command, init_logger_from_settings, load_and_merge_config,
};
use cadence_rs::config::Settings;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // preview is a pure computation: no config files, no log output on stdout
    let settings = if matches!(cli.command, Some(Commands::Preview { .. })) {
        Settings::default()
    } else {
        let settings = load_and_merge_config(&cli)?;
        init_logger_from_settings(&settings)?;
        tracing::debug!(version = cadence_rs::pkg_version(), "Logger initialized");
        settings
    };

    execute_command(cli, settings).await
}
