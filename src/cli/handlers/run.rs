//! Run command handler
//!
//! Handles the run command including dry-run validation and scheduler startup.

use std::path::PathBuf;

use anyhow::Context;
use validator::Validate;

use crate::config::Environment;
use crate::config::settings::Settings;
use crate::daemon::{Daemon, load_seed_jobs};

/// Handler for the run command
pub struct RunCommandHandler {
    config: Settings,
    environment: Environment,
    jobs_file: Option<PathBuf>,
}

impl RunCommandHandler {
    pub fn new(config: Settings, environment: Environment) -> Self {
        Self {
            config,
            environment,
            jobs_file: None,
        }
    }

    pub fn with_jobs_file(mut self, path: Option<PathBuf>) -> Self {
        self.jobs_file = path;
        self
    }

    /// Execute the run command with optional dry-run support
    ///
    /// # Errors
    /// - Configuration or seed job validation errors
    /// - Scheduler startup errors (if not dry-run)
    pub async fn execute(self, dry_run: bool) -> anyhow::Result<()> {
        if dry_run {
            return self.validate_only();
        }

        let mut daemon = Daemon::new(self.config).with_environment(self.environment);
        if let Some(path) = self.jobs_file {
            daemon = daemon.with_seed_file(path);
        }
        daemon.run().await
    }

    /// Validate configuration and seed jobs without starting the scheduler
    pub fn validate_only(&self) -> anyhow::Result<()> {
        self.config.validate()?;

        let scheduler = &self.config.scheduler;
        println!("✓ Configuration is valid ({})", self.environment);
        println!(
            "✓ Scheduler: tick every {}s, {} workers, global cap {}, per-owner cap {}",
            scheduler.tick_interval_secs,
            scheduler.worker_count,
            scheduler.max_global_concurrency,
            scheduler.max_per_owner_concurrency
        );
        println!("✓ Lock backend: {:?}", self.config.lock.backend);

        if let Some(path) = &self.jobs_file {
            let jobs = load_seed_jobs(path)?;
            for (index, job) in jobs.iter().enumerate() {
                job.validate()
                    .with_context(|| format!("Seed job #{} ('{}') is invalid", index, job.name))?;
            }
            println!("✓ {} seed job(s) in '{}'", jobs.len(), path.display());
        }

        println!("Dry run completed successfully - configuration is ready for deployment");
        Ok(())
    }

    pub fn config(&self) -> &Settings {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn jobs_file(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_run_handler_new() {
        let config = Settings::default();
        let handler = RunCommandHandler::new(config.clone(), Environment::Test);
        assert_eq!(handler.config(), &config);
    }

    #[tokio::test]
    async fn test_run_handler_dry_run() {
        let handler = RunCommandHandler::new(Settings::default(), Environment::Test);
        assert!(handler.execute(true).await.is_ok());
    }

    #[tokio::test]
    async fn test_run_handler_dry_run_invalid_config() {
        let mut config = Settings::default();
        config.scheduler.worker_count = 0;
        let handler = RunCommandHandler::new(config, Environment::Test);
        assert!(handler.execute(true).await.is_err());
    }

    #[test]
    fn test_dry_run_rejects_invalid_seed_job() {
        let file = jobs_file(
            r#"[{"owner_id":"a","name":"x","job_type":"Not A Type!","schedule_type":"one_time",
                 "run_at":"2030-01-01T00:00:00Z"}]"#,
        );
        let handler = RunCommandHandler::new(Settings::default(), Environment::Test)
            .with_jobs_file(Some(file.path().to_path_buf()));
        let err = handler.validate_only().unwrap_err();
        assert!(err.to_string().contains("Seed job #0"));
    }

    #[test]
    fn test_dry_run_accepts_valid_seed_jobs() {
        let file = jobs_file(
            r#"[{"owner_id":"a","name":"x","job_type":"log_message","schedule_type":"one_time",
                 "run_at":"2030-01-01T00:00:00Z"}]"#,
        );
        let handler = RunCommandHandler::new(Settings::default(), Environment::Test)
            .with_jobs_file(Some(file.path().to_path_buf()));
        assert!(handler.validate_only().is_ok());
    }
}
