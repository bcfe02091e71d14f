//! Long-running scheduler process.
//!
//! Builds the application state, seeds jobs, and drives ticks until a
//! shutdown signal arrives, then waits for running jobs to finish.

use std::path::{Path, PathBuf};

use anyhow::Context;
use jiff::Timestamp;
use serde_json::json;
use tokio::signal;
use tokio_util::sync::CancellationToken;

use crate::config::{Environment, HistoryConfig, Settings};
use crate::jobs::recurrence::{Frequency, MAX_INTERVAL, RecurrenceRule};
use crate::jobs::tasks::ExecutionCleanupTask;
use crate::jobs::{JobTask, MissedPolicy, NewScheduledJob, Priority, ScheduleType};
use crate::state::AppState;

/// Owner recorded on jobs the daemon creates for itself
pub const SYSTEM_OWNER: &str = "system";

/// Scheduler process manager
pub struct Daemon {
    settings: Settings,
    environment: Environment,
    seed_file: Option<PathBuf>,
}

impl Daemon {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            environment: Environment::from_env(),
            seed_file: None,
        }
    }

    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    /// Jobs to create at startup, as a JSON array of job definitions
    pub fn with_seed_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.seed_file = Some(path.into());
        self
    }

    /// Run until Ctrl+C or SIGTERM
    ///
    /// # Errors
    /// - Lock backend initialization errors
    /// - Seed file read or validation errors
    pub async fn run(self) -> anyhow::Result<()> {
        let shutdown = CancellationToken::new();
        let signal_token = shutdown.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            signal_token.cancel();
        });

        self.run_until(shutdown).await
    }

    /// Run until `shutdown` is cancelled
    pub async fn run_until(self, shutdown: CancellationToken) -> anyhow::Result<()> {
        tracing::info!(
            app_name = %self.settings.application.name,
            app_version = %self.settings.application.version,
            environment = %self.environment,
            "Application starting"
        );

        let scheduler = &self.settings.scheduler;
        tracing::info!(
            tick_interval_secs = scheduler.tick_interval_secs,
            worker_count = scheduler.worker_count,
            max_global_concurrency = scheduler.max_global_concurrency,
            max_per_owner_concurrency = scheduler.max_per_owner_concurrency,
            execution_timeout_secs = ?scheduler.execution_timeout_secs,
            lock_ttl_secs = scheduler.lock_ttl_secs,
            "Scheduler configuration loaded"
        );

        tracing::info!(
            level = %self.settings.logger.level,
            console_enabled = %self.settings.logger.console.enabled,
            file_enabled = %self.settings.logger.file.enabled,
            "Logger configuration loaded"
        );

        let state = AppState::new(&self.settings)
            .await
            .context("Failed to build application state")?;
        tracing::info!("Application state created");

        let now = Timestamp::now();
        if let Some(path) = self.seed_file.as_deref() {
            let seeded = seed_jobs(&state, path, now).await?;
            tracing::info!(count = seeded, path = %path.display(), "Seed jobs created");
        }

        if self.settings.history.cleanup_enabled {
            let job = state
                .schedules
                .create(cleanup_job(&self.settings.history), now)
                .await
                .context("Failed to schedule execution cleanup")?;
            tracing::info!(job_id = %job.id, "Execution cleanup scheduled");
        }

        if !self.settings.scheduler.enabled {
            tracing::warn!("Scheduler disabled by configuration; waiting for shutdown");
            shutdown.cancelled().await;
            return Ok(());
        }

        state.scheduler.run(shutdown).await;
        tracing::info!("Shutdown complete");

        Ok(())
    }
}

/// Reads a JSON array of job definitions
pub fn load_seed_jobs(path: &Path) -> anyhow::Result<Vec<NewScheduledJob>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read jobs file '{}'", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse jobs file '{}'", path.display()))
}

async fn seed_jobs(state: &AppState, path: &Path, now: Timestamp) -> anyhow::Result<usize> {
    let jobs = load_seed_jobs(path)?;
    let count = jobs.len();
    for (index, job) in jobs.into_iter().enumerate() {
        let name = job.name.clone();
        state
            .schedules
            .create(job, now)
            .await
            .with_context(|| format!("Seed job #{} ('{}') rejected", index, name))?;
    }
    Ok(count)
}

fn cleanup_job(history: &HistoryConfig) -> NewScheduledJob {
    let interval = history
        .cleanup_interval_minutes
        .clamp(1, u64::from(MAX_INTERVAL)) as u32;

    NewScheduledJob {
        owner_id: SYSTEM_OWNER.to_string(),
        name: "execution history cleanup".to_string(),
        job_type: ExecutionCleanupTask::task_type().to_string(),
        job_config: json!({ "retention_days": history.retention_days }),
        schedule_type: ScheduleType::Recurring,
        recurrence: Some(RecurrenceRule {
            interval,
            ..RecurrenceRule::new(Frequency::Minutely, "00:00")
        }),
        run_at: None,
        priority: Priority::Low,
        max_runs: None,
        missed_policy: MissedPolicy::Skip,
    }
}

/// Waits for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    use tempfile::NamedTempFile;

    fn seed_file(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_seed_jobs() {
        let file = seed_file(
            r#"[{"owner_id":"a","name":"ping","job_type":"log_message",
                 "job_config":{"message":"ping"},"schedule_type":"recurring",
                 "recurrence":{"frequency":"hourly","time_of_day":"00:15"}}]"#,
        );
        let jobs = load_seed_jobs(file.path()).unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].recurrence.as_ref().unwrap().frequency, Frequency::Hourly);
    }

    #[test]
    fn test_load_seed_jobs_reports_bad_json() {
        let file = seed_file("{not json");
        let err = load_seed_jobs(file.path()).unwrap_err();
        assert!(err.to_string().contains("Failed to parse jobs file"));
    }

    #[test]
    fn test_cleanup_job_definition() {
        let job = cleanup_job(&HistoryConfig::default());
        assert_eq!(job.job_type, "execution_cleanup");
        assert_eq!(job.recurrence.unwrap().interval, 60);
        assert_eq!(job.job_config, json!({"retention_days": 30}));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_until_seeds_and_stops() {
        let file = seed_file(
            r#"[{"owner_id":"a","name":"once","job_type":"log_message",
                 "job_config":{"message":"once"},"schedule_type":"one_time",
                 "run_at":"2020-01-01T00:00:00Z"}]"#,
        );
        let shutdown = CancellationToken::new();
        let daemon = Daemon::new(Settings::default()).with_seed_file(file.path());

        let handle = tokio::spawn(daemon.run_until(shutdown.clone()));
        tokio::time::sleep(std::time::Duration::from_secs(1)).await;
        shutdown.cancel();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_bad_seed_job_fails_startup() {
        let file = seed_file(
            r#"[{"owner_id":"a","name":"","job_type":"log_message","schedule_type":"one_time",
                 "run_at":"2020-01-01T00:00:00Z"}]"#,
        );
        let daemon = Daemon::new(Settings::default()).with_seed_file(file.path());
        let err = daemon.run_until(CancellationToken::new()).await.unwrap_err();
        assert!(err.to_string().contains("Seed job #0"));
    }
}
