//! Composition root.
//!
//! Wires repositories, the lock backend, the task registry, the executor,
//! the driver and the schedule registry from one set of settings.

use std::sync::Arc;

use crate::config::{SchedulerConfig, Settings};
use crate::error::AppResult;
use crate::jobs::{ExecutorOptions, JobRunner, JobScheduler, ScheduleExecutor, TaskRegistry};
use crate::lock::{LockManager, build_lock_manager};
use crate::repositories::Repositories;
use crate::services::ScheduleRegistry;

/// Shared handles for the running scheduler.
///
/// Cloning is cheap since every component sits behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub repositories: Repositories,
    pub locks: Arc<dyn LockManager>,
    pub executor: Arc<ScheduleExecutor>,
    pub scheduler: Arc<JobScheduler>,
    pub schedules: ScheduleRegistry,
}

impl AppState {
    /// Builds the state with in-memory stores, the configured lock backend
    /// and the built-in tasks.
    pub async fn new(settings: &Settings) -> AppResult<Self> {
        let locks = build_lock_manager(&settings.lock).await?;
        let runner: Arc<dyn JobRunner> = Arc::new(TaskRegistry::with_builtin_tasks());
        Ok(Self::from_parts(
            &settings.scheduler,
            Repositories::in_memory(),
            locks,
            runner,
        ))
    }

    /// Builds the state around caller-supplied stores, locks and runner
    pub fn from_parts(
        config: &SchedulerConfig,
        repositories: Repositories,
        locks: Arc<dyn LockManager>,
        runner: Arc<dyn JobRunner>,
    ) -> Self {
        let executor = Arc::new(ScheduleExecutor::new(
            Arc::clone(&repositories.jobs),
            Arc::clone(&repositories.executions),
            Arc::clone(&locks),
            runner,
            ExecutorOptions::from(config),
        ));
        let scheduler = Arc::new(JobScheduler::new(
            Arc::clone(&repositories.jobs),
            Arc::clone(&executor),
            config,
        ));
        let schedules = ScheduleRegistry::new(
            Arc::clone(&repositories.jobs),
            Arc::clone(&repositories.executions),
            Arc::clone(&executor),
            config.max_batch_size,
        );

        Self {
            repositories,
            locks,
            executor,
            scheduler,
            schedules,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jiff::Timestamp;
    use serde_json::json;

    use crate::jobs::recurrence::{Frequency, RecurrenceRule};
    use crate::jobs::{ExecutionStatus, MissedPolicy, NewScheduledJob, Priority, ScheduleType};

    #[tokio::test]
    async fn test_end_to_end_tick_through_state() {
        let state = AppState::new(&Settings::default()).await.unwrap();
        assert_eq!(state.locks.backend_name(), "memory");

        let created_at: Timestamp = "2024-05-01T08:00:00Z".parse().unwrap();
        let job = state
            .schedules
            .create(
                NewScheduledJob {
                    owner_id: "team-a".to_string(),
                    name: "heartbeat".to_string(),
                    job_type: "log_message".to_string(),
                    job_config: json!({"message": "tick"}),
                    schedule_type: ScheduleType::Recurring,
                    recurrence: Some(RecurrenceRule::new(Frequency::Daily, "09:00")),
                    run_at: None,
                    priority: Priority::Normal,
                    max_runs: None,
                    missed_policy: MissedPolicy::RunLatest,
                },
                created_at,
            )
            .await
            .unwrap();

        let now: Timestamp = "2024-05-01T09:00:05Z".parse().unwrap();
        let report = state.scheduler.tick(now).await.unwrap();
        assert_eq!(report.dispatched, 1);
        let drained = state.scheduler.drain().await;
        assert_eq!(drained.completed, 1);

        let history = state.schedules.list_executions(job.id, 10, 0).await.unwrap();
        assert_eq!(history[0].status, ExecutionStatus::Completed);
        assert_eq!(
            state.schedules.get(job.id).await.unwrap().next_run_at,
            Some("2024-05-02T09:00:00Z".parse().unwrap())
        );
    }
}
