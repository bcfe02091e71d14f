use std::borrow::Cow;
use std::sync::Arc;
use std::time::Duration;

use jiff::{SignedDuration, Timestamp};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::SchedulerConfig;
use crate::error::{AppError, AppResult};
use crate::jobs::error::JobError;
use crate::jobs::models::{
    ExecutionOutcome, NewScheduleExecution, RunRecord, ScheduleExecution, ScheduledJob,
};
use crate::jobs::recurrence::{
    self, RecurrenceRule, latest_occurrence, next_occurrence, pin_start_date,
};
use crate::jobs::types::{
    ExecutionStatus, JobContext, JobRunner, MissedPolicy, ScheduleStatus, ScheduleType,
};
use crate::lock::LockManager;
use crate::repositories::{ExecutionRepository, JobRepository};

/// Most catch-up runs a RUN_ALL job performs after a gap
pub const MAX_CATCH_UP_RUNS: usize = 5;

#[derive(Debug, Clone)]
pub struct ExecutorOptions {
    /// How long to wait for a held lock before recording SKIPPED
    pub lock_wait: Duration,
    /// Must exceed the worst-case run time
    pub lock_ttl: Duration,
    pub execution_timeout: Option<Duration>,
    pub catch_up_limit: usize,
}

impl Default for ExecutorOptions {
    fn default() -> Self {
        Self {
            lock_wait: Duration::ZERO,
            lock_ttl: Duration::from_secs(600),
            execution_timeout: None,
            catch_up_limit: MAX_CATCH_UP_RUNS,
        }
    }
}

impl From<&SchedulerConfig> for ExecutorOptions {
    fn from(config: &SchedulerConfig) -> Self {
        Self {
            lock_wait: config.lock_wait(),
            lock_ttl: config.lock_ttl(),
            execution_timeout: config.execution_timeout(),
            catch_up_limit: config.catch_up_limit,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunKind {
    Scheduled,
    Manual,
}

/// Runs one job attempt under its per-job lock and advances the job.
///
/// Every attempt leaves exactly one execution record per occurrence it
/// handles, including attempts that lose the lock race (SKIPPED). Runner
/// failures, panics and timeouts become FAILED records; only storage and
/// lock backend failures are returned as errors.
pub struct ScheduleExecutor {
    jobs: Arc<dyn JobRepository>,
    executions: Arc<dyn ExecutionRepository>,
    locks: Arc<dyn LockManager>,
    runner: Arc<dyn JobRunner>,
    options: ExecutorOptions,
}

impl ScheduleExecutor {
    pub fn new(
        jobs: Arc<dyn JobRepository>,
        executions: Arc<dyn ExecutionRepository>,
        locks: Arc<dyn LockManager>,
        runner: Arc<dyn JobRunner>,
        options: ExecutorOptions,
    ) -> Self {
        Self {
            jobs,
            executions,
            locks,
            runner,
            options,
        }
    }

    /// One scheduled tick for a due job.
    pub async fn execute(&self, job: &ScheduledJob, now: Timestamp) -> AppResult<ScheduleExecution> {
        let scheduled_for = job.next_run_at.unwrap_or(now);
        let mut records = self.run_locked(job, now, &[scheduled_for]).await?;
        records
            .pop()
            .ok_or_else(|| AppError::from(anyhow::anyhow!("tick for job {} produced no record", job.id)))
    }

    /// Immediate run outside the schedule. Takes the same lock as a
    /// scheduled tick and only updates `last_run_at`.
    pub async fn run_now(&self, job_id: Uuid, now: Timestamp) -> AppResult<ScheduleExecution> {
        let job = self.jobs.get_by_id(job_id).await?;
        ensure_runnable(&job)?;

        let owner = Uuid::new_v4().to_string();
        let key = job.lock_key();
        if !self
            .locks
            .acquire(&key, &owner, self.options.lock_wait, self.options.lock_ttl)
            .await?
        {
            tracing::info!(job_id = %job.id, owner = %job.owner_id, "Manual run skipped, job already running");
            return self
                .record_terminal(&job, now, now, ExecutionStatus::Skipped, RunKind::Manual, "job is already running")
                .await;
        }

        let result = self.run_now_locked(job_id, now).await;
        self.release(&key, &owner).await;
        result
    }

    async fn run_now_locked(&self, job_id: Uuid, now: Timestamp) -> AppResult<ScheduleExecution> {
        let job = self.jobs.get_by_id(job_id).await?;
        ensure_runnable(&job)?;

        let execution = self.run_one(&job, now, now, RunKind::Manual).await?;
        self.jobs
            .record_run(
                job.id,
                RunRecord {
                    last_run_at: Some(now),
                    increment_run_count: false,
                    next_run_at: None,
                    status: None,
                },
            )
            .await?;
        Ok(execution)
    }

    /// Applies the job's missed policy when more than one occurrence has
    /// passed since `next_run_at`, otherwise behaves like [`execute`].
    ///
    /// [`execute`]: ScheduleExecutor::execute
    pub async fn handle_missed(
        &self,
        job: &ScheduledJob,
        now: Timestamp,
    ) -> AppResult<Vec<ScheduleExecution>> {
        let (Some(next), Some(rule)) = (job.next_run_at, series_rule(job)) else {
            return Ok(vec![self.execute(job, now).await?]);
        };

        let missed = next_occurrence(&rule, next).is_some_and(|following| following <= now);
        if !missed {
            return Ok(vec![self.execute(job, now).await?]);
        }

        match job.missed_policy {
            MissedPolicy::Skip => {
                tracing::info!(job_id = %job.id, missed_since = %next, "Skipping missed occurrences");
                self.run_locked(job, now, &[]).await
            }
            MissedPolicy::RunLatest => {
                let latest = latest_occurrence(&rule, next, now).unwrap_or(next);
                tracing::info!(job_id = %job.id, scheduled_for = %latest, "Running latest missed occurrence");
                self.run_locked(job, now, &[latest]).await
            }
            MissedPolicy::RunAll => {
                let limit = self.options.catch_up_limit.max(1);
                let mut occurrences = vec![next];
                occurrences.extend(
                    recurrence::occurrences(&rule, next)
                        .take(limit - 1)
                        .take_while(|t| *t <= now),
                );
                tracing::info!(
                    job_id = %job.id,
                    catch_up = occurrences.len(),
                    limit,
                    "Catching up missed occurrences"
                );
                self.run_locked(job, now, &occurrences).await
            }
        }
    }

    /// Takes the job lock and runs each occurrence in order, then advances
    /// from `now`. An empty list only advances the schedule.
    async fn run_locked(
        &self,
        job: &ScheduledJob,
        now: Timestamp,
        occurrences: &[Timestamp],
    ) -> AppResult<Vec<ScheduleExecution>> {
        let owner = Uuid::new_v4().to_string();
        let key = job.lock_key();
        let first = occurrences.first().copied().unwrap_or(now);

        if !self
            .locks
            .acquire(&key, &owner, self.options.lock_wait, self.options.lock_ttl)
            .await?
        {
            tracing::info!(
                job_id = %job.id,
                owner = %job.owner_id,
                status = %ExecutionStatus::Skipped,
                "Lock held by another execution, skipping tick"
            );
            let record = self
                .record_terminal(job, first, now, ExecutionStatus::Skipped, RunKind::Scheduled, "another execution holds the lock")
                .await?;
            return Ok(vec![record]);
        }

        let result = self.run_holding_lock(job, now, occurrences).await;
        self.release(&key, &owner).await;
        result
    }

    async fn run_holding_lock(
        &self,
        snapshot: &ScheduledJob,
        now: Timestamp,
        occurrences: &[Timestamp],
    ) -> AppResult<Vec<ScheduleExecution>> {
        let mut job = self.jobs.get_by_id(snapshot.id).await?;
        let first = occurrences.first().copied().unwrap_or(now);

        if job.status == ScheduleStatus::Cancelled {
            let record = self
                .record_terminal(&job, first, now, ExecutionStatus::Cancelled, RunKind::Scheduled, "job was cancelled")
                .await?;
            return Ok(vec![record]);
        }

        let due = job.next_run_at.is_some_and(|next| next <= now);
        if job.status != ScheduleStatus::Active || !due {
            tracing::info!(job_id = %job.id, status = %job.status, "Job no longer due, skipping tick");
            let reason = if job.status == ScheduleStatus::Active {
                "job already advanced".to_string()
            } else {
                format!("job is {}", job.status)
            };
            let record = self
                .record_terminal(&job, first, now, ExecutionStatus::Skipped, RunKind::Scheduled, &reason)
                .await?;
            return Ok(vec![record]);
        }

        if occurrences.is_empty() {
            let (next_run_at, status) = advance(&job, job.run_count, now);
            self.jobs
                .record_run(
                    job.id,
                    RunRecord {
                        last_run_at: None,
                        increment_run_count: false,
                        next_run_at: Some(next_run_at),
                        status: Some(status),
                    },
                )
                .await?;
            return Ok(Vec::new());
        }

        let mut records = Vec::with_capacity(occurrences.len());
        for &scheduled_for in occurrences {
            let execution = self.run_one(&job, scheduled_for, now, RunKind::Scheduled).await?;
            records.push(execution);

            let (next_run_at, status) = advance(&job, job.run_count.saturating_add(1), now);
            job = self
                .jobs
                .record_run(
                    job.id,
                    RunRecord {
                        last_run_at: Some(now),
                        increment_run_count: true,
                        next_run_at: Some(next_run_at),
                        status: Some(status),
                    },
                )
                .await?;

            if job.status != ScheduleStatus::Active {
                tracing::info!(job_id = %job.id, status = %job.status, run_count = job.run_count, "Job left active state");
                break;
            }
        }

        Ok(records)
    }

    /// Creates the RUNNING record, runs the job and completes the record
    async fn run_one(
        &self,
        job: &ScheduledJob,
        scheduled_for: Timestamp,
        now: Timestamp,
        kind: RunKind,
    ) -> AppResult<ScheduleExecution> {
        let record = self
            .executions
            .create(NewScheduleExecution {
                job_id: job.id,
                owner_id: job.owner_id.clone(),
                scheduled_for,
                started_at: now,
                status: ExecutionStatus::Running,
                is_manual: kind == RunKind::Manual,
                error_message: None,
            })
            .await?;

        let token = CancellationToken::new();
        let ctx = JobContext {
            execution_id: record.id,
            job_id: job.id,
            owner_id: job.owner_id.clone(),
            job_type: job.job_type.clone(),
            scheduled_for,
            is_manual: kind == RunKind::Manual,
            executions: Arc::clone(&self.executions),
            cancellation_token: token.clone(),
        };

        let started = Instant::now();
        let result = self.invoke_runner(ctx, job, token).await;
        let completed_at = SignedDuration::try_from(started.elapsed())
            .ok()
            .and_then(|elapsed| now.checked_add(elapsed).ok())
            .unwrap_or(now);

        let outcome = match result {
            Ok(value) => {
                tracing::info!(
                    job_id = %job.id,
                    execution_id = %record.id,
                    owner = %job.owner_id,
                    status = %ExecutionStatus::Completed,
                    "Job execution completed"
                );
                ExecutionOutcome {
                    status: ExecutionStatus::Completed,
                    completed_at,
                    error_message: None,
                    result: Some(value),
                }
            }
            Err(e) => {
                tracing::warn!(
                    job_id = %job.id,
                    execution_id = %record.id,
                    owner = %job.owner_id,
                    status = %ExecutionStatus::Failed,
                    error = %e,
                    "Job execution failed"
                );
                ExecutionOutcome {
                    status: ExecutionStatus::Failed,
                    completed_at,
                    error_message: Some(e.to_string()),
                    result: None,
                }
            }
        };

        self.executions.complete(record.id, outcome).await
    }

    async fn invoke_runner(
        &self,
        ctx: JobContext,
        job: &ScheduledJob,
        token: CancellationToken,
    ) -> Result<serde_json::Value, JobError> {
        let runner = Arc::clone(&self.runner);
        let job_type = job.job_type.clone();
        let config = job.job_config.clone();
        let mut handle = tokio::spawn(async move { runner.run(ctx, &job_type, &config).await });

        let joined = match self.options.execution_timeout {
            Some(limit) => match tokio::time::timeout(limit, &mut handle).await {
                Ok(joined) => joined,
                Err(_) => {
                    token.cancel();
                    handle.abort();
                    return Err(JobError::Timeout(limit.as_secs()));
                }
            },
            None => handle.await,
        };

        match joined {
            Ok(result) => result,
            Err(e) if e.is_panic() => Err(JobError::Panicked(panic_message(e.into_panic()))),
            Err(_) => Err(JobError::Cancelled),
        }
    }

    async fn record_terminal(
        &self,
        job: &ScheduledJob,
        scheduled_for: Timestamp,
        now: Timestamp,
        status: ExecutionStatus,
        kind: RunKind,
        reason: &str,
    ) -> AppResult<ScheduleExecution> {
        self.executions
            .create(NewScheduleExecution {
                job_id: job.id,
                owner_id: job.owner_id.clone(),
                scheduled_for,
                started_at: now,
                status,
                is_manual: kind == RunKind::Manual,
                error_message: Some(reason.to_string()),
            })
            .await
    }

    async fn release(&self, key: &str, owner: &str) {
        match self.locks.release(key, owner).await {
            Ok(true) => {}
            Ok(false) => tracing::warn!(key, "Lock expired before release; raise lock_ttl_secs"),
            Err(e) => tracing::error!(key, error = %e, "Failed to release lock"),
        }
    }
}

fn recurring_rule(job: &ScheduledJob) -> Option<&RecurrenceRule> {
    match job.schedule_type {
        ScheduleType::Recurring => job.recurrence.as_ref(),
        ScheduleType::OneTime => None,
    }
}

/// The job's rule held to the series its pending slot belongs to, so a late
/// run does not restart an interval from the day it happened to execute.
fn series_rule(job: &ScheduledJob) -> Option<Cow<'_, RecurrenceRule>> {
    let rule = recurring_rule(job)?;
    match job.next_run_at {
        Some(slot) if rule.start_date.is_none() => {
            let mut pinned = rule.clone();
            pin_start_date(&mut pinned, slot);
            Some(Cow::Owned(pinned))
        }
        _ => Some(Cow::Borrowed(rule)),
    }
}

fn ensure_runnable(job: &ScheduledJob) -> AppResult<()> {
    match job.status {
        ScheduleStatus::Active | ScheduleStatus::Paused => Ok(()),
        status => Err(AppError::InvalidTransition {
            id: job.id.to_string(),
            from: status.to_string(),
            action: "run".to_string(),
        }),
    }
}

/// Next schedule state after a run that brought the count to `run_count`
fn advance(job: &ScheduledJob, run_count: u32, now: Timestamp) -> (Option<Timestamp>, ScheduleStatus) {
    if job.run_cap().is_some_and(|cap| run_count >= cap) {
        return (None, ScheduleStatus::Completed);
    }
    match series_rule(job).and_then(|rule| next_occurrence(&rule, now)) {
        Some(next) => (Some(next), ScheduleStatus::Active),
        None => (None, ScheduleStatus::Completed),
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
