//! External-facing lifecycle operations for scheduled jobs.

use std::collections::HashSet;
use std::sync::Arc;

use jiff::Timestamp;
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::jobs::executor::ScheduleExecutor;
use crate::jobs::models::{
    JobFilter, NewScheduledJob, ScheduleExecution, ScheduledJob, StatusChange, UpdateScheduledJob,
};
use crate::jobs::recurrence::{self, RecurrenceRule};
use crate::jobs::types::{ScheduleStatus, ScheduleType};
use crate::repositories::{ExecutionRepository, JobRepository};

/// CRUD and status transitions over job definitions.
///
/// Each transition names its legal source state and rejects any other,
/// including in bulk, where one bad item rejects the whole batch.
#[derive(Clone)]
pub struct ScheduleRegistry {
    jobs: Arc<dyn JobRepository>,
    executions: Arc<dyn ExecutionRepository>,
    executor: Arc<ScheduleExecutor>,
    max_batch_size: usize,
}

impl ScheduleRegistry {
    pub fn new(
        jobs: Arc<dyn JobRepository>,
        executions: Arc<dyn ExecutionRepository>,
        executor: Arc<ScheduleExecutor>,
        max_batch_size: usize,
    ) -> Self {
        Self {
            jobs,
            executions,
            executor,
            max_batch_size,
        }
    }

    /// Validates the definition and computes the first `next_run_at`.
    ///
    /// Calendar rules without a start date are pinned to the date of their
    /// first occurrence, so intervals keep counting from there.
    pub async fn create(&self, mut new_job: NewScheduledJob, now: Timestamp) -> AppResult<ScheduledJob> {
        new_job.validate()?;

        let next_run_at = match new_job.schedule_type {
            ScheduleType::Recurring => {
                let rule = new_job.recurrence.as_mut().ok_or_else(|| AppError::Validation {
                    field: "recurrence".to_string(),
                    reason: "recurring jobs need a recurrence rule".to_string(),
                })?;
                let first = first_occurrence(rule, now)?;
                recurrence::pin_start_date(rule, first);
                first
            }
            ScheduleType::OneTime => {
                if new_job.recurrence.is_some() {
                    return Err(AppError::Validation {
                        field: "recurrence".to_string(),
                        reason: "one-time jobs cannot carry a recurrence rule".to_string(),
                    });
                }
                new_job.run_at.ok_or_else(|| AppError::Validation {
                    field: "run_at".to_string(),
                    reason: "one-time jobs need run_at".to_string(),
                })?
            }
        };

        let job = ScheduledJob {
            id: Uuid::new_v4(),
            owner_id: new_job.owner_id,
            name: new_job.name,
            job_type: new_job.job_type,
            job_config: new_job.job_config,
            schedule_type: new_job.schedule_type,
            recurrence: new_job.recurrence,
            run_at: new_job.run_at,
            status: ScheduleStatus::Active,
            priority: new_job.priority,
            next_run_at: Some(next_run_at),
            last_run_at: None,
            run_count: 0,
            max_runs: new_job.max_runs,
            missed_policy: new_job.missed_policy,
            created_at: now,
            updated_at: now,
        };

        let job = self.jobs.create(job).await?;
        tracing::info!(
            job_id = %job.id,
            owner = %job.owner_id,
            job_type = %job.job_type,
            next_run_at = %next_run_at,
            "Scheduled job created"
        );
        Ok(job)
    }

    pub async fn get(&self, id: Uuid) -> AppResult<ScheduledJob> {
        self.jobs.get_by_id(id).await
    }

    pub async fn list(&self, filter: &JobFilter) -> AppResult<Vec<ScheduledJob>> {
        self.jobs.list(filter).await
    }

    /// Updates metadata. A new rule replaces the old one and, for an
    /// ACTIVE job, moves `next_run_at` to the new rule's next occurrence.
    pub async fn update(
        &self,
        id: Uuid,
        mut update: UpdateScheduledJob,
        now: Timestamp,
    ) -> AppResult<ScheduledJob> {
        update.validate()?;
        if update.max_runs == Some(Some(0)) {
            return Err(AppError::Validation {
                field: "max_runs".to_string(),
                reason: "max_runs must be at least 1".to_string(),
            });
        }

        let job = self.jobs.get_by_id(id).await?;
        if job.status.is_terminal() {
            return Err(invalid_transition(&job, "update"));
        }

        if let Some(rule) = update.recurrence.as_mut() {
            if job.schedule_type != ScheduleType::Recurring {
                return Err(AppError::Validation {
                    field: "recurrence".to_string(),
                    reason: "one-time jobs cannot carry a recurrence rule".to_string(),
                });
            }
            let next = first_occurrence(rule, now)?;
            recurrence::pin_start_date(rule, next);
            if job.status == ScheduleStatus::Active {
                update.next_run_at = Some(Some(next));
            }
        }

        self.jobs.update(id, update).await
    }

    pub async fn delete(&self, id: Uuid) -> AppResult<()> {
        self.jobs.delete(id).await?;
        tracing::info!(job_id = %id, "Scheduled job deleted");
        Ok(())
    }

    /// ACTIVE to PAUSED
    pub async fn pause(&self, id: Uuid) -> AppResult<ScheduledJob> {
        let change = self.pause_change(&self.jobs.get_by_id(id).await?)?;
        self.apply_one(change).await
    }

    /// PAUSED to ACTIVE, rescheduled from `now`
    pub async fn resume(&self, id: Uuid, now: Timestamp) -> AppResult<ScheduledJob> {
        let change = self.resume_change(&self.jobs.get_by_id(id).await?, now)?;
        self.apply_one(change).await
    }

    /// Any non-terminal state to CANCELLED. A run already in flight finishes.
    pub async fn cancel(&self, id: Uuid) -> AppResult<ScheduledJob> {
        let change = self.cancel_change(&self.jobs.get_by_id(id).await?)?;
        self.apply_one(change).await
    }

    /// Copies the definition into a fresh ACTIVE job
    pub async fn clone_job(&self, id: Uuid, now: Timestamp) -> AppResult<ScheduledJob> {
        let source = self.jobs.get_by_id(id).await?;
        let copy = NewScheduledJob {
            owner_id: source.owner_id.clone(),
            name: format!("{} (copy)", source.name),
            job_type: source.job_type.clone(),
            job_config: source.job_config.clone(),
            schedule_type: source.schedule_type,
            recurrence: source.recurrence.clone(),
            run_at: source.run_at,
            priority: source.priority,
            max_runs: source.max_runs,
            missed_policy: source.missed_policy,
        };
        self.create(copy, now).await
    }

    /// Runs the job immediately under its lock without moving the schedule
    pub async fn run_now(&self, id: Uuid, now: Timestamp) -> AppResult<ScheduleExecution> {
        self.executor.run_now(id, now).await
    }

    pub async fn bulk_pause(&self, ids: &[Uuid]) -> AppResult<Vec<ScheduledJob>> {
        let jobs = self.load_batch(ids).await?;
        let changes = jobs
            .iter()
            .map(|job| self.pause_change(job))
            .collect::<AppResult<Vec<_>>>()?;
        self.apply_batch("pause", changes).await
    }

    pub async fn bulk_resume(&self, ids: &[Uuid], now: Timestamp) -> AppResult<Vec<ScheduledJob>> {
        let jobs = self.load_batch(ids).await?;
        let changes = jobs
            .iter()
            .map(|job| self.resume_change(job, now))
            .collect::<AppResult<Vec<_>>>()?;
        self.apply_batch("resume", changes).await
    }

    pub async fn bulk_cancel(&self, ids: &[Uuid]) -> AppResult<Vec<ScheduledJob>> {
        let jobs = self.load_batch(ids).await?;
        let changes = jobs
            .iter()
            .map(|job| self.cancel_change(job))
            .collect::<AppResult<Vec<_>>>()?;
        self.apply_batch("cancel", changes).await
    }

    /// Execution history, newest first
    pub async fn list_executions(
        &self,
        id: Uuid,
        limit: usize,
        offset: usize,
    ) -> AppResult<Vec<ScheduleExecution>> {
        self.jobs.get_by_id(id).await?;
        self.executions.list_by_job(id, limit, offset).await
    }

    /// The next `n` instants the job would run at if nothing changes
    pub async fn upcoming(&self, id: Uuid, n: usize, now: Timestamp) -> AppResult<Vec<Timestamp>> {
        let job = self.jobs.get_by_id(id).await?;
        if job.status.is_terminal() || n == 0 {
            return Ok(Vec::new());
        }

        let Some(rule) = job.recurrence.as_ref().filter(|_| job.schedule_type == ScheduleType::Recurring) else {
            return Ok(job.next_run_at.into_iter().collect());
        };

        let mut upcoming = match (job.status, job.next_run_at) {
            (ScheduleStatus::Active, Some(next)) => {
                let mut list = vec![next];
                list.extend(recurrence::next_n_occurrences(rule, n - 1, next));
                list
            }
            _ => recurrence::next_n_occurrences(rule, n, now),
        };

        if let Some(cap) = job.run_cap() {
            let remaining = cap.saturating_sub(job.run_count) as usize;
            upcoming.truncate(remaining);
        }
        Ok(upcoming)
    }

    fn pause_change(&self, job: &ScheduledJob) -> AppResult<StatusChange> {
        if job.status != ScheduleStatus::Active {
            return Err(invalid_transition(job, "pause"));
        }
        Ok(StatusChange {
            id: job.id,
            expected: ScheduleStatus::Active,
            to: ScheduleStatus::Paused,
            next_run_at: job.next_run_at,
        })
    }

    fn resume_change(&self, job: &ScheduledJob, now: Timestamp) -> AppResult<StatusChange> {
        if job.status != ScheduleStatus::Paused {
            return Err(invalid_transition(job, "resume"));
        }

        let next_run_at = match (job.schedule_type, job.recurrence.as_ref()) {
            (ScheduleType::Recurring, Some(rule)) => recurrence::next_occurrence(rule, now),
            // a one-time job paused past its run_at fires on the next tick
            _ => job.run_at.map(|at| at.max(now)),
        };
        let to = if next_run_at.is_some() {
            ScheduleStatus::Active
        } else {
            ScheduleStatus::Completed
        };

        Ok(StatusChange {
            id: job.id,
            expected: ScheduleStatus::Paused,
            to,
            next_run_at,
        })
    }

    fn cancel_change(&self, job: &ScheduledJob) -> AppResult<StatusChange> {
        if job.status.is_terminal() {
            return Err(invalid_transition(job, "cancel"));
        }
        Ok(StatusChange {
            id: job.id,
            expected: job.status,
            to: ScheduleStatus::Cancelled,
            next_run_at: None,
        })
    }

    async fn apply_one(&self, change: StatusChange) -> AppResult<ScheduledJob> {
        let mut updated = self.jobs.transition(std::slice::from_ref(&change)).await?;
        let job = updated
            .pop()
            .ok_or_else(|| AppError::not_found("ScheduledJob", "id", change.id))?;
        tracing::info!(job_id = %job.id, status = %job.status, "Scheduled job status changed");
        Ok(job)
    }

    async fn apply_batch(&self, action: &str, changes: Vec<StatusChange>) -> AppResult<Vec<ScheduledJob>> {
        let updated = self.jobs.transition(&changes).await?;
        tracing::info!(action, count = updated.len(), "Bulk status change applied");
        Ok(updated)
    }

    /// Size check and load, before any write
    async fn load_batch(&self, ids: &[Uuid]) -> AppResult<Vec<ScheduledJob>> {
        if ids.len() > self.max_batch_size {
            return Err(AppError::BatchTooLarge {
                size: ids.len(),
                max: self.max_batch_size,
            });
        }

        let mut seen = HashSet::with_capacity(ids.len());
        let mut jobs = Vec::with_capacity(ids.len());
        for &id in ids {
            if seen.insert(id) {
                jobs.push(self.jobs.get_by_id(id).await?);
            }
        }
        Ok(jobs)
    }
}

fn first_occurrence(rule: &RecurrenceRule, now: Timestamp) -> AppResult<Timestamp> {
    let issues = recurrence::validate(rule);
    if !issues.is_empty() {
        return Err(AppError::RuleInvalid { issues });
    }
    recurrence::next_occurrence(rule, now).ok_or_else(|| AppError::Validation {
        field: "recurrence".to_string(),
        reason: "rule has no occurrence after the current time".to_string(),
    })
}

fn invalid_transition(job: &ScheduledJob, action: &str) -> AppError {
    AppError::InvalidTransition {
        id: job.id.to_string(),
        from: job.status.to_string(),
        action: action.to_string(),
    }
}
