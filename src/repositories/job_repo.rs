use std::collections::HashMap;

use async_trait::async_trait;
use jiff::Timestamp;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::jobs::models::{JobFilter, RunRecord, ScheduledJob, StatusChange, UpdateScheduledJob};
use crate::jobs::types::ScheduleStatus;

/// Storage for scheduled job definitions.
///
/// `transition` must apply every change or none of them, and `record_run`
/// must never replace a PAUSED or CANCELLED status written concurrently.
/// `update` refuses terminal jobs and only moves `next_run_at` while the
/// job is still ACTIVE.
#[async_trait]
pub trait JobRepository: Send + Sync {
    async fn create(&self, job: ScheduledJob) -> AppResult<ScheduledJob>;

    async fn get_by_id(&self, id: Uuid) -> AppResult<ScheduledJob>;

    async fn list(&self, filter: &JobFilter) -> AppResult<Vec<ScheduledJob>>;

    /// ACTIVE jobs with `next_run_at <= now`, highest priority first, then earliest
    async fn get_due_jobs(&self, now: Timestamp, limit: usize) -> AppResult<Vec<ScheduledJob>>;

    async fn update(&self, id: Uuid, update: UpdateScheduledJob) -> AppResult<ScheduledJob>;

    async fn transition(&self, changes: &[StatusChange]) -> AppResult<Vec<ScheduledJob>>;

    async fn record_run(&self, id: Uuid, run: RunRecord) -> AppResult<ScheduledJob>;

    async fn delete(&self, id: Uuid) -> AppResult<()>;
}

#[derive(Default)]
pub struct InMemoryJobRepository {
    jobs: RwLock<HashMap<Uuid, ScheduledJob>>,
}

impl InMemoryJobRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobRepository for InMemoryJobRepository {
    async fn create(&self, job: ScheduledJob) -> AppResult<ScheduledJob> {
        let mut jobs = self.jobs.write().await;
        if jobs.contains_key(&job.id) {
            return Err(AppError::BadRequest {
                message: format!("Job {} already exists", job.id),
            });
        }
        jobs.insert(job.id, job.clone());
        Ok(job)
    }

    async fn get_by_id(&self, id: Uuid) -> AppResult<ScheduledJob> {
        self.jobs
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::not_found("ScheduledJob", "id", id))
    }

    async fn list(&self, filter: &JobFilter) -> AppResult<Vec<ScheduledJob>> {
        let jobs = self.jobs.read().await;
        let mut matching: Vec<ScheduledJob> =
            jobs.values().filter(|j| filter.matches(j)).cloned().collect();
        matching.sort_by_key(|j| (j.created_at, j.id));
        Ok(matching)
    }

    async fn get_due_jobs(&self, now: Timestamp, limit: usize) -> AppResult<Vec<ScheduledJob>> {
        let jobs = self.jobs.read().await;
        let mut due: Vec<ScheduledJob> = jobs
            .values()
            .filter(|j| j.status == ScheduleStatus::Active)
            .filter(|j| j.next_run_at.is_some_and(|next| next <= now))
            .cloned()
            .collect();
        due.sort_by_key(|j| (j.priority.weight(), j.next_run_at, j.created_at));
        due.truncate(limit);
        Ok(due)
    }

    async fn update(&self, id: Uuid, update: UpdateScheduledJob) -> AppResult<ScheduledJob> {
        let mut jobs = self.jobs.write().await;
        let job = jobs
            .get_mut(&id)
            .ok_or_else(|| AppError::not_found("ScheduledJob", "id", id))?;

        if job.status.is_terminal() {
            return Err(AppError::InvalidTransition {
                id: id.to_string(),
                from: job.status.to_string(),
                action: "update".to_string(),
            });
        }

        if let Some(name) = update.name {
            job.name = name;
        }
        if let Some(config) = update.job_config {
            job.job_config = config;
        }
        if let Some(rule) = update.recurrence {
            job.recurrence = Some(rule);
        }
        if let Some(priority) = update.priority {
            job.priority = priority;
        }
        if let Some(max_runs) = update.max_runs {
            job.max_runs = max_runs;
        }
        if let Some(policy) = update.missed_policy {
            job.missed_policy = policy;
        }
        if job.status == ScheduleStatus::Active {
            if let Some(next) = update.next_run_at {
                job.next_run_at = next;
            }
        }
        job.updated_at = Timestamp::now();

        Ok(job.clone())
    }

    async fn transition(&self, changes: &[StatusChange]) -> AppResult<Vec<ScheduledJob>> {
        let mut jobs = self.jobs.write().await;

        // check everything before touching anything
        for change in changes {
            let job = jobs
                .get(&change.id)
                .ok_or_else(|| AppError::not_found("ScheduledJob", "id", change.id))?;
            if job.status != change.expected {
                return Err(AppError::InvalidTransition {
                    id: change.id.to_string(),
                    from: job.status.to_string(),
                    action: format!("move to {}", change.to),
                });
            }
        }

        let now = Timestamp::now();
        let mut updated = Vec::with_capacity(changes.len());
        for change in changes {
            if let Some(job) = jobs.get_mut(&change.id) {
                job.status = change.to;
                job.next_run_at = change.next_run_at;
                job.updated_at = now;
                updated.push(job.clone());
            }
        }
        Ok(updated)
    }

    async fn record_run(&self, id: Uuid, run: RunRecord) -> AppResult<ScheduledJob> {
        let mut jobs = self.jobs.write().await;
        let job = jobs
            .get_mut(&id)
            .ok_or_else(|| AppError::not_found("ScheduledJob", "id", id))?;

        if let Some(at) = run.last_run_at {
            job.last_run_at = Some(at);
        }
        if run.increment_run_count {
            job.run_count = job.run_count.saturating_add(1);
        }

        match job.status {
            ScheduleStatus::Cancelled | ScheduleStatus::Completed => {}
            ScheduleStatus::Paused => {
                // stays paused; resume recomputes next_run_at anyway
                if let Some(next) = run.next_run_at {
                    job.next_run_at = next;
                }
            }
            ScheduleStatus::Active => {
                if let Some(next) = run.next_run_at {
                    job.next_run_at = next;
                }
                if let Some(status) = run.status {
                    job.status = status;
                }
            }
        }
        job.updated_at = Timestamp::now();

        Ok(job.clone())
    }

    async fn delete(&self, id: Uuid) -> AppResult<()> {
        match self.jobs.write().await.remove(&id) {
            Some(_) => Ok(()),
            None => Err(AppError::not_found("ScheduledJob", "id", id)),
        }
    }
}
