use std::collections::HashMap;

use async_trait::async_trait;
use jiff::{Timestamp, ToSpan};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::jobs::models::{ExecutionOutcome, NewScheduleExecution, ScheduleExecution};

/// Append-only execution history. Terminal records are immutable.
#[async_trait]
pub trait ExecutionRepository: Send + Sync {
    async fn create(&self, exec: NewScheduleExecution) -> AppResult<ScheduleExecution>;

    async fn complete(&self, id: Uuid, outcome: ExecutionOutcome) -> AppResult<ScheduleExecution>;

    async fn get(&self, id: Uuid) -> AppResult<ScheduleExecution>;

    /// Newest first
    async fn list_by_job(
        &self,
        job_id: Uuid,
        limit: usize,
        offset: usize,
    ) -> AppResult<Vec<ScheduleExecution>>;

    /// Deletes terminal records started more than `retention_days` before `now`
    async fn cleanup_old_executions(&self, retention_days: i64, now: Timestamp) -> AppResult<usize>;
}

#[derive(Default)]
pub struct InMemoryExecutionRepository {
    executions: RwLock<HashMap<Uuid, ScheduleExecution>>,
}

impl InMemoryExecutionRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ExecutionRepository for InMemoryExecutionRepository {
    async fn create(&self, exec: NewScheduleExecution) -> AppResult<ScheduleExecution> {
        let terminal = exec.status.is_terminal();
        let record = ScheduleExecution {
            id: Uuid::new_v4(),
            job_id: exec.job_id,
            owner_id: exec.owner_id,
            scheduled_for: exec.scheduled_for,
            started_at: exec.started_at,
            completed_at: terminal.then_some(exec.started_at),
            duration_ms: terminal.then_some(0),
            status: exec.status,
            is_manual: exec.is_manual,
            error_message: exec.error_message,
            result: None,
        };
        self.executions
            .write()
            .await
            .insert(record.id, record.clone());
        Ok(record)
    }

    async fn complete(&self, id: Uuid, outcome: ExecutionOutcome) -> AppResult<ScheduleExecution> {
        let mut executions = self.executions.write().await;
        let record = executions
            .get_mut(&id)
            .ok_or_else(|| AppError::not_found("ScheduleExecution", "id", id))?;

        if record.status.is_terminal() {
            return Err(AppError::BadRequest {
                message: format!("Execution {} is already {}", id, record.status),
            });
        }
        if !outcome.status.is_terminal() {
            return Err(AppError::BadRequest {
                message: format!("Execution cannot complete as {}", outcome.status),
            });
        }

        record.status = outcome.status;
        record.completed_at = Some(outcome.completed_at);
        record.duration_ms = Some(
            outcome
                .completed_at
                .duration_since(record.started_at)
                .as_millis()
                .max(0) as i64,
        );
        record.error_message = outcome.error_message;
        record.result = outcome.result;
        Ok(record.clone())
    }

    async fn get(&self, id: Uuid) -> AppResult<ScheduleExecution> {
        self.executions
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::not_found("ScheduleExecution", "id", id))
    }

    async fn list_by_job(
        &self,
        job_id: Uuid,
        limit: usize,
        offset: usize,
    ) -> AppResult<Vec<ScheduleExecution>> {
        let executions = self.executions.read().await;
        let mut records: Vec<ScheduleExecution> = executions
            .values()
            .filter(|e| e.job_id == job_id)
            .cloned()
            .collect();
        records.sort_by(|a, b| b.started_at.cmp(&a.started_at).then(b.scheduled_for.cmp(&a.scheduled_for)));
        Ok(records.into_iter().skip(offset).take(limit).collect())
    }

    async fn cleanup_old_executions(&self, retention_days: i64, now: Timestamp) -> AppResult<usize> {
        let cutoff = now
            .checked_sub(retention_days.saturating_mul(24).hours())
            .map_err(|e| AppError::BadRequest {
                message: format!("Invalid retention period: {}", e),
            })?;

        let mut executions = self.executions.write().await;
        let before = executions.len();
        executions.retain(|_, e| !(e.status.is_terminal() && e.started_at < cutoff));
        Ok(before - executions.len())
    }
}
