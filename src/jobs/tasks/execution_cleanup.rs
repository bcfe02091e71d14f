use async_trait::async_trait;
use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};

use crate::jobs::error::JobError;
use crate::jobs::types::{JobContext, JobTask};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionCleanupTask {
    #[serde(default = "default_retention_days")]
    pub retention_days: i64,
}

fn default_retention_days() -> i64 {
    30
}

#[async_trait]
impl JobTask for ExecutionCleanupTask {
    fn task_type() -> &'static str
    where
        Self: Sized,
    {
        "execution_cleanup"
    }

    async fn execute(&self, ctx: JobContext) -> Result<JsonValue, JobError> {
        let deleted = ctx
            .executions
            .cleanup_old_executions(self.retention_days, Timestamp::now())
            .await?;

        tracing::info!(
            deleted_count = deleted,
            retention_days = self.retention_days,
            "Execution cleanup completed"
        );

        Ok(json!({ "deleted": deleted }))
    }

    fn description(&self) -> Option<String> {
        Some(format!(
            "Clean up execution history older than {} days",
            self.retention_days
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use tokio_util::sync::CancellationToken;
    use uuid::Uuid;

    use crate::jobs::models::NewScheduleExecution;
    use crate::jobs::types::ExecutionStatus;
    use crate::repositories::{ExecutionRepository, InMemoryExecutionRepository};

    #[tokio::test]
    async fn test_removes_old_terminal_records() {
        let executions = Arc::new(InMemoryExecutionRepository::new());
        let job_id = Uuid::new_v4();
        let old: Timestamp = "2000-01-01T00:00:00Z".parse().unwrap();
        executions
            .create(NewScheduleExecution {
                job_id,
                owner_id: "o".to_string(),
                scheduled_for: old,
                started_at: old,
                status: ExecutionStatus::Completed,
                is_manual: false,
                error_message: None,
            })
            .await
            .unwrap();

        let ctx = JobContext {
            execution_id: Uuid::new_v4(),
            job_id: Uuid::new_v4(),
            owner_id: "system".to_string(),
            job_type: "execution_cleanup".to_string(),
            scheduled_for: Timestamp::now(),
            is_manual: false,
            executions: executions.clone(),
            cancellation_token: CancellationToken::new(),
        };

        let task: ExecutionCleanupTask = serde_json::from_value(json!({})).unwrap();
        assert_eq!(task.retention_days, 30);
        let out = task.execute(ctx).await.unwrap();
        assert_eq!(out, json!({"deleted": 1}));
        assert!(executions.list_by_job(job_id, 10, 0).await.unwrap().is_empty());
    }
}
