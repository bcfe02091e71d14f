use std::sync::Arc;

use async_trait::async_trait;
use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::jobs::error::JobError;
use crate::repositories::ExecutionRepository;

/// Context handed to a task for one execution
#[derive(Clone)]
pub struct JobContext {
    pub execution_id: Uuid,
    pub job_id: Uuid,
    pub owner_id: String,
    pub job_type: String,
    pub scheduled_for: Timestamp,
    pub is_manual: bool,
    pub executions: Arc<dyn ExecutionRepository>,
    pub cancellation_token: CancellationToken,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleType {
    OneTime,
    Recurring,
}

impl std::fmt::Display for ScheduleType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScheduleType::OneTime => write!(f, "one_time"),
            ScheduleType::Recurring => write!(f, "recurring"),
        }
    }
}

/// Lifecycle status of a scheduled job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleStatus {
    Active,
    Paused,
    Completed,
    Cancelled,
}

impl ScheduleStatus {
    /// Completed and cancelled jobs never run again
    pub fn is_terminal(self) -> bool {
        matches!(self, ScheduleStatus::Completed | ScheduleStatus::Cancelled)
    }
}

impl std::fmt::Display for ScheduleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScheduleStatus::Active => write!(f, "active"),
            ScheduleStatus::Paused => write!(f, "paused"),
            ScheduleStatus::Completed => write!(f, "completed"),
            ScheduleStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Urgent,
}

impl Priority {
    /// Queue weight; lower runs first
    pub fn weight(self) -> u8 {
        match self {
            Priority::Urgent => 0,
            Priority::High => 1,
            Priority::Normal => 2,
            Priority::Low => 3,
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Priority::Low => write!(f, "low"),
            Priority::Normal => write!(f, "normal"),
            Priority::High => write!(f, "high"),
            Priority::Urgent => write!(f, "urgent"),
        }
    }
}

/// What to do with occurrences that passed while the driver was not ticking
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissedPolicy {
    Skip,
    #[default]
    RunLatest,
    RunAll,
}

impl std::fmt::Display for MissedPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MissedPolicy::Skip => write!(f, "skip"),
            MissedPolicy::RunLatest => write!(f, "run_latest"),
            MissedPolicy::RunAll => write!(f, "run_all"),
        }
    }
}

/// Execution record status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
    Cancelled,
}

impl ExecutionStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, ExecutionStatus::Pending | ExecutionStatus::Running)
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionStatus::Pending => write!(f, "pending"),
            ExecutionStatus::Running => write!(f, "running"),
            ExecutionStatus::Completed => write!(f, "completed"),
            ExecutionStatus::Failed => write!(f, "failed"),
            ExecutionStatus::Skipped => write!(f, "skipped"),
            ExecutionStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Trait that all job tasks must implement
#[async_trait]
pub trait JobTask: Send + Sync + std::fmt::Debug {
    /// Unique identifier for this task type
    fn task_type() -> &'static str
    where
        Self: Sized;

    /// Execute the task, returning an optional result payload
    async fn execute(&self, ctx: JobContext) -> Result<JsonValue, JobError>;

    /// Optional description
    fn description(&self) -> Option<String> {
        None
    }
}

/// The single integration point between the scheduler and job semantics
#[async_trait]
pub trait JobRunner: Send + Sync {
    async fn run(
        &self,
        ctx: JobContext,
        job_type: &str,
        job_config: &JsonValue,
    ) -> Result<JsonValue, JobError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_weights_order() {
        let mut priorities = vec![Priority::Low, Priority::Urgent, Priority::Normal, Priority::High];
        priorities.sort_by_key(|p| p.weight());
        assert_eq!(
            priorities,
            vec![Priority::Urgent, Priority::High, Priority::Normal, Priority::Low]
        );
    }

    #[test]
    fn test_status_terminality() {
        assert!(ScheduleStatus::Completed.is_terminal());
        assert!(ScheduleStatus::Cancelled.is_terminal());
        assert!(!ScheduleStatus::Paused.is_terminal());
        assert!(ExecutionStatus::Skipped.is_terminal());
        assert!(!ExecutionStatus::Running.is_terminal());
    }

    #[test]
    fn test_serde_names() {
        assert_eq!(serde_json::to_string(&MissedPolicy::RunAll).unwrap(), "\"run_all\"");
        assert_eq!(serde_json::to_string(&ScheduleType::OneTime).unwrap(), "\"one_time\"");
        let status: ScheduleStatus = serde_json::from_str("\"paused\"").unwrap();
        assert_eq!(status, ScheduleStatus::Paused);
        assert_eq!(ExecutionStatus::Failed.to_string(), "failed");
    }
}
