use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::jobs::recurrence::RecurrenceRule;
use crate::jobs::types::{ExecutionStatus, MissedPolicy, Priority, ScheduleStatus, ScheduleType};

// ============================================================================
// ScheduledJob Models
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledJob {
    pub id: Uuid,
    pub owner_id: String,
    pub name: String,
    pub job_type: String,
    pub job_config: JsonValue,
    pub schedule_type: ScheduleType,
    pub recurrence: Option<RecurrenceRule>,
    pub run_at: Option<Timestamp>,
    pub status: ScheduleStatus,
    pub priority: Priority,
    pub next_run_at: Option<Timestamp>,
    pub last_run_at: Option<Timestamp>,
    pub run_count: u32,
    pub max_runs: Option<u32>,
    pub missed_policy: MissedPolicy,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl ScheduledJob {
    /// Lock key shared by scheduled ticks and manual runs
    pub fn lock_key(&self) -> String {
        lock_key(self.id)
    }

    /// Effective run cap: the smaller of `max_runs` and the rule's `count`
    pub fn run_cap(&self) -> Option<u32> {
        let count = self.recurrence.as_ref().and_then(|r| r.count);
        match (self.max_runs, count) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }
}

pub fn lock_key(job_id: Uuid) -> String {
    format!("schedule:{}", job_id)
}

fn validate_job_type(value: &str) -> Result<(), ValidationError> {
    let valid = value
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    if valid && value.starts_with(|c: char| c.is_ascii_lowercase()) {
        Ok(())
    } else {
        let mut err = ValidationError::new("job_type");
        err.message = Some("job_type must be lowercase snake_case".into());
        Err(err)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct NewScheduledJob {
    #[validate(length(min = 1, max = 128, message = "owner_id must be 1-128 characters"))]
    pub owner_id: String,

    #[validate(length(min = 1, max = 255, message = "name must be 1-255 characters"))]
    pub name: String,

    #[validate(
        length(min = 1, max = 64, message = "job_type must be 1-64 characters"),
        custom(function = "validate_job_type")
    )]
    pub job_type: String,

    #[serde(default)]
    pub job_config: JsonValue,

    pub schedule_type: ScheduleType,

    #[serde(default)]
    pub recurrence: Option<RecurrenceRule>,

    #[serde(default)]
    pub run_at: Option<Timestamp>,

    #[serde(default)]
    pub priority: Priority,

    #[validate(range(min = 1, message = "max_runs must be at least 1"))]
    #[serde(default)]
    pub max_runs: Option<u32>,

    #[serde(default)]
    pub missed_policy: MissedPolicy,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateScheduledJob {
    #[validate(length(min = 1, max = 255, message = "name must be 1-255 characters"))]
    pub name: Option<String>,
    pub job_config: Option<JsonValue>,
    pub recurrence: Option<RecurrenceRule>,
    pub priority: Option<Priority>,
    pub max_runs: Option<Option<u32>>,
    pub missed_policy: Option<MissedPolicy>,

    /// Set by the registry when a rule change moves the schedule
    #[serde(skip)]
    pub next_run_at: Option<Option<Timestamp>>,
}

/// Filter for listing jobs; `None` matches anything
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JobFilter {
    pub owner_id: Option<String>,
    pub status: Option<ScheduleStatus>,
    pub job_type: Option<String>,
}

impl JobFilter {
    pub fn matches(&self, job: &ScheduledJob) -> bool {
        self.owner_id.as_deref().is_none_or(|o| o == job.owner_id)
            && self.status.is_none_or(|s| s == job.status)
            && self.job_type.as_deref().is_none_or(|t| t == job.job_type)
    }
}

/// One compare-and-set status change; applied only if the job is still `expected`
#[derive(Debug, Clone)]
pub struct StatusChange {
    pub id: Uuid,
    pub expected: ScheduleStatus,
    pub to: ScheduleStatus,
    pub next_run_at: Option<Timestamp>,
}

/// Job state advance written by the executor after an attempt
#[derive(Debug, Clone)]
pub struct RunRecord {
    /// `None` when the schedule moves without a run (skipped catch-up)
    pub last_run_at: Option<Timestamp>,
    pub increment_run_count: bool,
    /// `None` leaves the schedule untouched (manual runs)
    pub next_run_at: Option<Option<Timestamp>>,
    pub status: Option<ScheduleStatus>,
}

// ============================================================================
// ScheduleExecution Models
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleExecution {
    pub id: Uuid,
    pub job_id: Uuid,
    pub owner_id: String,
    pub scheduled_for: Timestamp,
    pub started_at: Timestamp,
    pub completed_at: Option<Timestamp>,
    pub duration_ms: Option<i64>,
    pub status: ExecutionStatus,
    pub is_manual: bool,
    pub error_message: Option<String>,
    pub result: Option<JsonValue>,
}

#[derive(Debug, Clone)]
pub struct NewScheduleExecution {
    pub job_id: Uuid,
    pub owner_id: String,
    pub scheduled_for: Timestamp,
    pub started_at: Timestamp,
    pub status: ExecutionStatus,
    pub is_manual: bool,
    pub error_message: Option<String>,
}

/// Terminal outcome applied to a RUNNING execution
#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    pub status: ExecutionStatus,
    pub completed_at: Timestamp,
    pub error_message: Option<String>,
    pub result: Option<JsonValue>,
}
