//! Job scheduling core: recurrence math, admission control, locked
//! execution and the polling driver.

pub mod error;
pub mod executor;
pub mod models;
pub mod queue;
pub mod recurrence;
pub mod registry;
pub mod scheduler;
pub mod tasks;
pub mod types;

pub use error::{JobError, JobResult};
pub use executor::{ExecutorOptions, MAX_CATCH_UP_RUNS, ScheduleExecutor};
pub use models::{
    ExecutionOutcome, JobFilter, NewScheduleExecution, NewScheduledJob, RunRecord,
    ScheduleExecution, ScheduledJob, StatusChange, UpdateScheduledJob,
};
pub use queue::ConcurrencyQueue;
pub use recurrence::{Frequency, RecurrenceRule, RuleIssue};
pub use registry::TaskRegistry;
pub use scheduler::{JobScheduler, TickReport};
pub use types::{
    ExecutionStatus, JobContext, JobRunner, JobTask, MissedPolicy, Priority, ScheduleStatus,
    ScheduleType,
};
