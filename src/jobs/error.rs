use thiserror::Error;

/// Failure of a single job run. Always recorded, never propagated.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("Job execution failed: {0}")]
    ExecutionFailed(String),

    #[error("execution timed out after {0}s")]
    Timeout(u64),

    #[error("Unknown job type: {0}")]
    UnknownJobType(String),

    #[error("Invalid job config: {0}")]
    InvalidConfig(#[from] serde_json::Error),

    #[error("Job was cancelled")]
    Cancelled,

    #[error("Job panicked: {0}")]
    Panicked(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl From<crate::error::AppError> for JobError {
    fn from(err: crate::error::AppError) -> Self {
        JobError::Storage(err.to_string())
    }
}

pub type JobResult<T> = Result<T, JobError>;
