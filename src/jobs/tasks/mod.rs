//! Built-in job types.

mod execution_cleanup;
mod log_message;

pub use execution_cleanup::ExecutionCleanupTask;
pub use log_message::LogMessageTask;
