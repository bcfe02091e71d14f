//! Repository layer for data access operations.
//!
//! The scheduler only talks to storage through these traits. The in-memory
//! implementations back the daemon and the tests; a database-backed store
//! implements the same contracts.

mod job_execution_repo;
mod job_repo;

pub use job_execution_repo::{ExecutionRepository, InMemoryExecutionRepository};
pub use job_repo::{InMemoryJobRepository, JobRepository};

#[cfg(test)]
pub(crate) use job_repo::tests::job_at;

use std::sync::Arc;

/// Aggregates all repositories for convenient access.
///
/// Cloning is cheap since both stores sit behind `Arc`.
#[derive(Clone)]
pub struct Repositories {
    pub jobs: Arc<dyn JobRepository>,
    pub executions: Arc<dyn ExecutionRepository>,
}

impl Repositories {
    pub fn new(jobs: Arc<dyn JobRepository>, executions: Arc<dyn ExecutionRepository>) -> Self {
        Self { jobs, executions }
    }

    /// In-process stores with no persistence across restarts
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(InMemoryJobRepository::new()),
            Arc::new(InMemoryExecutionRepository::new()),
        )
    }
}
