use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;

use crate::jobs::error::JobError;
use crate::jobs::tasks::{ExecutionCleanupTask, LogMessageTask};
use crate::jobs::types::{JobContext, JobRunner, JobTask};

type TaskFactory = Box<dyn Fn(JsonValue) -> Result<Box<dyn JobTask>, JobError> + Send + Sync>;

/// Maps job types to task implementations
pub struct TaskRegistry {
    factories: HashMap<String, TaskFactory>,
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Registry preloaded with the built-in tasks
    pub fn with_builtin_tasks() -> Self {
        let mut registry = Self::new();
        registry
            .register::<LogMessageTask>()
            .register::<ExecutionCleanupTask>();
        registry
    }

    /// Register a task type whose config deserializes into the task itself
    pub fn register<T>(&mut self) -> &mut Self
    where
        T: JobTask + DeserializeOwned + 'static,
    {
        let factory: TaskFactory = Box::new(|config: JsonValue| {
            let task: T = serde_json::from_value(config)?;
            Ok(Box::new(task) as Box<dyn JobTask>)
        });

        self.factories.insert(T::task_type().to_string(), factory);
        self
    }

    /// Register a shared task instance that ignores the job config
    pub fn register_with<T>(&mut self, task: Arc<T>) -> &mut Self
    where
        T: JobTask + 'static,
    {
        let factory: TaskFactory = Box::new(move |_config: JsonValue| {
            Ok(Box::new(SharedTask(Arc::clone(&task))) as Box<dyn JobTask>)
        });

        self.factories.insert(T::task_type().to_string(), factory);
        self
    }

    pub fn contains(&self, job_type: &str) -> bool {
        self.factories.contains_key(job_type)
    }

    pub fn job_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }

    /// Create a task instance from job type and config
    pub fn create_task(&self, job_type: &str, config: JsonValue) -> Result<Box<dyn JobTask>, JobError> {
        let factory = self
            .factories
            .get(job_type)
            .ok_or_else(|| JobError::UnknownJobType(job_type.to_string()))?;

        // a missing config means "all defaults"
        let config = match config {
            JsonValue::Null => JsonValue::Object(Default::default()),
            other => other,
        };
        factory(config)
    }
}

#[async_trait]
impl JobRunner for TaskRegistry {
    async fn run(
        &self,
        ctx: JobContext,
        job_type: &str,
        job_config: &JsonValue,
    ) -> Result<JsonValue, JobError> {
        let task = self.create_task(job_type, job_config.clone())?;
        if let Some(description) = task.description() {
            tracing::debug!(job_id = %ctx.job_id, job_type, description = %description, "Running task");
        }
        task.execute(ctx).await
    }
}

#[derive(Debug)]
struct SharedTask<T>(Arc<T>);

#[async_trait]
impl<T: JobTask + 'static> JobTask for SharedTask<T> {
    fn task_type() -> &'static str
    where
        Self: Sized,
    {
        T::task_type()
    }

    async fn execute(&self, ctx: JobContext) -> Result<JsonValue, JobError> {
        self.0.execute(ctx).await
    }

    fn description(&self) -> Option<String> {
        self.0.description()
    }
}
