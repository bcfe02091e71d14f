use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};

use crate::jobs::error::JobError;
use crate::jobs::types::{JobContext, JobTask};

/// Emits a tracing event; handy for smoke-testing a schedule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogMessageTask {
    pub message: String,
    #[serde(default = "default_level")]
    pub level: String,
}

fn default_level() -> String {
    "info".to_string()
}

#[async_trait]
impl JobTask for LogMessageTask {
    fn task_type() -> &'static str
    where
        Self: Sized,
    {
        "log_message"
    }

    async fn execute(&self, ctx: JobContext) -> Result<JsonValue, JobError> {
        let message = self.message.as_str();
        match self.level.to_ascii_lowercase().as_str() {
            "error" => tracing::error!(job_id = %ctx.job_id, scheduled_for = %ctx.scheduled_for, "{}", message),
            "warn" => tracing::warn!(job_id = %ctx.job_id, scheduled_for = %ctx.scheduled_for, "{}", message),
            "debug" => tracing::debug!(job_id = %ctx.job_id, scheduled_for = %ctx.scheduled_for, "{}", message),
            "info" => tracing::info!(job_id = %ctx.job_id, scheduled_for = %ctx.scheduled_for, "{}", message),
            other => {
                return Err(JobError::ExecutionFailed(format!(
                    "unsupported log level '{}'",
                    other
                )));
            }
        }

        Ok(json!({ "logged": message }))
    }

    fn description(&self) -> Option<String> {
        Some(format!("Log '{}' at {}", self.message, self.level))
    }
}
