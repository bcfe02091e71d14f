use thiserror::Error;

use crate::config::ConfigError;
use crate::jobs::recurrence::RuleIssue;
use crate::lock::LockError;

/// A single field failure reported by `validator`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationFieldError {
    pub field: String,
    pub message: String,
}

/// Application-wide error type for the scheduling core.
///
/// Lock contention and job-runner failures never appear here; the executor
/// records them as execution outcomes.
#[derive(Error, Debug)]
pub enum AppError {
    /// Resource not found error with entity, field, and value information
    #[error("Resource not found: {entity} with {field}={value}")]
    NotFound {
        entity: String,
        field: String,
        value: String,
    },

    /// Single-field validation error
    #[error("Validation failed for {field}: {reason}")]
    Validation { field: String, reason: String },

    /// Validation errors collected from a `validator` derive
    #[error("Validation failed: {}", format_field_errors(.errors))]
    ValidationErrors { errors: Vec<ValidationFieldError> },

    /// Recurrence rule rejected with every violated constraint
    #[error("Invalid recurrence rule: {}", format_rule_issues(.issues))]
    RuleInvalid { issues: Vec<RuleIssue> },

    /// Status transition not allowed from the job's current state
    #[error("Cannot {action} job {id} while it is {from}")]
    InvalidTransition {
        id: String,
        from: String,
        action: String,
    },

    /// Bulk request larger than the configured batch limit
    #[error("Batch of {size} items exceeds the maximum of {max}")]
    BatchTooLarge { size: usize, max: usize },

    /// Bad request error with descriptive message
    #[error("Bad request: {message}")]
    BadRequest { message: String },

    /// Lock backend failure (not contention)
    #[error("Lock backend error")]
    Lock {
        #[source]
        source: LockError,
    },

    /// Configuration error with key information
    #[error("Configuration error: {key}")]
    Configuration {
        key: String,
        #[source]
        source: anyhow::Error,
    },

    /// Internal error for unexpected failures
    #[error("Internal error")]
    Internal {
        #[source]
        source: anyhow::Error,
    },
}

impl AppError {
    pub fn not_found(entity: &str, field: &str, value: impl ToString) -> Self {
        AppError::NotFound {
            entity: entity.to_string(),
            field: field.to_string(),
            value: value.to_string(),
        }
    }
}

fn format_field_errors(errors: &[ValidationFieldError]) -> String {
    errors
        .iter()
        .map(|e| format!("{}: {}", e.field, e.message))
        .collect::<Vec<_>>()
        .join("; ")
}

fn format_rule_issues(issues: &[RuleIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        AppError::Internal { source: error }
    }
}

impl From<ConfigError> for AppError {
    fn from(error: ConfigError) -> Self {
        let key = match &error {
            ConfigError::ValidationError { field, .. } => field.clone(),
            _ => "config".to_string(),
        };
        AppError::Configuration {
            key,
            source: anyhow::Error::new(error),
        }
    }
}

impl From<LockError> for AppError {
    fn from(error: LockError) -> Self {
        AppError::Lock { source: error }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut fields: Vec<ValidationFieldError> = errors
            .field_errors()
            .into_iter()
            .flat_map(|(field, errs)| {
                errs.iter().map(move |e| ValidationFieldError {
                    field: field.to_string(),
                    message: e
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| e.code.to_string()),
                })
            })
            .collect();
        fields.sort_by(|a, b| a.field.cmp(&b.field));
        AppError::ValidationErrors { errors: fields }
    }
}

/// Type alias for Result with AppError to simplify function signatures
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use validator::Validate;

    #[derive(Validate)]
    struct Sample {
        #[validate(length(min = 1, message = "name must not be empty"))]
        name: String,
        #[validate(range(min = 1))]
        max_runs: u32,
    }

    #[test]
    fn test_validator_errors_are_collected_per_field() {
        let sample = Sample {
            name: String::new(),
            max_runs: 0,
        };
        let err: AppError = sample.validate().unwrap_err().into();

        match err {
            AppError::ValidationErrors { errors } => {
                assert_eq!(errors.len(), 2);
                assert_eq!(errors[0].field, "max_runs");
                assert_eq!(errors[0].message, "range");
                assert_eq!(errors[1].field, "name");
                assert_eq!(errors[1].message, "name must not be empty");
            }
            other => panic!("Expected ValidationErrors, got {:?}", other),
        }
    }

    #[test]
    fn test_invalid_transition_message() {
        let err = AppError::InvalidTransition {
            id: "abc".to_string(),
            from: "cancelled".to_string(),
            action: "pause".to_string(),
        };
        assert_eq!(err.to_string(), "Cannot pause job abc while it is cancelled");
    }

    #[test]
    fn test_not_found_helper() {
        let err = AppError::not_found("ScheduledJob", "id", 42);
        assert_eq!(err.to_string(), "Resource not found: ScheduledJob with id=42");
    }
}
