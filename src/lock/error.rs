//! Lock backend error types.

use thiserror::Error;

/// Backend failures. Contention is never an error; it is a `false` acquire.
#[derive(Error, Debug)]
pub enum LockError {
    #[error("Lock backend connection failed: {0}")]
    Connection(String),

    #[error("Lock operation failed: {0}")]
    Operation(String),
}

pub type LockResult<T> = Result<T, LockError>;
