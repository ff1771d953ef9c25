//! # Provisioning Errors

use thiserror::Error;

use crate::lock::LockError;

/// Result type for trigger provisioning
pub type ProvisionResult<T> = Result<T, ProvisionError>;

/// Trigger provisioning errors. Fatal to startup.
#[derive(Debug, Error)]
pub enum ProvisionError {
    /// DDL or catalog query failed
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Schema lock backend failed
    #[error("Schema lock error: {0}")]
    Lock(#[from] LockError),

    /// Executor failure not backed by sqlx
    #[error("Schema executor error: {0}")]
    Executor(String),
}

impl ProvisionError {
    /// Shorthand for executor-specific failures
    pub fn executor(message: impl Into<String>) -> Self {
        ProvisionError::Executor(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_error_converts() {
        let err: ProvisionError = LockError::Backend("down".into()).into();
        assert!(matches!(err, ProvisionError::Lock(_)));
        assert!(err.to_string().starts_with("Schema lock error"));
    }
}
