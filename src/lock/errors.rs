//! # Lock Errors
//!
//! Error types for lock backends. A rejected acquisition is not an error;
//! these only describe a backend that could not answer.

use thiserror::Error;

/// Result type for lock operations
pub type LockResult<T> = Result<T, LockError>;

/// Lock backend errors
#[derive(Debug, Error)]
pub enum LockError {
    /// In-process lock table was poisoned by a panicking holder
    #[error("Lock table poisoned")]
    Poisoned,

    /// Redis command failed
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Backend-specific failure
    #[error("Lock backend error: {0}")]
    Backend(String),
}
