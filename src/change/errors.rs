//! # Change Errors
//!
//! Decode failures. None of these is fatal: the notification is logged and
//! dropped.

use thiserror::Error;

/// Result type for decoding
pub type ChangeResult<T> = Result<T, ChangeError>;

/// Decode errors
#[derive(Debug, Error)]
pub enum ChangeError {
    /// Payload is not valid notification JSON
    #[error("Invalid notification payload: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// No listener registration covers the table
    #[error("Unknown table: {0}")]
    UnknownTable(String),

    /// JSON is well formed but the row data has the wrong shape
    #[error("Malformed payload for table {table}: {reason}")]
    MalformedPayload { table: String, reason: String },
}

impl ChangeError {
    pub(crate) fn malformed(table: &str, reason: impl Into<String>) -> Self {
        ChangeError::MalformedPayload {
            table: table.to_string(),
            reason: reason.into(),
        }
    }
}
