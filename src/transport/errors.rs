//! # Transport Errors

use thiserror::Error;

/// Result type for notification transport operations
pub type TransportResult<T> = Result<T, TransportError>;

/// Notification transport errors.
///
/// Inside the listen loop every variant leads to a reconnect; only the
/// control operations surface them.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connect, LISTEN or receive failed
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The server connection dropped
    #[error("Notification connection lost")]
    ConnectionLost,

    /// The transport was stopped
    #[error("Notification transport closed")]
    Closed,

    /// Connector-specific failure
    #[error("Notification transport error: {0}")]
    Other(String),
}
