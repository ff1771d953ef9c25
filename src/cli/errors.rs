//! CLI-specific error types
//!
//! Every CLI error ends the process with a non-zero exit code.

use std::fmt;
use std::io;

use crate::config::ConfigError;
use crate::errors::PubSubError;

/// CLI error codes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliErrorCode {
    /// Configuration file or registration error
    ConfigError,
    /// I/O error (stdout)
    IoError,
    /// Trigger synchronization or catalog query failed
    SyncFailed,
    /// Listening could not be started
    StartFailed,
}

impl CliErrorCode {
    /// Get the error code string
    pub fn code(&self) -> &'static str {
        match self {
            Self::ConfigError => "PGPUBSUB_CLI_CONFIG_ERROR",
            Self::IoError => "PGPUBSUB_CLI_IO_ERROR",
            Self::SyncFailed => "PGPUBSUB_CLI_SYNC_FAILED",
            Self::StartFailed => "PGPUBSUB_CLI_START_FAILED",
        }
    }
}

/// CLI error
#[derive(Debug)]
pub struct CliError {
    code: CliErrorCode,
    message: String,
}

impl CliError {
    /// Create a new CLI error
    pub fn new(code: CliErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Config error
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::ConfigError, msg)
    }

    /// I/O error
    pub fn io_error(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::IoError, msg)
    }

    /// Synchronization failed
    pub fn sync_failed(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::SyncFailed, msg)
    }

    /// Start failed
    pub fn start_failed(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::StartFailed, msg)
    }

    /// Get the error code
    pub fn code(&self) -> &CliErrorCode {
        &self.code
    }

    /// Get the error code string
    pub fn code_str(&self) -> &'static str {
        self.code.code()
    }

    /// Get the error message
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code.code(), self.message)
    }
}

impl std::error::Error for CliError {}

impl From<io::Error> for CliError {
    fn from(e: io::Error) -> Self {
        Self::io_error(e.to_string())
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        Self::io_error(format!("JSON error: {}", e))
    }
}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        Self::config_error(e.to_string())
    }
}

impl From<PubSubError> for CliError {
    fn from(e: PubSubError) -> Self {
        match e {
            PubSubError::Config(_) | PubSubError::Registry(_) => Self::config_error(e.to_string()),
            PubSubError::Provision(_) | PubSubError::Lock(_) => Self::sync_failed(e.to_string()),
            PubSubError::Transport(_) | PubSubError::MissingComponent(_) => {
                Self::start_failed(e.to_string())
            }
        }
    }
}

/// CLI result type
pub type CliResult<T> = Result<T, CliError>;
