//! # Errors
//!
//! Crate-level error aggregating every module's error type.
//!
//! Only provisioning failures, lock backend failures raised while
//! provisioning, and setup mistakes reach callers. Runtime failures inside
//! the pipeline (transport drops, undecodable payloads, listener errors)
//! are retried or logged where they occur.

use thiserror::Error;

use crate::config::ConfigError;
use crate::lock::LockError;
use crate::registry::RegistryError;
use crate::transport::TransportError;
use crate::trigger::ProvisionError;

/// Result type for service operations
pub type PubSubResult<T> = Result<T, PubSubError>;

/// Service-level error
#[derive(Debug, Error)]
pub enum PubSubError {
    #[error(transparent)]
    Lock(#[from] LockError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Provision(#[from] ProvisionError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A required component was not supplied to the builder
    #[error("Missing component: {0}")]
    MissingComponent(&'static str),
}
