//! # Registry Errors

use thiserror::Error;

/// Result type for registry construction
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Listener registration errors, all raised at startup
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// A payload field is not a mapped property of the entity
    #[error("Unknown payload field '{field}' for entity {entity}")]
    UnknownField { entity: String, field: String },

    /// Entity resolves to a table with no mapped column
    #[error("Entity {0} has no mapped columns")]
    NoColumns(String),

    /// Two tables map to the same trigger name
    #[error("Tables {first} and {second} both map to trigger {trigger}")]
    TriggerNameCollision {
        trigger: String,
        first: String,
        second: String,
    },
}
