//! # Metadata Provider
//!
//! The pipeline never talks to an ORM directly. Whatever persistence layer
//! the application uses supplies table and column names through
//! [`MetadataProvider`].

pub mod entity;

use std::collections::HashMap;

pub use entity::{ColumnMetadata, EntityMetadata};

/// Resolves an entity type name to its table metadata
pub trait MetadataProvider: Send + Sync {
    /// Metadata for `entity`, or `None` when the type is unknown
    fn resolve(&self, entity: &str) -> Option<EntityMetadata>;
}

/// A fixed entity → metadata map, built at startup
#[derive(Debug, Clone, Default)]
pub struct StaticMetadataProvider {
    entities: HashMap<String, EntityMetadata>,
}

impl StaticMetadataProvider {
    /// Create an empty provider
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `metadata` under the entity name `entity`
    pub fn with_entity(mut self, entity: impl Into<String>, metadata: EntityMetadata) -> Self {
        self.insert(entity, metadata);
        self
    }

    /// Register `metadata` under the entity name `entity`
    pub fn insert(&mut self, entity: impl Into<String>, metadata: EntityMetadata) {
        self.entities.insert(entity.into(), metadata);
    }

    /// Number of known entities
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Whether no entity is registered
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

impl MetadataProvider for StaticMetadataProvider {
    fn resolve(&self, entity: &str) -> Option<EntityMetadata> {
        self.entities.get(entity).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_provider_resolves_registered_entity() {
        let provider = StaticMetadataProvider::new()
            .with_entity("Order", EntityMetadata::new("orders", [("id", "id")]));

        let meta = provider.resolve("Order").unwrap();
        assert_eq!(meta.table_name(), "orders");
        assert!(provider.resolve("Invoice").is_none());
        assert_eq!(provider.len(), 1);
    }
}
