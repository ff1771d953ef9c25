//! # Entity Metadata
//!
//! Table name plus the property ↔ column mapping of one entity type.

use std::collections::HashMap;

/// One mapped column
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMetadata {
    /// Property name on the entity
    pub property: String,
    /// Database-native column name
    pub column: String,
}

/// Resolved metadata of an entity type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityMetadata {
    table_name: String,
    columns: Vec<ColumnMetadata>,
    property_to_column: HashMap<String, String>,
    column_to_property: HashMap<String, String>,
}

impl EntityMetadata {
    /// Create metadata from `(property, column)` pairs in declaration order
    pub fn new<I, P, C>(table_name: impl Into<String>, columns: I) -> Self
    where
        I: IntoIterator<Item = (P, C)>,
        P: Into<String>,
        C: Into<String>,
    {
        let columns: Vec<ColumnMetadata> = columns
            .into_iter()
            .map(|(property, column)| ColumnMetadata {
                property: property.into(),
                column: column.into(),
            })
            .collect();

        let property_to_column = columns
            .iter()
            .map(|c| (c.property.clone(), c.column.clone()))
            .collect();
        let column_to_property = columns
            .iter()
            .map(|c| (c.column.clone(), c.property.clone()))
            .collect();

        Self {
            table_name: table_name.into(),
            columns,
            property_to_column,
            column_to_property,
        }
    }

    /// Table backing the entity
    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// Mapped columns in declaration order
    pub fn columns(&self) -> &[ColumnMetadata] {
        &self.columns
    }

    /// Column storing `property`
    pub fn column_for(&self, property: &str) -> Option<&str> {
        self.property_to_column.get(property).map(String::as_str)
    }

    /// Property mapped to `column`
    pub fn property_for(&self, column: &str) -> Option<&str> {
        self.column_to_property.get(column).map(String::as_str)
    }

    /// Whether `property` is mapped
    pub fn has_property(&self, property: &str) -> bool {
        self.property_to_column.contains_key(property)
    }
}
