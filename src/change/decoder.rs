//! # Change Decoder
//!
//! Turns column-keyed notification payloads into typed [`ChangeEvent`]s,
//! renaming columns to entity properties and computing the update diff.

use std::collections::HashMap;

use chrono::Utc;
use serde_json::Value;

use super::errors::{ChangeError, ChangeResult};
use super::event::{
    ChangeEvent, ChangeKind, DeleteChange, InsertChange, RawNotification, Row, UpdateChange,
};
use crate::metadata::EntityMetadata;
use crate::registry::ListenerRegistry;

/// Decoder over a fixed set of watched tables
#[derive(Debug, Clone, Default)]
pub struct ChangeDecoder {
    tables: HashMap<String, EntityMetadata>,
}

impl ChangeDecoder {
    /// Create a decoder for the given entity metadata
    pub fn new(entities: impl IntoIterator<Item = EntityMetadata>) -> Self {
        let tables = entities
            .into_iter()
            .map(|meta| (meta.table_name().to_string(), meta))
            .collect();
        Self { tables }
    }

    /// Create a decoder for every table of `registry`
    pub fn from_registry(registry: &ListenerRegistry) -> Self {
        Self::new(registry.tables().map(|binding| binding.metadata().clone()))
    }

    /// Parse and decode a raw notification payload
    pub fn decode_payload(&self, payload: &str) -> ChangeResult<ChangeEvent> {
        self.decode(RawNotification::parse(payload)?)
    }

    /// Decode a parsed notification
    pub fn decode(&self, raw: RawNotification) -> ChangeResult<ChangeEvent> {
        let entity = self
            .tables
            .get(&raw.table)
            .ok_or_else(|| ChangeError::UnknownTable(raw.table.clone()))?;

        let RawNotification {
            id,
            event,
            schema,
            table,
            data,
        } = raw;
        let received_at = Utc::now();

        let change = match event {
            ChangeKind::Insert => ChangeEvent::Insert(InsertChange {
                data: to_row(entity, &table, data)?,
                id,
                schema,
                table,
                received_at,
            }),
            ChangeKind::Delete => ChangeEvent::Delete(DeleteChange {
                data: to_row(entity, &table, data)?,
                id,
                schema,
                table,
                received_at,
            }),
            ChangeKind::Update => {
                let Value::Object(mut images) = data else {
                    return Err(ChangeError::malformed(&table, "update data is not an object"));
                };
                let new = images
                    .remove("new")
                    .ok_or_else(|| ChangeError::malformed(&table, "update is missing `new`"))?;
                let old = images
                    .remove("old")
                    .ok_or_else(|| ChangeError::malformed(&table, "update is missing `old`"))?;

                let old = to_row(entity, &table, old)?;
                let new = to_row(entity, &table, new)?;
                let updated_fields = updated_fields(&old, &new);

                ChangeEvent::Update(UpdateChange {
                    id,
                    schema,
                    table,
                    old,
                    new,
                    updated_fields,
                    received_at,
                })
            }
        };

        Ok(change)
    }
}

/// Rebuild a property-keyed row. Columns without a mapped property are dropped.
pub fn to_row(entity: &EntityMetadata, table: &str, data: Value) -> ChangeResult<Row> {
    let Value::Object(columns) = data else {
        return Err(ChangeError::malformed(table, "row data is not an object"));
    };

    Ok(columns
        .into_iter()
        .filter_map(|(column, value)| {
            entity
                .property_for(&column)
                .map(|property| (property.to_string(), value))
        })
        .collect())
}

/// Scalar properties of `old` whose value differs in `new`.
///
/// Objects, arrays and `null` old values are skipped even when they
/// changed.
pub fn updated_fields(old: &Row, new: &Row) -> Vec<String> {
    old.iter()
        .filter(|(_, value)| is_scalar(value))
        .filter(|(property, value)| new.get(property.as_str()) != Some(*value))
        .map(|(property, _)| property.clone())
        .collect()
}

fn is_scalar(value: &Value) -> bool {
    !matches!(value, Value::Object(_) | Value::Array(_) | Value::Null)
}
