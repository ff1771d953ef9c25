//! # Listener Registry
//!
//! Resolves static registrations against entity metadata, merges the
//! requirements of every registration on the same table, and answers
//! "which listeners watch this table".

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use super::errors::{RegistryError, RegistryResult};
use super::listener::{ListenerRegistration, TableChangeListener};
use crate::change::ChangeKind;
use crate::metadata::{EntityMetadata, MetadataProvider};
use crate::trigger::{Selection, TriggerSpec};

/// A listener bound to a resolved table
#[derive(Clone)]
pub struct RegisteredListener {
    target: String,
    listener: Arc<dyn TableChangeListener>,
}

impl RegisteredListener {
    /// Entity type the listener was registered for
    pub fn target(&self) -> &str {
        &self.target
    }

    /// The handler
    pub fn listener(&self) -> &Arc<dyn TableChangeListener> {
        &self.listener
    }
}

impl std::fmt::Debug for RegisteredListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredListener")
            .field("target", &self.target)
            .field("listener", &self.listener.name())
            .finish()
    }
}

/// Everything known about one watched table
#[derive(Debug, Clone)]
pub struct TableBinding {
    metadata: EntityMetadata,
    trigger: TriggerSpec,
    listeners: Vec<RegisteredListener>,
}

impl TableBinding {
    /// Table name
    pub fn table(&self) -> &str {
        self.metadata.table_name()
    }

    /// Entity metadata of the table
    pub fn metadata(&self) -> &EntityMetadata {
        &self.metadata
    }

    /// Merged trigger for the table
    pub fn trigger(&self) -> &TriggerSpec {
        &self.trigger
    }

    /// Listeners in registration order
    pub fn listeners(&self) -> &[RegisteredListener] {
        &self.listeners
    }
}

/// Accumulator used while merging registrations
struct PendingTable {
    metadata: EntityMetadata,
    events: Selection<ChangeKind>,
    fields: Selection<String>,
    listeners: Vec<RegisteredListener>,
}

/// Immutable table → listeners map built once at startup
#[derive(Debug, Clone, Default)]
pub struct ListenerRegistry {
    bindings: Vec<TableBinding>,
    index: HashMap<String, usize>,
}

impl ListenerRegistry {
    /// Resolve and merge `registrations`.
    ///
    /// Registrations whose entity the provider does not know are skipped
    /// with a warning. A payload field that is not a property of its entity
    /// is an error.
    pub fn build(
        registrations: Vec<ListenerRegistration>,
        metadata: &dyn MetadataProvider,
        trigger_prefix: &str,
    ) -> RegistryResult<Self> {
        let mut pending: Vec<PendingTable> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();

        for registration in registrations {
            let Some(entity) = metadata.resolve(registration.target()) else {
                warn!(
                    entity = registration.target(),
                    listener = registration.listener().name(),
                    "listener target has no table metadata, skipping"
                );
                continue;
            };

            if entity.columns().is_empty() {
                return Err(RegistryError::NoColumns(registration.target().to_string()));
            }

            if let Some(field) = registration
                .payload_fields()
                .iter()
                .find(|f| !entity.has_property(f))
            {
                return Err(RegistryError::UnknownField {
                    entity: registration.target().to_string(),
                    field: field.clone(),
                });
            }

            let events = Selection::from_items(registration.events().iter().copied());
            let fields = Selection::from_items(registration.payload_fields().iter().cloned());
            let listener = RegisteredListener {
                target: registration.target().to_string(),
                listener: Arc::clone(registration.listener()),
            };

            let table = entity.table_name().to_string();
            match index.get(&table) {
                Some(&i) => {
                    let slot = &mut pending[i];
                    slot.events.merge(&events);
                    slot.fields.merge(&fields);
                    slot.listeners.push(listener);
                }
                None => {
                    index.insert(table, pending.len());
                    pending.push(PendingTable {
                        metadata: entity,
                        events,
                        fields,
                        listeners: vec![listener],
                    });
                }
            }
        }

        let mut bindings: Vec<TableBinding> = Vec::with_capacity(pending.len());
        let mut trigger_owners: HashMap<String, String> = HashMap::new();
        for p in pending {
            let trigger = TriggerSpec::new(trigger_prefix, &p.metadata, &p.events, &p.fields);
            if let Some(first) = trigger_owners.get(trigger.name()) {
                return Err(RegistryError::TriggerNameCollision {
                    trigger: trigger.name().to_string(),
                    first: first.clone(),
                    second: p.metadata.table_name().to_string(),
                });
            }
            trigger_owners.insert(trigger.name().to_string(), p.metadata.table_name().to_string());

            debug!(
                table = p.metadata.table_name(),
                trigger = trigger.name(),
                listeners = p.listeners.len(),
                "table bound"
            );
            bindings.push(TableBinding {
                metadata: p.metadata,
                trigger,
                listeners: p.listeners,
            });
        }

        Ok(Self { bindings, index })
    }

    /// Bindings in order of first registration
    pub fn tables(&self) -> impl Iterator<Item = &TableBinding> {
        self.bindings.iter()
    }

    /// Binding for `table`
    pub fn binding(&self, table: &str) -> Option<&TableBinding> {
        self.index.get(table).map(|&i| &self.bindings[i])
    }

    /// Entity metadata for `table`
    pub fn entity(&self, table: &str) -> Option<&EntityMetadata> {
        self.binding(table).map(TableBinding::metadata)
    }

    /// Listeners watching `table`, empty if none
    pub fn listeners(&self, table: &str) -> &[RegisteredListener] {
        self.binding(table)
            .map(TableBinding::listeners)
            .unwrap_or(&[])
    }

    /// One merged trigger per watched table
    pub fn trigger_specs(&self) -> impl Iterator<Item = &TriggerSpec> {
        self.bindings.iter().map(TableBinding::trigger)
    }

    /// Watched table names
    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.bindings.iter().map(TableBinding::table)
    }

    /// Number of watched tables
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// Whether no table is watched
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}
