//! # Trigger Specs
//!
//! The merged requirements of every registration on a table, as one
//! installable trigger.

use std::collections::BTreeSet;

use crate::change::ChangeKind;
use crate::metadata::EntityMetadata;

/// Reserved prefix of every CDC trigger and trigger function
pub const DEFAULT_TRIGGER_PREFIX: &str = "pubsub_trigger";

/// A set where "empty" means "everything".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection<T: Ord> {
    /// No restriction
    All,
    /// Only these items
    Only(BTreeSet<T>),
}

impl<T: Ord + Clone> Selection<T> {
    /// Build from a requested set; an empty request selects everything
    pub fn from_items(items: impl IntoIterator<Item = T>) -> Self {
        let items: BTreeSet<T> = items.into_iter().collect();
        if items.is_empty() {
            Selection::All
        } else {
            Selection::Only(items)
        }
    }

    /// Union with `other`. `All` on either side absorbs the union.
    pub fn merge(&mut self, other: &Selection<T>) {
        match other {
            Selection::All => *self = Selection::All,
            Selection::Only(items) => {
                if let Selection::Only(own) = self {
                    own.extend(items.iter().cloned());
                }
            }
        }
    }

    /// Whether `item` is selected
    pub fn contains(&self, item: &T) -> bool {
        match self {
            Selection::All => true,
            Selection::Only(items) => items.contains(item),
        }
    }

    /// Whether nothing is filtered out
    pub fn is_all(&self) -> bool {
        matches!(self, Selection::All)
    }
}

/// Deterministic trigger name for `table`
pub fn trigger_name(prefix: &str, table: &str) -> String {
    let suffix: String = table
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    format!("{}_{}", prefix, suffix)
}

/// One installable trigger
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerSpec {
    table: String,
    name: String,
    events: Vec<ChangeKind>,
    payload_columns: Option<Vec<String>>,
}

impl TriggerSpec {
    /// Build the trigger for `entity` from merged event and property selections.
    ///
    /// Payload properties are translated to column names, in the entity's
    /// column order.
    pub fn new(
        prefix: &str,
        entity: &EntityMetadata,
        events: &Selection<ChangeKind>,
        fields: &Selection<String>,
    ) -> Self {
        let events = ChangeKind::ALL
            .into_iter()
            .filter(|kind| events.contains(kind))
            .collect();

        let payload_columns = match fields {
            Selection::All => None,
            Selection::Only(properties) => Some(
                entity
                    .columns()
                    .iter()
                    .filter(|c| properties.contains(&c.property))
                    .map(|c| c.column.clone())
                    .collect(),
            ),
        };

        Self {
            table: entity.table_name().to_string(),
            name: trigger_name(prefix, entity.table_name()),
            events,
            payload_columns,
        }
    }

    /// Watched table
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Trigger and trigger function name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Change kinds that fire the trigger
    pub fn events(&self) -> &[ChangeKind] {
        &self.events
    }

    /// Columns carried in the payload, `None` for the full row
    pub fn payload_columns(&self) -> Option<&[String]> {
        self.payload_columns.as_deref()
    }
}
