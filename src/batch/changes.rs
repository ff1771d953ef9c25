//! # Table Changes
//!
//! One flush window's events for one table, partitioned by kind.

use std::collections::HashMap;

use serde::Serialize;

use crate::change::{ChangeEvent, DeleteChange, InsertChange, UpdateChange};

/// The batch handed to a table's listeners.
///
/// Every array preserves arrival order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TableChanges {
    /// Table the changes belong to
    pub table: String,

    /// All changes, mixed kinds
    pub all: Vec<ChangeEvent>,

    /// Inserted rows
    #[serde(rename = "INSERT")]
    pub inserts: Vec<InsertChange>,

    /// Updated rows
    #[serde(rename = "UPDATE")]
    pub updates: Vec<UpdateChange>,

    /// Deleted rows
    #[serde(rename = "DELETE")]
    pub deletes: Vec<DeleteChange>,
}

impl TableChanges {
    /// Create an empty batch for `table`
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            ..Default::default()
        }
    }

    /// Append one event
    pub fn push(&mut self, event: ChangeEvent) {
        match &event {
            ChangeEvent::Insert(c) => self.inserts.push(c.clone()),
            ChangeEvent::Update(c) => self.updates.push(c.clone()),
            ChangeEvent::Delete(c) => self.deletes.push(c.clone()),
        }
        self.all.push(event);
    }

    /// Number of changes
    pub fn len(&self) -> usize {
        self.all.len()
    }

    /// Whether the batch has no change
    pub fn is_empty(&self) -> bool {
        self.all.is_empty()
    }
}

/// Partition events by table, in order of each table's first appearance
pub fn group_by_table(events: Vec<ChangeEvent>) -> Vec<TableChanges> {
    let mut groups: Vec<TableChanges> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for event in events {
        let slot = match index.get(event.table()) {
            Some(&slot) => slot,
            None => {
                index.insert(event.table().to_string(), groups.len());
                groups.push(TableChanges::new(event.table()));
                groups.len() - 1
            }
        };
        groups[slot].push(event);
    }

    groups
}
