//! # Table Change Listeners
//!
//! Application handlers and the static registrations that bind them to an
//! entity type.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::batch::TableChanges;
use crate::change::ChangeKind;

/// Error returned by a listener
pub type ListenerError = Box<dyn std::error::Error + Send + Sync>;

/// Result returned by a listener
pub type ListenerResult = Result<(), ListenerError>;

/// Handler for batched changes of one table.
///
/// `process` is called once per table per non-empty flush window, with
/// every admitted change of that window.
#[async_trait]
pub trait TableChangeListener: Send + Sync {
    /// Process one flush window's changes
    async fn process(&self, changes: &TableChanges) -> ListenerResult;

    /// Name used in logs
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// Static registration of a listener against an entity type.
///
/// Empty `events` means every kind; empty `payload_fields` means every
/// column.
#[derive(Clone)]
pub struct ListenerRegistration {
    target: String,
    events: BTreeSet<ChangeKind>,
    payload_fields: BTreeSet<String>,
    listener: Arc<dyn TableChangeListener>,
}

impl ListenerRegistration {
    /// Register `listener` for every change of `target`
    pub fn new(target: impl Into<String>, listener: Arc<dyn TableChangeListener>) -> Self {
        Self {
            target: target.into(),
            events: BTreeSet::new(),
            payload_fields: BTreeSet::new(),
            listener,
        }
    }

    /// Restrict the change kinds the trigger must report
    pub fn with_events(mut self, events: impl IntoIterator<Item = ChangeKind>) -> Self {
        self.events = events.into_iter().collect();
        self
    }

    /// Restrict the properties carried in the payload
    pub fn with_payload_fields<S: Into<String>>(
        mut self,
        fields: impl IntoIterator<Item = S>,
    ) -> Self {
        self.payload_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Entity type name
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Requested change kinds (empty = all)
    pub fn events(&self) -> &BTreeSet<ChangeKind> {
        &self.events
    }

    /// Requested payload properties (empty = all)
    pub fn payload_fields(&self) -> &BTreeSet<String> {
        &self.payload_fields
    }

    /// The handler
    pub fn listener(&self) -> &Arc<dyn TableChangeListener> {
        &self.listener
    }
}

impl fmt::Debug for ListenerRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerRegistration")
            .field("target", &self.target)
            .field("events", &self.events)
            .field("payload_fields", &self.payload_fields)
            .field("listener", &self.listener.name())
            .finish()
    }
}
