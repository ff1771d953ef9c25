//! # Change Events
//!
//! Wire payloads emitted by the CDC triggers and the typed events they
//! decode into.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::errors::ChangeResult;

/// A row keyed by entity property name, in payload column order
pub type Row = Map<String, Value>;

/// Kind of row change
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    /// New row inserted
    Insert,
    /// Existing row updated
    Update,
    /// Row deleted
    Delete,
}

impl ChangeKind {
    /// Every kind, in trigger declaration order
    pub const ALL: [ChangeKind; 3] = [ChangeKind::Insert, ChangeKind::Update, ChangeKind::Delete];

    /// SQL keyword for the kind (`TG_OP` value)
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Insert => "INSERT",
            ChangeKind::Update => "UPDATE",
            ChangeKind::Delete => "DELETE",
        }
    }
}

impl std::fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn default_schema() -> String {
    "public".to_string()
}

/// Notification payload exactly as the trigger function publishes it.
///
/// `data` is column keyed. For updates it is `{"new": {...}, "old": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawNotification {
    /// Unique id generated by the trigger (`gen_random_uuid()`)
    pub id: String,

    /// Operation that fired the trigger
    pub event: ChangeKind,

    /// Schema of the changed table
    #[serde(default = "default_schema")]
    pub schema: String,

    /// Changed table
    pub table: String,

    /// Column-keyed row data
    pub data: Value,
}

impl RawNotification {
    /// Parse a notification payload
    pub fn parse(payload: &str) -> ChangeResult<Self> {
        Ok(serde_json::from_str(payload)?)
    }

    /// Idempotency key shared by every process receiving this notification
    pub fn dedup_key(&self, prefix: &str) -> String {
        format!("{}_{}_{}_{}", prefix, self.table, self.event, self.id)
    }
}

/// An inserted row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InsertChange {
    pub id: String,
    pub schema: String,
    pub table: String,
    pub data: Row,
    pub received_at: DateTime<Utc>,
}

/// An updated row.
///
/// `updated_fields` lists the scalar properties whose value differs between
/// `old` and `new`. Object and array properties are never listed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpdateChange {
    pub id: String,
    pub schema: String,
    pub table: String,
    pub old: Row,
    pub new: Row,
    pub updated_fields: Vec<String>,
    pub received_at: DateTime<Utc>,
}

impl UpdateChange {
    /// Whether `property` is among the updated fields
    pub fn is_updated(&self, property: &str) -> bool {
        self.updated_fields.iter().any(|f| f == property)
    }
}

/// A deleted row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeleteChange {
    pub id: String,
    pub schema: String,
    pub table: String,
    pub data: Row,
    pub received_at: DateTime<Utc>,
}

/// A decoded row change
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "UPPERCASE")]
pub enum ChangeEvent {
    Insert(InsertChange),
    Update(UpdateChange),
    Delete(DeleteChange),
}

impl ChangeEvent {
    /// Trigger generated id
    pub fn id(&self) -> &str {
        match self {
            ChangeEvent::Insert(c) => &c.id,
            ChangeEvent::Update(c) => &c.id,
            ChangeEvent::Delete(c) => &c.id,
        }
    }

    /// Changed table
    pub fn table(&self) -> &str {
        match self {
            ChangeEvent::Insert(c) => &c.table,
            ChangeEvent::Update(c) => &c.table,
            ChangeEvent::Delete(c) => &c.table,
        }
    }

    /// Kind of change
    pub fn kind(&self) -> ChangeKind {
        match self {
            ChangeEvent::Insert(_) => ChangeKind::Insert,
            ChangeEvent::Update(_) => ChangeKind::Update,
            ChangeEvent::Delete(_) => ChangeKind::Delete,
        }
    }
}
