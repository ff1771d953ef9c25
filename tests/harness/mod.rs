//! In-process test doubles for the pipeline
//!
//! - `FakeBus`: a notification server shared by any number of services
//! - `RecordingExecutor`: records DDL instead of running it
//! - `Recorder`: a listener remembering every batch

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::broadcast;

use pgpubsub::batch::TableChanges;
use pgpubsub::lock::LockService;
use pgpubsub::metadata::{EntityMetadata, StaticMetadataProvider};
use pgpubsub::registry::{ListenerRegistration, ListenerResult, TableChangeListener};
use pgpubsub::transport::{
    Notification, NotificationConnector, NotificationStream, TransportError, TransportResult,
};
use pgpubsub::trigger::{InstalledTrigger, ProvisionError, ProvisionResult, SchemaExecutor};
use pgpubsub::{PgPubSub, PgPubSubOptions};

pub const CHANNEL: &str = "pubsub_trigger";

// =============================================================================
// Notification bus
// =============================================================================

const DROP_CONNECTIONS: &str = "__drop_connections__";

pub struct FakeBus {
    tx: broadcast::Sender<Notification>,
    connects: AtomicUsize,
}

impl FakeBus {
    pub fn new() -> Arc<Self> {
        let (tx, _) = broadcast::channel(1024);
        Arc::new(Self {
            tx,
            connects: AtomicUsize::new(0),
        })
    }

    /// Publish like `pg_notify(channel, payload)`
    pub fn notify(&self, channel: &str, payload: impl Into<String>) {
        let _ = self.tx.send(Notification {
            channel: channel.to_string(),
            payload: payload.into(),
        });
    }

    /// Sever every open connection
    pub fn drop_connections(&self) {
        self.notify(DROP_CONNECTIONS, "");
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NotificationConnector for FakeBus {
    async fn connect(&self) -> TransportResult<Box<dyn NotificationStream>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeStream {
            rx: self.tx.subscribe(),
            channels: Vec::new(),
        }))
    }
}

struct FakeStream {
    rx: broadcast::Receiver<Notification>,
    channels: Vec<String>,
}

#[async_trait]
impl NotificationStream for FakeStream {
    async fn listen(&mut self, channel: &str) -> TransportResult<()> {
        if !self.channels.iter().any(|c| c == channel) {
            self.channels.push(channel.to_string());
        }
        Ok(())
    }

    async fn recv(&mut self) -> TransportResult<Notification> {
        loop {
            let notification = self
                .rx
                .recv()
                .await
                .map_err(|_| TransportError::ConnectionLost)?;
            if notification.channel == DROP_CONNECTIONS {
                return Err(TransportError::ConnectionLost);
            }
            if self.channels.contains(&notification.channel) {
                return Ok(notification);
            }
        }
    }

    async fn close(self: Box<Self>) -> TransportResult<()> {
        Ok(())
    }
}

// =============================================================================
// Schema executor
// =============================================================================

#[derive(Default)]
pub struct RecordingExecutor {
    pub installed: Mutex<Vec<InstalledTrigger>>,
    pub executed: Mutex<Vec<String>>,
    pub fail: AtomicBool,
}

impl RecordingExecutor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing() -> Arc<Self> {
        let executor = Self::default();
        executor.fail.store(true, Ordering::SeqCst);
        Arc::new(executor)
    }

    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }
}

#[async_trait]
impl SchemaExecutor for RecordingExecutor {
    async fn installed_triggers(
        &self,
        _schema: &str,
        _like_pattern: &str,
    ) -> ProvisionResult<Vec<InstalledTrigger>> {
        Ok(self.installed.lock().unwrap().clone())
    }

    async fn execute(&self, sql: &str) -> ProvisionResult<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(ProvisionError::executor("relation does not exist"));
        }
        self.executed.lock().unwrap().push(sql.to_string());
        Ok(())
    }
}

// =============================================================================
// Listener
// =============================================================================

#[derive(Default)]
pub struct Recorder {
    calls: Mutex<Vec<TableChanges>>,
}

impl Recorder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> Vec<TableChanges> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl TableChangeListener for Recorder {
    async fn process(&self, changes: &TableChanges) -> ListenerResult {
        self.calls.lock().unwrap().push(changes.clone());
        Ok(())
    }
}

// =============================================================================
// Fixtures
// =============================================================================

pub fn metadata() -> StaticMetadataProvider {
    StaticMetadataProvider::new()
        .with_entity(
            "Order",
            EntityMetadata::new(
                "orders",
                [("id", "id"), ("status", "status"), ("total", "total")],
            ),
        )
        .with_entity(
            "Customer",
            EntityMetadata::new("customers", [("id", "id"), ("fullName", "full_name")]),
        )
}

pub fn service(
    bus: &Arc<FakeBus>,
    executor: &Arc<RecordingExecutor>,
    locks: Arc<dyn LockService>,
    registrations: Vec<ListenerRegistration>,
) -> PgPubSub {
    PgPubSub::builder()
        .register_all(registrations)
        .metadata(metadata())
        .lock_service(locks)
        .schema_executor(executor.clone())
        .connector(bus.clone())
        .options(PgPubSubOptions::default())
        .build()
        .unwrap()
}

pub fn insert_payload(id: &str, table: &str, data: Value) -> String {
    json!({
        "id": id,
        "event": "INSERT",
        "schema": "public",
        "table": table,
        "data": data
    })
    .to_string()
}

pub fn update_payload(id: &str, table: &str, new: Value, old: Value) -> String {
    json!({
        "id": id,
        "event": "UPDATE",
        "schema": "public",
        "table": table,
        "data": {"new": new, "old": old}
    })
    .to_string()
}
