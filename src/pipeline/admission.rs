//! # Notification Admission
//!
//! Every process listening on the channel receives every NOTIFY. Before a
//! payload reaches the buffer it must win the dedup lock for its
//! `<channel>_<table>_<EVENT>_<id>` key; losers drop it.
//!
//! The dedup lock is never released early: it expires with its TTL, so a
//! duplicate arriving late within the TTL is still rejected.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, warn};

use crate::batch::BatchBuffer;
use crate::change::{ChangeDecoder, RawNotification};
use crate::lock::LockService;

/// What happened to one payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmitOutcome {
    /// Decoded and pushed to the buffer
    Buffered,
    /// Another receiver already admitted it
    Duplicate,
    /// Unparseable, undecodable or the lock backend failed
    Dropped,
}

/// Dedup and decode stage between the transport and the buffer
pub struct Admission {
    locks: Arc<dyn LockService>,
    decoder: ChangeDecoder,
    buffer: Arc<BatchBuffer>,
    key_prefix: String,
    ttl: Duration,
}

impl Admission {
    pub fn new(
        locks: Arc<dyn LockService>,
        decoder: ChangeDecoder,
        buffer: Arc<BatchBuffer>,
        key_prefix: impl Into<String>,
        ttl: Duration,
    ) -> Self {
        Self {
            locks,
            decoder,
            buffer,
            key_prefix: key_prefix.into(),
            ttl,
        }
    }

    /// Admit one raw payload
    pub async fn admit(&self, payload: &str) -> AdmitOutcome {
        let raw = match RawNotification::parse(payload) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "dropping unparseable notification");
                return AdmitOutcome::Dropped;
            }
        };

        let key = raw.dedup_key(&self.key_prefix);
        match self.locks.acquire(&key, self.ttl).await {
            Ok(Some(_token)) => {}
            Ok(None) => {
                debug!(key = %key, "duplicate notification");
                return AdmitOutcome::Duplicate;
            }
            Err(e) => {
                error!(key = %key, error = %e, "dedup lock failed, dropping notification");
                return AdmitOutcome::Dropped;
            }
        }

        let table = raw.table.clone();
        match self.decoder.decode(raw) {
            Ok(event) => {
                self.buffer.push(event);
                AdmitOutcome::Buffered
            }
            Err(e) => {
                warn!(table = %table, error = %e, "dropping undecodable notification");
                AdmitOutcome::Dropped
            }
        }
    }
}

/// Work item for the admission task
#[derive(Debug)]
pub(crate) enum AdmissionItem {
    Payload(String),
    /// Acknowledged once every earlier item has been admitted
    Barrier(oneshot::Sender<()>),
}

/// Admit queued payloads one at a time, in arrival order
pub(crate) async fn run_admission(
    admission: Arc<Admission>,
    mut queue: mpsc::UnboundedReceiver<AdmissionItem>,
) {
    while let Some(item) = queue.recv().await {
        match item {
            AdmissionItem::Payload(payload) => {
                admission.admit(&payload).await;
            }
            AdmissionItem::Barrier(ack) => {
                let _ = ack.send(());
            }
        }
    }
    debug!("admission queue closed");
}
