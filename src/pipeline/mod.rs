//! # Pipeline
//!
//! The CDC service: provisions triggers, listens on the shared channel,
//! deduplicates and decodes notifications, and drives the flush timer
//! that delivers batches to listeners.
//!
//! ```text
//! NOTIFY → transport → admission (dedup lock, decode) → buffer
//!                                                          ↓ every flush_interval
//!                                     listeners ← dispatcher
//! ```

pub mod admission;
pub mod builder;

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::batch::{BatchBuffer, FlushTask};
use crate::change::ChangeDecoder;
use crate::dispatch::{panic_message, Dispatcher};
use crate::errors::{PubSubError, PubSubResult};
use crate::lock::LockService;
use crate::registry::ListenerRegistry;
use crate::transport::{
    NotificationConnector, NotificationTransport, PayloadHandler, ReconnectBackoff, TransportState,
};
use crate::trigger::{
    ProvisionerConfig, SchemaExecutor, SyncOutcome, TriggerProvisioner, DEFAULT_TRIGGER_PREFIX,
};

pub use admission::{Admission, AdmitOutcome};
pub use builder::PgPubSubBuilder;

use admission::{run_admission, AdmissionItem};

/// Pipeline settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PgPubSubOptions {
    /// Schema holding watched tables and triggers
    pub schema: String,
    /// Shared NOTIFY channel, also the dedup key prefix
    pub channel: String,
    /// Trigger name prefix
    pub trigger_prefix: String,
    /// Batch window length
    pub flush_interval: Duration,
    /// Lifetime of per-notification dedup locks
    pub dedup_lock_ttl: Duration,
    /// Lifetime of the schema synchronization lock
    pub schema_lock_ttl: Duration,
    /// Reconnect delays of the listen connection
    pub backoff: ReconnectBackoff,
}

impl Default for PgPubSubOptions {
    fn default() -> Self {
        Self {
            schema: "public".to_string(),
            channel: DEFAULT_TRIGGER_PREFIX.to_string(),
            trigger_prefix: DEFAULT_TRIGGER_PREFIX.to_string(),
            flush_interval: Duration::from_millis(1000),
            dedup_lock_ttl: Duration::from_millis(3000),
            schema_lock_ttl: Duration::from_millis(1000),
            backoff: ReconnectBackoff::default(),
        }
    }
}

/// Postgres change-data-capture service
pub struct PgPubSub {
    options: PgPubSubOptions,
    registry: Arc<ListenerRegistry>,
    provisioner: TriggerProvisioner,
    transport: NotificationTransport,
    admission: Arc<Admission>,
    buffer: Arc<BatchBuffer>,
    dispatcher: Dispatcher,
    queue_tx: mpsc::UnboundedSender<AdmissionItem>,
    queue_rx: std::sync::Mutex<Option<mpsc::UnboundedReceiver<AdmissionItem>>>,
    admission_task: Mutex<Option<JoinHandle<()>>>,
    flusher: Mutex<Option<FlushTask>>,
    subscribed: AtomicBool,
}

impl PgPubSub {
    /// Start building a service
    pub fn builder() -> PgPubSubBuilder {
        PgPubSubBuilder::new()
    }

    pub(crate) fn assemble(
        registry: Arc<ListenerRegistry>,
        locks: Arc<dyn LockService>,
        executor: Arc<dyn SchemaExecutor>,
        connector: Arc<dyn NotificationConnector>,
        options: PgPubSubOptions,
    ) -> Self {
        let provisioner = TriggerProvisioner::new(
            executor,
            Arc::clone(&locks),
            ProvisionerConfig {
                schema: options.schema.clone(),
                channel: options.channel.clone(),
                trigger_prefix: options.trigger_prefix.clone(),
                lock_ttl: options.schema_lock_ttl,
            },
        );

        let buffer = Arc::new(BatchBuffer::new());
        let admission = Arc::new(Admission::new(
            locks,
            ChangeDecoder::from_registry(&registry),
            Arc::clone(&buffer),
            options.channel.clone(),
            options.dedup_lock_ttl,
        ));
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();

        Self {
            transport: NotificationTransport::new(connector, options.backoff.clone()),
            dispatcher: Dispatcher::new(Arc::clone(&registry)),
            options,
            registry,
            provisioner,
            admission,
            buffer,
            queue_tx,
            queue_rx: std::sync::Mutex::new(Some(queue_rx)),
            admission_task: Mutex::new(None),
            flusher: Mutex::new(None),
            subscribed: AtomicBool::new(false),
        }
    }

    /// Resolved listeners and triggers
    pub fn registry(&self) -> &Arc<ListenerRegistry> {
        &self.registry
    }

    /// Pipeline settings
    pub fn options(&self) -> &PgPubSubOptions {
        &self.options
    }

    /// Trigger provisioner bound to this service's registry settings
    pub fn provisioner(&self) -> &TriggerProvisioner {
        &self.provisioner
    }

    /// State of the listen connection
    pub fn transport_state(&self) -> TransportState {
        self.transport.state()
    }

    /// Synchronize triggers, then start listening.
    ///
    /// A provisioning failure is returned and nothing is started.
    pub async fn start(&self) -> PubSubResult<()> {
        let outcome = self.synchronize().await?;
        info!(
            tables = self.registry.len(),
            outcome = ?outcome,
            "pg pubsub starting"
        );
        self.resume().await
    }

    /// Drop and recreate the CDC triggers of every watched table
    pub async fn synchronize(&self) -> PubSubResult<SyncOutcome> {
        Ok(self.provisioner.synchronize(&self.registry).await?)
    }

    /// Start (or restart) listening and flushing. Idempotent.
    pub async fn resume(&self) -> PubSubResult<()> {
        self.ensure_admission().await;

        if !self.subscribed.swap(true, Ordering::SeqCst) {
            let queue = self.queue_tx.clone();
            let handler: PayloadHandler = Arc::new(move |payload| {
                if queue.send(AdmissionItem::Payload(payload)).is_err() {
                    debug!("admission queue closed, notification ignored");
                }
            });
            self.transport.subscribe(self.options.channel.clone(), handler).await;
        }

        {
            let mut flusher = self.flusher.lock().await;
            if !flusher.as_ref().is_some_and(FlushTask::is_running) {
                let previous = flusher.take();
                *flusher = Some(FlushTask::spawn_after(
                    previous,
                    Arc::clone(&self.buffer),
                    self.dispatcher.clone(),
                    self.options.flush_interval,
                ));
            }
        }

        self.transport.connect().await?;
        info!(channel = %self.options.channel, "pg pubsub listening");
        Ok(())
    }

    /// Stop listening, admit what was already received, and stop the flush
    /// timer. Idempotent.
    ///
    /// Admitted events are still delivered by a final flush once the window
    /// in flight completes. Pause does not wait for that dispatch, so a
    /// listener may pause (or `suspend_and_run`) its own service.
    pub async fn pause(&self) {
        self.transport.pause().await;
        self.drain_admission().await;

        if let Some(flusher) = self.flusher.lock().await.as_ref() {
            flusher.stop();
        }
        info!("pg pubsub paused");
    }

    /// Pause, run `action`, then resume.
    ///
    /// Resume always runs, even when `action` fails or panics. The action's
    /// error is returned (or its panic resumed) after resuming.
    pub async fn suspend_and_run<F, Fut, T, E>(&self, action: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<PubSubError>,
    {
        self.pause().await;
        let outcome = AssertUnwindSafe(async move { action().await })
            .catch_unwind()
            .await;
        let resumed = self.resume().await;

        match outcome {
            Ok(Ok(value)) => {
                resumed?;
                Ok(value)
            }
            Ok(Err(e)) => {
                if let Err(resume_err) = resumed {
                    warn!(error = %resume_err, "resume after failed action also failed");
                }
                Err(e)
            }
            Err(panic) => {
                warn!(panic = panic_message(&*panic), "action panicked while suspended");
                std::panic::resume_unwind(panic)
            }
        }
    }

    /// Pause, wait for the final flush and stop the admission task for good.
    ///
    /// Must not be called from a listener: it waits for dispatch to finish.
    pub async fn shutdown(&self) {
        self.pause().await;

        let flusher = self.flusher.lock().await.take();
        if let Some(flusher) = flusher {
            flusher.join().await;
        }

        if let Some(task) = self.admission_task.lock().await.take() {
            task.abort();
            let _ = task.await;
        }
        info!("pg pubsub stopped");
    }

    async fn ensure_admission(&self) {
        let mut task = self.admission_task.lock().await;
        if task.is_some() {
            return;
        }

        let receiver = self
            .queue_rx
            .lock()
            .ok()
            .and_then(|mut rx| rx.take());
        match receiver {
            Some(receiver) => {
                *task = Some(tokio::spawn(run_admission(Arc::clone(&self.admission), receiver)));
            }
            None => warn!("admission queue already consumed, service was shut down"),
        }
    }

    /// Wait until every payload received so far has been admitted
    async fn drain_admission(&self) {
        if self.admission_task.lock().await.is_none() {
            return;
        }

        let (ack, done) = oneshot::channel();
        if self.queue_tx.send(AdmissionItem::Barrier(ack)).is_ok() {
            let _ = done.await;
        }
    }
}
