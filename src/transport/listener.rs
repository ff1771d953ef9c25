//! # Notification Transport
//!
//! Owns the single LISTEN connection. A background task connects, issues
//! `LISTEN` for every subscribed channel, and hands each payload to the
//! channel's handler. A dropped connection moves the transport to
//! `Reconnecting` and the task retries with exponential backoff until it
//! is listening again or paused.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use super::backoff::ReconnectBackoff;
use super::connector::{Notification, NotificationConnector, NotificationStream};
use super::errors::{TransportError, TransportResult};

/// Callback receiving raw payload text. Must not block.
pub type PayloadHandler = Arc<dyn Fn(String) + Send + Sync>;

type Subscriptions = Arc<RwLock<HashMap<String, PayloadHandler>>>;

/// Connection state as observed by callers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    Disconnected,
    Connecting,
    Listening,
    Reconnecting,
}

impl std::fmt::Display for TransportState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TransportState::Disconnected => "disconnected",
            TransportState::Connecting => "connecting",
            TransportState::Listening => "listening",
            TransportState::Reconnecting => "reconnecting",
        };
        write!(f, "{}", s)
    }
}

/// Handle on the running listen task
struct Worker {
    handle: JoinHandle<()>,
    shutdown_tx: watch::Sender<bool>,
    commands: mpsc::UnboundedSender<String>,
}

/// Push-notification transport with automatic reconnect
pub struct NotificationTransport {
    connector: Arc<dyn NotificationConnector>,
    backoff: ReconnectBackoff,
    subscriptions: Subscriptions,
    state: Arc<watch::Sender<TransportState>>,
    worker: Mutex<Option<Worker>>,
}

impl NotificationTransport {
    pub fn new(connector: Arc<dyn NotificationConnector>, backoff: ReconnectBackoff) -> Self {
        let (state, _) = watch::channel(TransportState::Disconnected);
        Self {
            connector,
            backoff,
            subscriptions: Arc::new(RwLock::new(HashMap::new())),
            state: Arc::new(state),
            worker: Mutex::new(None),
        }
    }

    /// Current state
    pub fn state(&self) -> TransportState {
        *self.state.borrow()
    }

    /// Receiver notified on every state change
    pub fn watch_state(&self) -> watch::Receiver<TransportState> {
        self.state.subscribe()
    }

    /// Route payloads of `channel` to `handler`.
    ///
    /// Replaces any previous handler of the channel. When connected, the
    /// channel is listened to immediately; otherwise on the next connect.
    pub async fn subscribe(&self, channel: impl Into<String>, handler: PayloadHandler) {
        let channel = channel.into();
        write_subscriptions(&self.subscriptions).insert(channel.clone(), handler);

        if let Some(worker) = self.worker.lock().await.as_ref() {
            if worker.commands.send(channel).is_err() {
                debug!("listen task already stopped, channel picked up on next connect");
            }
        }
    }

    /// Start the listen task if needed and wait until it is listening.
    ///
    /// Also returns when a concurrent [`pause`](Self::pause) stops the task.
    pub async fn connect(&self) -> TransportResult<()> {
        {
            let mut worker = self.worker.lock().await;
            let running = worker.as_ref().map(|w| !w.handle.is_finished()).unwrap_or(false);
            if !running {
                self.state.send_replace(TransportState::Connecting);
                *worker = Some(self.spawn_worker());
            }
        }

        let mut state = self.state.subscribe();
        let reached = state
            .wait_for(|s| matches!(s, TransportState::Listening | TransportState::Disconnected))
            .await
            .map_err(|_| TransportError::Closed)?;

        match *reached {
            TransportState::Listening => Ok(()),
            _ => Err(TransportError::Closed),
        }
    }

    /// Re-establish the connection if absent. Idempotent.
    pub async fn resume(&self) -> TransportResult<()> {
        self.connect().await
    }

    /// Stop the listen task and close the connection. Idempotent.
    pub async fn pause(&self) {
        let mut guard = self.worker.lock().await;
        let Some(worker) = guard.take() else {
            return;
        };

        let _ = worker.shutdown_tx.send(true);
        if let Err(e) = worker.handle.await {
            error!(error = %e, "listen task ended abnormally");
        }
        self.state.send_replace(TransportState::Disconnected);
        info!("notification transport paused");
    }

    fn spawn_worker(&self) -> Worker {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (commands, command_rx) = mpsc::unbounded_channel();

        let task = ListenTask {
            connector: Arc::clone(&self.connector),
            subscriptions: Arc::clone(&self.subscriptions),
            state: Arc::clone(&self.state),
            backoff: self.backoff.clone(),
            shutdown_rx,
            commands: command_rx,
        };
        let handle = tokio::spawn(task.run());

        Worker {
            handle,
            shutdown_tx,
            commands,
        }
    }
}

impl Drop for NotificationTransport {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.get_mut().take() {
            let _ = worker.shutdown_tx.send(true);
        }
    }
}

fn read_subscriptions(
    subscriptions: &Subscriptions,
) -> std::sync::RwLockReadGuard<'_, HashMap<String, PayloadHandler>> {
    subscriptions.read().unwrap_or_else(|e| e.into_inner())
}

fn write_subscriptions(
    subscriptions: &Subscriptions,
) -> std::sync::RwLockWriteGuard<'_, HashMap<String, PayloadHandler>> {
    subscriptions.write().unwrap_or_else(|e| e.into_inner())
}

/// Connect and LISTEN on every subscribed channel
async fn open(
    connector: &Arc<dyn NotificationConnector>,
    subscriptions: &Subscriptions,
) -> TransportResult<Box<dyn NotificationStream>> {
    let mut stream = connector.connect().await?;

    let channels: Vec<String> = read_subscriptions(subscriptions).keys().cloned().collect();
    for channel in &channels {
        stream.listen(channel).await?;
    }

    info!(channels = ?channels, "listening for notifications");
    Ok(stream)
}

/// What woke the receive loop
enum Wake {
    Shutdown,
    Listen(String),
    Received(TransportResult<Notification>),
}

struct ListenTask {
    connector: Arc<dyn NotificationConnector>,
    subscriptions: Subscriptions,
    state: Arc<watch::Sender<TransportState>>,
    backoff: ReconnectBackoff,
    shutdown_rx: watch::Receiver<bool>,
    commands: mpsc::UnboundedReceiver<String>,
}

impl ListenTask {
    async fn run(mut self) {
        loop {
            let connected = tokio::select! {
                biased;
                _ = self.shutdown_rx.changed() => break,
                result = open(&self.connector, &self.subscriptions) => result,
            };

            let stream = match connected {
                Ok(stream) => stream,
                Err(e) => {
                    if self.wait_before_retry(e).await {
                        continue;
                    }
                    break;
                }
            };

            self.backoff.reset();
            self.state.send_replace(TransportState::Listening);

            match self.receive(stream).await {
                Some(e) => {
                    if !self.wait_before_retry(e).await {
                        break;
                    }
                }
                None => break,
            }
        }

        self.state.send_replace(TransportState::Disconnected);
        debug!("listen task stopped");
    }

    /// Deliver notifications until shutdown (`None`) or failure (`Some`)
    async fn receive(&mut self, mut stream: Box<dyn NotificationStream>) -> Option<TransportError> {
        loop {
            let wake = tokio::select! {
                biased;
                _ = self.shutdown_rx.changed() => Wake::Shutdown,
                Some(channel) = self.commands.recv() => Wake::Listen(channel),
                received = stream.recv() => Wake::Received(received),
            };

            match wake {
                Wake::Shutdown => {
                    if let Err(e) = stream.close().await {
                        debug!(error = %e, "failed to close notification connection");
                    }
                    return None;
                }
                Wake::Listen(channel) => {
                    if let Err(e) = stream.listen(&channel).await {
                        return Some(e);
                    }
                    debug!(channel = %channel, "listening on new channel");
                }
                Wake::Received(Ok(notification)) => self.deliver(notification),
                Wake::Received(Err(e)) => return Some(e),
            }
        }
    }

    fn deliver(&self, notification: Notification) {
        let handler = read_subscriptions(&self.subscriptions)
            .get(&notification.channel)
            .cloned();
        match handler {
            Some(handler) => handler(notification.payload),
            None => debug!(channel = %notification.channel, "notification on unsubscribed channel"),
        }
    }

    /// Sleep out the backoff delay. Returns `false` when shut down meanwhile.
    async fn wait_before_retry(&mut self, cause: TransportError) -> bool {
        self.state.send_replace(TransportState::Reconnecting);
        let delay = self.backoff.next_delay();
        warn!(
            error = %cause,
            attempt = self.backoff.attempt(),
            delay_ms = delay.as_millis() as u64,
            "notification connection failed, reconnecting"
        );

        tokio::select! {
            biased;
            _ = self.shutdown_rx.changed() => false,
            _ = sleep(delay) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;
    use tokio::sync::broadcast;

    const DROP: &str = "__drop__";

    struct FakeConnector {
        bus: broadcast::Sender<Notification>,
        connects: AtomicUsize,
        failures: AtomicUsize,
        listens: Arc<StdMutex<Vec<String>>>,
    }

    impl FakeConnector {
        fn new(failures: usize) -> Arc<Self> {
            let (bus, _) = broadcast::channel(64);
            Arc::new(Self {
                bus,
                connects: AtomicUsize::new(0),
                failures: AtomicUsize::new(failures),
                listens: Arc::new(StdMutex::new(Vec::new())),
            })
        }

        fn notify(&self, channel: &str, payload: &str) {
            let _ = self.bus.send(Notification {
                channel: channel.into(),
                payload: payload.into(),
            });
        }
    }

    struct FakeStream {
        rx: broadcast::Receiver<Notification>,
        channels: Vec<String>,
        listens: Arc<StdMutex<Vec<String>>>,
    }

    #[async_trait]
    impl NotificationConnector for FakeConnector {
        async fn connect(&self) -> TransportResult<Box<dyn NotificationStream>> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            if self
                .failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(TransportError::Other("refused".into()));
            }
            Ok(Box::new(FakeStream {
                rx: self.bus.subscribe(),
                channels: Vec::new(),
                listens: Arc::clone(&self.listens),
            }))
        }
    }

    #[async_trait]
    impl NotificationStream for FakeStream {
        async fn listen(&mut self, channel: &str) -> TransportResult<()> {
            self.channels.push(channel.to_string());
            self.listens.lock().unwrap().push(channel.to_string());
            Ok(())
        }

        async fn recv(&mut self) -> TransportResult<Notification> {
            loop {
                let n = self.rx.recv().await.map_err(|_| TransportError::ConnectionLost)?;
                if n.channel == DROP {
                    return Err(TransportError::ConnectionLost);
                }
                if self.channels.contains(&n.channel) {
                    return Ok(n);
                }
            }
        }

        async fn close(self: Box<Self>) -> TransportResult<()> {
            Ok(())
        }
    }

    fn collector() -> (PayloadHandler, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handler: PayloadHandler = Arc::new(move |payload| {
            let _ = tx.send(payload);
        });
        (handler, rx)
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_delivers_payloads() {
        let connector = FakeConnector::new(0);
        let transport = NotificationTransport::new(connector.clone(), ReconnectBackoff::default());
        let (handler, mut rx) = collector();

        transport.subscribe("pubsub_trigger", handler).await;
        transport.connect().await.unwrap();
        assert_eq!(transport.state(), TransportState::Listening);

        connector.notify("other", "ignored");
        connector.notify("pubsub_trigger", "hello");
        assert_eq!(rx.recv().await.unwrap(), "hello");

        transport.pause().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_retries_with_backoff() {
        let connector = FakeConnector::new(2);
        let transport = NotificationTransport::new(connector.clone(), ReconnectBackoff::default());
        let (handler, _rx) = collector();
        transport.subscribe("pubsub_trigger", handler).await;

        let started = tokio::time::Instant::now();
        transport.connect().await.unwrap();

        assert_eq!(connector.connects.load(Ordering::SeqCst), 3);
        assert!(started.elapsed() >= Duration::from_secs(3));
        transport.pause().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_is_idempotent_and_resume_reconnects() {
        let connector = FakeConnector::new(0);
        let transport = NotificationTransport::new(connector.clone(), ReconnectBackoff::default());
        let (handler, mut rx) = collector();
        transport.subscribe("c", handler).await;

        transport.connect().await.unwrap();
        transport.pause().await;
        transport.pause().await;
        assert_eq!(transport.state(), TransportState::Disconnected);

        transport.resume().await.unwrap();
        transport.resume().await.unwrap();
        assert_eq!(connector.connects.load(Ordering::SeqCst), 2);

        connector.notify("c", "after resume");
        assert_eq!(rx.recv().await.unwrap(), "after resume");
        transport.pause().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_lost_connection_relistens_all_channels() {
        let connector = FakeConnector::new(0);
        let transport = NotificationTransport::new(connector.clone(), ReconnectBackoff::default());
        let (a, _ra) = collector();
        let (b, mut rb) = collector();
        transport.subscribe("a", a).await;
        transport.connect().await.unwrap();
        transport.subscribe("b", b).await;

        let mut states = transport.watch_state();
        connector.notify(DROP, "");
        states
            .wait_for(|s| *s == TransportState::Reconnecting)
            .await
            .unwrap();
        states
            .wait_for(|s| *s == TransportState::Listening)
            .await
            .unwrap();

        connector.notify("b", "after reconnect");
        assert_eq!(rb.recv().await.unwrap(), "after reconnect");

        let mut listens = connector.listens.lock().unwrap().clone();
        listens.sort();
        assert_eq!(listens, vec!["a", "a", "b", "b"]);
        transport.pause().await;
    }
}
