//! # Flush Task
//!
//! Periodic timer that drains the [`BatchBuffer`] and dispatches each
//! non-empty window. Dispatch is awaited inside the tick, so window N is
//! fully delivered before window N+1 is drained.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error};

use super::buffer::BatchBuffer;
use crate::dispatch::{DispatchReport, Dispatcher};

/// Drain `buffer` once and dispatch what it held. Empty windows dispatch
/// nothing.
pub async fn flush_once(buffer: &BatchBuffer, dispatcher: &Dispatcher) -> Vec<DispatchReport> {
    let events = buffer.drain();
    if events.is_empty() {
        return Vec::new();
    }

    debug!(events = events.len(), "flushing batch window");
    dispatcher.dispatch_batch(events).await
}

/// Handle on a flush timer.
///
/// Stopping only signals the task; it finishes the window in flight, runs a
/// final flush and exits on its own. A successor started with
/// [`FlushTask::spawn_after`] waits for it first, so windows never overlap.
pub struct FlushTask {
    handle: JoinHandle<()>,
    shutdown_tx: watch::Sender<bool>,
}

impl FlushTask {
    /// Start flushing every `period`, first tick one period from now
    pub fn spawn(buffer: Arc<BatchBuffer>, dispatcher: Dispatcher, period: Duration) -> Self {
        Self::spawn_after(None, buffer, dispatcher, period)
    }

    /// Like [`spawn`](Self::spawn), but only starts ticking once
    /// `previous` has finished its final flush.
    pub fn spawn_after(
        previous: Option<FlushTask>,
        buffer: Arc<BatchBuffer>,
        dispatcher: Dispatcher,
        period: Duration,
    ) -> Self {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            if let Some(previous) = previous {
                previous.stop();
                previous.join().await;
            }

            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.changed() => break,
                    _ = ticker.tick() => {
                        flush_once(&buffer, &dispatcher).await;
                    }
                }
            }

            // admitted events must not be lost on pause
            let reports = flush_once(&buffer, &dispatcher).await;
            debug!(tables = reports.len(), "final flush complete");
        });

        Self {
            handle,
            shutdown_tx,
        }
    }

    /// Ask the timer to stop after the window in flight and a final flush.
    /// Does not wait, so a listener may call it from inside a dispatch.
    pub fn stop(&self) {
        self.shutdown_tx.send_replace(true);
    }

    /// Wait until the task has exited
    pub async fn join(self) {
        if let Err(e) = self.handle.await {
            error!(error = %e, "flush task ended abnormally");
        }
    }

    /// Whether the timer is ticking (not stopped and not finished)
    pub fn is_running(&self) -> bool {
        !*self.shutdown_tx.borrow() && !self.handle.is_finished()
    }
}
