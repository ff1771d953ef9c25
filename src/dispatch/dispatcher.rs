//! # Dispatcher
//!
//! Fans a flush window's changes out to the listeners of each table.
//!
//! Every listener of a table runs concurrently and the dispatcher awaits
//! all of them. A listener that fails or panics is logged and counted; it
//! never prevents its siblings from completing.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::future::join_all;
use futures_util::FutureExt;
use tracing::{debug, error, warn};

use crate::batch::{group_by_table, TableChanges};
use crate::change::ChangeEvent;
use crate::registry::{ListenerRegistry, RegisteredListener};

/// Result of dispatching one table's batch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Table dispatched
    pub table: String,

    /// Changes in the batch
    pub events: usize,

    /// Listeners invoked
    pub invoked: usize,

    /// Listeners that returned an error or panicked
    pub failed: usize,
}

impl DispatchReport {
    /// Listeners that completed successfully
    pub fn succeeded(&self) -> usize {
        self.invoked - self.failed
    }

    /// Whether every invoked listener succeeded
    pub fn is_clean(&self) -> bool {
        self.failed == 0
    }
}

/// Routes batches to the listeners registered at startup
#[derive(Debug, Clone)]
pub struct Dispatcher {
    registry: Arc<ListenerRegistry>,
}

impl Dispatcher {
    pub fn new(registry: Arc<ListenerRegistry>) -> Self {
        Self { registry }
    }

    /// The registry listeners are selected from
    pub fn registry(&self) -> &Arc<ListenerRegistry> {
        &self.registry
    }

    /// Invoke every listener of `changes.table` once with the whole batch
    pub async fn dispatch(&self, changes: &TableChanges) -> DispatchReport {
        let listeners = self.registry.listeners(&changes.table);
        let mut report = DispatchReport {
            table: changes.table.clone(),
            events: changes.len(),
            invoked: listeners.len(),
            failed: 0,
        };

        if listeners.is_empty() {
            warn!(
                table = %changes.table,
                events = changes.len(),
                "no listener for table, dropping batch"
            );
            return report;
        }

        let results = join_all(listeners.iter().map(|l| invoke(l, changes))).await;
        report.failed = results.into_iter().filter(|ok| !ok).count();

        if report.is_clean() {
            debug!(
                table = %report.table,
                events = report.events,
                listeners = report.invoked,
                "batch dispatched"
            );
        } else {
            error!(
                table = %report.table,
                events = report.events,
                failed = report.failed,
                listeners = report.invoked,
                "batch dispatched with listener failures"
            );
        }

        report
    }

    /// Group `events` by table and dispatch every table concurrently
    pub async fn dispatch_batch(&self, events: Vec<ChangeEvent>) -> Vec<DispatchReport> {
        let groups = group_by_table(events);
        join_all(groups.iter().map(|changes| self.dispatch(changes))).await
    }
}

/// Run one listener, returning whether it succeeded
async fn invoke(registered: &RegisteredListener, changes: &TableChanges) -> bool {
    let listener = registered.listener();
    match AssertUnwindSafe(listener.process(changes)).catch_unwind().await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            error!(
                table = %changes.table,
                listener = listener.name(),
                error = %e,
                "listener failed"
            );
            false
        }
        Err(panic) => {
            error!(
                table = %changes.table,
                listener = listener.name(),
                panic = panic_message(&*panic),
                "listener panicked"
            );
            false
        }
    }
}

/// Best-effort text of a panic payload
pub(crate) fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}
