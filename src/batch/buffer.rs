//! # Batch Buffer
//!
//! Accumulates admitted events between flushes. Draining is all-or-nothing:
//! a flush takes the whole window and leaves an empty buffer behind.

use std::sync::Mutex;

use crate::change::ChangeEvent;

/// Event sink shared by the admission path and the flush task
#[derive(Debug, Default)]
pub struct BatchBuffer {
    pending: Mutex<Vec<ChangeEvent>>,
}

impl BatchBuffer {
    /// Create an empty buffer
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event to the current window
    pub fn push(&self, event: ChangeEvent) {
        if let Ok(mut pending) = self.pending.lock() {
            pending.push(event);
        }
    }

    /// Take every buffered event, in arrival order
    pub fn drain(&self) -> Vec<ChangeEvent> {
        self.pending
            .lock()
            .map(|mut pending| std::mem::take(&mut *pending))
            .unwrap_or_default()
    }

    /// Number of buffered events
    pub fn len(&self) -> usize {
        self.pending.lock().map(|p| p.len()).unwrap_or(0)
    }

    /// Whether the buffer holds no event
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
