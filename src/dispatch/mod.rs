//! # Dispatch
//!
//! Delivers grouped batches to table listeners.

pub mod dispatcher;

pub use dispatcher::{DispatchReport, Dispatcher};
pub(crate) use dispatcher::panic_message;
