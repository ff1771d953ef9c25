//! # Dispatch Registry
//!
//! Static listener registrations, resolved once at startup into a
//! table-keyed map that drives both trigger provisioning and dispatch.

pub mod errors;
pub mod listener;
pub mod table;

pub use errors::{RegistryError, RegistryResult};
pub use listener::{ListenerError, ListenerRegistration, ListenerResult, TableChangeListener};
pub use table::{ListenerRegistry, RegisteredListener, TableBinding};
