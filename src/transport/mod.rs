//! # Notification Transport
//!
//! Postgres LISTEN/NOTIFY with a reconnecting listen task.

pub mod backoff;
pub mod connector;
pub mod errors;
pub mod listener;

pub use backoff::ReconnectBackoff;
pub use connector::{Notification, NotificationConnector, NotificationStream, PgConnector};
pub use errors::{TransportError, TransportResult};
pub use listener::{NotificationTransport, PayloadHandler, TransportState};
