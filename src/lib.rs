//! pgpubsub - Postgres change-data-capture over LISTEN/NOTIFY
//!
//! Installs row-level triggers that publish changes on a shared channel,
//! deduplicates notifications across processes through a lock service,
//! batches them per flush window and delivers one grouped batch per table
//! to the registered listeners.

pub mod batch;
pub mod change;
pub mod cli;
pub mod config;
pub mod dispatch;
pub mod errors;
pub mod lock;
pub mod logging;
pub mod metadata;
pub mod pipeline;
pub mod registry;
pub mod transport;
pub mod trigger;

pub use errors::{PubSubError, PubSubResult};
pub use pipeline::{PgPubSub, PgPubSubBuilder, PgPubSubOptions};
