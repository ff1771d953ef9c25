//! # Batching
//!
//! Coalesces bursts of row changes into one listener call per table per
//! flush window.

pub mod buffer;
pub mod changes;
pub mod flush;

pub use buffer::BatchBuffer;
pub use changes::{group_by_table, TableChanges};
pub use flush::{flush_once, FlushTask};
