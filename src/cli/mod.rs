//! CLI module for pgpubsub
//!
//! Provides command-line interface for:
//! - ddl: Print trigger DDL
//! - sync: Synchronize triggers
//! - triggers: List installed triggers
//! - watch: Stream dispatched batches to stdout

mod args;
mod commands;
mod errors;
mod io;

pub use args::{Cli, Command};
pub use commands::{
    ddl, ddl_script, load_config, run, run_command, sync, triggers, watch, StdoutListener,
};
pub use errors::{CliError, CliErrorCode, CliResult};
