//! CLI argument definitions using clap
//!
//! Commands:
//! - pgpubsub ddl --config <path>
//! - pgpubsub sync --config <path>
//! - pgpubsub triggers --config <path>
//! - pgpubsub watch --config <path>

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::logging::LogFormat;

/// pgpubsub - Postgres change-data-capture over LISTEN/NOTIFY
#[derive(Parser, Debug)]
#[command(name = "pgpubsub")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Log line format
    #[arg(long, value_enum, default_value_t = LogFormat::Plain, global = true)]
    pub log_format: LogFormat,

    /// Postgres connection string, overrides the config file
    #[arg(long, env = "DATABASE_URL", global = true)]
    pub database_url: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the trigger DDL that `sync` would run
    Ddl {
        /// Path to configuration file
        #[arg(long, default_value = "./pgpubsub.json")]
        config: PathBuf,
    },

    /// Drop and recreate the CDC triggers, then exit
    Sync {
        /// Path to configuration file
        #[arg(long, default_value = "./pgpubsub.json")]
        config: PathBuf,
    },

    /// List installed CDC triggers
    Triggers {
        /// Path to configuration file
        #[arg(long, default_value = "./pgpubsub.json")]
        config: PathBuf,
    },

    /// Synchronize triggers and print every dispatched batch until Ctrl-C
    Watch {
        /// Path to configuration file
        #[arg(long, default_value = "./pgpubsub.json")]
        config: PathBuf,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
