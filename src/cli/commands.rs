//! CLI command implementations
//!
//! Every command loads the JSON configuration, applies the database URL
//! override, and builds the pipeline from it. `ddl` is the only command
//! that never touches the database.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::info;

use crate::batch::TableChanges;
use crate::config::PubSubConfig;
use crate::logging;
use crate::pipeline::{PgPubSub, PgPubSubBuilder};
use crate::registry::{ListenerRegistry, ListenerResult, TableChangeListener};
use crate::trigger::{sql, SyncOutcome};

use super::args::{Cli, Command};
use super::errors::{CliError, CliResult};
use super::io::{write_line, write_response, write_text};

/// Prints every batch it receives as one JSON line on stdout
#[derive(Debug, Default)]
pub struct StdoutListener;

#[async_trait]
impl TableChangeListener for StdoutListener {
    async fn process(&self, changes: &TableChanges) -> ListenerResult {
        write_line(changes)?;
        Ok(())
    }

    fn name(&self) -> &str {
        "stdout"
    }
}

/// Main CLI entry point
///
/// Parses arguments, installs logging and dispatches to the command.
/// This is the only function that main.rs should call.
pub async fn run() -> CliResult<()> {
    let cli = Cli::parse_args();
    logging::init(cli.log_format);
    run_command(cli.command, cli.database_url).await
}

/// Run the appropriate command based on CLI args
pub async fn run_command(cmd: Command, database_url: Option<String>) -> CliResult<()> {
    match cmd {
        Command::Ddl { config } => ddl(&config, database_url),
        Command::Sync { config } => sync(&config, database_url).await,
        Command::Triggers { config } => triggers(&config, database_url).await,
        Command::Watch { config } => watch(&config, database_url).await,
    }
}

/// Load the config file and apply the database URL override
pub fn load_config(path: &Path, database_url: Option<String>) -> CliResult<PubSubConfig> {
    let config = PubSubConfig::load(path)?.with_database_url(database_url);
    Ok(config)
}

/// Trigger creation script for every configured entity
pub fn ddl_script(config: &PubSubConfig) -> CliResult<String> {
    let registry = ListenerRegistry::build(
        config.registrations(Arc::new(StdoutListener)),
        &config.metadata_provider(),
        &config.trigger_prefix,
    )
    .map_err(|e| CliError::config_error(e.to_string()))?;

    Ok(sql::render_script(
        &config.schema,
        &config.channel,
        registry.trigger_specs(),
    ))
}

/// Print the trigger DDL without running it
pub fn ddl(config_path: &Path, database_url: Option<String>) -> CliResult<()> {
    let config = load_config(config_path, database_url)?;
    write_text(&ddl_script(&config)?)
}

async fn service(config: &PubSubConfig) -> CliResult<PgPubSub> {
    let service = PgPubSubBuilder::from_config(config)
        .await?
        .register_all(config.registrations(Arc::new(StdoutListener)))
        .build()?;
    Ok(service)
}

/// Drop and recreate the CDC triggers
pub async fn sync(config_path: &Path, database_url: Option<String>) -> CliResult<()> {
    let config = load_config(config_path, database_url)?;
    let service = service(&config).await?;

    let data = match service.synchronize().await? {
        SyncOutcome::Synchronized { dropped, created } => json!({
            "synchronized": true,
            "dropped": dropped,
            "created": created
        }),
        SyncOutcome::Skipped => json!({
            "synchronized": false,
            "reason": "schema lock held by another instance"
        }),
    };
    write_response(data)
}

/// List installed CDC triggers
pub async fn triggers(config_path: &Path, database_url: Option<String>) -> CliResult<()> {
    let config = load_config(config_path, database_url)?;
    let service = service(&config).await?;

    let installed = service
        .provisioner()
        .installed()
        .await
        .map_err(|e| CliError::sync_failed(e.to_string()))?;

    let data: Vec<_> = installed
        .iter()
        .map(|t| json!({"name": t.name, "table": t.table}))
        .collect();
    write_response(json!(data))
}

/// Synchronize, then stream batches to stdout until Ctrl-C
pub async fn watch(config_path: &Path, database_url: Option<String>) -> CliResult<()> {
    let config = load_config(config_path, database_url)?;
    let service = service(&config).await?;

    service.start().await?;
    info!(tables = service.registry().len(), "watching, press Ctrl-C to stop");

    let signal = tokio::signal::ctrl_c().await;
    service.shutdown().await;
    signal.map_err(|e| CliError::io_error(format!("Failed to wait for Ctrl-C: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::super::errors::CliErrorCode;
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn create_config(temp_dir: &TempDir, config: serde_json::Value) -> std::path::PathBuf {
        let config_path = temp_dir.path().join("pgpubsub.json");
        fs::write(&config_path, config.to_string()).unwrap();
        config_path
    }

    fn orders() -> serde_json::Value {
        json!({
            "tables": [{
                "entity": "Order",
                "table": "orders",
                "columns": [
                    {"property": "id"},
                    {"property": "status"},
                    {"property": "total"}
                ],
                "events": ["UPDATE"],
                "payload_fields": ["id", "status"]
            }]
        })
    }

    #[test]
    fn test_ddl_script_restricts_columns() {
        let temp_dir = TempDir::new().unwrap();
        let config = load_config(&create_config(&temp_dir, orders()), None).unwrap();

        let script = ddl_script(&config).unwrap();
        assert!(script.contains("CREATE TRIGGER \"pubsub_trigger_orders\""));
        assert!(script.contains("AFTER UPDATE ON \"public\".\"orders\""));
        assert!(!script.contains("total"));
    }

    #[test]
    fn test_ddl_rejects_unknown_payload_field() {
        let temp_dir = TempDir::new().unwrap();
        let mut value = orders();
        value["tables"][0]["payload_fields"] = json!(["colour"]);
        let config = load_config(&create_config(&temp_dir, value), None).unwrap();

        let err = ddl_script(&config).unwrap_err();
        assert_eq!(err.code(), &CliErrorCode::ConfigError);
    }

    #[test]
    fn test_invalid_config_is_config_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = create_config(&temp_dir, json!({"flush_interval_ms": 0}));

        let err = load_config(&path, None).unwrap_err();
        assert_eq!(err.code(), &CliErrorCode::ConfigError);
    }

    #[tokio::test]
    async fn test_sync_requires_database_url() {
        let temp_dir = TempDir::new().unwrap();
        let path = create_config(&temp_dir, orders());

        let err = sync(&path, None).await.unwrap_err();
        assert_eq!(err.code(), &CliErrorCode::ConfigError);
    }
}
