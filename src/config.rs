//! # Configuration
//!
//! JSON configuration file for the service and the CLI. Every field but
//! `database_url` has a default; `database_url` may also come from the
//! command line or the `DATABASE_URL` environment variable.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::change::ChangeKind;
use crate::metadata::{EntityMetadata, StaticMetadataProvider};
use crate::pipeline::PgPubSubOptions;
use crate::registry::{ListenerRegistration, TableChangeListener};
use crate::transport::ReconnectBackoff;
use crate::trigger::DEFAULT_TRIGGER_PREFIX;

/// Result type for configuration handling
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid config JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),

    #[error("database_url is not set")]
    MissingDatabaseUrl,
}

impl ConfigError {
    fn invalid(message: impl Into<String>) -> Self {
        ConfigError::Invalid(message.into())
    }
}

/// Lock backend selection
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum LockBackendConfig {
    /// Single-process map
    #[default]
    Memory,
    /// Shared Redis instance
    Redis {
        url: String,
        #[serde(default = "default_lock_namespace")]
        namespace: String,
    },
}

/// One property → column mapping. `column` defaults to the property name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnConfig {
    pub property: String,
    #[serde(default)]
    pub column: Option<String>,
}

impl ColumnConfig {
    /// Database column name
    pub fn column(&self) -> &str {
        self.column.as_deref().unwrap_or(&self.property)
    }
}

/// A watched entity and its table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableConfig {
    /// Entity type name used by registrations
    pub entity: String,

    /// Backing table
    pub table: String,

    /// Mapped columns in declaration order
    pub columns: Vec<ColumnConfig>,

    /// Change kinds to watch (empty = all)
    #[serde(default)]
    pub events: Vec<ChangeKind>,

    /// Properties carried in payloads (empty = all)
    #[serde(default)]
    pub payload_fields: Vec<String>,
}

impl TableConfig {
    /// Entity metadata for this table
    pub fn metadata(&self) -> EntityMetadata {
        EntityMetadata::new(
            self.table.clone(),
            self.columns
                .iter()
                .map(|c| (c.property.clone(), c.column().to_string())),
        )
    }
}

/// Service configuration file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PubSubConfig {
    /// Postgres connection string
    #[serde(default)]
    pub database_url: Option<String>,

    /// Schema holding the watched tables and triggers
    #[serde(default = "default_schema")]
    pub schema: String,

    /// NOTIFY channel shared by every trigger
    #[serde(default = "default_channel")]
    pub channel: String,

    /// Name prefix of generated triggers
    #[serde(default = "default_trigger_prefix")]
    pub trigger_prefix: String,

    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,

    #[serde(default = "default_dedup_lock_ttl_ms")]
    pub dedup_lock_ttl_ms: u64,

    #[serde(default = "default_schema_lock_ttl_ms")]
    pub schema_lock_ttl_ms: u64,

    #[serde(default = "default_reconnect_initial_ms")]
    pub reconnect_initial_ms: u64,

    #[serde(default = "default_reconnect_max_ms")]
    pub reconnect_max_ms: u64,

    #[serde(default)]
    pub lock: LockBackendConfig,

    #[serde(default)]
    pub tables: Vec<TableConfig>,
}

fn default_schema() -> String {
    "public".to_string()
}
fn default_channel() -> String {
    DEFAULT_TRIGGER_PREFIX.to_string()
}
fn default_trigger_prefix() -> String {
    DEFAULT_TRIGGER_PREFIX.to_string()
}
fn default_flush_interval_ms() -> u64 {
    1000
}
fn default_dedup_lock_ttl_ms() -> u64 {
    3000
}
fn default_schema_lock_ttl_ms() -> u64 {
    1000
}
fn default_reconnect_initial_ms() -> u64 {
    1000
}
fn default_reconnect_max_ms() -> u64 {
    30000
}
fn default_lock_namespace() -> String {
    crate::lock::distributed::DEFAULT_NAMESPACE.to_string()
}

impl Default for PubSubConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            schema: default_schema(),
            channel: default_channel(),
            trigger_prefix: default_trigger_prefix(),
            flush_interval_ms: default_flush_interval_ms(),
            dedup_lock_ttl_ms: default_dedup_lock_ttl_ms(),
            schema_lock_ttl_ms: default_schema_lock_ttl_ms(),
            reconnect_initial_ms: default_reconnect_initial_ms(),
            reconnect_max_ms: default_reconnect_max_ms(),
            lock: LockBackendConfig::default(),
            tables: Vec::new(),
        }
    }
}

impl PubSubConfig {
    /// Load and validate a configuration file
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&content)
    }

    /// Parse and validate configuration text
    pub fn from_json(content: &str) -> ConfigResult<Self> {
        let config: PubSubConfig = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Override the connection string when `url` is given
    pub fn with_database_url(mut self, url: Option<String>) -> Self {
        if let Some(url) = url {
            self.database_url = Some(url);
        }
        self
    }

    /// Connection string, required by every database-backed command
    pub fn database_url(&self) -> ConfigResult<&str> {
        match self.database_url.as_deref() {
            Some(url) if !url.trim().is_empty() => Ok(url),
            _ => Err(ConfigError::MissingDatabaseUrl),
        }
    }

    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> ConfigResult<()> {
        if self.schema.trim().is_empty() {
            return Err(ConfigError::invalid("schema must not be empty"));
        }
        if self.channel.trim().is_empty() {
            return Err(ConfigError::invalid("channel must not be empty"));
        }
        if self.trigger_prefix.trim().is_empty() {
            return Err(ConfigError::invalid("trigger_prefix must not be empty"));
        }

        for (name, value) in [
            ("flush_interval_ms", self.flush_interval_ms),
            ("dedup_lock_ttl_ms", self.dedup_lock_ttl_ms),
            ("schema_lock_ttl_ms", self.schema_lock_ttl_ms),
            ("reconnect_initial_ms", self.reconnect_initial_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::invalid(format!("{} must be > 0", name)));
            }
        }

        if self.reconnect_max_ms < self.reconnect_initial_ms {
            return Err(ConfigError::invalid(
                "reconnect_max_ms must be >= reconnect_initial_ms",
            ));
        }

        if let LockBackendConfig::Redis { url, .. } = &self.lock {
            if url.trim().is_empty() {
                return Err(ConfigError::invalid("redis lock backend requires a url"));
            }
        }

        let mut entities = HashSet::new();
        for table in &self.tables {
            if !entities.insert(table.entity.as_str()) {
                return Err(ConfigError::invalid(format!(
                    "duplicate entity '{}'",
                    table.entity
                )));
            }
            if table.columns.is_empty() {
                return Err(ConfigError::invalid(format!(
                    "entity '{}' has no columns",
                    table.entity
                )));
            }
        }

        Ok(())
    }

    /// Pipeline settings
    pub fn options(&self) -> PgPubSubOptions {
        PgPubSubOptions {
            schema: self.schema.clone(),
            channel: self.channel.clone(),
            trigger_prefix: self.trigger_prefix.clone(),
            flush_interval: Duration::from_millis(self.flush_interval_ms),
            dedup_lock_ttl: Duration::from_millis(self.dedup_lock_ttl_ms),
            schema_lock_ttl: Duration::from_millis(self.schema_lock_ttl_ms),
            backoff: ReconnectBackoff::new(
                Duration::from_millis(self.reconnect_initial_ms),
                Duration::from_millis(self.reconnect_max_ms),
            ),
        }
    }

    /// Metadata for every configured entity
    pub fn metadata_provider(&self) -> StaticMetadataProvider {
        self.tables
            .iter()
            .fold(StaticMetadataProvider::new(), |provider, table| {
                provider.with_entity(table.entity.clone(), table.metadata())
            })
    }

    /// One registration per configured entity, all handled by `listener`
    pub fn registrations(
        &self,
        listener: Arc<dyn TableChangeListener>,
    ) -> Vec<ListenerRegistration> {
        self.tables
            .iter()
            .map(|table| {
                ListenerRegistration::new(table.entity.clone(), Arc::clone(&listener))
                    .with_events(table.events.iter().copied())
                    .with_payload_fields(table.payload_fields.iter().cloned())
            })
            .collect()
    }
}
