//! # Trigger Provisioner
//!
//! Brings the database's CDC triggers in line with the listener registry.
//! Every pass drops all installed CDC triggers, then recreates one per
//! watched table. Concurrent instances are serialized by the schema lock;
//! a pass that finds the lock taken is skipped.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::try_join_all;
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{error, info, warn};

use super::errors::ProvisionResult;
use super::spec::DEFAULT_TRIGGER_PREFIX;
use super::sql;
use crate::lock::{try_lock_or_else, LockService};
use crate::registry::ListenerRegistry;

/// A CDC trigger currently installed in the database
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledTrigger {
    pub name: String,
    pub table: String,
}

/// Database access needed for provisioning
#[async_trait]
pub trait SchemaExecutor: Send + Sync {
    /// Installed triggers in `schema` whose name matches `like_pattern`
    async fn installed_triggers(
        &self,
        schema: &str,
        like_pattern: &str,
    ) -> ProvisionResult<Vec<InstalledTrigger>>;

    /// Run a (possibly multi-statement) DDL script
    async fn execute(&self, sql: &str) -> ProvisionResult<()>;
}

/// [`SchemaExecutor`] over a sqlx Postgres pool
#[derive(Debug, Clone)]
pub struct PgSchemaExecutor {
    pool: PgPool,
}

impl PgSchemaExecutor {
    /// Wrap an existing pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a small pool to `database_url`
    pub async fn connect(database_url: &str) -> ProvisionResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(2)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl SchemaExecutor for PgSchemaExecutor {
    async fn installed_triggers(
        &self,
        schema: &str,
        like_pattern: &str,
    ) -> ProvisionResult<Vec<InstalledTrigger>> {
        let rows: Vec<(String, String)> = sqlx::query_as(sql::LIST_TRIGGERS)
            .bind(schema)
            .bind(like_pattern)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .into_iter()
            .map(|(name, table)| InstalledTrigger { name, table })
            .collect())
    }

    async fn execute(&self, sql: &str) -> ProvisionResult<()> {
        sqlx::raw_sql(sql).execute(&self.pool).await?;
        Ok(())
    }
}

/// Provisioner settings
#[derive(Debug, Clone)]
pub struct ProvisionerConfig {
    pub schema: String,
    pub channel: String,
    pub trigger_prefix: String,
    pub lock_ttl: Duration,
}

impl Default for ProvisionerConfig {
    fn default() -> Self {
        Self {
            schema: "public".to_string(),
            channel: DEFAULT_TRIGGER_PREFIX.to_string(),
            trigger_prefix: DEFAULT_TRIGGER_PREFIX.to_string(),
            lock_ttl: Duration::from_millis(1000),
        }
    }
}

/// Result of one provisioning pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Triggers were dropped and recreated
    Synchronized { dropped: usize, created: usize },
    /// Another instance holds the schema lock
    Skipped,
}

/// Installs CDC triggers for a [`ListenerRegistry`]
pub struct TriggerProvisioner {
    executor: Arc<dyn SchemaExecutor>,
    locks: Arc<dyn LockService>,
    config: ProvisionerConfig,
}

impl TriggerProvisioner {
    pub fn new(
        executor: Arc<dyn SchemaExecutor>,
        locks: Arc<dyn LockService>,
        config: ProvisionerConfig,
    ) -> Self {
        Self {
            executor,
            locks,
            config,
        }
    }

    /// Provisioner settings
    pub fn config(&self) -> &ProvisionerConfig {
        &self.config
    }

    fn lock_key(&self) -> String {
        format!("{}:schema-sync", self.config.channel)
    }

    /// Drop every installed CDC trigger and recreate the registry's triggers.
    ///
    /// Returns [`SyncOutcome::Skipped`] without touching the schema when the
    /// lock is held by another instance.
    pub async fn synchronize(&self, registry: &ListenerRegistry) -> ProvisionResult<SyncOutcome> {
        let key = self.lock_key();
        let outcome = try_lock_or_else(
            self.locks.as_ref(),
            &key,
            self.config.lock_ttl,
            self.run(registry),
            async {
                warn!(key = %key, "schema lock held elsewhere, skipping trigger synchronization");
            },
        )
        .await?;

        match outcome {
            Some(Ok(outcome)) => Ok(outcome),
            Some(Err(e)) => {
                error!(schema = %self.config.schema, error = %e, "trigger synchronization failed");
                Err(e)
            }
            None => Ok(SyncOutcome::Skipped),
        }
    }

    async fn run(&self, registry: &ListenerRegistry) -> ProvisionResult<SyncOutcome> {
        let schema = &self.config.schema;
        let installed = self.installed().await?;

        if !installed.is_empty() {
            let names: Vec<String> = installed
                .iter()
                .map(|t| format!("{}.{}", t.table, t.name))
                .collect();
            info!(schema = %schema, triggers = ?names, "dropping triggers");
            self.executor
                .execute(&sql::drop_functions(schema, &installed))
                .await?;
        }

        let specs: Vec<_> = registry.trigger_specs().collect();
        if !specs.is_empty() {
            let names: Vec<String> = specs
                .iter()
                .map(|s| format!("{}.{}", s.table(), s.name()))
                .collect();
            info!(schema = %schema, triggers = ?names, "creating triggers");

            try_join_all(specs.iter().map(|spec| {
                let ddl = sql::create_trigger(schema, &self.config.channel, spec);
                async move { self.executor.execute(&ddl).await }
            }))
            .await?;
        }

        Ok(SyncOutcome::Synchronized {
            dropped: installed.len(),
            created: specs.len(),
        })
    }

    /// Creation script for every trigger of `registry`, without running it.
    ///
    /// Drops of previously installed triggers are not included since they
    /// depend on the live catalog.
    pub fn render(&self, registry: &ListenerRegistry) -> String {
        sql::render_script(
            &self.config.schema,
            &self.config.channel,
            registry.trigger_specs(),
        )
    }

    /// CDC triggers currently installed in the configured schema
    pub async fn installed(&self) -> ProvisionResult<Vec<InstalledTrigger>> {
        self.executor
            .installed_triggers(
                &self.config.schema,
                &sql::trigger_like_pattern(&self.config.trigger_prefix),
            )
            .await
    }
}
