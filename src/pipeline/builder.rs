//! # Service Builder

use std::sync::Arc;

use tracing::info;

use super::{PgPubSub, PgPubSubOptions};
use crate::config::{LockBackendConfig, PubSubConfig};
use crate::errors::{PubSubError, PubSubResult};
use crate::lock::{InMemoryLockService, LockService, RedisLockService};
use crate::metadata::{MetadataProvider, StaticMetadataProvider};
use crate::registry::{ListenerRegistration, ListenerRegistry, TableChangeListener};
use crate::transport::{NotificationConnector, PgConnector};
use crate::trigger::{PgSchemaExecutor, SchemaExecutor};

/// Assembles a [`PgPubSub`].
///
/// Registrations, a metadata provider, a schema executor and a
/// notification connector are required. The lock service defaults to
/// [`InMemoryLockService`].
#[derive(Default)]
pub struct PgPubSubBuilder {
    registrations: Vec<ListenerRegistration>,
    metadata: Option<Arc<dyn MetadataProvider>>,
    locks: Option<Arc<dyn LockService>>,
    executor: Option<Arc<dyn SchemaExecutor>>,
    connector: Option<Arc<dyn NotificationConnector>>,
    options: PgPubSubOptions,
}

impl PgPubSubBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder wired to the database, lock backend and entities of `config`
    pub async fn from_config(config: &PubSubConfig) -> PubSubResult<Self> {
        let database_url = config.database_url()?;

        let locks: Arc<dyn LockService> = match &config.lock {
            LockBackendConfig::Memory => Arc::new(InMemoryLockService::new()),
            LockBackendConfig::Redis { url, namespace } => {
                info!(namespace = %namespace, "using redis lock backend");
                Arc::new(RedisLockService::connect(url).await?.with_namespace(namespace.clone()))
            }
        };

        let executor = PgSchemaExecutor::connect(database_url).await?;

        Ok(Self::new()
            .options(config.options())
            .metadata(config.metadata_provider())
            .lock_service(locks)
            .schema_executor(Arc::new(executor))
            .connector(Arc::new(PgConnector::new(database_url))))
    }

    /// Add one registration
    pub fn register(mut self, registration: ListenerRegistration) -> Self {
        self.registrations.push(registration);
        self
    }

    /// Shorthand for registering `listener` on every change of `entity`
    pub fn listen(self, entity: impl Into<String>, listener: Arc<dyn TableChangeListener>) -> Self {
        self.register(ListenerRegistration::new(entity, listener))
    }

    /// Add several registrations
    pub fn register_all(
        mut self,
        registrations: impl IntoIterator<Item = ListenerRegistration>,
    ) -> Self {
        self.registrations.extend(registrations);
        self
    }

    pub fn metadata(mut self, provider: impl MetadataProvider + 'static) -> Self {
        self.metadata = Some(Arc::new(provider));
        self
    }

    pub fn lock_service(mut self, locks: Arc<dyn LockService>) -> Self {
        self.locks = Some(locks);
        self
    }

    pub fn schema_executor(mut self, executor: Arc<dyn SchemaExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn connector(mut self, connector: Arc<dyn NotificationConnector>) -> Self {
        self.connector = Some(connector);
        self
    }

    pub fn options(mut self, options: PgPubSubOptions) -> Self {
        self.options = options;
        self
    }

    /// Resolve registrations and assemble the service
    pub fn build(self) -> PubSubResult<PgPubSub> {
        let metadata = self
            .metadata
            .unwrap_or_else(|| Arc::new(StaticMetadataProvider::new()));
        let executor = self
            .executor
            .ok_or(PubSubError::MissingComponent("schema executor"))?;
        let connector = self
            .connector
            .ok_or(PubSubError::MissingComponent("notification connector"))?;
        let locks = self
            .locks
            .unwrap_or_else(|| Arc::new(InMemoryLockService::new()));

        let registry = ListenerRegistry::build(
            self.registrations,
            metadata.as_ref(),
            &self.options.trigger_prefix,
        )?;

        Ok(PgPubSub::assemble(
            Arc::new(registry),
            locks,
            executor,
            connector,
            self.options,
        ))
    }
}
