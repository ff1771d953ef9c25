//! # Trigger Provisioner
//!
//! Generates and installs the PL/pgSQL triggers that publish row changes
//! on the notification channel.

pub mod errors;
pub mod provisioner;
pub mod spec;
pub mod sql;

pub use errors::{ProvisionError, ProvisionResult};
pub use provisioner::{
    InstalledTrigger, PgSchemaExecutor, ProvisionerConfig, SchemaExecutor, SyncOutcome,
    TriggerProvisioner,
};
pub use spec::{trigger_name, Selection, TriggerSpec, DEFAULT_TRIGGER_PREFIX};
