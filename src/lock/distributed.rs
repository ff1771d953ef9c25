//! # Redis Lock Service
//!
//! Fleet-wide locks stored in Redis. Acquisition is an atomic
//! `SET key token NX PX ttl`; release runs a Lua compare-and-delete so a
//! holder whose TTL already lapsed cannot delete a successor's lock.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{Client, Script};
use uuid::Uuid;

use super::errors::{LockError, LockResult};
use super::{LockService, LockToken};

/// Default namespace prepended to every key
pub const DEFAULT_NAMESPACE: &str = "lock:";

const RELEASE_SCRIPT: &str = r#"
if redis.call('get', KEYS[1]) == ARGV[1] then
    return redis.call('del', KEYS[1])
else
    return 0
end
"#;

/// [`LockService`] backed by a Redis server
#[derive(Clone)]
pub struct RedisLockService {
    connection: ConnectionManager,
    namespace: String,
}

impl RedisLockService {
    /// Connect to the Redis server at `url`
    pub async fn connect(url: &str) -> LockResult<Self> {
        let client = Client::open(url)?;
        let connection = ConnectionManager::new(client).await?;
        Ok(Self::with_connection(connection))
    }

    /// Wrap an existing managed connection
    pub fn with_connection(connection: ConnectionManager) -> Self {
        Self {
            connection,
            namespace: DEFAULT_NAMESPACE.to_string(),
        }
    }

    /// Override the key namespace
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    fn lock_key(&self, key: &str) -> String {
        namespaced(&self.namespace, key)
    }
}

fn namespaced(namespace: &str, key: &str) -> String {
    format!("{}{}", namespace, key)
}

/// `SET ... NX` answers `OK` when the key was set and nil when it exists.
fn acquired(reply: Option<String>) -> LockResult<bool> {
    match reply.as_deref() {
        None => Ok(false),
        Some("OK") => Ok(true),
        Some(other) => Err(LockError::Backend(format!("unexpected SET reply: {}", other))),
    }
}

/// Redis rejects `PX 0`, so sub-millisecond TTLs round up.
fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

#[async_trait]
impl LockService for RedisLockService {
    async fn acquire(&self, key: &str, ttl: Duration) -> LockResult<Option<LockToken>> {
        let token = Uuid::new_v4().to_string();
        let mut connection = self.connection.clone();

        let reply: Option<String> = redis::cmd("SET")
            .arg(self.lock_key(key))
            .arg(&token)
            .arg("NX")
            .arg("PX")
            .arg(ttl_millis(ttl))
            .query_async(&mut connection)
            .await?;

        Ok(acquired(reply)?.then(|| LockToken::new(key, token)))
    }

    async fn release(&self, token: LockToken) -> LockResult<()> {
        let mut connection = self.connection.clone();
        let script = Script::new(RELEASE_SCRIPT);

        let _deleted: i64 = script
            .key(self.lock_key(token.key()))
            .arg(token.token())
            .invoke_async(&mut connection)
            .await?;

        Ok(())
    }
}
