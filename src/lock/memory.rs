//! # In-Memory Lock Service
//!
//! Single-process lock table with TTL based expiry. Keys stay reserved for
//! their full duration even after release, so a duplicate that arrives
//! after the first holder finished is still rejected.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use uuid::Uuid;

use super::errors::{LockError, LockResult};
use super::{LockService, LockToken};

/// Expired entries are swept once the table grows past this size
const PRUNE_THRESHOLD: usize = 1024;

#[derive(Debug)]
struct HeldLock {
    token: String,
    expires_at: Instant,
}

/// Process-local [`LockService`]. Not shared between processes.
#[derive(Debug, Default)]
pub struct InMemoryLockService {
    locks: Mutex<HashMap<String, HeldLock>>,
}

impl InMemoryLockService {
    /// Create an empty lock table
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently tracked, expired or not
    pub fn tracked(&self) -> usize {
        self.locks.lock().map(|locks| locks.len()).unwrap_or(0)
    }
}

#[async_trait]
impl LockService for InMemoryLockService {
    async fn acquire(&self, key: &str, ttl: Duration) -> LockResult<Option<LockToken>> {
        let now = Instant::now();
        let mut locks = self.locks.lock().map_err(|_| LockError::Poisoned)?;

        if locks.len() >= PRUNE_THRESHOLD {
            locks.retain(|_, held| held.expires_at > now);
        }

        if let Some(held) = locks.get(key) {
            if held.expires_at > now {
                return Ok(None);
            }
        }

        let token = Uuid::new_v4().to_string();
        locks.insert(
            key.to_string(),
            HeldLock {
                token: token.clone(),
                expires_at: now + ttl,
            },
        );

        Ok(Some(LockToken::new(key, token)))
    }

    async fn release(&self, token: LockToken) -> LockResult<()> {
        let now = Instant::now();
        let mut locks = self.locks.lock().map_err(|_| LockError::Poisoned)?;

        // Only drop our own entry, and only once it has expired.
        let expired_own = locks
            .get(token.key())
            .map(|held| held.token == token.token() && held.expires_at <= now)
            .unwrap_or(false);
        if expired_own {
            locks.remove(token.key());
        }

        Ok(())
    }
}
