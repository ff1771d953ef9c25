//! # Lock Service
//!
//! Pluggable mutual exclusion keyed by string with a time-to-live.
//!
//! The pipeline uses it twice: once around trigger provisioning so only one
//! process in a fleet runs DDL, and once per notification so a change
//! delivered to N listening processes is admitted exactly once.
//!
//! Two backends ship with the crate:
//!
//! - [`InMemoryLockService`]: single process, TTL based expiry
//! - [`RedisLockService`]: `SET NX PX` with compare-and-delete release

pub mod distributed;
pub mod errors;
pub mod memory;

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

pub use distributed::RedisLockService;
pub use errors::{LockError, LockResult};
pub use memory::InMemoryLockService;

/// Proof of a held lock, handed back to [`LockService::release`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockToken {
    key: String,
    token: String,
}

impl LockToken {
    /// Create a token for `key` carrying the holder's unique value
    pub fn new(key: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            token: token.into(),
        }
    }

    /// Locked key
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Holder value stored under the key
    pub fn token(&self) -> &str {
        &self.token
    }
}

/// A mutual-exclusion backend.
///
/// For a given key at most one holder exists for the lock's duration.
/// Implementations must never let a holder remove a lock it no longer owns.
#[async_trait]
pub trait LockService: Send + Sync {
    /// Try to take `key` for `ttl`. `Ok(None)` means another holder has it.
    async fn acquire(&self, key: &str, ttl: Duration) -> LockResult<Option<LockToken>>;

    /// End the holder's critical section.
    ///
    /// A backend may keep the key reserved until its TTL elapses.
    async fn release(&self, token: LockToken) -> LockResult<()>;
}

/// Result of [`try_lock`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockOutcome<T> {
    /// The lock was taken and `on_accept` ran to completion
    Accepted(T),
    /// Another holder owns the key; `on_accept` never ran
    Rejected,
}

impl<T> LockOutcome<T> {
    /// Whether the lock was taken
    pub fn is_accepted(&self) -> bool {
        matches!(self, LockOutcome::Accepted(_))
    }

    /// Accepted value, if any
    pub fn into_accepted(self) -> Option<T> {
        match self {
            LockOutcome::Accepted(value) => Some(value),
            LockOutcome::Rejected => None,
        }
    }
}

/// Run `on_accept` while holding `key`.
///
/// The lock is released once `on_accept` completes, whatever it returned.
/// A failed release is logged: the TTL still bounds how long the key stays
/// taken.
pub async fn try_lock<T, A>(
    locks: &dyn LockService,
    key: &str,
    ttl: Duration,
    on_accept: A,
) -> LockResult<LockOutcome<T>>
where
    A: Future<Output = T>,
{
    let Some(token) = locks.acquire(key, ttl).await? else {
        return Ok(LockOutcome::Rejected);
    };

    let value = on_accept.await;

    if let Err(e) = locks.release(token).await {
        warn!(key, error = %e, "failed to release lock, waiting for ttl expiry");
    }

    Ok(LockOutcome::Accepted(value))
}

/// Like [`try_lock`], running `on_reject` when the key is already held.
///
/// Returns `Some` with the accepted value, `None` after `on_reject` ran.
pub async fn try_lock_or_else<T, A, R>(
    locks: &dyn LockService,
    key: &str,
    ttl: Duration,
    on_accept: A,
    on_reject: R,
) -> LockResult<Option<T>>
where
    A: Future<Output = T>,
    R: Future<Output = ()>,
{
    match try_lock(locks, key, ttl, on_accept).await? {
        LockOutcome::Accepted(value) => Ok(Some(value)),
        LockOutcome::Rejected => {
            on_reject.await;
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_try_lock_runs_on_accept() {
        let locks = InMemoryLockService::new();
        let outcome = try_lock(&locks, "k", Duration::from_millis(100), async { 7 })
            .await
            .unwrap();
        assert_eq!(outcome, LockOutcome::Accepted(7));
    }

    #[tokio::test]
    async fn test_rejected_caller_runs_on_reject_only() {
        let locks = InMemoryLockService::new();
        let accepted = AtomicUsize::new(0);
        let rejected = AtomicUsize::new(0);

        let _ = locks.acquire("held", Duration::from_secs(5)).await.unwrap();

        let result = try_lock_or_else(
            &locks,
            "held",
            Duration::from_millis(100),
            async {
                accepted.fetch_add(1, Ordering::SeqCst);
            },
            async {
                rejected.fetch_add(1, Ordering::SeqCst);
            },
        )
        .await
        .unwrap();

        assert!(result.is_none());
        assert_eq!(accepted.load(Ordering::SeqCst), 0);
        assert_eq!(rejected.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_accepted_value_is_returned() {
        let locks = InMemoryLockService::new();
        let result = try_lock_or_else(
            &locks,
            "free",
            Duration::from_millis(100),
            async { "done" },
            async {},
        )
        .await
        .unwrap();
        assert_eq!(result, Some("done"));
    }

    #[test]
    fn test_outcome_helpers() {
        assert!(LockOutcome::Accepted(1).is_accepted());
        assert!(!LockOutcome::<i32>::Rejected.is_accepted());
        assert_eq!(LockOutcome::Accepted(3).into_accepted(), Some(3));
        assert_eq!(LockOutcome::<i32>::Rejected.into_accepted(), None);
    }
}
