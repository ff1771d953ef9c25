//! Redis lock backend against a live server
//!
//! Runs only when `REDIS_URL` is set, e.g.
//! `REDIS_URL=redis://127.0.0.1/ cargo test --test redis_lock`.

use std::time::Duration;

use uuid::Uuid;

use pgpubsub::lock::{LockService, RedisLockService};

async fn locks() -> Option<RedisLockService> {
    let Ok(url) = std::env::var("REDIS_URL") else {
        eprintln!("REDIS_URL not set, skipping");
        return None;
    };
    let service = RedisLockService::connect(&url).await.unwrap();
    Some(service.with_namespace(format!("pgpubsub-test:{}:", Uuid::new_v4())))
}

#[tokio::test]
async fn test_second_acquire_rejected_while_held() {
    let Some(locks) = locks().await else { return };

    let held = locks.acquire("orders", Duration::from_secs(5)).await.unwrap();
    assert!(held.is_some());
    assert!(locks
        .acquire("orders", Duration::from_secs(5))
        .await
        .unwrap()
        .is_none());

    // the holder may release its own lock
    locks.release(held.unwrap()).await.unwrap();
    assert!(locks
        .acquire("orders", Duration::from_secs(5))
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn test_reacquire_after_ttl_lapses() {
    let Some(locks) = locks().await else { return };

    let ttl = Duration::from_millis(200);
    assert!(locks.acquire("orders", ttl).await.unwrap().is_some());
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert!(locks.acquire("orders", ttl).await.unwrap().is_some());
}

#[tokio::test]
async fn test_stale_release_keeps_successor_lock() {
    let Some(locks) = locks().await else { return };

    let stale = locks
        .acquire("orders", Duration::from_millis(200))
        .await
        .unwrap()
        .unwrap();
    tokio::time::sleep(Duration::from_millis(400)).await;

    let successor = locks
        .acquire("orders", Duration::from_secs(5))
        .await
        .unwrap()
        .unwrap();
    assert_ne!(stale.token(), successor.token());

    locks.release(stale).await.unwrap();
    assert!(locks
        .acquire("orders", Duration::from_secs(5))
        .await
        .unwrap()
        .is_none());
}
