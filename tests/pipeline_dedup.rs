//! Cross-instance deduplication tests
//!
//! Several services on one notification bus share a lock service; each
//! notification id must be dispatched by exactly one of them.

mod harness;

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use harness::*;
use pgpubsub::lock::{InMemoryLockService, LockService};
use pgpubsub::registry::ListenerRegistration;

fn total_changes(recorders: &[Arc<Recorder>]) -> usize {
    recorders
        .iter()
        .flat_map(|r| r.calls())
        .map(|changes| changes.len())
        .sum()
}

#[tokio::test(start_paused = true)]
async fn test_one_dispatch_across_instances() {
    let bus = FakeBus::new();
    let locks: Arc<dyn LockService> = Arc::new(InMemoryLockService::new());
    let first = Recorder::new();
    let second = Recorder::new();

    let a = service(
        &bus,
        &RecordingExecutor::new(),
        Arc::clone(&locks),
        vec![ListenerRegistration::new("Order", first.clone())],
    );
    let b = service(
        &bus,
        &RecordingExecutor::new(),
        Arc::clone(&locks),
        vec![ListenerRegistration::new("Order", second.clone())],
    );

    a.start().await.unwrap();
    b.start().await.unwrap();
    assert_eq!(bus.connects(), 2);

    bus.notify(CHANNEL, insert_payload("evt-1", "orders", json!({"id": 1})));
    tokio::time::sleep(Duration::from_millis(1500)).await;

    assert_eq!(total_changes(&[first.clone(), second.clone()]), 1);

    a.shutdown().await;
    b.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_distinct_ids_are_all_dispatched() {
    let bus = FakeBus::new();
    let locks: Arc<dyn LockService> = Arc::new(InMemoryLockService::new());
    let recorders: Vec<Arc<Recorder>> = (0..3).map(|_| Recorder::new()).collect();

    let services: Vec<_> = recorders
        .iter()
        .map(|recorder| {
            service(
                &bus,
                &RecordingExecutor::new(),
                Arc::clone(&locks),
                vec![ListenerRegistration::new("Order", recorder.clone())],
            )
        })
        .collect();

    for service in &services {
        service.start().await.unwrap();
    }

    for i in 0..5 {
        bus.notify(
            CHANNEL,
            insert_payload(&format!("evt-{}", i), "orders", json!({"id": i})),
        );
    }
    tokio::time::sleep(Duration::from_millis(1500)).await;

    assert_eq!(total_changes(&recorders), 5);

    for service in &services {
        service.shutdown().await;
    }
}

/// A redelivered id inside the lock TTL is suppressed even on one instance.
#[tokio::test(start_paused = true)]
async fn test_redelivery_within_ttl_is_suppressed() {
    let bus = FakeBus::new();
    let recorder = Recorder::new();
    let service = service(
        &bus,
        &RecordingExecutor::new(),
        Arc::new(InMemoryLockService::new()),
        vec![ListenerRegistration::new("Order", recorder.clone())],
    );

    service.start().await.unwrap();
    let payload = insert_payload("evt-1", "orders", json!({"id": 1}));
    bus.notify(CHANNEL, payload.clone());
    bus.notify(CHANNEL, payload);
    tokio::time::sleep(Duration::from_millis(1500)).await;

    let calls = recorder.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].len(), 1);

    service.shutdown().await;
}
