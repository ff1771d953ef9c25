//! suspend_and_run tests
//!
//! Listening is paused while the action runs and restored afterwards,
//! whether the action succeeds, fails or panics.

mod harness;

use std::sync::Arc;

use thiserror::Error;

use harness::*;
use pgpubsub::lock::InMemoryLockService;
use pgpubsub::registry::ListenerRegistration;
use pgpubsub::transport::TransportState;
use pgpubsub::{PgPubSub, PubSubError};

#[derive(Debug, Error)]
enum TestError {
    #[error("action failed: {0}")]
    Action(String),

    #[error(transparent)]
    PubSub(#[from] PubSubError),
}

fn started_service(bus: &Arc<FakeBus>) -> PgPubSub {
    service(
        bus,
        &RecordingExecutor::new(),
        Arc::new(InMemoryLockService::new()),
        vec![ListenerRegistration::new("Order", Recorder::new())],
    )
}

#[tokio::test(start_paused = true)]
async fn test_action_runs_while_disconnected() {
    let bus = FakeBus::new();
    let service = started_service(&bus);
    service.start().await.unwrap();

    let value = service
        .suspend_and_run(|| async {
            assert_eq!(service.transport_state(), TransportState::Disconnected);
            Ok::<_, TestError>(42)
        })
        .await
        .unwrap();

    assert_eq!(value, 42);
    assert_eq!(service.transport_state(), TransportState::Listening);
    assert_eq!(bus.connects(), 2);

    service.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_failed_action_still_resumes() {
    let bus = FakeBus::new();
    let service = started_service(&bus);
    service.start().await.unwrap();

    let err = service
        .suspend_and_run(|| async {
            assert_eq!(service.transport_state(), TransportState::Disconnected);
            Err::<(), _>(TestError::Action("boom".into()))
        })
        .await
        .unwrap_err();

    assert!(matches!(err, TestError::Action(ref msg) if msg == "boom"));
    assert_eq!(service.transport_state(), TransportState::Listening);
    assert_eq!(bus.connects(), 2);

    service.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_panicking_action_still_resumes() {
    let bus = FakeBus::new();
    let service = Arc::new(started_service(&bus));
    service.start().await.unwrap();

    let task = {
        let service = Arc::clone(&service);
        tokio::spawn(async move {
            service
                .suspend_and_run(|| async {
                    if true {
                        panic!("boom");
                    }
                    Ok::<(), TestError>(())
                })
                .await
        })
    };

    let err = task.await.unwrap_err();
    assert!(err.is_panic());
    assert_eq!(service.transport_state(), TransportState::Listening);
    assert_eq!(bus.connects(), 2);

    service.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_suspend_on_idle_service_starts_listening() {
    let bus = FakeBus::new();
    let service = started_service(&bus);

    service
        .suspend_and_run(|| async { Ok::<_, TestError>(()) })
        .await
        .unwrap();

    assert_eq!(service.transport_state(), TransportState::Listening);
    assert_eq!(bus.connects(), 1);

    service.shutdown().await;
}
