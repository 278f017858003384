//! Event delivery through the orchestrator with the in-memory bus.

mod common;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use common::{orchestrator, test_config, TestService};
use service_framework::{event_handler, Context, LifecycleState, MemoryBus, MessageBus};

#[tokio::test]
async fn test_subscribed_handler_receives_messages_in_order() {
    let bus = Arc::new(MemoryBus::new());
    let (tx, mut rx) = mpsc::unbounded_channel::<Vec<u8>>();

    let mut events = HashMap::new();
    events.insert(
        "orders".to_string(),
        event_handler(move |_ctx, msg| {
            let tx = tx.clone();
            async move {
                let _ = tx.send(msg);
            }
        }),
    );
    let service = TestService {
        bus: Some(bus.clone()),
        events: Some(events),
        ..TestService::default()
    };
    let orchestrator = orchestrator(test_config());
    let handle = orchestrator.handle();
    let run = tokio::spawn(orchestrator.run(service));

    handle.wait_for(LifecycleState::Running).await;
    // Subscription tasks register asynchronously.
    while bus.subscriber_count("orders") == 0 {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let ctx = Context::background();
    for payload in ["first", "second", "third"] {
        bus.publish(&ctx, "orders", payload.as_bytes().to_vec())
            .await
            .unwrap();
    }
    bus.publish(&ctx, "ignored", b"nobody listens".to_vec())
        .await
        .unwrap();

    for expected in ["first", "second", "third"] {
        let msg = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("message delivered")
            .expect("channel open");
        assert_eq!(msg, expected.as_bytes());
    }

    handle.shutdown();
    let result = tokio::time::timeout(Duration::from_secs(10), run)
        .await
        .expect("run finishes")
        .unwrap();
    assert!(result.is_ok());
    assert!(bus.is_closed());
    assert!(rx.try_recv().is_err());
}
