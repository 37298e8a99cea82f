//! S6 — a queue-backed processor at capacity applies its overflow policy:
//! `Reject` fails the enqueue, `DropOldest` silently evicts the head.

use std::sync::Arc;

use kernel_core::{
    AcceptOptions, AcceptOutcome, KernelError, ListenerManager, Message, MessageKind,
    OverflowPolicy, Path, ProcessorFacet, RegistrationPolicy, RouteRegistry,
};

fn ping(n: i64) -> Message {
    Message::new(
        Path::parse("s://ping").unwrap(),
        MessageKind::Query,
        serde_json::json!({"n": n}),
    )
}

#[tokio::test]
async fn reject_policy_fails_enqueue_once_full() {
    let router = Arc::new(RouteRegistry::new());
    let listeners = Arc::new(ListenerManager::new(RegistrationPolicy::Multi));
    let reply: Arc<dyn Fn(Message) + Send + Sync> = Arc::new(|_msg| {});
    let processor = ProcessorFacet::new(2, OverflowPolicy::Reject, router, listeners, reply);

    assert!(matches!(
        processor.accept(ping(1), AcceptOptions::default()).await,
        Ok(AcceptOutcome::Queued)
    ));
    assert!(matches!(
        processor.accept(ping(2), AcceptOptions::default()).await,
        Ok(AcceptOutcome::Queued)
    ));
    let result = processor.accept(ping(3), AcceptOptions::default()).await;
    assert!(matches!(result, Err(KernelError::QueueFull)));
    assert_eq!(processor.queue_len(), 2);
}

#[tokio::test]
async fn drop_oldest_policy_evicts_the_head_instead_of_failing() {
    let router = Arc::new(RouteRegistry::new());
    let listeners = Arc::new(ListenerManager::new(RegistrationPolicy::Multi));
    let reply: Arc<dyn Fn(Message) + Send + Sync> = Arc::new(|_msg| {});
    let processor = ProcessorFacet::new(2, OverflowPolicy::DropOldest, router, listeners, reply);

    processor.accept(ping(1), AcceptOptions::default()).await.unwrap();
    processor.accept(ping(2), AcceptOptions::default()).await.unwrap();
    let outcome = processor.accept(ping(3), AcceptOptions::default()).await.unwrap();
    match outcome {
        AcceptOutcome::Dropped(dropped) => assert_eq!(dropped.body, serde_json::json!({"n": 1})),
        other => panic!("expected a dropped outcome, got {other:?}"),
    }
    assert_eq!(processor.queue_len(), 2);
}
