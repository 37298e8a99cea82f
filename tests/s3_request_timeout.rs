//! S3 — a one-shot request against a destination with no matching route
//! never completes, and `await_one` fails with `Timeout` once the deadline
//! passes, leaving no residue in the pending-response store.

mod common;

use std::sync::Arc;
use std::time::Duration;

use kernel_core::{
    KernelError, KernelResult, ListenerManager, Message, OneShotRequest, Path,
    PendingResponseStore, RegistrationPolicy, RouteRegistry,
};

#[tokio::test]
async fn request_to_unmatched_route_times_out_cleanly() {
    let system = common::fresh_system();
    let router = Arc::new(RouteRegistry::new());
    let listeners = Arc::new(ListenerManager::new(RegistrationPolicy::Multi));
    let subsystem = common::build_subsystem("users", system.clone(), router, listeners, true);
    system.register("users", subsystem).unwrap();

    let store = PendingResponseStore::new();
    let system_for_sender = system.clone();
    let sender: Arc<dyn Fn(Message) + Send + Sync> = Arc::new(move |msg: Message| {
        let system = system_for_sender.clone();
        tokio::spawn(async move {
            let _ = system.dispatch(msg).await;
        });
    });
    let install: Arc<dyn Fn(&Path) -> KernelResult<()> + Send + Sync> = Arc::new(|_p| Ok(()));
    let remove: Arc<dyn Fn(&Path) + Send + Sync> = Arc::new(|_p| {});

    let one_shot = OneShotRequest::new(
        store.clone(),
        sender,
        install,
        remove,
        Path::parse("users://caller").unwrap(),
    );

    let msg = Message::new(
        Path::parse("users://query/nonexistent").unwrap(),
        kernel_core::MessageKind::Query,
        serde_json::json!({}),
    );
    let result = one_shot
        .send(msg, kernel_core::Deadline::with_timeout(Duration::from_millis(50)), kernel_core::Cancellation::new())
        .await;

    assert!(matches!(result, Err(KernelError::Timeout)));
    assert!(store.is_empty(), "timed-out request must not leak a pending entry");
}
