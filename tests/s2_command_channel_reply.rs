//! S2 — a command routed through a reusable [`kernel_core::Channel`]
//! resolves via its long-lived reply route instead of an ephemeral one.

mod common;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use kernel_core::{
    ChannelManager, ChannelRequest, Commands, CreateChannelOptions, HandlerResult, KernelResult,
    ListenerManager, Message, OneShotRequest, Params, Path, PathPattern, PendingResponseStore,
    RegistrationPolicy, RouteRegistry,
};

struct Deposit;

#[async_trait]
impl kernel_core::RouteHandler for Deposit {
    async fn handle(&self, msg: &Message, _params: &Params) -> KernelResult<HandlerResult> {
        let amount = msg.body["amount"].as_i64().unwrap_or(0);
        Ok(HandlerResult::ok(serde_json::json!({"balance": amount + 100})))
    }
}

struct ReplyCompleter(PendingResponseStore);

#[async_trait]
impl kernel_core::RouteHandler for ReplyCompleter {
    async fn handle(&self, msg: &Message, _params: &Params) -> KernelResult<HandlerResult> {
        if let Some(id) = msg.meta.correlation_id {
            self.0.complete(id, msg.clone());
        }
        Ok(HandlerResult::ok(serde_json::json!(null)))
    }
}

#[tokio::test]
async fn command_reply_arrives_over_a_reusable_channel() {
    let system = common::fresh_system();
    let router = Arc::new(RouteRegistry::new());
    let listeners = Arc::new(ListenerManager::new(RegistrationPolicy::Multi));
    let subsystem = common::build_subsystem("users", system.clone(), router.clone(), listeners, true);
    system.register("users", subsystem.clone()).unwrap();

    let channels = ChannelManager::new(Path::new("users", vec![]), router.clone());
    let channel = channels
        .create("lobby", Arc::new(Deposit), CreateChannelOptions::default())
        .unwrap();

    let store = PendingResponseStore::new();
    let reply_path = Path::new(
        "users",
        vec!["channels".to_string(), "lobby".to_string(), "reply".to_string()],
    );
    subsystem
        .register_route(
            PathPattern::parse(&reply_path.to_string()).unwrap(),
            Arc::new(ReplyCompleter(store.clone())),
        )
        .unwrap();

    let system_for_sender = system.clone();
    let sender: Arc<dyn Fn(Message) + Send + Sync> = Arc::new(move |msg: Message| {
        let system = system_for_sender.clone();
        tokio::spawn(async move {
            let _ = system.dispatch(msg).await;
        });
    });

    let channel_request = ChannelRequest::new(store.clone(), sender.clone(), reply_path);

    // Required by `Commands::send`'s signature but never invoked, since a
    // channel-backed request is supplied.
    let dummy_one_shot = OneShotRequest::new(
        store,
        sender,
        Arc::new(|_p: &Path| Ok(())),
        Arc::new(|_p: &Path| {}),
        Path::parse("users://unused").unwrap(),
    );

    let commands = Commands::new(router);
    let response = commands
        .send(
            channel.full_path.clone(),
            serde_json::json!({"amount": 50}),
            Duration::from_secs(2),
            &dummy_one_shot,
            Some(&channel_request),
        )
        .await
        .unwrap();

    assert_eq!(response.body, serde_json::json!({"balance": 150}));
}
