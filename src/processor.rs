//! C9 — Queue Facet / Processor Facet.
//!
//! The facet that turns an inbound [`Message`] into a drained, routed,
//! listener-notified result. Implements [`Accepter`] so it can be reached
//! through [`Facet::as_accepter`] by [`crate::subsystem::Subsystem`] and
//! [`crate::scheduler`] without either of those knowing the concrete type.
//! Grounded in `spark-core::pipeline::handler`'s "match route, dispatch,
//! convert thrown error to `Result`" shape, generalized to spec §4.9's
//! accept/process-tick split and its listener/postHandler fan-out.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::KernelResult;
use crate::facet::{
    AcceptOptions, AcceptOutcome, Accepter, BuildContext, Facet, FacetKind, ProcessOutcome,
    SubsystemHandle, kinds,
};
use crate::identity::PrincipalRegistry;
use crate::listener::ListenerManager;
use crate::message::{HandlerResult, Message, MessageKind};
use crate::queue::{BoundedQueue, EnqueueOutcome, OverflowPolicy};
use crate::router::RouteRegistry;

/// Dispatches a fully-formed response message back toward its destination,
/// typically `MessageSystem::route` (spec §4.9 step 5). Injected rather
/// than referenced directly to avoid a dependency cycle between
/// `processor` and `system`.
pub type ReplyDispatcher = Arc<dyn Fn(Message) + Send + Sync>;

/// C9 — queue-backed message processor.
pub struct ProcessorFacet {
    queue: Mutex<BoundedQueue<Message>>,
    router: Arc<RouteRegistry>,
    listeners: Arc<ListenerManager>,
    principals: Option<Arc<PrincipalRegistry>>,
    synchronous: bool,
    reply: ReplyDispatcher,
}

const DECLARED_METHODS: &[&str] = &[
    "accept",
    "process_message",
    "process_tick",
    "process_immediately",
];

impl ProcessorFacet {
    pub fn new(
        capacity: usize,
        policy: OverflowPolicy,
        router: Arc<RouteRegistry>,
        listeners: Arc<ListenerManager>,
        reply: ReplyDispatcher,
    ) -> Self {
        Self {
            queue: Mutex::new(BoundedQueue::new(capacity, policy)),
            router,
            listeners,
            principals: None,
            synchronous: false,
            reply,
        }
    }

    pub fn synchronous(mut self, flag: bool) -> Self {
        self.synchronous = flag;
        self
    }

    pub fn with_principals(mut self, principals: Arc<PrincipalRegistry>) -> Self {
        self.principals = Some(principals);
        self
    }

    pub fn queue_len(&self) -> usize {
        self.queue.lock().len()
    }

    /// Role-based scope check (spec §4.9 step 3): if the matched route's
    /// metadata declares a `required_role`, the sender's PKR must be
    /// registered under that role. Messages with no sender PKR, or routes
    /// with no scope requirement, pass unchecked.
    fn check_scope(&self, msg: &Message, required_role: Option<&String>) -> KernelResult<()> {
        let Some(required_role) = required_role else {
            return Ok(());
        };
        let Some(registry) = &self.principals else {
            return Ok(());
        };
        let Some(sender) = &msg.meta.sender_pkr else {
            return Err(crate::error::KernelError::Permission);
        };
        match registry.get_role(sender) {
            Some(role) if &role == required_role => Ok(()),
            _ => Err(crate::error::KernelError::Permission),
        }
    }
}

#[async_trait]
impl Accepter for ProcessorFacet {
    fn is_synchronous(&self) -> bool {
        self.synchronous
    }

    async fn accept(&self, msg: Message, opts: AcceptOptions) -> KernelResult<AcceptOutcome> {
        if opts.bypass_queue || msg.meta.process_immediately || self.synchronous {
            let outcome = self.process_immediately(msg).await?;
            return Ok(AcceptOutcome::Processed(outcome.result));
        }
        let priority = msg.meta.priority.unwrap_or(0);
        let _ = priority; // FIFO queue here; priority strategy lives in the scheduler facet.
        match self.queue.lock().enqueue(msg)? {
            EnqueueOutcome::Accepted => Ok(AcceptOutcome::Queued),
            EnqueueOutcome::AcceptedWithDrop { dropped } => Ok(AcceptOutcome::Dropped(dropped)),
            // DropNewest: the message handed to `accept` is itself refused.
            EnqueueOutcome::Refused { refused } => Ok(AcceptOutcome::Dropped(refused)),
        }
    }

    async fn process_message(&self, msg: Message) -> KernelResult<ProcessOutcome> {
        let matched = self.router.matched(&msg.path);
        let Some((entry, params)) = matched else {
            if msg.kind == MessageKind::Event {
                self.listeners.emit(&msg).await;
            }
            return Ok(ProcessOutcome {
                result: HandlerResult::err("no route matched"),
                matched_route: false,
            });
        };

        if msg.kind == MessageKind::Event {
            self.listeners.emit(&msg).await;
            return Ok(ProcessOutcome {
                result: HandlerResult::ok(serde_json::json!(null)),
                matched_route: true,
            });
        }

        let required_role = entry.metadata.get("required_role");
        if let Err(err) = self.check_scope(&msg, required_role) {
            return Ok(ProcessOutcome {
                result: HandlerResult::err(err.to_string()),
                matched_route: true,
            });
        }

        let result = match entry.handler.handle(&msg, &params).await {
            Ok(result) => result,
            Err(err) => HandlerResult::err(err.to_string()),
        };

        // Synthetic postHandler listener event (spec §4.9 step 2).
        let post_handler = Message::new(
            msg.path.clone(),
            MessageKind::Event,
            serde_json::json!({ "postHandler": true, "success": result.success }),
        );
        self.listeners.emit(&post_handler).await;

        if let Some(response) = msg.respond(result.data.clone().unwrap_or(serde_json::json!(null))) {
            (self.reply)(response);
        }

        Ok(ProcessOutcome {
            result,
            matched_route: true,
        })
    }

    async fn process_tick(&self) -> Option<KernelResult<ProcessOutcome>> {
        let drained = self.queue.lock().dequeue()?;
        Some(self.process_message(drained).await)
    }

    async fn process_immediately(&self, msg: Message) -> KernelResult<ProcessOutcome> {
        self.process_message(msg).await
    }

    fn queue_len(&self) -> usize {
        self.queue.lock().len()
    }
}

impl Facet for ProcessorFacet {
    fn kind(&self) -> FacetKind {
        kinds::processor()
    }

    fn contract_name(&self) -> Option<&'static str> {
        Some("processor")
    }

    fn dependencies(&self) -> Vec<FacetKind> {
        vec![kinds::queue(), kinds::router(), kinds::listeners()]
    }

    fn declared_methods(&self) -> &[&'static str] {
        DECLARED_METHODS
    }

    fn init(&self, _ctx: &BuildContext, _subsystem: &SubsystemHandle) -> KernelResult<()> {
        Ok(())
    }

    fn as_accepter(&self) -> Option<&dyn Accepter> {
        Some(self)
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::{Params, Path, PathPattern};
    use crate::router::RouteHandler;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Echo;

    #[async_trait]
    impl RouteHandler for Echo {
        async fn handle(&self, msg: &Message, _params: &Params) -> KernelResult<HandlerResult> {
            Ok(HandlerResult::ok(msg.body.clone()))
        }
    }

    fn processor() -> (ProcessorFacet, Arc<RouteRegistry>, Arc<ListenerManager>) {
        let router = Arc::new(RouteRegistry::new());
        let listeners = Arc::new(ListenerManager::new(
            crate::listener::RegistrationPolicy::Multi,
        ));
        let reply: ReplyDispatcher = Arc::new(|_msg| {});
        let processor = ProcessorFacet::new(
            4,
            OverflowPolicy::Reject,
            router.clone(),
            listeners.clone(),
            reply,
        );
        (processor, router, listeners)
    }

    #[tokio::test]
    async fn accept_enqueues_then_process_tick_drains_it() {
        let (processor, router, _listeners) = processor();
        router
            .register(
                PathPattern::parse("s://ping").unwrap(),
                Arc::new(Echo),
                0,
                HashMap::new(),
            )
            .unwrap();
        let msg = Message::new(
            Path::parse("s://ping").unwrap(),
            MessageKind::Query,
            serde_json::json!({"v": 1}),
        );
        let outcome = processor.accept(msg, AcceptOptions::default()).await.unwrap();
        assert!(matches!(outcome, AcceptOutcome::Queued));
        assert_eq!(processor.queue_len(), 1);
        let tick = processor.process_tick().await.unwrap().unwrap();
        assert!(tick.result.success);
        assert_eq!(processor.queue_len(), 0);
    }

    #[tokio::test]
    async fn process_immediately_bypasses_the_queue() {
        let (processor, router, _listeners) = processor();
        router
            .register(
                PathPattern::parse("s://ping").unwrap(),
                Arc::new(Echo),
                0,
                HashMap::new(),
            )
            .unwrap();
        let msg = Message::new(
            Path::parse("s://ping").unwrap(),
            MessageKind::Query,
            serde_json::json!({}),
        )
        .with_process_immediately(true);
        let outcome = processor.accept(msg, AcceptOptions::default()).await.unwrap();
        assert!(matches!(outcome, AcceptOutcome::Processed(_)));
        assert_eq!(processor.queue_len(), 0);
    }

    #[tokio::test]
    async fn event_fans_out_to_listeners_without_requiring_a_handler() {
        let (processor, _router, listeners) = processor();
        let seen = Arc::new(AtomicUsize::new(0));
        struct Counter(Arc<AtomicUsize>);
        #[async_trait]
        impl crate::listener::ListenerHandler for Counter {
            async fn handle(&self, _msg: &Message, _params: &Params) -> KernelResult<()> {
                self.0.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }
        listeners
            .on(PathPattern::parse("s://evt").unwrap(), Arc::new(Counter(seen.clone())))
            .unwrap();
        let msg = Message::new(
            Path::parse("s://evt").unwrap(),
            MessageKind::Event,
            serde_json::json!({}),
        );
        let outcome = processor.process_message(msg).await.unwrap();
        assert!(!outcome.matched_route);
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn scope_check_denies_missing_sender() {
        let (processor, router, _listeners) = processor();
        let mut metadata = HashMap::new();
        metadata.insert("required_role".to_string(), "admin".to_string());
        router
            .register(
                PathPattern::parse("s://secret").unwrap(),
                Arc::new(Echo),
                0,
                metadata,
            )
            .unwrap();
        let msg = Message::new(
            Path::parse("s://secret").unwrap(),
            MessageKind::Command,
            serde_json::json!({}),
        );
        let outcome = processor.process_message(msg).await.unwrap();
        assert!(!outcome.result.success);
    }
}
