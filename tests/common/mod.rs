//! Shared scaffolding for the end-to-end scenario tests (S1-S7). Builds a
//! fully wired subsystem (queue/router/listeners/processor facets) the way
//! a real caller would: hooks registered on a [`Subsystem`], verified and
//! executed through a [`SubsystemBuilder`].

#![allow(dead_code)]

use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;
use kernel_core::{
    BuildContext, Facet, FacetKind, Hook, KernelResult, ListenerManager, Message, MessageSystem,
    ProcessorFacet, RouteRegistry, Subsystem, SubsystemBuilder, SubsystemHandle,
};

static TRACING_INIT: std::sync::Once = std::sync::Once::new();

/// Route the kernel's `tracing` output (listener fan-out errors, route
/// misses) to stdout under `RUST_LOG`, so a failing scenario test can be
/// re-run with logging instead of guessing. Safe to call from every test —
/// only the first call installs the subscriber.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// A facet that exists purely to satisfy a dependency edge (spec §4.7 step
/// 5 just checks the kind is installed, not any particular capability).
struct MarkerFacet(FacetKind);

impl Facet for MarkerFacet {
    fn kind(&self) -> FacetKind {
        self.0.clone()
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn marker_hook(kind: FacetKind) -> Hook {
    Hook::new(kind.clone(), "test-harness", move |_ctx, _sub| {
        Ok(Arc::new(MarkerFacet(kind.clone())) as Arc<dyn Facet>)
    })
}

/// Build a subsystem named `name` with queue/router/listeners markers and a
/// real [`ProcessorFacet`] wired to `router`/`listeners`, dispatching
/// replies back through `system`.
pub fn build_subsystem(
    name: &str,
    system: Arc<MessageSystem>,
    router: Arc<RouteRegistry>,
    listeners: Arc<ListenerManager>,
    synchronous: bool,
) -> Arc<Subsystem> {
    init_tracing();
    let subsystem = Arc::new(Subsystem::new(name, router.clone()));

    let reply: Arc<dyn Fn(Message) + Send + Sync> = Arc::new(move |msg: Message| {
        let system = system.clone();
        tokio::spawn(async move {
            let _ = system.dispatch(msg).await;
        });
    });

    let router_for_hook = router.clone();
    let listeners_for_hook = listeners.clone();
    let processor_hook = Hook::new(
        kernel_core::facet::kinds::processor(),
        "test-harness",
        move |_ctx: &BuildContext, _sub: &SubsystemHandle| {
            let facet = ProcessorFacet::new(
                16,
                kernel_core::OverflowPolicy::Reject,
                router_for_hook.clone(),
                listeners_for_hook.clone(),
                reply.clone(),
            )
            .synchronous(synchronous);
            Ok(Arc::new(facet) as Arc<dyn Facet>)
        },
    );

    subsystem.use_hook(marker_hook(kernel_core::facet::kinds::queue()));
    subsystem.use_hook(marker_hook(kernel_core::facet::kinds::router()));
    subsystem.use_hook(marker_hook(kernel_core::facet::kinds::listeners()));
    subsystem.use_hook(processor_hook);

    let builder = SubsystemBuilder::new(kernel_core::ContractRegistry::new());
    subsystem
        .build(&builder, &BuildContext::default())
        .expect("subsystem builds cleanly");
    subsystem
}

pub fn fresh_system() -> Arc<MessageSystem> {
    Arc::new(MessageSystem::new(
        vec![9u8, 9, 9],
        kernel_core::GlobalStrategy::RoundRobin,
    ))
}

pub struct Echo;

#[async_trait]
impl kernel_core::RouteHandler for Echo {
    async fn handle(
        &self,
        msg: &Message,
        _params: &kernel_core::Params,
    ) -> KernelResult<kernel_core::HandlerResult> {
        Ok(kernel_core::HandlerResult::ok(msg.body.clone()))
    }
}
