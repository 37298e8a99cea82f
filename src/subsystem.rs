//! C17 — Subsystem Base.
//!
//! The unit of composition: a named node in the subsystem tree that owns a
//! [`FacetManager`], a hook list, and (once built) a processor it delegates
//! `accept`/`process` to. Grounded in `spark-core`'s host/pipeline split —
//! a long-lived owner object that installs handlers once and then forwards
//! traffic to them — generalized to spec §4.17's idempotent `Build` and
//! facet-delegation rules.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;

use crate::builder::SubsystemBuilder;
use crate::error::{KernelError, KernelResult};
use crate::facet::{
    AcceptOptions, AcceptOutcome, BuildContext, Facet, FacetKind, FacetManager, Hook,
    ProcessOutcome, SchedulerRunResult, SubsystemHandle, kinds,
};
use crate::message::Message;
use crate::path::{Path, PathPattern};
use crate::router::{RouteHandler, RouteRegistry};

/// `Build` is idempotent (spec §4.17): concurrent/re-entrant callers
/// observe one of these states rather than racing the install.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum BuildState {
    NotStarted,
    InProgress,
    Done,
}

/// C17 — a node in the subsystem tree.
pub struct Subsystem {
    name: Arc<str>,
    default_hooks: Vec<Hook>,
    hooks: Mutex<Vec<Hook>>,
    facets: Arc<Mutex<FacetManager>>,
    ctx: Mutex<BuildContext>,
    build_state: Mutex<BuildState>,
    parent: Mutex<Weak<Subsystem>>,
    children: Mutex<Vec<Arc<Subsystem>>>,
    router: Arc<RouteRegistry>,
    paused: AtomicBool,
}

impl Subsystem {
    pub fn new(name: impl Into<Arc<str>>, router: Arc<RouteRegistry>) -> Self {
        Self {
            name: name.into(),
            default_hooks: Vec::new(),
            hooks: Mutex::new(Vec::new()),
            facets: Arc::new(Mutex::new(FacetManager::new())),
            ctx: Mutex::new(BuildContext::default()),
            build_state: Mutex::new(BuildState::NotStarted),
            parent: Mutex::new(Weak::new()),
            children: Mutex::new(Vec::new()),
            router,
            paused: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get_name_string(&self) -> String {
        self.name.to_string()
    }

    /// `Use(hook)`: register an additional (non-default) hook. Invalidates
    /// nothing by itself — the owning [`SubsystemBuilder`]'s plan cache is
    /// invalidated by the caller when it knows the hook set actually
    /// changed (spec §4.7 "any mutation to hook list invalidates it").
    pub fn use_hook(&self, hook: Hook) {
        self.hooks.lock().push(hook);
    }

    pub fn handle(self: &Arc<Self>) -> SubsystemHandle {
        SubsystemHandle::new(self.name.clone(), self.facets.clone())
    }

    pub fn is_built(&self) -> bool {
        *self.build_state.lock() == BuildState::Done
    }

    pub fn set_parent(self: &Arc<Self>, parent: &Arc<Subsystem>) {
        *self.parent.lock() = Arc::downgrade(parent);
        parent.children.lock().push(self.clone());
    }

    pub fn get_parent(&self) -> Option<Arc<Subsystem>> {
        self.parent.lock().upgrade()
    }

    pub fn is_root(&self) -> bool {
        self.get_parent().is_none()
    }

    pub fn get_root(self: &Arc<Self>) -> Arc<Subsystem> {
        let mut current = self.clone();
        while let Some(parent) = current.get_parent() {
            current = parent;
        }
        current
    }

    /// Look up a direct child by name, used during routing descent (spec
    /// §4.16).
    pub fn find_child(&self, name: &str) -> Option<Arc<Subsystem>> {
        self.children
            .lock()
            .iter()
            .find(|c| c.name() == name)
            .cloned()
    }

    /// `Build(extraCtx)` (spec §4.17, §4.7 Execute): idempotent — a
    /// build already in progress or already complete is a no-op for the
    /// caller; this synchronous implementation (single-writer via
    /// `build_state`) never actually has a second concurrent builder to
    /// join, so "in-flight" collapses to "already done or already running
    /// on this thread".
    pub fn build(
        self: &Arc<Self>,
        builder: &SubsystemBuilder,
        extra_ctx: &BuildContext,
    ) -> KernelResult<()> {
        {
            let mut state = self.build_state.lock();
            match *state {
                BuildState::Done | BuildState::InProgress => return Ok(()),
                BuildState::NotStarted => *state = BuildState::InProgress,
            }
        }

        let handle = self.handle();
        let base_ctx = self.ctx.lock().clone();
        let hooks = self.hooks.lock().clone();
        let plan = builder.verify(&base_ctx, extra_ctx, &self.default_hooks, &hooks, &handle)?;
        *self.ctx.lock() = plan.resolved_ctx.clone();
        builder.execute(&mut self.facets.lock(), &plan, &handle)?;

        for child in self.children.lock().iter() {
            child.build(builder, &self.ctx.lock().clone())?;
        }

        *self.build_state.lock() = BuildState::Done;
        Ok(())
    }

    /// `Dispose()`: best-effort, reverse-install-order facet disposal
    /// (spec §4.5, §5 "Lifecycle ordering" — leaves before root at the
    /// tree level is the caller's responsibility via [`crate::system`]).
    pub fn dispose(&self) -> Vec<KernelError> {
        let mut errors = self.facets.lock().dispose_all();
        for child in self.children.lock().iter() {
            errors.extend(child.dispose());
        }
        *self.build_state.lock() = BuildState::NotStarted;
        errors
    }

    fn accepter(&self) -> Option<Arc<dyn Facet>> {
        let facets = self.facets.lock();
        facets
            .get(&kinds::processor())
            .filter(|f| f.as_accepter().is_some())
    }

    /// Delegates to the processor facet's `accept`. `ErrMissingFacet` if
    /// none is installed (spec §4.17).
    pub async fn accept(&self, msg: Message, opts: AcceptOptions) -> KernelResult<AcceptOutcome> {
        let facet = self
            .accepter()
            .ok_or_else(|| KernelError::MissingFacet(kinds::processor()))?;
        // SAFETY of this pattern: `as_accepter` returns a borrow tied to
        // `facet`'s lifetime; we re-fetch it to keep the Arc alive across
        // the await point instead of holding the facet-manager lock.
        AccepterRef(facet).accept(msg, opts).await
    }

    /// Current processor queue occupancy, `0` if no accepter-capable facet
    /// is installed (used for the no-scheduler/paused `remainingQueue`
    /// reports below, spec §4.10 step 4).
    fn queue_len(&self) -> usize {
        self.accepter()
            .map(|facet| AccepterRef(facet).queue_len())
            .unwrap_or(0)
    }

    pub async fn process(&self, time_slice: Duration) -> KernelResult<SchedulerRunResult> {
        if self.paused.load(Ordering::SeqCst) {
            return Ok(SchedulerRunResult {
                processed: 0,
                remaining_queue: self.queue_len(),
                paused: true,
            });
        }
        let scheduler = {
            let facets = self.facets.lock();
            facets.get(&kinds::scheduler())
        };
        match scheduler {
            Some(facet) => SchedulerRef(facet).process(time_slice).await,
            None => Ok(SchedulerRunResult {
                processed: 0,
                remaining_queue: self.queue_len(),
                paused: false,
            }),
        }
    }

    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
        if let Some(facet) = self.facets.lock().get(&kinds::scheduler()) {
            if let Some(scheduler) = facet.as_scheduler() {
                scheduler.pause();
            }
        }
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
        if let Some(facet) = self.facets.lock().get(&kinds::scheduler()) {
            if let Some(scheduler) = facet.as_scheduler() {
                scheduler.resume();
            }
        }
    }

    pub fn find(&self, kind: &FacetKind) -> Option<Arc<dyn Facet>> {
        self.facets.lock().get(kind)
    }

    pub fn register_route(
        &self,
        pattern: PathPattern,
        handler: Arc<dyn RouteHandler>,
    ) -> KernelResult<()> {
        if !self.facets.lock().has(&kinds::router()) {
            return Err(KernelError::MissingFacet(kinds::router()));
        }
        self.router.register(pattern, handler, 0, Default::default())
    }

    pub fn unregister_route(&self, pattern: &PathPattern) -> bool {
        self.router.unregister(pattern)
    }

    pub fn capabilities(&self) -> Vec<FacetKind> {
        self.facets.lock().installed_kinds()
    }

    pub fn path(&self, scheme: &str) -> Path {
        Path::new(scheme, vec![self.name.to_string()])
    }
}

struct AccepterRef(Arc<dyn Facet>);

impl AccepterRef {
    async fn accept(&self, msg: Message, opts: AcceptOptions) -> KernelResult<AcceptOutcome> {
        self.0
            .as_accepter()
            .expect("checked by caller")
            .accept(msg, opts)
            .await
    }

    fn queue_len(&self) -> usize {
        self.0.as_accepter().expect("checked by caller").queue_len()
    }
}

struct SchedulerRef(Arc<dyn Facet>);

impl SchedulerRef {
    async fn process(&self, time_slice: Duration) -> KernelResult<SchedulerRunResult> {
        self.0
            .as_scheduler()
            .expect("checked by caller")
            .process(time_slice)
            .await
    }
}
