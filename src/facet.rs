//! C5 — Facet Manager, plus the shared `Facet`/`Hook`/`BuildContext` types
//! that the rest of the kernel (contract registry, builder, processor,
//! scheduler) is built around.
//!
//! `spark-core` models its extensible units as object-safe traits
//! (`InboundHandler`, `OutboundHandler`, ...) implemented by concrete
//! handler types and stored behind `Arc<dyn Trait>`. Facets follow the same
//! shape: `Facet` is the minimal object-safe contract every installed unit
//! satisfies, and the richer capabilities a facet may offer (driving
//! message acceptance, participating in cooperative scheduling) are
//! exposed as additional small traits (`Accepter`, `SchedulerCapability`)
//! that `Facet::as_accepter`/`as_scheduler` return by reference when
//! present — the "small capability interfaces, explicit accessor, no
//! reflection" approach spec §9's design notes call for.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value as JsonValue;

use crate::error::{KernelError, KernelResult};
use crate::message::{HandlerResult, Message};

/// Identifies a facet's capability uniquely within a subsystem. Cheaply
/// cloneable (backed by `Arc<str>`) since it is used as a map key across
/// the builder, dependency graph cache, and contract registry.
#[derive(Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct FacetKind(Arc<str>);

impl FacetKind {
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for FacetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for FacetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for FacetKind {
    fn from(value: &str) -> Self {
        FacetKind::new(value.to_string())
    }
}

/// Well-known facet kinds installed by the default hook set (spec §4.9–4.11).
pub mod kinds {
    use super::FacetKind;

    pub fn queue() -> FacetKind {
        FacetKind::new("queue")
    }
    pub fn router() -> FacetKind {
        FacetKind::new("router")
    }
    pub fn listeners() -> FacetKind {
        FacetKind::new("listeners")
    }
    pub fn processor() -> FacetKind {
        FacetKind::new("processor")
    }
    pub fn scheduler() -> FacetKind {
        FacetKind::new("scheduler")
    }
    pub fn kernel_services() -> FacetKind {
        FacetKind::new("kernelServices")
    }
}

/// A single configuration value under a facet's slice of `ctx.config`
/// (spec §6 "Configuration surface"). Thin wrapper over `serde_json::Value`
/// so configuration can be authored as JSON/YAML the way `ob-poc` and
/// `knhk` load their runtime configuration, while giving the builder a
/// documented deep-merge operation (spec §4.7 step 1).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ConfigValue(pub JsonValue);

impl ConfigValue {
    /// Deep-merge `other` into `self`: JSON objects merge key-by-key
    /// recursively; any other value (including arrays) is replaced
    /// wholesale by `other`, last-write-wins.
    pub fn merge(&mut self, other: &ConfigValue) {
        merge_json(&mut self.0, &other.0);
    }
}

fn merge_json(base: &mut JsonValue, incoming: &JsonValue) {
    match (base, incoming) {
        (JsonValue::Object(base_map), JsonValue::Object(incoming_map)) => {
            for (k, v) in incoming_map {
                merge_json(base_map.entry(k.clone()).or_insert(JsonValue::Null), v);
            }
        }
        (base_slot, incoming_value) => {
            *base_slot = incoming_value.clone();
        }
    }
}

/// The merged context a subsystem build runs under (spec §3 "Subsystem" /
/// §4.7 step 1). Distinct from mutable runtime state: a `BuildContext` is
/// produced once per `Verify` call and handed unchanged to `Build`.
#[derive(Clone, Debug, Default)]
pub struct BuildContext {
    pub config: HashMap<String, ConfigValue>,
    pub debug: bool,
    /// Set once the root `MessageSystem` has bootstrapped the kernel
    /// principal; consulted by the builder's special rule (spec §4.7 step 6)
    /// to strip the `kernelServices` dependency once it is no longer needed.
    pub kernel_initialized: bool,
}

impl BuildContext {
    /// Shallow-merge `extra` into `self`, except for the `config` map which
    /// is deep-merged (spec §4.7 step 1).
    pub fn merged_with(&self, extra: &BuildContext) -> BuildContext {
        let mut config = self.config.clone();
        for (k, v) in &extra.config {
            config
                .entry(k.clone())
                .and_modify(|existing| existing.merge(v))
                .or_insert_with(|| v.clone());
        }
        BuildContext {
            config,
            debug: extra.debug || self.debug,
            kernel_initialized: extra.kernel_initialized || self.kernel_initialized,
        }
    }

    /// The debug flag resolution order from spec §6: per-facet override,
    /// falling back to `ctx.debug`, then `false`.
    pub fn debug_for(&self, facet_kind: &FacetKind) -> bool {
        self.facet_config(facet_kind)
            .and_then(|c| c.0.get("debug"))
            .and_then(|v| v.as_bool())
            .unwrap_or(self.debug)
    }

    pub fn facet_config(&self, facet_kind: &FacetKind) -> Option<&ConfigValue> {
        self.config.get(facet_kind.as_str())
    }
}

/// Read-only handle to a subsystem's already-installed facets, given to
/// hooks and to `Facet::init` so later-installed facets can discover
/// earlier ones in topological order (spec §4.5 step 1).
#[derive(Clone)]
pub struct SubsystemHandle {
    name: Arc<str>,
    facets: Arc<Mutex<FacetManager>>,
}

impl SubsystemHandle {
    pub(crate) fn new(name: Arc<str>, facets: Arc<Mutex<FacetManager>>) -> Self {
        Self { name, facets }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn find(&self, kind: &FacetKind) -> Option<Arc<dyn Facet>> {
        self.facets.lock().get(kind)
    }

    pub fn has(&self, kind: &FacetKind) -> bool {
        self.facets.lock().has(kind)
    }
}

/// Options threaded through [`Accepter::accept`]; currently carries nothing
/// beyond the message itself but exists as an extension point the way
/// `spark-core::pipeline::handler` methods take a `&dyn Context`.
#[derive(Clone, Debug, Default)]
pub struct AcceptOptions {
    pub bypass_queue: bool,
}

/// Outcome of handing a message to a subsystem's `Accepter` capability.
#[derive(Debug)]
pub enum AcceptOutcome {
    /// Handled synchronously (or immediately); carries the handler result.
    Processed(HandlerResult),
    /// Enqueued for later draining by the scheduler.
    Queued,
    /// Not enqueued because of the queue's overflow policy; carries the
    /// message that was dropped instead (which may be the message just
    /// submitted, under `drop-newest`).
    Dropped(Message),
}

/// Outcome of draining one message from the queue (spec §4.9 "ProcessMessage").
#[derive(Debug)]
pub struct ProcessOutcome {
    pub result: HandlerResult,
    pub matched_route: bool,
}

/// Capability offered by a subsystem's queue/processor facet: accepting
/// inbound messages and draining the queue (spec §4.9).
#[async_trait]
pub trait Accepter: Send + Sync {
    /// Whether this subsystem bypasses the queue entirely, routing every
    /// `accept` straight to `process_immediately` (spec §9 open question 4,
    /// resolved: a synchronous facet always wins over a queue if both are
    /// installed).
    fn is_synchronous(&self) -> bool {
        false
    }

    async fn accept(&self, msg: Message, opts: AcceptOptions) -> KernelResult<AcceptOutcome>;

    async fn process_message(&self, msg: Message) -> KernelResult<ProcessOutcome>;

    /// Drain at most one message from the queue; `None` if the queue is
    /// empty.
    async fn process_tick(&self) -> Option<KernelResult<ProcessOutcome>>;

    async fn process_immediately(&self, msg: Message) -> KernelResult<ProcessOutcome>;

    /// Current queue occupancy, for the scheduler's `remainingQueue`
    /// report (spec §4.10 step 4). `0` for accepters with no backing
    /// queue (e.g. a purely synchronous one).
    fn queue_len(&self) -> usize {
        0
    }
}

/// Outcome of a scheduler facet's time-sliced drain (spec §4.10).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerRunResult {
    pub processed: usize,
    pub remaining_queue: usize,
    pub paused: bool,
}

/// Capability offered by a subsystem's scheduler facet: cooperative,
/// time-sliced draining plus pause/resume (spec §4.10).
#[async_trait]
pub trait SchedulerCapability: Send + Sync {
    async fn process(&self, time_slice: Duration) -> KernelResult<SchedulerRunResult>;
    fn pause(&self);
    fn resume(&self);
    fn is_paused(&self) -> bool;
    /// Share of the global scheduler's slice this subsystem should receive
    /// under the `priority` strategy (spec §4.11).
    fn priority(&self) -> f64 {
        1.0
    }
}

/// A capability object installed into a subsystem, identified by a unique
/// `kind` (spec §3 "Facet", spec §9 design notes).
///
/// Object-safe: stored as `Arc<dyn Facet>` in [`FacetManager`]. Default
/// method bodies make the common case (a facet with no dependencies, no
/// contract, no lifecycle hooks) a one-line `impl`.
pub trait Facet: Send + Sync + 'static {
    fn kind(&self) -> FacetKind;

    fn contract_name(&self) -> Option<&'static str> {
        None
    }

    fn dependencies(&self) -> Vec<FacetKind> {
        Vec::new()
    }

    /// Whether this facet may replace an existing facet of the same kind
    /// (or be replaced by one) during `Verify` (spec §4.7 step 4).
    fn overwrite(&self) -> bool {
        false
    }

    /// Whether this facet should be exposed as a named accessor on the
    /// owning subsystem once installed (spec §4.5 step 1).
    fn attach(&self) -> bool {
        false
    }

    /// Method names this facet declares support for, consulted by
    /// [`crate::contract::ContractRegistry::enforce`].
    fn declared_methods(&self) -> &[&'static str] {
        &[]
    }

    /// Property names this facet declares support for.
    fn declared_properties(&self) -> &[&'static str] {
        &[]
    }

    fn property(&self, _name: &str) -> Option<JsonValue> {
        None
    }

    /// Called once during `Execute`, in topological order, with access to
    /// already-installed sibling facets (spec §4.5 step 1).
    fn init(&self, _ctx: &BuildContext, _subsystem: &SubsystemHandle) -> KernelResult<()> {
        Ok(())
    }

    /// Called during subsystem disposal or `AddMany` rollback, in reverse
    /// install order (spec §4.5 step 2, §5 "Lifecycle ordering").
    fn dispose(&self) -> KernelResult<()> {
        Ok(())
    }

    fn as_accepter(&self) -> Option<&dyn Accepter> {
        None
    }

    fn as_scheduler(&self) -> Option<&dyn SchedulerCapability> {
        None
    }

    fn as_any(&self) -> &dyn Any;
}

/// A factory that produces a [`Facet`] during `Verify` (spec §3 "Hook").
pub struct Hook {
    pub kind: FacetKind,
    pub contract_name: Option<&'static str>,
    pub required: Vec<FacetKind>,
    pub overwrite: bool,
    /// Free-form provenance string for diagnostics (spec §6 Hooks ABI
    /// `source`), e.g. the module or plugin that registered this hook.
    pub source: &'static str,
    factory: Arc<dyn Fn(&BuildContext, &SubsystemHandle) -> KernelResult<Arc<dyn Facet>> + Send + Sync>,
}

impl Hook {
    pub fn new(
        kind: FacetKind,
        source: &'static str,
        factory: impl Fn(&BuildContext, &SubsystemHandle) -> KernelResult<Arc<dyn Facet>>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        Self {
            kind,
            contract_name: None,
            required: Vec::new(),
            overwrite: false,
            source,
            factory: Arc::new(factory),
        }
    }

    pub fn with_contract(mut self, name: &'static str) -> Self {
        self.contract_name = Some(name);
        self
    }

    pub fn with_required(mut self, required: Vec<FacetKind>) -> Self {
        self.required = required;
        self
    }

    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    /// Invoke the hook's factory. The returned facet's `kind()` must equal
    /// `self.kind` — checked by the caller (spec §4.7 step 4).
    pub fn build(
        &self,
        ctx: &BuildContext,
        subsystem: &SubsystemHandle,
    ) -> KernelResult<Arc<dyn Facet>> {
        (self.factory)(ctx, subsystem)
    }
}

impl fmt::Debug for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hook")
            .field("kind", &self.kind)
            .field("required", &self.required)
            .field("overwrite", &self.overwrite)
            .field("source", &self.source)
            .finish()
    }
}

/// C5 — keyed set of installed facets per subsystem, with transactional
/// `add_many` (ordered init, reverse-order rollback on failure) and
/// best-effort `dispose_all` (spec §4.5).
///
/// Single-writer: callers serialize access with a `parking_lot::Mutex`
/// (held by [`crate::subsystem::Subsystem`]); `FacetManager` itself assumes
/// exclusive `&mut self` access for every mutating method, matching spec
/// §5's "enforced by internal lock" requirement at the call site.
#[derive(Default)]
pub struct FacetManager {
    order: Vec<FacetKind>,
    facets: HashMap<FacetKind, Arc<dyn Facet>>,
}

impl FacetManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has(&self, kind: &FacetKind) -> bool {
        self.facets.contains_key(kind)
    }

    pub fn get(&self, kind: &FacetKind) -> Option<Arc<dyn Facet>> {
        self.facets.get(kind).cloned()
    }

    pub fn installed_kinds(&self) -> Vec<FacetKind> {
        self.order.clone()
    }

    /// Install a single facet outside of a transaction (used by tests and
    /// by `Subsystem::dispose`/`build` bookkeeping that does not need
    /// init/attach semantics).
    pub fn add(&mut self, kind: FacetKind, facet: Arc<dyn Facet>) {
        if !self.facets.contains_key(&kind) {
            self.order.push(kind.clone());
        }
        self.facets.insert(kind, facet);
    }

    /// Transactionally install `ordered_kinds`, each built via
    /// `factories[kind]`, calling `init` (if `run_init`) in order and
    /// rolling back in reverse on the first failure (spec §4.5 `AddMany`).
    ///
    /// On failure, the facet map is left exactly as it was before this call
    /// (spec §8 item 4) — every successfully-inited facet up to the failure
    /// point is disposed and removed before the error is returned.
    pub fn add_many(
        &mut self,
        ordered_kinds: &[FacetKind],
        facets_by_kind: &HashMap<FacetKind, Arc<dyn Facet>>,
        ctx: &BuildContext,
        subsystem: &SubsystemHandle,
        run_init: bool,
    ) -> KernelResult<()> {
        let mut installed: Vec<FacetKind> = Vec::with_capacity(ordered_kinds.len());
        for kind in ordered_kinds {
            let facet = match facets_by_kind.get(kind) {
                Some(f) => f.clone(),
                None => return Err(KernelError::MissingDep(kind.clone())),
            };
            if run_init {
                if let Err(err) = facet.init(ctx, subsystem) {
                    tracing::warn!(facet_kind = %kind, error = %err, "facet init failed, rolling back");
                    for done in installed.iter().rev() {
                        if let Some(f) = self.facets.get(done) {
                            let _ = f.dispose();
                        }
                        self.facets.remove(done);
                        self.order.retain(|k| k != done);
                    }
                    return Err(err);
                }
            }
            self.order.push(kind.clone());
            self.facets.insert(kind.clone(), facet);
            installed.push(kind.clone());
        }
        Ok(())
    }

    /// Dispose every installed facet in reverse install order, collecting
    /// (rather than short-circuiting on) every error (spec §4.5, §7
    /// "Disposal is best-effort").
    pub fn dispose_all(&mut self) -> Vec<KernelError> {
        let mut errors = Vec::new();
        for kind in self.order.clone().into_iter().rev() {
            if let Some(facet) = self.facets.remove(&kind) {
                if let Err(err) = facet.dispose() {
                    errors.push(err);
                }
            }
        }
        self.order.clear();
        errors
    }
}
