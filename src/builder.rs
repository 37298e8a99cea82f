//! C7 — Subsystem Builder.
//!
//! Two-phase `Verify`/`Execute` builder: `Verify` is pure (it may run
//! repeatedly against speculative contexts without side effects) and
//! produces a [`Plan`]; `Execute` consumes a `Plan` and installs facets
//! transactionally via [`crate::facet::FacetManager::add_many`]. Grounded in
//! `spark-core::pipeline`'s build-then-install staging, generalized to
//! spec §4.7's ten-step `Verify` and six-step `Execute`.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use crate::contract::ContractRegistry;
use crate::depgraph::{cache_key, CachedPlan, DependencyGraphCache};
use crate::error::{KernelError, KernelResult};
use crate::facet::{BuildContext, Facet, FacetKind, FacetManager, Hook, SubsystemHandle, kinds};

/// The frozen outcome of [`SubsystemBuilder::verify`]: a resolved context,
/// a topological install order, and the concrete facet for each kind
/// (spec §4.7 step 10).
pub struct Plan {
    pub resolved_ctx: BuildContext,
    pub ordered_kinds: Vec<FacetKind>,
    pub facets_by_kind: HashMap<FacetKind, Arc<dyn Facet>>,
}

/// C7 — verifies and executes a subsystem's hook set against a facet
/// manager. Holds no subsystem-specific state itself; one builder instance
/// is shared process-wide (mirroring [`ContractRegistry`]'s shape) with the
/// dependency graph cache as its only mutable internal state.
pub struct SubsystemBuilder {
    contracts: ContractRegistry,
    depgraph_cache: DependencyGraphCache,
    last_plan: parking_lot::Mutex<Option<(u64, Arc<Plan>)>>,
}

impl SubsystemBuilder {
    pub fn new(contracts: ContractRegistry) -> Self {
        Self {
            contracts,
            depgraph_cache: DependencyGraphCache::default(),
            last_plan: parking_lot::Mutex::new(None),
        }
    }

    /// Drop the cached last plan (spec §4.7 "Plan caching", `Invalidate`).
    pub fn invalidate(&self) {
        *self.last_plan.lock() = None;
    }

    fn ctx_hash(ctx: &BuildContext) -> u64 {
        use std::hash::{Hash, Hasher};
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        ctx.debug.hash(&mut hasher);
        ctx.kernel_initialized.hash(&mut hasher);
        let mut keys: Vec<&String> = ctx.config.keys().collect();
        keys.sort();
        for k in keys {
            k.hash(&mut hasher);
            ctx.config[k].0.to_string().hash(&mut hasher);
        }
        hasher.finish()
    }

    /// `Verify` (spec §4.7 steps 1–10): pure, side-effect-free except for
    /// reading/writing the dependency-graph cache.
    pub fn verify(
        &self,
        base_ctx: &BuildContext,
        extra_ctx: &BuildContext,
        default_hooks: &[Hook],
        hooks: &[Hook],
        subsystem: &SubsystemHandle,
    ) -> KernelResult<Plan> {
        // Step 1: merge contexts, deep-merging `config`.
        let mut ctx = base_ctx.merged_with(extra_ctx);

        // Step 2: collect hooks, default hooks first, order preserved.
        let all_hooks: Vec<&Hook> = default_hooks.iter().chain(hooks.iter()).collect();

        // Step 3: duplicate-kind detection; a duplicate is allowed only if
        // either hook permits overwrite.
        let mut by_kind: HashMap<FacetKind, &Hook> = HashMap::new();
        for hook in &all_hooks {
            if hook.kind.as_str().is_empty() {
                return Err(KernelError::Path("hook kind must not be empty".to_string()));
            }
            match by_kind.get(&hook.kind) {
                Some(existing) if !existing.overwrite && !hook.overwrite => {
                    return Err(KernelError::Duplicate(hook.kind.to_string()));
                }
                _ => {
                    by_kind.insert(hook.kind.clone(), hook);
                }
            }
        }

        // Step 4: build facets; the hook-level overwrite rule already
        // resolved which hook wins for each kind, so this is a 1:1 build.
        let mut facets_by_kind: HashMap<FacetKind, Arc<dyn Facet>> = HashMap::new();
        let mut required: HashMap<FacetKind, Vec<FacetKind>> = HashMap::new();
        for (kind, hook) in &by_kind {
            let facet = hook.build(&ctx, subsystem)?;
            if &facet.kind() != kind {
                return Err(KernelError::Path(format!(
                    "hook `{kind}` produced a facet of kind `{}`",
                    facet.kind()
                )));
            }
            let overwrite_ok = hook.overwrite || facet.overwrite();
            let _ = overwrite_ok; // resolved at step 3; kept for symmetry with spec wording
            let mut deps = hook.required.clone();
            deps.extend(facet.dependencies());
            required.insert(kind.clone(), deps);
            facets_by_kind.insert(kind.clone(), facet);
        }

        // Step 6: strip `kernelServices` once the kernel is initialized.
        if ctx.kernel_initialized {
            let kernel_services = kinds::kernel_services();
            facets_by_kind.remove(&kernel_services);
            required.remove(&kernel_services);
            for deps in required.values_mut() {
                deps.retain(|d| d != &kernel_services);
            }
        }

        // Step 5: every dependency must resolve to an installed kind.
        for (kind, deps) in &required {
            for dep in deps {
                if !facets_by_kind.contains_key(dep) {
                    return Err(KernelError::MissingDep(dep.clone()));
                }
            }
            let _ = kind;
        }

        // Step 7: contract enforcement.
        for facet in facets_by_kind.values() {
            if let Some(contract_name) = facet.contract_name() {
                self.contracts.enforce(contract_name, facet.as_ref())?;
            }
        }

        // Step 8/9: dependency-graph-cache-backed topological sort.
        let mut kinds_sorted: Vec<FacetKind> = facets_by_kind.keys().cloned().collect();
        kinds_sorted.sort();
        let key = cache_key(&kinds_sorted);
        let ordered_kinds = match self.depgraph_cache.get(&key) {
            Some(CachedPlan::Order(order)) => order,
            Some(CachedPlan::Cycle(cycle)) => return Err(KernelError::Cycle(cycle)),
            None => match topological_sort(&kinds_sorted, &required) {
                Ok(order) => {
                    self.depgraph_cache
                        .set(key, CachedPlan::Order(order.clone()));
                    order
                }
                Err(cycle) => {
                    self.depgraph_cache
                        .set(key, CachedPlan::Cycle(cycle.clone()));
                    return Err(KernelError::Cycle(cycle));
                }
            },
        };

        ctx.kernel_initialized = ctx.kernel_initialized || base_ctx.kernel_initialized;

        Ok(Plan {
            resolved_ctx: ctx,
            ordered_kinds,
            facets_by_kind,
        })
    }

    /// `Execute` (spec §4.7 steps 1–4 of Execute; recursive child build and
    /// plan-cache bookkeeping are the caller's responsibility —
    /// [`crate::subsystem::Subsystem::build`] drives both).
    pub fn execute(
        &self,
        manager: &mut FacetManager,
        plan: &Plan,
        subsystem: &SubsystemHandle,
    ) -> KernelResult<()> {
        let already_installed: HashSet<FacetKind> = manager.installed_kinds().into_iter().collect();
        let to_add: Vec<FacetKind> = plan
            .ordered_kinds
            .iter()
            .filter(|k| !already_installed.contains(k))
            .cloned()
            .collect();
        manager.add_many(&to_add, &plan.facets_by_kind, &plan.resolved_ctx, subsystem, true)
    }

    /// Cache the plan for `ctx`'s hash and return it, or reuse the
    /// previously cached plan if the merged ctx hashes identically (spec
    /// §4.7 "Plan caching").
    pub fn cached_or_verify(
        &self,
        base_ctx: &BuildContext,
        extra_ctx: &BuildContext,
        default_hooks: &[Hook],
        hooks: &[Hook],
        subsystem: &SubsystemHandle,
    ) -> KernelResult<Arc<Plan>> {
        let merged = base_ctx.merged_with(extra_ctx);
        let hash = Self::ctx_hash(&merged);
        if let Some((cached_hash, plan)) = self.last_plan.lock().as_ref() {
            if *cached_hash == hash {
                return Ok(plan.clone());
            }
        }
        let plan = Arc::new(self.verify(base_ctx, extra_ctx, default_hooks, hooks, subsystem)?);
        *self.last_plan.lock() = Some((hash, plan.clone()));
        Ok(plan)
    }
}

/// Kahn's algorithm over `kinds`/`required`, tie-breaking ready nodes by
/// lexicographic kind order (spec §4.7 step 9). Returns the cycle
/// participants on failure.
fn topological_sort(
    kinds: &[FacetKind],
    required: &HashMap<FacetKind, Vec<FacetKind>>,
) -> Result<Vec<FacetKind>, Vec<FacetKind>> {
    let empty = Vec::new();
    let mut in_degree: HashMap<FacetKind, usize> = HashMap::new();
    let mut dependents: HashMap<FacetKind, Vec<FacetKind>> = HashMap::new();
    for kind in kinds {
        in_degree.entry(kind.clone()).or_insert(0);
        for dep in required.get(kind).unwrap_or(&empty) {
            *in_degree.entry(kind.clone()).or_insert(0) += 1;
            dependents.entry(dep.clone()).or_default().push(kind.clone());
        }
    }

    let mut ready: VecDeque<FacetKind> = kinds
        .iter()
        .filter(|k| in_degree.get(*k).copied().unwrap_or(0) == 0)
        .cloned()
        .collect();
    let mut ready_sorted: Vec<FacetKind> = ready.drain(..).collect();
    ready_sorted.sort();
    let mut ready: VecDeque<FacetKind> = ready_sorted.into();

    let mut order = Vec::with_capacity(kinds.len());
    while let Some(node) = ready.pop_front() {
        order.push(node.clone());
        if let Some(children) = dependents.get(&node) {
            let mut newly_ready = Vec::new();
            for child in children {
                let degree = in_degree.get_mut(child).unwrap();
                *degree -= 1;
                if *degree == 0 {
                    newly_ready.push(child.clone());
                }
            }
            newly_ready.sort();
            for child in newly_ready {
                // keep the queue sorted by re-sorting after insertion
                let pos = ready.iter().position(|k| k > &child).unwrap_or(ready.len());
                ready.insert(pos, child);
            }
        }
    }

    if order.len() == kinds.len() {
        Ok(order)
    } else {
        let mut cycle: Vec<FacetKind> = kinds
            .iter()
            .filter(|k| !order.contains(k))
            .cloned()
            .collect();
        cycle.sort();
        Err(cycle)
    }
}
