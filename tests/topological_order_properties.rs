//! Property: for any facet dependency graph with no cycle, `Verify`'s
//! topological order places every dependency strictly before its
//! dependent; for any graph that does contain a cycle, `Verify` rejects it
//! with `KernelError::Cycle` instead of returning a bogus order.

use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use kernel_core::{
    BuildContext, ContractRegistry, Facet, FacetKind, Hook, KernelError, RouteRegistry, Subsystem,
    SubsystemBuilder,
};
use proptest::prelude::*;

struct StubFacet(FacetKind, Vec<FacetKind>);

impl Facet for StubFacet {
    fn kind(&self) -> FacetKind {
        self.0.clone()
    }
    fn dependencies(&self) -> Vec<FacetKind> {
        self.1.clone()
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
}

const NODE_COUNT: usize = 5;

fn node_name(i: usize) -> String {
    format!("k{i}")
}

/// Detect a cycle in the adjacency matrix via plain DFS, independent of
/// the kernel's own topological sort, so the test has an oracle to check
/// against.
fn has_cycle(edges: &[[bool; NODE_COUNT]; NODE_COUNT]) -> bool {
    let mut state = vec![0u8; NODE_COUNT]; // 0 = unvisited, 1 = in-progress, 2 = done
    fn visit(
        node: usize,
        edges: &[[bool; NODE_COUNT]; NODE_COUNT],
        state: &mut [u8],
    ) -> bool {
        state[node] = 1;
        for next in 0..NODE_COUNT {
            if edges[node][next] {
                match state[next] {
                    1 => return true,
                    0 if visit(next, edges, state) => return true,
                    _ => {}
                }
            }
        }
        state[node] = 2;
        false
    }
    (0..NODE_COUNT).any(|n| state[n] == 0 && visit(n, edges, &mut state))
}

fn build_plan(
    edges: &[[bool; NODE_COUNT]; NODE_COUNT],
) -> Result<Vec<FacetKind>, KernelError> {
    let router = Arc::new(RouteRegistry::new());
    let subsystem = Arc::new(Subsystem::new("props", router));
    let handle = subsystem.handle();

    let hooks: Vec<Hook> = (0..NODE_COUNT)
        .map(|i| {
            let kind = FacetKind::new(node_name(i));
            let deps: Vec<FacetKind> = (0..NODE_COUNT)
                .filter(|&j| edges[i][j])
                .map(|j| FacetKind::new(node_name(j)))
                .collect();
            Hook::new(kind.clone(), "prop-test", move |_ctx, _sub| {
                Ok(Arc::new(StubFacet(kind.clone(), deps.clone())) as Arc<dyn Facet>)
            })
        })
        .collect();

    let builder = SubsystemBuilder::new(ContractRegistry::new());
    builder
        .verify(&BuildContext::default(), &BuildContext::default(), &[], &hooks, &handle)
        .map(|plan| plan.ordered_kinds)
}

fn edge_matrix() -> impl Strategy<Value = [[bool; NODE_COUNT]; NODE_COUNT]> {
    prop::collection::vec(any::<bool>(), NODE_COUNT * NODE_COUNT).prop_map(|flat| {
        let mut m = [[false; NODE_COUNT]; NODE_COUNT];
        for i in 0..NODE_COUNT {
            for j in 0..NODE_COUNT {
                // no self-dependency; diagonal entries are always false
                if i != j {
                    m[i][j] = flat[i * NODE_COUNT + j];
                }
            }
        }
        m
    })
}

proptest! {
    #[test]
    fn acyclic_graphs_sort_every_dependency_before_its_dependent(edges in edge_matrix()) {
        prop_assume!(!has_cycle(&edges));
        let order = build_plan(&edges).expect("an acyclic graph must verify");

        let position: HashMap<&str, usize> = order
            .iter()
            .enumerate()
            .map(|(idx, kind)| (kind.as_str(), idx))
            .collect();

        let seen: HashSet<&str> = position.keys().copied().collect();
        prop_assert_eq!(seen.len(), NODE_COUNT, "every node must appear exactly once");

        for i in 0..NODE_COUNT {
            for j in 0..NODE_COUNT {
                if edges[i][j] {
                    let dependent = position[node_name(i).as_str()];
                    let dependency = position[node_name(j).as_str()];
                    prop_assert!(
                        dependency < dependent,
                        "dependency {} must precede dependent {}",
                        node_name(j),
                        node_name(i)
                    );
                }
            }
        }
    }

    #[test]
    fn cyclic_graphs_are_rejected_instead_of_silently_ordered(edges in edge_matrix()) {
        prop_assume!(has_cycle(&edges));
        let result = build_plan(&edges);
        prop_assert!(matches!(result, Err(KernelError::Cycle(_))));
    }
}
