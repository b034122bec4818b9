//! Depth-limited cycle search over the import graph

use super::DependencyGraph;
use crate::models::CircularDependency;
use petgraph::algo::tarjan_scc;
use petgraph::graph::NodeIndex;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::PathBuf;
use tracing::debug;

/// Cycles found plus the start files whose search was cut off
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleSearch {
    pub cycles: Vec<CircularDependency>,
    pub unresolved: Vec<PathBuf>,
}

/// Rotate a cycle so it starts at its smallest path
pub fn normalize_cycle(cycle: &[PathBuf]) -> Vec<PathBuf> {
    if cycle.is_empty() {
        return vec![];
    }
    let min_idx = cycle
        .iter()
        .enumerate()
        .min_by_key(|(_, v)| *v)
        .map(|(i, _)| i)
        .unwrap_or(0);

    let mut normalized = Vec::with_capacity(cycle.len());
    normalized.extend_from_slice(&cycle[min_idx..]);
    normalized.extend_from_slice(&cycle[..min_idx]);
    normalized
}

/// DFS steps allowed per start file before its search is abandoned
pub const VISIT_BUDGET: usize = 20_000;

struct Search<'g> {
    graph: &'g DependencyGraph,
    /// Position of each node in sorted path order
    rank: &'g HashMap<NodeIndex, usize>,
    /// Strongly connected component of each node
    component: &'g HashMap<NodeIndex, usize>,
    start_rank: usize,
    start_component: usize,
    depth: usize,
    visits: usize,
    stack: Vec<NodeIndex>,
    on_stack: HashSet<NodeIndex>,
    found: BTreeSet<Vec<PathBuf>>,
    truncated: bool,
    exhausted: bool,
}

impl Search<'_> {
    /// Neighbors in the start's component that sort at or after the start.
    /// Every cycle is found from its smallest file, so the rest can be skipped.
    fn eligible_neighbors(&self, node: NodeIndex) -> Vec<NodeIndex> {
        let g = self.graph.inner();
        let mut out: Vec<NodeIndex> = g
            .neighbors(node)
            .filter(|n| {
                self.component.get(n) == Some(&self.start_component)
                    && self.rank.get(n).is_some_and(|r| *r >= self.start_rank)
            })
            .collect();
        out.sort_by_key(|n| self.rank.get(n).copied().unwrap_or(usize::MAX));
        out
    }

    fn visit(&mut self, node: NodeIndex) {
        if self.visits >= VISIT_BUDGET {
            self.exhausted = true;
            return;
        }
        self.visits += 1;
        self.stack.push(node);
        self.on_stack.insert(node);

        for next in self.eligible_neighbors(node) {
            if self.exhausted {
                break;
            }
            if self.on_stack.contains(&next) {
                if let Some(pos) = self.stack.iter().position(|n| *n == next) {
                    let g = self.graph.inner();
                    let files: Vec<PathBuf> = self.stack[pos..].iter().map(|n| g[*n].clone()).collect();
                    if files.len() >= 2 {
                        self.found.insert(normalize_cycle(&files));
                    }
                }
            } else if self.stack.len() >= self.depth {
                self.truncated = true;
            } else {
                self.visit(next);
            }
        }

        self.on_stack.remove(&node);
        self.stack.pop();
    }
}

/// Search cycles inside strongly connected components.
///
/// Files outside a non-trivial component cannot be on a cycle and are never
/// searched. From every remaining file, in sorted order, an iteratively
/// deepening DFS runs up to `max_depth`, so short cycles are always found
/// before long ones. A neighbor already on the path closes a cycle made of
/// the path slice from that neighbor onward. Results are rotated,
/// deduplicated and sorted, so repeated runs return the same cycles.
///
/// A start lands in `unresolved` when its search hit the depth limit or
/// used up [`VISIT_BUDGET`].
pub fn find_cycles(graph: &DependencyGraph, max_depth: usize) -> CycleSearch {
    let g = graph.inner();
    let mut starts: Vec<NodeIndex> = g.node_indices().collect();
    starts.sort_by(|a, b| g[*a].cmp(&g[*b]));
    let rank: HashMap<NodeIndex, usize> = starts.iter().enumerate().map(|(i, n)| (*n, i)).collect();

    let mut component = HashMap::new();
    for (id, scc) in tarjan_scc(g).into_iter().enumerate() {
        if scc.len() > 1 {
            component.extend(scc.into_iter().map(|n| (n, id)));
        }
    }

    let mut found = BTreeSet::new();
    let mut unresolved = Vec::new();
    let max_depth = max_depth.max(1);

    for start in starts {
        let Some(&start_component) = component.get(&start) else {
            continue;
        };
        let mut search = Search {
            graph,
            rank: &rank,
            component: &component,
            start_rank: rank[&start],
            start_component,
            depth: 1,
            visits: 0,
            stack: Vec::new(),
            on_stack: HashSet::new(),
            found: BTreeSet::new(),
            truncated: false,
            exhausted: false,
        };
        for depth in 2.min(max_depth)..=max_depth {
            search.depth = depth;
            search.truncated = false;
            search.visit(start);
            if search.exhausted || !search.truncated {
                break;
            }
        }
        if search.exhausted {
            debug!("Cycle search from {} stopped after {} steps", g[start].display(), search.visits);
        }
        if search.truncated || search.exhausted {
            unresolved.push(g[start].clone());
        }
        found.extend(search.found);
    }

    CycleSearch {
        cycles: found.into_iter().map(CircularDependency::new).collect(),
        unresolved,
    }
}
