// Class-level dependency graph built from raw edges.
//
// `A → B` means "A needs B". Forward reachability from a test entry point gives
// the test's dependency closure; reverse reachability from a changed class gives
// every class it impacts.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};

use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use rayon::prelude::*;
use tracing::debug;

use crate::edges::format_edge;
use crate::{ClassName, DependencyEdge};

/// Entry point → every class transitively reachable from it (itself included).
pub type Closures = BTreeMap<ClassName, BTreeSet<ClassName>>;

/// Directed graph over class names, rebuilt every run.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    graph: DiGraph<ClassName, ()>,
    index: HashMap<ClassName, NodeIndex>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Union project edges with cached third-party edges. Duplicate edges
    /// collapse; every endpoint becomes a node even without outgoing edges.
    pub fn build(
        project_edges: impl IntoIterator<Item = DependencyEdge>,
        cached_edges: impl IntoIterator<Item = DependencyEdge>,
    ) -> Self {
        let edges: HashSet<DependencyEdge> = project_edges.into_iter().chain(cached_edges).collect();
        let mut graph = Self::new();
        for edge in &edges {
            graph.add_edge(edge);
        }
        debug!(
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            "Built dependency graph"
        );
        graph
    }

    pub fn from_edges(edges: impl IntoIterator<Item = DependencyEdge>) -> Self {
        Self::build(edges, std::iter::empty())
    }

    /// Insert a node if it is not present yet and return its index.
    pub fn ensure_node(&mut self, name: &ClassName) -> NodeIndex {
        if let Some(&idx) = self.index.get(name) {
            return idx;
        }
        let idx = self.graph.add_node(name.clone());
        self.index.insert(name.clone(), idx);
        idx
    }

    fn add_edge(&mut self, edge: &DependencyEdge) {
        let from = self.ensure_node(&edge.from);
        let to = self.ensure_node(&edge.to);
        self.graph.update_edge(from, to, ());
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn contains(&self, name: &ClassName) -> bool {
        self.index.contains_key(name)
    }

    pub fn classes(&self) -> impl Iterator<Item = &ClassName> {
        self.graph.node_weights()
    }

    /// Direct dependencies of a class, sorted.
    pub fn dependencies_of(&self, name: &ClassName) -> Vec<ClassName> {
        let Some(&idx) = self.index.get(name) else {
            return Vec::new();
        };
        let mut deps: Vec<ClassName> = self
            .graph
            .neighbors_directed(idx, Direction::Outgoing)
            .map(|n| self.graph[n].clone())
            .collect();
        deps.sort();
        deps
    }

    /// Forward closure of one entry point. An entry point unknown to the graph
    /// (no edges at all) has the singleton closure `{entry}`.
    pub fn closure(&self, entry: &ClassName) -> BTreeSet<ClassName> {
        let Some(&start) = self.index.get(entry) else {
            return BTreeSet::from([entry.clone()]);
        };
        self.reach(start, Direction::Outgoing)
            .into_iter()
            .map(|idx| self.graph[idx].clone())
            .collect()
    }

    /// Closures for many entry points. Traversals are independent and run in
    /// parallel; the result map is ordered, so output is deterministic.
    pub fn closures(&self, entries: &[ClassName]) -> Closures {
        entries
            .par_iter()
            .map(|entry| (entry.clone(), self.closure(entry)))
            .collect()
    }

    /// All known classes (graph nodes plus `universe`) not reached by any
    /// closure. The wildcard node is never part of the result.
    pub fn unreached<'a>(
        &self,
        closures: &Closures,
        universe: impl IntoIterator<Item = &'a ClassName>,
    ) -> BTreeSet<ClassName> {
        let reached: HashSet<&ClassName> = closures.values().flatten().collect();
        let mut unreached = BTreeSet::new();
        for class in self.classes() {
            if !class.is_wildcard() && !reached.contains(class) {
                unreached.insert(class.clone());
            }
        }
        for class in universe {
            if !class.is_wildcard() && !reached.contains(class) {
                unreached.insert(class.clone());
            }
        }
        unreached
    }

    /// Every class that transitively depends on at least one of `targets`.
    /// Targets themselves are only included when another target reaches them.
    pub fn dependents_of(&self, targets: &BTreeSet<ClassName>) -> BTreeSet<ClassName> {
        let mut visited: HashSet<NodeIndex> = HashSet::new();
        let mut queue: VecDeque<NodeIndex> = VecDeque::new();
        for target in targets {
            if let Some(&idx) = self.index.get(target) {
                queue.push_back(idx);
            }
        }

        let mut dependents = BTreeSet::new();
        while let Some(idx) = queue.pop_front() {
            for parent in self.graph.neighbors_directed(idx, Direction::Incoming) {
                if visited.insert(parent) {
                    dependents.insert(self.graph[parent].clone());
                    queue.push_back(parent);
                }
            }
        }
        dependents
    }

    /// BFS from `start` following `direction`, including `start`.
    fn reach(&self, start: NodeIndex, direction: Direction) -> HashSet<NodeIndex> {
        let mut visited = HashSet::from([start]);
        let mut queue = VecDeque::from([start]);
        while let Some(idx) = queue.pop_front() {
            for next in self.graph.neighbors_directed(idx, direction) {
                if visited.insert(next) {
                    queue.push_back(next);
                }
            }
        }
        visited
    }

    /// Sorted `from -> to` lines; the optional graph debug artifact.
    pub fn dump(&self) -> String {
        let mut lines: Vec<String> = self
            .graph
            .edge_indices()
            .filter_map(|e| self.graph.edge_endpoints(e))
            .map(|(a, b)| format_edge(&DependencyEdge::new(self.graph[a].clone(), self.graph[b].clone())))
            .collect();
        lines.sort();
        let mut out = lines.join("\n");
        if !out.is_empty() {
            out.push('\n');
        }
        out
    }
}

/// Whether a closure passes through the wildcard node.
pub fn reaches_wildcard(closure: &BTreeSet<ClassName>) -> bool {
    closure.iter().any(ClassName::is_wildcard)
}

// ── Tests ─────────────────────────────────────────────────────────────
