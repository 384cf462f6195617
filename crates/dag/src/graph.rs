//! A `petgraph`-backed structural view of a [`Definition`], used for cycle
//! detection and reachability queries. Topological ordering for
//! [`crate::ParseResult::execution_order`] is computed separately by
//! [`crate::validate::validate`] via a deterministic Kahn's-algorithm pass —
//! `petgraph::algo::toposort` does not guarantee a specific tie-break order
//! among independent nodes, which the spec requires.

use std::collections::{BTreeSet, HashMap, VecDeque};

use n3n_core::NodeId;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;

use crate::model::Definition;

/// Structural graph of a [`Definition`]: one petgraph node per flow node id,
/// one petgraph edge per flow edge.
#[derive(Debug)]
pub struct DependencyGraph {
    graph: DiGraph<NodeId, ()>,
    index_of: HashMap<NodeId, NodeIndex>,
}

impl DependencyGraph {
    /// Build a graph from a definition's nodes and edges. Edges whose
    /// endpoints don't resolve to a known node id are skipped — the caller
    /// is expected to have already reported those as dangling-edge errors.
    #[must_use]
    pub fn build(definition: &Definition) -> Self {
        let mut graph = DiGraph::new();
        let mut index_of = HashMap::with_capacity(definition.nodes.len());
        for node in &definition.nodes {
            let idx = graph.add_node(node.id);
            index_of.insert(node.id, idx);
        }
        for edge in &definition.edges {
            if let (Some(&source), Some(&target)) =
                (index_of.get(&edge.source), index_of.get(&edge.target))
            {
                graph.add_edge(source, target, ());
            }
        }
        Self { graph, index_of }
    }

    #[must_use]
    pub fn contains(&self, id: NodeId) -> bool {
        self.index_of.contains_key(&id)
    }

    #[must_use]
    pub fn is_cyclic(&self) -> bool {
        petgraph::algo::is_cyclic_directed(&self.graph)
    }

    #[must_use]
    pub fn predecessors(&self, id: NodeId) -> Vec<NodeId> {
        let Some(&idx) = self.index_of.get(&id) else {
            return Vec::new();
        };
        self.graph
            .edges_directed(idx, petgraph::Direction::Incoming)
            .map(|e| self.graph[e.source()])
            .collect()
    }

    #[must_use]
    pub fn successors(&self, id: NodeId) -> Vec<NodeId> {
        let Some(&idx) = self.index_of.get(&id) else {
            return Vec::new();
        };
        self.graph
            .edges_directed(idx, petgraph::Direction::Outgoing)
            .map(|e| self.graph[e.target()])
            .collect()
    }

    #[must_use]
    pub fn in_degree(&self, id: NodeId) -> usize {
        self.predecessors(id).len()
    }

    /// Whether `target` is reachable from `source` by following edges
    /// forward.
    #[must_use]
    pub fn is_reachable(&self, source: NodeId, target: NodeId) -> bool {
        let (Some(&from), Some(&to)) = (self.index_of.get(&source), self.index_of.get(&target))
        else {
            return false;
        };
        petgraph::algo::has_path_connecting(&self.graph, from, to, None)
    }

    #[must_use]
    pub fn node_ids(&self) -> Vec<NodeId> {
        self.graph.node_weights().copied().collect()
    }

    /// Group nodes into waves that can run in parallel: a node's wave is one
    /// past the deepest wave of its predecessors. Entry nodes (no
    /// predecessors) form wave 0. Assumes the graph is acyclic; callers must
    /// reject cycles before asking for a plan. Nodes within a wave are
    /// ordered by ascending id for determinism.
    #[must_use]
    pub fn parallel_groups(&self) -> Vec<Vec<NodeId>> {
        let mut in_degree: HashMap<NodeId, usize> = self
            .node_ids()
            .into_iter()
            .map(|id| (id, self.in_degree(id)))
            .collect();
        let mut level: HashMap<NodeId, usize> = HashMap::with_capacity(in_degree.len());
        let mut ready: BTreeSet<NodeId> = in_degree
            .iter()
            .filter(|&(_, &deg)| deg == 0)
            .map(|(&id, _)| id)
            .collect();
        for &id in &ready {
            level.insert(id, 0);
        }

        let mut queue: VecDeque<NodeId> = ready.iter().copied().collect();
        ready.clear();
        while let Some(id) = queue.pop_front() {
            let current_level = level[&id];
            for successor in self.successors(id) {
                let degree = in_degree.get_mut(&successor).expect("successor tracked");
                *degree -= 1;
                let candidate = current_level + 1;
                let entry = level.entry(successor).or_insert(candidate);
                if candidate > *entry {
                    *entry = candidate;
                }
                if *degree == 0 {
                    queue.push_back(successor);
                }
            }
        }

        let mut by_level: HashMap<usize, BTreeSet<NodeId>> = HashMap::new();
        for (id, lvl) in level {
            by_level.entry(lvl).or_default().insert(id);
        }
        let max_level = by_level.keys().copied().max();
        match max_level {
            Some(max_level) => (0..=max_level)
                .map(|lvl| by_level.get(&lvl).into_iter().flatten().copied().collect())
                .collect(),
            None => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Edge, Node, NodeData, Position};
    use n3n_core::EdgeId;

    fn node(id: NodeId, type_name: &str) -> Node {
        Node {
            id,
            r#type: type_name.to_string(),
            data: NodeData {
                label: type_name.to_string(),
                config: serde_json::json!({}),
                credential_id: None,
                node_type: None,
            },
            position: Position { x: 0.0, y: 0.0 },
        }
    }

    fn edge(source: NodeId, target: NodeId) -> Edge {
        Edge {
            id: EdgeId::v4(),
            source,
            target,
            source_handle: None,
            target_handle: None,
        }
    }

    #[test]
    fn detects_no_cycle_in_linear_chain() {
        let a = NodeId::v4();
        let b = NodeId::v4();
        let definition = Definition {
            nodes: vec![node(a, "trigger"), node(b, "action")],
            edges: vec![edge(a, b)],
            viewport: None,
        };
        let graph = DependencyGraph::build(&definition);
        assert!(!graph.is_cyclic());
        assert_eq!(graph.successors(a), vec![b]);
        assert_eq!(graph.predecessors(b), vec![a]);
    }

    #[test]
    fn detects_cycle() {
        let a = NodeId::v4();
        let b = NodeId::v4();
        let definition = Definition {
            nodes: vec![node(a, "trigger"), node(b, "action")],
            edges: vec![edge(a, b), edge(b, a)],
            viewport: None,
        };
        let graph = DependencyGraph::build(&definition);
        assert!(graph.is_cyclic());
    }

    #[test]
    fn reachability_follows_edges_forward() {
        let a = NodeId::v4();
        let b = NodeId::v4();
        let c = NodeId::v4();
        let definition = Definition {
            nodes: vec![node(a, "trigger"), node(b, "action"), node(c, "action")],
            edges: vec![edge(a, b), edge(b, c)],
            viewport: None,
        };
        let graph = DependencyGraph::build(&definition);
        assert!(graph.is_reachable(a, c));
        assert!(!graph.is_reachable(c, a));
    }

    #[test]
    fn parallel_groups_on_diamond_graph() {
        let a = NodeId::v4();
        let b = NodeId::v4();
        let c = NodeId::v4();
        let d = NodeId::v4();
        let definition = Definition {
            nodes: vec![node(a, "trigger"), node(b, "action"), node(c, "action"), node(d, "action")],
            edges: vec![edge(a, b), edge(a, c), edge(b, d), edge(c, d)],
            viewport: None,
        };
        let graph = DependencyGraph::build(&definition);
        let groups = graph.parallel_groups();
        assert_eq!(groups.len(), 3);
        assert_eq!(groups[0], vec![a]);
        let mut wave1 = groups[1].clone();
        wave1.sort();
        let mut expected1 = vec![b, c];
        expected1.sort();
        assert_eq!(wave1, expected1);
        assert_eq!(groups[2], vec![d]);
    }

    #[test]
    fn parallel_groups_takes_deepest_predecessor_level() {
        let a = NodeId::v4();
        let b = NodeId::v4();
        let c = NodeId::v4();
        // a -> c directly, and a -> b -> c: c must wait for the longer chain.
        let definition = Definition {
            nodes: vec![node(a, "trigger"), node(b, "action"), node(c, "action")],
            edges: vec![edge(a, b), edge(a, c), edge(b, c)],
            viewport: None,
        };
        let graph = DependencyGraph::build(&definition);
        let groups = graph.parallel_groups();
        assert_eq!(groups, vec![vec![a], vec![b], vec![c]]);
    }

    #[test]
    fn dangling_edge_is_skipped_not_panicking() {
        let a = NodeId::v4();
        let ghost = NodeId::v4();
        let definition = Definition {
            nodes: vec![node(a, "trigger")],
            edges: vec![edge(a, ghost)],
            viewport: None,
        };
        let graph = DependencyGraph::build(&definition);
        assert!(!graph.contains(ghost));
        assert!(graph.successors(a).is_empty());
    }
}
