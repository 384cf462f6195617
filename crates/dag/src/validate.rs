//! Structural validation and execution-order planning for a [`Definition`].

use std::collections::{BTreeSet, HashMap, HashSet};

use n3n_core::NodeId;

use crate::graph::DependencyGraph;
use crate::model::{Definition, NodeKind};

/// The outcome of validating a [`Definition`].
///
/// For identical input `ParseResult` is byte-identical (field order and
/// string content are deterministic): ties in the topological order are
/// broken by ascending node id.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ParseResult {
    pub valid: bool,
    pub execution_order: Vec<NodeId>,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

/// Validate a definition. `explicit_entry` overrides the "exactly one entry
/// kind" requirement when the execution names a specific starting node.
#[must_use]
pub fn validate(definition: &Definition, explicit_entry: Option<NodeId>) -> ParseResult {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    // 1. every node has a non-empty unique id.
    let mut seen_ids = HashSet::new();
    for node in &definition.nodes {
        if !seen_ids.insert(node.id) {
            errors.push(format!("duplicate node id: {}", node.id));
        }
    }

    // 2. every edge's source/target reference extant node ids.
    for edge in &definition.edges {
        if definition.node(edge.source).is_none() {
            errors.push(format!("edge {} has dangling source {}", edge.id, edge.source));
        }
        if definition.node(edge.target).is_none() {
            errors.push(format!("edge {} has dangling target {}", edge.id, edge.target));
        }
    }

    let graph = DependencyGraph::build(definition);

    // 3. no directed cycle.
    if graph.is_cyclic() {
        errors.push("definition contains a directed cycle".to_string());
    }

    // 4. exactly one entry kind, unless an explicit entry is given.
    let entry_nodes: Vec<NodeId> = definition
        .nodes
        .iter()
        .filter(|n| n.kind().is_entry())
        .map(|n| n.id)
        .collect();
    if explicit_entry.is_none() {
        match entry_nodes.len() {
            0 => errors.push("definition has no entry node (trigger/scheduleTrigger/webhook)".to_string()),
            1 => {}
            _ => errors.push(format!(
                "definition has {} entry nodes, expected exactly one",
                entry_nodes.len()
            )),
        }
    }
    if let Some(entry) = explicit_entry {
        if definition.node(entry).is_none() {
            errors.push(format!("explicit entry node {entry} does not exist"));
        }
    }

    // 6. condition/loop handle-count checks.
    for node in &definition.nodes {
        match node.kind() {
            NodeKind::Condition => {
                let handles: HashSet<Option<String>> = definition
                    .outgoing(node.id)
                    .map(|e| e.source_handle.clone())
                    .collect();
                if handles.len() > 2 {
                    errors.push(format!(
                        "condition node {} has {} outgoing handles, at most 2 (true/false) allowed",
                        node.id,
                        handles.len()
                    ));
                }
            }
            NodeKind::Loop => {
                let handles: HashSet<Option<String>> = definition
                    .outgoing(node.id)
                    .map(|e| e.source_handle.clone())
                    .collect();
                if handles.len() > 2 {
                    errors.push(format!(
                        "loop node {} has {} outgoing handles, expected one body handle and one after handle",
                        node.id,
                        handles.len()
                    ));
                }
            }
            _ => {}
        }
    }

    let execution_order = if graph.is_cyclic() {
        Vec::new()
    } else {
        kahn_topological_order(definition, &graph)
    };

    // 5. every non-entry node is reachable from some entry node (warning only).
    if !graph.is_cyclic() {
        let entries: Vec<NodeId> = if let Some(explicit) = explicit_entry {
            vec![explicit]
        } else {
            entry_nodes.clone()
        };
        for node in &definition.nodes {
            let is_entry = entries.contains(&node.id);
            if is_entry {
                continue;
            }
            let reachable = entries.iter().any(|&e| graph.is_reachable(e, node.id));
            if !reachable {
                warnings.push(format!("node {} is unreachable from any entry node", node.id));
            }
        }
    }

    let valid = errors.is_empty();

    ParseResult {
        valid,
        execution_order,
        warnings,
        errors,
    }
}

/// Kahn's algorithm with lexicographic (ascending node id) tie-break among
/// nodes that become ready at the same step.
fn kahn_topological_order(definition: &Definition, graph: &DependencyGraph) -> Vec<NodeId> {
    let mut in_degree: HashMap<NodeId, usize> = definition
        .nodes
        .iter()
        .map(|n| (n.id, graph.in_degree(n.id)))
        .collect();

    let mut ready: BTreeSet<NodeId> = in_degree
        .iter()
        .filter(|(_, &deg)| deg == 0)
        .map(|(&id, _)| id)
        .collect();

    let mut order = Vec::with_capacity(definition.nodes.len());
    while let Some(&next) = ready.iter().next() {
        ready.remove(&next);
        order.push(next);
        for successor in graph.successors(next) {
            if let Some(deg) = in_degree.get_mut(&successor) {
                *deg -= 1;
                if *deg == 0 {
                    ready.insert(successor);
                }
            }
        }
    }
    order
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

    fn edge_h(source: NodeId, target: NodeId, handle: Option<&str>) -> Edge {
        Edge {
            id: EdgeId::v4(),
            source,
            target,
            source_handle: handle.map(str::to_string),
            target_handle: None,
        }
    }

    #[test]
    fn valid_linear_definition() {
        let a = NodeId::v4();
        let b = NodeId::v4();
        let c = NodeId::v4();
        let definition = Definition {
            nodes: vec![node(a, "trigger"), node(b, "httpRequest"), node(c, "output")],
            edges: vec![edge_h(a, b, None), edge_h(b, c, None)],
            viewport: None,
        };
        let result = validate(&definition, None);
        assert!(result.valid, "{:?}", result.errors);
        assert_eq!(result.execution_order, vec![a, b, c]);
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn cycle_is_rejected() {
        let a = NodeId::v4();
        let b = NodeId::v4();
        let definition = Definition {
            nodes: vec![node(a, "trigger"), node(b, "httpRequest")],
            edges: vec![edge_h(a, b, None), edge_h(b, a, None)],
            viewport: None,
        };
        let result = validate(&definition, None);
        assert!(!result.valid);
        assert!(result.execution_order.is_empty());
        assert!(result.errors.iter().any(|e| e.contains("cycle")));
    }

    #[test]
    fn dangling_edge_is_an_error() {
        let a = NodeId::v4();
        let ghost = NodeId::v4();
        let definition = Definition {
            nodes: vec![node(a, "trigger")],
            edges: vec![edge_h(a, ghost, None)],
            viewport: None,
        };
        let result = validate(&definition, None);
        assert!(!result.valid);
        assert!(result.errors.iter().any(|e| e.contains("dangling")));
    }

    #[test]
    fn no_entry_node_is_an_error() {
        let a = NodeId::v4();
        let definition = Definition {
            nodes: vec![node(a, "httpRequest")],
            edges: vec![],
            viewport: None,
        };
        let result = validate(&definition, None);
        assert!(!result.valid);
        assert!(result.errors.iter().any(|e| e.contains("no entry node")));
    }

    #[test]
    fn multiple_entry_nodes_is_an_error_unless_explicit() {
        let a = NodeId::v4();
        let b = NodeId::v4();
        let definition = Definition {
            nodes: vec![node(a, "trigger"), node(b, "webhook")],
            edges: vec![],
            viewport: None,
        };
        let result = validate(&definition, None);
        assert!(!result.valid);

        let explicit = validate(&definition, Some(a));
        assert!(explicit.errors.iter().all(|e| !e.contains("entry nodes")));
    }

    #[test]
    fn unreachable_node_is_a_warning_not_an_error() {
        let a = NodeId::v4();
        let b = NodeId::v4();
        let orphan = NodeId::v4();
        let definition = Definition {
            nodes: vec![node(a, "trigger"), node(b, "httpRequest"), node(orphan, "httpRequest")],
            edges: vec![edge_h(a, b, None)],
            viewport: None,
        };
        let result = validate(&definition, None);
        assert!(result.valid);
        assert!(result.warnings.iter().any(|w| w.contains("unreachable")));
    }

    #[test]
    fn condition_node_allows_true_false_handles() {
        let a = NodeId::v4();
        let cond = NodeId::v4();
        let t = NodeId::v4();
        let f = NodeId::v4();
        let definition = Definition {
            nodes: vec![node(a, "trigger"), node(cond, "condition"), node(t, "output"), node(f, "output")],
            edges: vec![
                edge_h(a, cond, None),
                edge_h(cond, t, Some("true")),
                edge_h(cond, f, Some("false")),
            ],
            viewport: None,
        };
        let result = validate(&definition, None);
        assert!(result.valid, "{:?}", result.errors);
    }

    #[test]
    fn condition_node_with_too_many_handles_is_an_error() {
        let a = NodeId::v4();
        let cond = NodeId::v4();
        let x = NodeId::v4();
        let y = NodeId::v4();
        let z = NodeId::v4();
        let definition = Definition {
            nodes: vec![node(a, "trigger"), node(cond, "condition"), node(x, "output"), node(y, "output"), node(z, "output")],
            edges: vec![
                edge_h(a, cond, None),
                edge_h(cond, x, Some("true")),
                edge_h(cond, y, Some("false")),
                edge_h(cond, z, Some("maybe")),
            ],
            viewport: None,
        };
        let result = validate(&definition, None);
        assert!(!result.valid);
        assert!(result.errors.iter().any(|e| e.contains("condition node")));
    }

    #[test]
    fn topological_tie_break_is_ascending_node_id() {
        let a = NodeId::v4();
        let mut siblings = vec![NodeId::v4(), NodeId::v4(), NodeId::v4()];
        siblings.sort();
        let definition = Definition {
            nodes: {
                let mut nodes = vec![node(a, "trigger")];
                nodes.extend(siblings.iter().map(|&id| node(id, "httpRequest")));
                nodes
            },
            edges: siblings.iter().map(|&s| edge_h(a, s, None)).collect(),
            viewport: None,
        };
        let result = validate(&definition, None);
        assert!(result.valid);
        assert_eq!(&result.execution_order[1..], siblings.as_slice());
    }

    #[test]
    fn deterministic_for_identical_input() {
        let a = NodeId::v4();
        let b = NodeId::v4();
        let definition = Definition {
            nodes: vec![node(a, "trigger"), node(b, "output")],
            edges: vec![edge_h(a, b, None)],
            viewport: None,
        };
        let r1 = validate(&definition, None);
        let r2 = validate(&definition, None);
        assert_eq!(r1, r2);
    }
}
