//! The structural `(nodes, edges)` description of a workflow.

use n3n_core::{CredentialId, NodeId};
use serde::{Deserialize, Serialize};

/// Structural role of a node, used by the validator and the engine's
/// condition/loop handling. Anything not recognized as one of the named
/// roles is a plain `Action` node dispatched to the handler registry by its
/// free-form `type` string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NodeKind {
    Trigger,
    ScheduleTrigger,
    Webhook,
    Action,
    Condition,
    Loop,
    Output,
}

impl NodeKind {
    /// Classify a node's free-form `type` string into its structural role.
    #[must_use]
    pub fn from_type(type_name: &str) -> Self {
        match type_name {
            "trigger" => Self::Trigger,
            "scheduleTrigger" => Self::ScheduleTrigger,
            "webhook" => Self::Webhook,
            "condition" => Self::Condition,
            "loop" => Self::Loop,
            "output" => Self::Output,
            _ => Self::Action,
        }
    }

    /// Whether a node of this kind may serve as a graph entry point.
    #[must_use]
    pub fn is_entry(self) -> bool {
        matches!(self, Self::Trigger | Self::ScheduleTrigger | Self::Webhook)
    }
}

/// The payload carried by a node: label, handler config, optional bound
/// credential, and an optional secondary type discriminator used by
/// dynamic handlers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeData {
    pub label: String,
    #[serde(default)]
    pub config: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential_id: Option<CredentialId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_type: Option<String>,
}

/// Canvas position hint; not consumed by validation or execution.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// A node: `(id, type, data, position)`. `id` is unique within the
/// definition; `type` must resolve in the Handler Registry for non-entry,
/// non-structural node kinds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub r#type: String,
    pub data: NodeData,
    pub position: Position,
}

impl Node {
    #[must_use]
    pub fn kind(&self) -> NodeKind {
        NodeKind::from_type(&self.r#type)
    }
}

/// An edge: `(id, source, target, sourceHandle?, targetHandle?)`. Multi-edges
/// between the same two nodes are only valid if their handles differ.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub id: n3n_core::EdgeId,
    pub source: NodeId,
    pub target: NodeId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_handle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_handle: Option<String>,
}

/// Viewport hint carried alongside the structural definition; purely
/// cosmetic, never consulted by validation or execution.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Viewport {
    pub x: f64,
    pub y: f64,
    pub zoom: f64,
}

/// The `(nodes, edges)` structural description of a workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Definition {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub viewport: Option<Viewport>,
}

impl Definition {
    #[must_use]
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Edges whose `source` equals `id`.
    pub fn outgoing(&self, id: NodeId) -> impl Iterator<Item = &Edge> {
        self.edges.iter().filter(move |e| e.source == id)
    }

    /// Edges whose `target` equals `id`.
    pub fn incoming(&self, id: NodeId) -> impl Iterator<Item = &Edge> {
        self.edges.iter().filter(move |e| e.target == id)
    }
}

/// Runtime state of a single node, shared by the DAG validator's
/// reachability pass and by the execution engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NodeState {
    Pending,
    Ready,
    Running,
    Completed,
    Failed,
    Skipped,
    Cancelled,
    Retrying,
}

impl NodeState {
    /// States a dependent node treats as "this predecessor is settled".
    #[must_use]
    pub fn is_terminal_non_failure(self) -> bool {
        matches!(self, Self::Completed | Self::Skipped)
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Skipped | Self::Cancelled)
    }
}
