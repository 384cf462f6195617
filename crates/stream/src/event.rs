//! The event vocabulary the hub fans out (spec §4.4).

use chrono::{DateTime, Utc};
use n3n_core::{ExecutionId, FlowVersionId, NodeId};
use n3n_execution::{ExecutionStatus, NodeStatus};
use serde::{Deserialize, Serialize};

/// Output previews are capped to keep a single event small; larger payloads
/// stay addressable through the execution's own `NodeExecution.outputData`.
pub const OUTPUT_PREVIEW_MAX_BYTES: usize = 2_048;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum StreamEvent {
    ExecutionCreated {
        execution_id: ExecutionId,
        flow_version_id: FlowVersionId,
        started_at: DateTime<Utc>,
    },
    ExecutionStatus {
        execution_id: ExecutionId,
        status: ExecutionStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        duration_ms: Option<u64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error_message: Option<String>,
    },
    NodeStatus {
        execution_id: ExecutionId,
        node_id: NodeId,
        status: NodeStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        started_at: Option<DateTime<Utc>>,
        #[serde(skip_serializing_if = "Option::is_none")]
        completed_at: Option<DateTime<Utc>>,
        attempts: u32,
    },
    NodeOutput {
        execution_id: ExecutionId,
        node_id: NodeId,
        output_preview: serde_json::Value,
    },
    ExecutionCompleted {
        execution_id: ExecutionId,
        status: ExecutionStatus,
    },
    /// Synthetic event delivered in place of a dropped one when a
    /// subscriber's buffer cannot absorb an `execution.status` transition;
    /// the subscriber is disconnected immediately after receiving this.
    Overflow {
        execution_id: ExecutionId,
    },
}

impl StreamEvent {
    /// Build a size-capped `node.output` event, truncating the preview if
    /// its JSON encoding exceeds [`OUTPUT_PREVIEW_MAX_BYTES`].
    #[must_use]
    pub fn node_output(execution_id: ExecutionId, node_id: NodeId, output: &serde_json::Value) -> Self {
        let encoded = serde_json::to_string(output).unwrap_or_else(|_| "null".to_string());
        let preview = if encoded.len() > OUTPUT_PREVIEW_MAX_BYTES {
            serde_json::json!({
                "truncated": true,
                "preview": encoded.chars().take(OUTPUT_PREVIEW_MAX_BYTES).collect::<String>(),
            })
        } else {
            output.clone()
        };
        Self::NodeOutput { execution_id, node_id, output_preview: preview }
    }

    #[must_use]
    pub fn execution_id(&self) -> ExecutionId {
        match self {
            Self::ExecutionCreated { execution_id, .. }
            | Self::ExecutionStatus { execution_id, .. }
            | Self::NodeStatus { execution_id, .. }
            | Self::NodeOutput { execution_id, .. }
            | Self::ExecutionCompleted { execution_id, .. }
            | Self::Overflow { execution_id } => *execution_id,
        }
    }

    #[must_use]
    pub fn node_id(&self) -> Option<NodeId> {
        match self {
            Self::NodeStatus { node_id, .. } | Self::NodeOutput { node_id, .. } => Some(*node_id),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_node_output(&self) -> bool {
        matches!(self, Self::NodeOutput { .. })
    }

    #[must_use]
    pub fn is_node_status(&self) -> bool {
        matches!(self, Self::NodeStatus { .. })
    }

    #[must_use]
    pub fn is_execution_status(&self) -> bool {
        matches!(self, Self::ExecutionStatus { .. })
    }
}
