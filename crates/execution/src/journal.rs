//! Append-only record of everything that happened during an execution, used
//! to rebuild state after a crash and to feed the stream hub's synthetic
//! snapshot for late subscribers.

use chrono::{DateTime, Utc};
use n3n_core::{ExecutionId, NodeId};
use serde::{Deserialize, Serialize};

use crate::status::{ExecutionStatus, NodeStatus};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum JournalEntry {
    ExecutionStarted {
        execution_id: ExecutionId,
        at: DateTime<Utc>,
    },
    ExecutionStatusChanged {
        execution_id: ExecutionId,
        status: ExecutionStatus,
        at: DateTime<Utc>,
    },
    ExecutionCompleted {
        execution_id: ExecutionId,
        status: ExecutionStatus,
        at: DateTime<Utc>,
    },
    NodeDispatched {
        execution_id: ExecutionId,
        node_id: NodeId,
        attempt: u32,
        at: DateTime<Utc>,
    },
    NodeStatusChanged {
        execution_id: ExecutionId,
        node_id: NodeId,
        status: NodeStatus,
        at: DateTime<Utc>,
    },
    NodeRetryScheduled {
        execution_id: ExecutionId,
        node_id: NodeId,
        attempt: u32,
        delay_ms: u64,
        at: DateTime<Utc>,
    },
    NodeSkipped {
        execution_id: ExecutionId,
        node_id: NodeId,
        reason: String,
        at: DateTime<Utc>,
    },
    CancellationRequested {
        execution_id: ExecutionId,
        reason: Option<String>,
        at: DateTime<Utc>,
    },
}

impl JournalEntry {
    #[must_use]
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::ExecutionStarted { at, .. }
            | Self::ExecutionStatusChanged { at, .. }
            | Self::ExecutionCompleted { at, .. }
            | Self::NodeDispatched { at, .. }
            | Self::NodeStatusChanged { at, .. }
            | Self::NodeRetryScheduled { at, .. }
            | Self::NodeSkipped { at, .. }
            | Self::CancellationRequested { at, .. } => *at,
        }
    }

    #[must_use]
    pub fn node_id(&self) -> Option<NodeId> {
        match self {
            Self::NodeDispatched { node_id, .. }
            | Self::NodeStatusChanged { node_id, .. }
            | Self::NodeRetryScheduled { node_id, .. }
            | Self::NodeSkipped { node_id, .. } => Some(*node_id),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_node_event(&self) -> bool {
        self.node_id().is_some()
    }

    #[must_use]
    pub fn is_execution_event(&self) -> bool {
        !self.is_node_event()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_events_carry_a_node_id() {
        let entry = JournalEntry::NodeStatusChanged {
            execution_id: ExecutionId::v4(),
            node_id: NodeId::v4(),
            status: NodeStatus::Completed,
            at: Utc::now(),
        };
        assert!(entry.is_node_event());
        assert!(!entry.is_execution_event());
    }

    #[test]
    fn execution_events_have_no_node_id() {
        let entry = JournalEntry::ExecutionStarted { execution_id: ExecutionId::v4(), at: Utc::now() };
        assert!(entry.is_execution_event());
        assert_eq!(entry.node_id(), None);
    }

    #[test]
    fn json_roundtrip_preserves_variant() {
        let entry = JournalEntry::CancellationRequested {
            execution_id: ExecutionId::v4(),
            reason: Some("user requested".to_string()),
            at: Utc::now(),
        };
        let json = entry.to_json().unwrap();
        assert!(json.contains("\"event\":\"cancellationRequested\""));
        let back = JournalEntry::from_json(&json).unwrap();
        assert!(matches!(back, JournalEntry::CancellationRequested { .. }));
    }
}
