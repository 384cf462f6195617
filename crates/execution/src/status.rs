//! The two status vocabularies exposed on [`crate::state::ExecutionState`] and
//! [`crate::state::NodeExecutionState`].
//!
//! These are distinct from [`n3n_dag::NodeState`]: that type additionally
//! carries `Ready` and `Retrying`, transient scheduler-internal states the
//! engine's ready queue uses to decide what to dispatch next. Neither value
//! is ever written to a persisted `NodeExecution.status` field — a node
//! waiting to be scheduled or about to be retried is still `Pending` or
//! `Running` from the outside.

use serde::{Deserialize, Serialize};

/// `Execution.status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl ExecutionStatus {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// `NodeExecution.status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NodeStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
    Cancelled,
}

impl NodeStatus {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Skipped | Self::Cancelled)
    }

    /// Predecessor statuses a dependent node treats as "settled, not failed".
    #[must_use]
    pub fn is_terminal_non_failure(self) -> bool {
        matches!(self, Self::Completed | Self::Skipped)
    }
}

impl std::fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn execution_status_terminal_set() {
        assert!(!ExecutionStatus::Pending.is_terminal());
        assert!(!ExecutionStatus::Running.is_terminal());
        assert!(ExecutionStatus::Completed.is_terminal());
        assert!(ExecutionStatus::Failed.is_terminal());
        assert!(ExecutionStatus::Cancelled.is_terminal());
    }

    #[test]
    fn node_status_terminal_non_failure() {
        assert!(NodeStatus::Completed.is_terminal_non_failure());
        assert!(NodeStatus::Skipped.is_terminal_non_failure());
        assert!(!NodeStatus::Failed.is_terminal_non_failure());
        assert!(!NodeStatus::Cancelled.is_terminal_non_failure());
    }

    #[test]
    fn serializes_camel_case() {
        assert_eq!(serde_json::to_string(&ExecutionStatus::Pending).unwrap(), "\"pending\"");
        assert_eq!(serde_json::to_string(&NodeStatus::Skipped).unwrap(), "\"skipped\"");
    }
}
