//! Guards for the two state machines in the data model: `pending ->
//! admitted -> running` etc. for executions, `pending -> deps-satisfied ->
//! running` etc. for nodes. Every mutation to a status field goes through one
//! of these so an invalid transition is rejected at the boundary rather than
//! silently written.

use n3n_error::{Error, Result};

use crate::status::{ExecutionStatus, NodeStatus};

#[must_use]
pub fn can_transition_execution(from: ExecutionStatus, to: ExecutionStatus) -> bool {
    use ExecutionStatus::{Cancelled, Completed, Failed, Pending, Running};
    matches!(
        (from, to),
        (Pending, Running)
            | (Pending, Cancelled)
            | (Running, Completed)
            | (Running, Failed)
            | (Running, Cancelled)
    )
}

pub fn validate_execution_transition(from: ExecutionStatus, to: ExecutionStatus) -> Result<()> {
    if can_transition_execution(from, to) {
        Ok(())
    } else {
        Err(Error::conflict(format!("invalid execution transition {from} -> {to}")))
    }
}

#[must_use]
pub fn can_transition_node(from: NodeStatus, to: NodeStatus) -> bool {
    use NodeStatus::{Cancelled, Completed, Failed, Pending, Running, Skipped};
    matches!(
        (from, to),
        (Pending, Running)
            | (Pending, Skipped)
            | (Pending, Cancelled)
            | (Running, Completed)
            | (Running, Failed)
            | (Running, Cancelled)
    )
}

pub fn validate_node_transition(from: NodeStatus, to: NodeStatus) -> Result<()> {
    if can_transition_node(from, to) {
        Ok(())
    } else {
        Err(Error::conflict(format!("invalid node transition {from} -> {to}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use n3n_error::ErrorKind;

    #[test]
    fn execution_pending_to_running_allowed() {
        assert!(can_transition_execution(ExecutionStatus::Pending, ExecutionStatus::Running));
    }

    #[test]
    fn execution_cancel_before_admit_allowed() {
        assert!(can_transition_execution(ExecutionStatus::Pending, ExecutionStatus::Cancelled));
    }

    #[test]
    fn execution_completed_to_anything_rejected() {
        assert!(!can_transition_execution(ExecutionStatus::Completed, ExecutionStatus::Running));
        let err = validate_execution_transition(ExecutionStatus::Completed, ExecutionStatus::Running).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Conflict);
    }

    #[test]
    fn node_pending_can_skip_without_running() {
        assert!(can_transition_node(NodeStatus::Pending, NodeStatus::Skipped));
    }

    #[test]
    fn node_cannot_go_from_failed_to_completed() {
        assert!(!can_transition_node(NodeStatus::Failed, NodeStatus::Completed));
    }

    #[test]
    fn node_running_can_reach_any_terminal() {
        assert!(can_transition_node(NodeStatus::Running, NodeStatus::Completed));
        assert!(can_transition_node(NodeStatus::Running, NodeStatus::Failed));
        assert!(can_transition_node(NodeStatus::Running, NodeStatus::Cancelled));
    }
}
