//! The serializable runtime record for an execution and its nodes —
//! `Execution` and `NodeExecution` from the data model, plus enough
//! bookkeeping (attempts, idempotency bookkeeping lives in [`crate::idempotency`])
//! to resume after a crash.

use chrono::{DateTime, Utc};
use n3n_core::{ExecutionId, FlowVersionId, NodeId, TriggerType, UserId};
use n3n_error::Result;
use serde::{Deserialize, Serialize};

use crate::attempt::NodeAttempt;
use crate::output::NodeOutput;
use crate::status::{ExecutionStatus, NodeStatus};
use crate::transition::{validate_execution_transition, validate_node_transition};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeExecutionState {
    pub execution_id: ExecutionId,
    pub node_id: NodeId,
    pub status: NodeStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub input_data: serde_json::Value,
    pub output_data: Option<NodeOutput>,
    pub error_message: Option<String>,
    pub attempts: Vec<NodeAttempt>,
}

impl NodeExecutionState {
    #[must_use]
    pub fn new(execution_id: ExecutionId, node_id: NodeId, input_data: serde_json::Value) -> Self {
        Self {
            execution_id,
            node_id,
            status: NodeStatus::Pending,
            started_at: None,
            completed_at: None,
            input_data,
            output_data: None,
            error_message: None,
            attempts: Vec::new(),
        }
    }

    pub fn transition_to(&mut self, status: NodeStatus, now: DateTime<Utc>) -> Result<()> {
        validate_node_transition(self.status, status)?;
        if status == NodeStatus::Running && self.started_at.is_none() {
            self.started_at = Some(now);
        }
        if status.is_terminal() {
            self.completed_at = Some(now);
        }
        self.status = status;
        Ok(())
    }

    #[must_use]
    pub fn attempt_count(&self) -> u32 {
        self.attempts.len() as u32
    }

    pub fn record_output(&mut self, output: NodeOutput) {
        self.output_data = Some(output);
    }

    pub fn record_error(&mut self, message: impl Into<String>) {
        self.error_message = Some(message.into());
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionState {
    pub id: ExecutionId,
    pub flow_version_id: FlowVersionId,
    pub status: ExecutionStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<u64>,
    pub trigger_type: TriggerType,
    pub triggered_by: Option<UserId>,
    pub input_data: serde_json::Value,
    pub error_message: Option<String>,
}

impl ExecutionState {
    #[must_use]
    pub fn new(
        id: ExecutionId,
        flow_version_id: FlowVersionId,
        trigger_type: TriggerType,
        triggered_by: Option<UserId>,
        input_data: serde_json::Value,
    ) -> Self {
        Self {
            id,
            flow_version_id,
            status: ExecutionStatus::Pending,
            started_at: None,
            completed_at: None,
            duration_ms: None,
            trigger_type,
            triggered_by,
            input_data,
            error_message: None,
        }
    }

    pub fn transition_to(&mut self, status: ExecutionStatus, now: DateTime<Utc>) -> Result<()> {
        validate_execution_transition(self.status, status)?;
        if status == ExecutionStatus::Running && self.started_at.is_none() {
            self.started_at = Some(now);
        }
        if status.is_terminal() {
            self.completed_at = Some(now);
            if let Some(started_at) = self.started_at {
                self.duration_ms = Some((now - started_at).num_milliseconds().max(0) as u64);
            }
        }
        self.status = status;
        Ok(())
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
