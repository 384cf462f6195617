//! Runtime-only context threaded into every handler dispatch. Unlike
//! [`crate::state::ExecutionState`] this is never serialized or journaled —
//! it holds live synchronization primitives, not a resumable snapshot.

use std::collections::HashMap;
use std::sync::Arc;

use n3n_core::{ExecutionId, NodeId};
use n3n_dag::Definition;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::output::NodeOutput;

/// Per-`FlowVersion` execution tuning. Defaults match the data model's
/// stated defaults (concurrency cap 16, retry ceiling 30s).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionSettings {
    pub concurrency_cap: usize,
    pub max_attempts: u32,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
    pub node_timeout_ms: Option<u64>,
    pub execution_timeout_ms: Option<u64>,
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        Self {
            concurrency_cap: 16,
            max_attempts: 3,
            retry_base_delay_ms: 1_000,
            retry_max_delay_ms: 30_000,
            node_timeout_ms: None,
            execution_timeout_ms: None,
        }
    }
}

/// Global pool tuning, shared by every execution the process runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub worker_pool_size: usize,
    pub stream_buffer_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { worker_pool_size: 256, stream_buffer_size: 256 }
    }
}

/// Live context passed to every handler dispatch for one execution.
#[derive(Clone)]
pub struct ExecutionContext {
    pub execution_id: ExecutionId,
    pub definition: Arc<Definition>,
    pub settings: ExecutionSettings,
    node_outputs: Arc<RwLock<HashMap<NodeId, NodeOutput>>>,
    variables: Arc<RwLock<serde_json::Map<String, serde_json::Value>>>,
    cancellation: CancellationToken,
}

impl ExecutionContext {
    #[must_use]
    pub fn new(execution_id: ExecutionId, definition: Arc<Definition>, settings: ExecutionSettings) -> Self {
        Self {
            execution_id,
            definition,
            settings,
            node_outputs: Arc::new(RwLock::new(HashMap::new())),
            variables: Arc::new(RwLock::new(serde_json::Map::new())),
            cancellation: CancellationToken::new(),
        }
    }

    pub fn record_output(&self, node_id: NodeId, output: NodeOutput) {
        self.node_outputs.write().insert(node_id, output);
    }

    #[must_use]
    pub fn output_of(&self, node_id: NodeId) -> Option<NodeOutput> {
        self.node_outputs.read().get(&node_id).cloned()
    }

    #[must_use]
    pub fn all_outputs(&self) -> HashMap<NodeId, NodeOutput> {
        self.node_outputs.read().clone()
    }

    pub fn set_variable(&self, key: impl Into<String>, value: serde_json::Value) {
        self.variables.write().insert(key.into(), value);
    }

    #[must_use]
    pub fn get_variable(&self, key: &str) -> Option<serde_json::Value> {
        self.variables.read().get(key).cloned()
    }

    /// A child token for one node's attempt: cancelling the execution
    /// cancels every child, but a per-node timeout can cancel a single
    /// child without affecting the rest of the run.
    #[must_use]
    pub fn child_cancellation(&self) -> CancellationToken {
        self.cancellation.child_token()
    }

    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use n3n_dag::Definition;

    fn empty_definition() -> Arc<Definition> {
        Arc::new(Definition { nodes: Vec::new(), edges: Vec::new(), viewport: None })
    }

    #[test]
    fn records_and_reads_node_output() {
        let ctx = ExecutionContext::new(ExecutionId::v4(), empty_definition(), ExecutionSettings::default());
        let node = NodeId::v4();
        ctx.record_output(node, NodeOutput::new(serde_json::json!({"ok": true})));
        assert_eq!(ctx.output_of(node).unwrap().data, serde_json::json!({"ok": true}));
    }

    #[test]
    fn cancellation_propagates_to_children() {
        let ctx = ExecutionContext::new(ExecutionId::v4(), empty_definition(), ExecutionSettings::default());
        let child = ctx.child_cancellation();
        assert!(!child.is_cancelled());
        ctx.cancel();
        assert!(child.is_cancelled());
        assert!(ctx.is_cancelled());
    }

    #[test]
    fn variables_are_shared_across_clones() {
        let ctx = ExecutionContext::new(ExecutionId::v4(), empty_definition(), ExecutionSettings::default());
        let clone = ctx.clone();
        ctx.set_variable("loopIndex", serde_json::json!(1));
        assert_eq!(clone.get_variable("loopIndex"), Some(serde_json::json!(1)));
    }

    #[test]
    fn default_settings_match_documented_defaults() {
        let settings = ExecutionSettings::default();
        assert_eq!(settings.concurrency_cap, 16);
        assert_eq!(settings.retry_max_delay_ms, 30_000);
    }
}
