//! A single-process, in-memory [`StorageBackend`] for the CLI wrapper.
//! Not a persistence layer: executions and their node rows live only for
//! the lifetime of the process, same caveat the spec's own Non-goals state
//! ("not a durable queue; in-flight executions survive restart only if
//! persisted by its storage collaborator").

use std::collections::HashMap;

use async_trait::async_trait;
use n3n_core::FlowId;
use n3n_engine::{PublishedFlowVersion, StorageBackend, TransactBlock};
use n3n_error::Result;
use n3n_execution::{ExecutionState, NodeExecutionState};
use n3n_registry::CredentialResolver;
use parking_lot::Mutex;

pub struct InMemoryStorage {
    published: HashMap<FlowId, PublishedFlowVersion>,
    executions: Mutex<HashMap<n3n_core::ExecutionId, ExecutionState>>,
    node_executions: Mutex<HashMap<(n3n_core::ExecutionId, n3n_core::NodeId), NodeExecutionState>>,
}

impl InMemoryStorage {
    #[must_use]
    pub fn with_single_flow(flow_id: FlowId, published: PublishedFlowVersion) -> Self {
        let mut map = HashMap::new();
        map.insert(flow_id, published);
        Self { published: map, executions: Mutex::new(HashMap::new()), node_executions: Mutex::new(HashMap::new()) }
    }

    #[must_use]
    pub fn execution(&self, execution_id: n3n_core::ExecutionId) -> Option<ExecutionState> {
        self.executions.lock().get(&execution_id).cloned()
    }

    #[must_use]
    pub fn node_executions_for(&self, execution_id: n3n_core::ExecutionId) -> Vec<NodeExecutionState> {
        self.node_executions.lock().values().filter(|n| n.execution_id == execution_id).cloned().collect()
    }
}

#[async_trait]
impl StorageBackend for InMemoryStorage {
    async fn find_published_version(&self, flow_id: FlowId) -> Result<Option<PublishedFlowVersion>> {
        Ok(self.published.get(&flow_id).cloned())
    }

    async fn create_execution(&self, execution: &ExecutionState) -> Result<()> {
        self.executions.lock().insert(execution.id, execution.clone());
        Ok(())
    }

    async fn update_execution(&self, execution: &ExecutionState) -> Result<()> {
        self.executions.lock().insert(execution.id, execution.clone());
        Ok(())
    }

    async fn create_node_execution(&self, node_execution: &NodeExecutionState) -> Result<()> {
        self.node_executions.lock().insert((node_execution.execution_id, node_execution.node_id), node_execution.clone());
        Ok(())
    }

    async fn update_node_execution(&self, node_execution: &NodeExecutionState) -> Result<()> {
        self.node_executions.lock().insert((node_execution.execution_id, node_execution.node_id), node_execution.clone());
        Ok(())
    }

    async fn transact<'a>(&'a self, block: TransactBlock<'a>) -> Result<()> {
        block().await
    }
}

/// Resolves every credential to an empty payload. A real deployment wires
/// in the credential store the spec names as an external collaborator
/// (§6); the CLI wrapper has no credential store of its own.
pub struct NoopCredentialResolver;

#[async_trait]
impl CredentialResolver for NoopCredentialResolver {
    async fn resolve(&self, _credential_id: n3n_core::CredentialId, _user_id: n3n_core::UserId) -> Result<serde_json::Value> {
        Ok(serde_json::json!({}))
    }
}
