//! The persistence seam the orchestrator reads/writes through (spec §6).
//!
//! Unlike `n3n-secure-channel`'s narrow [`DeviceKeyStore`](n3n_secure_channel)
//! (device-key persistence is orthogonal to flow execution, per spec §2),
//! this trait covers exactly what the engine itself needs: the published
//! version to run, and the `Execution`/`NodeExecution` rows it creates and
//! updates as it runs. Device-key methods from the spec's combined
//! `StorageBackend` sketch are intentionally omitted here — see
//! `DESIGN.md` for that split.

use std::future::Future;
use std::pin::Pin;

use async_trait::async_trait;
use n3n_core::FlowId;
use n3n_dag::Definition;
use n3n_error::Result;
use n3n_execution::{ExecutionSettings, ExecutionState, NodeExecutionState};

/// The definition + settings the engine needs to run a flow, independent of
/// how the storage collaborator represents `Flow`/`FlowVersion` rows.
#[derive(Debug, Clone)]
pub struct PublishedFlowVersion {
    pub flow_version_id: n3n_core::FlowVersionId,
    pub definition: Definition,
    pub settings: ExecutionSettings,
}

/// A unit of work run inside [`StorageBackend::transact`]; boxed because the
/// trait itself must stay object-safe.
pub type TransactBlock<'a> =
    Box<dyn FnOnce() -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> + Send + 'a>;

/// Storage collaborator contract (spec §6). All operations are assumed
/// single-statement atomic; multi-step invariants use [`transact`].
///
/// [`transact`]: StorageBackend::transact
#[async_trait]
pub trait StorageBackend: Send + Sync {
    async fn find_published_version(&self, flow_id: FlowId) -> Result<Option<PublishedFlowVersion>>;
    async fn create_execution(&self, execution: &ExecutionState) -> Result<()>;
    async fn update_execution(&self, execution: &ExecutionState) -> Result<()>;
    async fn create_node_execution(&self, node_execution: &NodeExecutionState) -> Result<()>;
    async fn update_node_execution(&self, node_execution: &NodeExecutionState) -> Result<()>;
    async fn transact<'a>(&'a self, block: TransactBlock<'a>) -> Result<()>;
}
