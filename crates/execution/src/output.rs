//! Per-node output data, held inline. The external interfaces this engine
//! talks to never define a blob store, so unlike a larger multi-tenant
//! product this crate has nowhere to offload a large payload to — every
//! output is carried as `serde_json::Value` and sized for observability.

use serde::{Deserialize, Serialize};

/// The data produced by one node's execution, merged into a successor's
/// input by `targetHandle` at dispatch time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeOutput {
    pub data: serde_json::Value,
    /// Approximate serialized size, for stream-hub payload accounting.
    pub bytes: u64,
}

impl NodeOutput {
    #[must_use]
    pub fn new(data: serde_json::Value) -> Self {
        let bytes = serde_json::to_vec(&data).map(|v| v.len() as u64).unwrap_or(0);
        Self { data, bytes }
    }
}

impl From<serde_json::Value> for NodeOutput {
    fn from(data: serde_json::Value) -> Self {
        Self::new(data)
    }
}
