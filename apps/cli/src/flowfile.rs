//! The on-disk JSON shape the CLI reads a flow from: a name/description
//! plus the structural `Definition` and `ExecutionSettings` the engine and
//! export pipeline need. Not a wire format of its own — just enough of
//! `Flow`/`FlowVersion` (spec §3) for a file-backed, out-of-process caller.

use std::path::Path;

use n3n_dag::Definition;
use n3n_execution::ExecutionSettings;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowFile {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub definition: Definition,
    #[serde(default)]
    pub settings: ExecutionSettings,
}

impl FlowFile {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
        let file: Self = serde_json::from_str(&raw)
            .map_err(|e| anyhow::anyhow!("failed to parse {} as a flow file: {e}", path.display()))?;
        Ok(file)
    }
}
