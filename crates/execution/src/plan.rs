//! A precomputed dispatch order for a validated definition, built once
//! before an execution starts so the scheduler never has to recompute
//! reachability mid-run.

use n3n_core::NodeId;
use n3n_dag::{DependencyGraph, Definition};
use n3n_error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Nodes grouped into waves that can be dispatched concurrently, plus the
/// entry set the scheduler seeds its `ready` queue with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub entry_nodes: Vec<NodeId>,
    pub parallel_groups: Vec<Vec<NodeId>>,
}

impl ExecutionPlan {
    /// Build a plan from an already-validated definition. Callers must have
    /// rejected cycles and dangling edges first (see `n3n_dag::validate`);
    /// this does not repeat that check.
    pub fn from_definition(definition: &Definition) -> Result<Self> {
        let graph = DependencyGraph::build(definition);
        if graph.is_cyclic() {
            return Err(Error::validation("cannot plan a cyclic definition"));
        }
        let parallel_groups = graph.parallel_groups();
        let entry_nodes = parallel_groups.first().cloned().unwrap_or_default();
        Ok(Self { entry_nodes, parallel_groups })
    }

    #[must_use]
    pub fn total_nodes(&self) -> usize {
        self.parallel_groups.iter().map(Vec::len).sum()
    }
}
