//! Execution-time state: this crate models execution-time concepts — it
//! does NOT contain the engine orchestrator (see `n3n-engine` for
//! scheduling, dispatch and retry decisions).

mod attempt;
mod context;
mod idempotency;
mod journal;
mod output;
mod plan;
mod status;
mod transition;

pub mod state;

pub use attempt::NodeAttempt;
pub use context::{EngineConfig, ExecutionContext, ExecutionSettings};
pub use idempotency::{IdempotencyKey, IdempotencyManager};
pub use journal::JournalEntry;
pub use output::NodeOutput;
pub use plan::ExecutionPlan;
pub use state::{ExecutionState, NodeExecutionState};
pub use status::{ExecutionStatus, NodeStatus};
pub use transition::{
    can_transition_execution, can_transition_node, validate_execution_transition,
    validate_node_transition,
};
