//! The Execution Engine (spec component C3): runs an execution end to end —
//! schedules ready nodes, concurrency-limits them, routes inputs/outputs,
//! honors cancellation, retries and timeouts.

mod condition;
mod dispatch;
mod input;
mod loop_exec;
mod scheduler;
mod storage;
mod trigger;

pub use dispatch::{dispatch_node, DispatchOutcome, DispatchRequest};
pub use loop_exec::{run_loop, LoopRequest};
pub use scheduler::Engine;
pub use storage::{PublishedFlowVersion, StorageBackend, TransactBlock};
pub use trigger::{match_webhook, verify_webhook_auth, Webhook, WebhookAuth};
