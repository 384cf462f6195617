//! The `Engine` orchestrator (spec §4.3): the ready/inflight scheduling loop
//! that ties `n3n-dag` planning, `n3n-registry` dispatch and `n3n-stream`
//! publishing into one running execution. Grounded on
//! `crates/engine/src/engine.rs`'s `WorkflowEngine` (`tokio::task::JoinSet`
//! + `Semaphore` + `CancellationToken`), generalized from single-handler-type
//! dispatch to the node-kind-driven dispatch this crate's `condition.rs` and
//! `loop_exec.rs` already implement for the two structural node kinds.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use n3n_core::{ExecutionId, FlowId, NodeId, OnFailure, RetryPolicy, TriggerType, UserId};
use n3n_dag::{validate, DependencyGraph, Definition, Node, NodeKind, ParseResult};
use n3n_error::{Error, ErrorKind, Result};
use n3n_execution::{
    EngineConfig, ExecutionContext, ExecutionPlan, ExecutionState, ExecutionStatus, JournalEntry,
    NodeExecutionState, NodeOutput, NodeStatus,
};
use n3n_registry::{CredentialResolver, HandlerRegistry};
use n3n_stream::{StreamEvent, StreamHub, Subscription};
use serde_json::Value;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::condition::{evaluate, output_for, FALSE_HANDLE, TRUE_HANDLE};
use crate::dispatch::{dispatch_node, DispatchOutcome, DispatchRequest};
use crate::input::merge_inputs;
use crate::loop_exec::{run_loop, LoopRequest};
use crate::storage::{PublishedFlowVersion, StorageBackend};

/// The settled result of running one node to completion, uniform across
/// condition evaluation, loop iteration and registry-handler dispatch.
enum NodeOutcome {
    Completed(Value),
    Failed { kind: ErrorKind, message: String },
    Cancelled,
}

/// The execution orchestrator: one instance per process, cheap to clone
/// (every field is an `Arc` or a small config struct), shared across every
/// execution it admits.
#[derive(Clone)]
pub struct Engine {
    registry: Arc<HandlerRegistry>,
    credential_resolver: Arc<dyn CredentialResolver>,
    storage: Arc<dyn StorageBackend>,
    hub: Arc<StreamHub>,
    worker_pool: Arc<Semaphore>,
    running: Arc<DashMap<ExecutionId, ExecutionContext>>,
}

impl Engine {
    #[must_use]
    pub fn new(
        config: EngineConfig,
        registry: Arc<HandlerRegistry>,
        credential_resolver: Arc<dyn CredentialResolver>,
        storage: Arc<dyn StorageBackend>,
        hub: Arc<StreamHub>,
    ) -> Self {
        let worker_pool = Arc::new(Semaphore::new(config.worker_pool_size.max(1)));
        Self { registry, credential_resolver, storage, hub, worker_pool, running: Arc::new(DashMap::new()) }
    }

    /// Admit a new execution and return its id. The published version is
    /// resolved and structurally validated synchronously, so a caller gets a
    /// validation error immediately; the run itself proceeds on a spawned
    /// task so the caller isn't blocked on the whole workflow.
    pub async fn start_execution(
        &self,
        flow_id: FlowId,
        trigger_type: TriggerType,
        triggered_by: Option<UserId>,
        trigger_input: Value,
    ) -> Result<ExecutionId> {
        let published = self
            .storage
            .find_published_version(flow_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("flow {flow_id} has no published version")))?;

        let parse = validate(&published.definition, None);
        if !parse.valid {
            return Err(Error::validation(format!("definition is invalid: {}", parse.errors.join("; "))));
        }

        let execution_id = ExecutionId::v4();
        let now = Utc::now();
        let execution_state = ExecutionState::new(
            execution_id,
            published.flow_version_id,
            trigger_type,
            triggered_by,
            trigger_input.clone(),
        );
        self.storage.create_execution(&execution_state).await?;
        self.journal(JournalEntry::ExecutionStarted { execution_id, at: now });
        self.hub.publish(StreamEvent::ExecutionCreated {
            execution_id,
            flow_version_id: published.flow_version_id,
            started_at: now,
        });

        let ctx = ExecutionContext::new(execution_id, Arc::new(published.definition.clone()), published.settings.clone());
        self.running.insert(execution_id, ctx.clone());

        let engine = self.clone();
        tokio::spawn(async move {
            engine.run(execution_id, published, execution_state, trigger_input, ctx, parse, triggered_by).await;
        });

        Ok(execution_id)
    }

    /// Request cancellation. Idempotent: a no-op for an unknown or
    /// already-settled execution (its entry has already been removed from
    /// `running` by the time it reaches a terminal status).
    pub fn cancel_execution(&self, execution_id: ExecutionId, reason: Option<String>) {
        if let Some(ctx) = self.running.get(&execution_id) {
            self.journal(JournalEntry::CancellationRequested { execution_id, reason: reason.clone(), at: Utc::now() });
            tracing::info!(%execution_id, reason = reason.as_deref().unwrap_or(""), "cancellation requested");
            ctx.cancel();
        }
    }

    #[must_use]
    pub fn subscribe(&self, execution_id: ExecutionId) -> Subscription {
        self.hub.subscribe(execution_id)
    }

    #[must_use]
    pub fn subscribe_all(&self) -> Subscription {
        self.hub.subscribe_all()
    }

    fn journal(&self, entry: JournalEntry) {
        match entry.to_json() {
            Ok(json) => tracing::trace!(target: "n3n_engine::journal", %json),
            Err(err) => tracing::warn!(error = %err, "failed to encode journal entry"),
        }
    }

    async fn run(
        &self,
        execution_id: ExecutionId,
        published: PublishedFlowVersion,
        mut execution_state: ExecutionState,
        trigger_input: Value,
        ctx: ExecutionContext,
        parse: ParseResult,
        triggered_by: Option<UserId>,
    ) {
        let outcome =
            self.run_inner(execution_id, &published, &mut execution_state, trigger_input, &ctx, &parse, triggered_by).await;
        let (final_status, error_message) = match outcome {
            Ok(result) => result,
            Err(err) => (ExecutionStatus::Failed, Some(err.message)),
        };

        let now = Utc::now();
        if execution_state.status != final_status {
            if let Err(err) = execution_state.transition_to(final_status, now) {
                tracing::error!(%execution_id, error = %err, "failed to record terminal execution status");
            }
        }
        if execution_state.error_message.is_none() {
            execution_state.error_message = error_message;
        }
        if let Err(err) = self.storage.update_execution(&execution_state).await {
            tracing::error!(%execution_id, error = %err, "failed to persist terminal execution state");
        }

        self.journal(JournalEntry::ExecutionCompleted { execution_id, status: final_status, at: now });
        self.hub.publish(StreamEvent::ExecutionStatus {
            execution_id,
            status: final_status,
            duration_ms: execution_state.duration_ms,
            error_message: execution_state.error_message.clone(),
        });
        self.hub.publish(StreamEvent::ExecutionCompleted { execution_id, status: final_status });

        self.running.remove(&execution_id);
    }

    /// Run the scheduling loop to completion, returning the execution's
    /// terminal status and, if it failed, the first node's error message.
    /// Storage failures bubble as `Err` and are treated as `Failed` by the
    /// caller — there is nowhere else for them to go from a spawned task.
    #[allow(clippy::too_many_arguments)]
    async fn run_inner(
        &self,
        execution_id: ExecutionId,
        published: &PublishedFlowVersion,
        execution_state: &mut ExecutionState,
        trigger_input: Value,
        ctx: &ExecutionContext,
        parse: &ParseResult,
        triggered_by: Option<UserId>,
    ) -> Result<(ExecutionStatus, Option<String>)> {
        let definition = &published.definition;
        let settings = &published.settings;
        let graph = DependencyGraph::build(definition);
        let plan = ExecutionPlan::from_definition(definition)?;
        let rank: HashMap<NodeId, usize> =
            parse.execution_order.iter().enumerate().map(|(i, &id)| (id, i)).collect();

        let retry_policy = RetryPolicy {
            max_attempts: settings.max_attempts,
            base_delay_ms: settings.retry_base_delay_ms,
            max_delay_ms: settings.retry_max_delay_ms,
        };
        let node_timeout = settings.node_timeout_ms.map(Duration::from_millis);
        let concurrency_cap = settings.concurrency_cap.max(1);
        let user_id = triggered_by.unwrap_or_else(UserId::nil);

        let started_at = Utc::now();
        execution_state.transition_to(ExecutionStatus::Running, started_at)?;
        self.storage.update_execution(execution_state).await?;
        self.journal(JournalEntry::ExecutionStatusChanged { execution_id, status: ExecutionStatus::Running, at: started_at });
        self.hub.publish(StreamEvent::ExecutionStatus {
            execution_id,
            status: ExecutionStatus::Running,
            duration_ms: None,
            error_message: None,
        });

        let mut node_status: HashMap<NodeId, NodeStatus> =
            definition.nodes.iter().map(|n| (n.id, NodeStatus::Pending)).collect();
        let mut node_execs: HashMap<NodeId, NodeExecutionState> = HashMap::new();
        let mut ready: Vec<NodeId> = plan.entry_nodes.clone();
        let mut inflight: JoinSet<(NodeId, NodeOutcome)> = JoinSet::new();
        let mut aborting = false;
        let mut final_status = ExecutionStatus::Completed;
        let mut first_error: Option<String> = None;

        let deadline = settings.execution_timeout_ms.map(|ms| tokio::time::Instant::now() + Duration::from_millis(ms));
        let mut timed_out = false;

        loop {
            if ctx.is_cancelled() && !aborting {
                aborting = true;
                final_status = ExecutionStatus::Cancelled;
            }

            while !aborting && !ready.is_empty() && inflight.len() < concurrency_cap {
                ready.sort_by_key(|id| rank.get(id).copied().unwrap_or(usize::MAX));
                let node_id = ready.remove(0);
                if node_status.get(&node_id).copied() != Some(NodeStatus::Pending) {
                    continue;
                }

                let Ok(permit) = Arc::clone(&self.worker_pool).acquire_owned().await else {
                    break;
                };
                let Some(node) = definition.node(node_id).cloned() else {
                    continue;
                };

                let input = merge_inputs(definition, node_id, &trigger_input, ctx);
                let now = Utc::now();
                self.begin_node(execution_id, &mut node_execs, node_id, input.clone(), now).await?;
                self.journal(JournalEntry::NodeDispatched { execution_id, node_id, attempt: 1, at: now });
                node_status.insert(node_id, NodeStatus::Running);
                self.hub.publish(StreamEvent::NodeStatus {
                    execution_id,
                    node_id,
                    status: NodeStatus::Running,
                    started_at: Some(now),
                    completed_at: None,
                    attempts: 1,
                });

                let registry = Arc::clone(&self.registry);
                let credential_resolver = Arc::clone(&self.credential_resolver);
                let hub = Arc::clone(&self.hub);
                let definition_arc = Arc::clone(&ctx.definition);
                let graph_owned = DependencyGraph::build(&definition_arc);
                let cancellation = ctx.child_cancellation();
                let retry_policy = retry_policy;
                let node_timeout = node_timeout;

                inflight.spawn(async move {
                    let _permit = permit;
                    let outcome = match node.kind() {
                        NodeKind::Condition => {
                            if cancellation.is_cancelled() {
                                NodeOutcome::Cancelled
                            } else {
                                let predicate = evaluate(&node.data.config, &input);
                                NodeOutcome::Completed(output_for(predicate))
                            }
                        }
                        NodeKind::Loop => {
                            let loop_request = LoopRequest {
                                execution_id,
                                loop_node: &node,
                                definition: &definition_arc,
                                graph: &graph_owned,
                                loop_input: input,
                                user_id,
                                registry,
                                credential_resolver,
                                hub,
                                retry_policy,
                                node_timeout,
                                cancellation,
                            };
                            match run_loop(loop_request).await {
                                Ok(value) => NodeOutcome::Completed(value),
                                Err(err) if err.kind == ErrorKind::Cancelled => NodeOutcome::Cancelled,
                                Err(err) => NodeOutcome::Failed { kind: err.kind, message: err.message },
                            }
                        }
                        _ => {
                            let handler = match registry.get(&node.r#type) {
                                Ok(handler) => handler,
                                Err(err) => return (node_id, NodeOutcome::Failed { kind: err.kind, message: err.message }),
                            };
                            let dispatch_request = DispatchRequest {
                                execution_id,
                                node_id,
                                user_id,
                                credential_id: node.data.credential_id,
                                node_config: node.data.config.clone(),
                                input_data: input,
                                retry_policy,
                                node_timeout,
                                cancellation,
                            };
                            let (outcome, _attempts) =
                                dispatch_node(dispatch_request, handler, credential_resolver, hub).await;
                            match outcome {
                                DispatchOutcome::Completed(output) => NodeOutcome::Completed(output.data),
                                DispatchOutcome::Failed { kind, message } => NodeOutcome::Failed { kind, message },
                                DispatchOutcome::Cancelled => NodeOutcome::Cancelled,
                            }
                        }
                    };
                    (node_id, outcome)
                });
            }

            if inflight.is_empty() && (aborting || ready.is_empty()) {
                break;
            }

            tokio::select! {
                biased;
                joined = inflight.join_next(), if !inflight.is_empty() => {
                    match joined {
                        Some(Ok((node_id, outcome))) => {
                            self.settle_node(
                                execution_id, &graph, definition, &mut node_status, &mut node_execs, &mut ready,
                                node_id, outcome, &mut aborting, &mut final_status, &mut first_error,
                            ).await?;
                        }
                        Some(Err(join_err)) => {
                            tracing::error!(%execution_id, error = %join_err, "node task panicked");
                        }
                        None => {}
                    }
                }
                () = async {
                    match deadline {
                        Some(d) => tokio::time::sleep_until(d).await,
                        None => std::future::pending::<()>().await,
                    }
                }, if deadline.is_some() && !timed_out => {
                    timed_out = true;
                    aborting = true;
                    final_status = ExecutionStatus::Failed;
                    first_error.get_or_insert_with(|| "execution exceeded its configured timeout".to_string());
                    ctx.cancel();
                }
            }
        }

        Ok((final_status, first_error))
    }

    /// Apply one settled node outcome: record its state, publish its events,
    /// run condition branch-skipping or `onFailure` skip propagation, and
    /// push newly-ready successors.
    #[allow(clippy::too_many_arguments)]
    async fn settle_node(
        &self,
        execution_id: ExecutionId,
        graph: &DependencyGraph,
        definition: &Definition,
        node_status: &mut HashMap<NodeId, NodeStatus>,
        node_execs: &mut HashMap<NodeId, NodeExecutionState>,
        ready: &mut Vec<NodeId>,
        node_id: NodeId,
        outcome: NodeOutcome,
        aborting: &mut bool,
        final_status: &mut ExecutionStatus,
        first_error: &mut Option<String>,
    ) -> Result<()> {
        let now = Utc::now();
        match outcome {
            NodeOutcome::Completed(value) => {
                node_status.insert(node_id, NodeStatus::Completed);
                self.complete_node(execution_id, node_execs, node_id, value.clone(), now).await?;
                self.journal(JournalEntry::NodeStatusChanged { execution_id, node_id, status: NodeStatus::Completed, at: now });
                self.hub.publish(StreamEvent::NodeStatus {
                    execution_id,
                    node_id,
                    status: NodeStatus::Completed,
                    started_at: node_execs.get(&node_id).and_then(|s| s.started_at),
                    completed_at: Some(now),
                    attempts: node_execs.get(&node_id).map(NodeExecutionState::attempt_count).unwrap_or(1),
                });
                self.hub.publish(StreamEvent::node_output(execution_id, node_id, &value));

                if let Some(node) = definition.node(node_id) {
                    if node.kind() == NodeKind::Condition {
                        self.apply_condition_skip(execution_id, definition, graph, node, &value, node_status, node_execs, now)
                            .await?;
                    }
                }

                for successor in graph.successors(node_id) {
                    let settled = node_status.get(&successor).copied() == Some(NodeStatus::Pending)
                        && graph
                            .predecessors(successor)
                            .iter()
                            .all(|p| node_status.get(p).copied().is_some_and(NodeStatus::is_terminal_non_failure));
                    if settled && !ready.contains(&successor) {
                        ready.push(successor);
                    }
                }
            }
            NodeOutcome::Cancelled => {
                self.cancel_node(execution_id, node_execs, node_id, now).await?;
                node_status.insert(node_id, NodeStatus::Cancelled);
                *aborting = true;
                *final_status = ExecutionStatus::Cancelled;
            }
            NodeOutcome::Failed { kind, message } if kind == ErrorKind::Cancelled => {
                self.cancel_node(execution_id, node_execs, node_id, now).await?;
                node_status.insert(node_id, NodeStatus::Cancelled);
                first_error.get_or_insert(message);
                *aborting = true;
                *final_status = ExecutionStatus::Cancelled;
            }
            NodeOutcome::Failed { message, .. } => {
                node_status.insert(node_id, NodeStatus::Failed);
                self.transition_node_exec(execution_id, node_execs, node_id, NodeStatus::Failed, now, Some(message.clone()))
                    .await?;
                self.journal(JournalEntry::NodeStatusChanged { execution_id, node_id, status: NodeStatus::Failed, at: now });
                self.hub.publish(StreamEvent::NodeStatus {
                    execution_id,
                    node_id,
                    status: NodeStatus::Failed,
                    started_at: node_execs.get(&node_id).and_then(|s| s.started_at),
                    completed_at: Some(now),
                    attempts: node_execs.get(&node_id).map(NodeExecutionState::attempt_count).unwrap_or(1),
                });
                first_error.get_or_insert_with(|| message.clone());

                let on_failure: OnFailure = definition
                    .node(node_id)
                    .and_then(|n| n.data.config.get("onFailure").cloned())
                    .and_then(|v| serde_json::from_value(v).ok())
                    .unwrap_or_default();

                match on_failure {
                    OnFailure::Abort => {
                        *aborting = true;
                        *final_status = ExecutionStatus::Failed;
                    }
                    OnFailure::Continue => {
                        for n in graph.node_ids() {
                            if n != node_id
                                && graph.is_reachable(node_id, n)
                                && node_status.get(&n).copied() == Some(NodeStatus::Pending)
                            {
                                self.skip_node(execution_id, node_execs, n, now, "upstream node failed (onFailure: continue)")
                                    .await?;
                                node_status.insert(n, NodeStatus::Skipped);
                            }
                        }
                    }
                    OnFailure::Isolate => {
                        for successor in graph.successors(node_id) {
                            if node_status.get(&successor).copied() == Some(NodeStatus::Pending) {
                                self.skip_node(
                                    execution_id,
                                    node_execs,
                                    successor,
                                    now,
                                    "upstream node failed (onFailure: isolate)",
                                )
                                .await?;
                                node_status.insert(successor, NodeStatus::Skipped);
                            }
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Mark the non-chosen handle's exclusively-reachable nodes `Skipped`.
    /// A node reachable through the chosen branch by any path stays pending.
    #[allow(clippy::too_many_arguments)]
    async fn apply_condition_skip(
        &self,
        execution_id: ExecutionId,
        definition: &Definition,
        graph: &DependencyGraph,
        node: &Node,
        output: &Value,
        node_status: &mut HashMap<NodeId, NodeStatus>,
        node_execs: &mut HashMap<NodeId, NodeExecutionState>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let chosen_handle = output.get("branch").and_then(Value::as_str).unwrap_or(TRUE_HANDLE);
        let other_handle = if chosen_handle == TRUE_HANDLE { FALSE_HANDLE } else { TRUE_HANDLE };

        let chosen_target =
            definition.outgoing(node.id).find(|e| e.source_handle.as_deref() == Some(chosen_handle)).map(|e| e.target);
        let other_target =
            definition.outgoing(node.id).find(|e| e.source_handle.as_deref() == Some(other_handle)).map(|e| e.target);

        let Some(other_target) = other_target else { return Ok(()) };
        for n in graph.node_ids() {
            let via_other = n == other_target || graph.is_reachable(other_target, n);
            let via_chosen = chosen_target.is_some_and(|c| c == n || graph.is_reachable(c, n));
            if via_other && !via_chosen && node_status.get(&n).copied() == Some(NodeStatus::Pending) {
                self.skip_node(execution_id, node_execs, n, now, "condition branch not taken").await?;
                node_status.insert(n, NodeStatus::Skipped);
            }
        }
        Ok(())
    }

    async fn begin_node(
        &self,
        execution_id: ExecutionId,
        node_execs: &mut HashMap<NodeId, NodeExecutionState>,
        node_id: NodeId,
        input: Value,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let mut state = NodeExecutionState::new(execution_id, node_id, input);
        state.transition_to(NodeStatus::Running, now)?;
        self.storage.create_node_execution(&state).await?;
        node_execs.insert(node_id, state);
        Ok(())
    }

    async fn complete_node(
        &self,
        execution_id: ExecutionId,
        node_execs: &mut HashMap<NodeId, NodeExecutionState>,
        node_id: NodeId,
        output: Value,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let state =
            node_execs.entry(node_id).or_insert_with(|| NodeExecutionState::new(execution_id, node_id, Value::Null));
        state.record_output(NodeOutput::new(output));
        state.transition_to(NodeStatus::Completed, now)?;
        self.storage.update_node_execution(state).await
    }

    async fn cancel_node(
        &self,
        execution_id: ExecutionId,
        node_execs: &mut HashMap<NodeId, NodeExecutionState>,
        node_id: NodeId,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.transition_node_exec(execution_id, node_execs, node_id, NodeStatus::Cancelled, now, None).await?;
        self.journal(JournalEntry::NodeStatusChanged { execution_id, node_id, status: NodeStatus::Cancelled, at: now });
        self.hub.publish(StreamEvent::NodeStatus {
            execution_id,
            node_id,
            status: NodeStatus::Cancelled,
            started_at: None,
            completed_at: Some(now),
            attempts: 1,
        });
        Ok(())
    }

    async fn transition_node_exec(
        &self,
        execution_id: ExecutionId,
        node_execs: &mut HashMap<NodeId, NodeExecutionState>,
        node_id: NodeId,
        status: NodeStatus,
        now: DateTime<Utc>,
        error_message: Option<String>,
    ) -> Result<()> {
        let state =
            node_execs.entry(node_id).or_insert_with(|| NodeExecutionState::new(execution_id, node_id, Value::Null));
        if let Some(message) = error_message {
            state.record_error(message);
        }
        state.transition_to(status, now)?;
        self.storage.update_node_execution(state).await
    }

    async fn skip_node(
        &self,
        execution_id: ExecutionId,
        node_execs: &mut HashMap<NodeId, NodeExecutionState>,
        node_id: NodeId,
        now: DateTime<Utc>,
        reason: &str,
    ) -> Result<()> {
        let is_new = !node_execs.contains_key(&node_id);
        let state =
            node_execs.entry(node_id).or_insert_with(|| NodeExecutionState::new(execution_id, node_id, Value::Null));
        state.transition_to(NodeStatus::Skipped, now)?;
        if is_new {
            self.storage.create_node_execution(state).await?;
        } else {
            self.storage.update_node_execution(state).await?;
        }
        self.journal(JournalEntry::NodeSkipped { execution_id, node_id, reason: reason.to_string(), at: now });
        self.hub.publish(StreamEvent::NodeStatus {
            execution_id,
            node_id,
            status: NodeStatus::Skipped,
            started_at: None,
            completed_at: Some(now),
            attempts: 0,
        });
        Ok(())
    }
}
