//! Loop-node execution (spec §4.3): re-runs a body subgraph once per item
//! in a collection, sequentially, accumulating each iteration's output into
//! an array. Only the loop node's own `NodeExecution` is visible outside
//! this module — per-iteration bookkeeping is private to one `run_loop`
//! call, matching the spec's "only the outermost id appears in the
//! user-visible aggregate".
//!
//! Nesting another condition or loop node inside a loop body is not
//! supported; such a node fails the containing iteration with a
//! `VALIDATION` error.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use n3n_core::{ExecutionId, NodeId, OnFailure, RetryPolicy, UserId};
use n3n_dag::{Definition, DependencyGraph, Node, NodeKind};
use n3n_error::{Error, Result};
use n3n_execution::NodeOutput;
use n3n_registry::{CredentialResolver, HandlerRegistry};
use n3n_stream::StreamHub;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::condition::lookup_path;
use crate::dispatch::{dispatch_node, DispatchOutcome, DispatchRequest};

pub const BODY_HANDLE: &str = "body";
pub const AFTER_HANDLE: &str = "after";

pub struct LoopRequest<'a> {
    pub execution_id: ExecutionId,
    pub loop_node: &'a Node,
    pub definition: &'a Definition,
    pub graph: &'a DependencyGraph,
    pub loop_input: Value,
    pub user_id: UserId,
    pub registry: Arc<HandlerRegistry>,
    pub credential_resolver: Arc<dyn CredentialResolver>,
    pub hub: Arc<StreamHub>,
    pub retry_policy: RetryPolicy,
    pub node_timeout: Option<Duration>,
    pub cancellation: CancellationToken,
}

/// Run every iteration of a loop node to completion, returning the
/// accumulated array of per-iteration outputs. An `Abort`-policy body
/// failure or a cancellation surfaces as `Err` so the caller can treat the
/// loop node itself as failed/cancelled the same way a plain dispatch would.
pub async fn run_loop(request: LoopRequest<'_>) -> Result<Value> {
    let on_failure: OnFailure = request
        .loop_node
        .data
        .config
        .get("onFailure")
        .and_then(|v| serde_json::from_value(v.clone()).ok())
        .unwrap_or_default();

    let items = resolve_items(&request.loop_node.data.config, &request.loop_input)?;
    let body = BodySubgraph::extract(request.definition, request.graph, request.loop_node.id)?;

    let body_graph = DependencyGraph::build(&body.definition);
    let waves = body_graph.parallel_groups();

    let mut accumulated = Vec::with_capacity(items.len());

    for (index, item) in items.into_iter().enumerate() {
        if request.cancellation.is_cancelled() {
            return Err(Error::cancelled());
        }
        let iteration = run_iteration(&request, &body, &body_graph, &waves, item, on_failure).await?;
        tracing::debug!(loop_node = %request.loop_node.id, index, "loop iteration settled");
        accumulated.push(iteration);
    }

    Ok(Value::Array(accumulated))
}

async fn run_iteration(
    request: &LoopRequest<'_>,
    body: &BodySubgraph,
    body_graph: &DependencyGraph,
    waves: &[Vec<NodeId>],
    item: Value,
    on_failure: OnFailure,
) -> Result<Value> {
    let mut local_outputs: std::collections::HashMap<NodeId, NodeOutput> = std::collections::HashMap::new();
    let mut skipped: HashSet<NodeId> = HashSet::new();
    let mut last_error: Option<Error> = None;

    for wave in waves {
        for &node_id in wave {
            if request.cancellation.is_cancelled() {
                return Err(Error::cancelled());
            }
            if skipped.contains(&node_id) {
                continue;
            }

            let node = body
                .definition
                .node(node_id)
                .ok_or_else(|| Error::validation("loop body node vanished from its own subgraph"))?;
            if matches!(node.kind(), NodeKind::Condition | NodeKind::Loop) {
                return Err(Error::validation("nested condition/loop nodes are not supported inside a loop body"));
            }

            let input = if node_id == body.entry {
                item.clone()
            } else {
                merge_body_input(&body.definition, node_id, &local_outputs)
            };

            let handler = request.registry.get(&node.r#type)?;
            let dispatch_request = DispatchRequest {
                execution_id: request.execution_id,
                node_id,
                user_id: request.user_id,
                credential_id: node.data.credential_id,
                node_config: node.data.config.clone(),
                input_data: input,
                retry_policy: request.retry_policy,
                node_timeout: request.node_timeout,
                cancellation: request.cancellation.child_token(),
            };
            let (outcome, _attempts) =
                dispatch_node(dispatch_request, handler, Arc::clone(&request.credential_resolver), Arc::clone(&request.hub)).await;

            match outcome {
                DispatchOutcome::Completed(output) => {
                    local_outputs.insert(node_id, output);
                }
                DispatchOutcome::Cancelled => return Err(Error::cancelled()),
                DispatchOutcome::Failed { kind, message } => {
                    if on_failure == OnFailure::Abort {
                        return Err(Error::new(kind, message));
                    }
                    last_error = Some(Error::new(kind, message));
                    match on_failure {
                        OnFailure::Abort => unreachable!("handled above"),
                        OnFailure::Continue => {
                            for n in body_graph.node_ids() {
                                if body_graph.is_reachable(node_id, n) {
                                    skipped.insert(n);
                                }
                            }
                        }
                        OnFailure::Isolate => {
                            for successor in body_graph.successors(node_id) {
                                skipped.insert(successor);
                            }
                        }
                    }
                }
            }
        }
    }

    if let Some(error) = last_error {
        return Ok(serde_json::json!({"error": error.message}));
    }

    let sinks: Vec<NodeId> =
        body.definition.nodes.iter().map(|n| n.id).filter(|&id| body.definition.outgoing(id).next().is_none()).collect();
    Ok(match sinks.as_slice() {
        [] => Value::Null,
        [only] => local_outputs.get(only).map(|o| o.data.clone()).unwrap_or(Value::Null),
        many => {
            let mut map = serde_json::Map::with_capacity(many.len());
            for &id in many {
                map.insert(id.to_string(), local_outputs.get(&id).map(|o| o.data.clone()).unwrap_or(Value::Null));
            }
            Value::Object(map)
        }
    })
}

fn merge_body_input(
    definition: &Definition,
    node_id: NodeId,
    local_outputs: &std::collections::HashMap<NodeId, NodeOutput>,
) -> Value {
    let incoming: Vec<_> = definition.incoming(node_id).collect();
    match incoming.as_slice() {
        [] => Value::Null,
        [only] => local_outputs.get(&only.source).map(|o| o.data.clone()).unwrap_or(Value::Null),
        many => {
            let mut map = serde_json::Map::with_capacity(many.len());
            for edge in many {
                let key = edge.target_handle.clone().unwrap_or_else(|| edge.source.to_string());
                map.insert(key, local_outputs.get(&edge.source).map(|o| o.data.clone()).unwrap_or(Value::Null));
            }
            Value::Object(map)
        }
    }
}

fn resolve_items(config: &Value, loop_input: &Value) -> Result<Vec<Value>> {
    let scoped = match config.get("items").and_then(Value::as_str) {
        Some(path) => lookup_path(loop_input, path),
        None => loop_input.clone(),
    };
    match scoped {
        Value::Array(items) => Ok(items),
        other => Err(Error::validation(format!("loop items must resolve to an array, got {other}"))),
    }
}

/// The node set and internal edges reachable from a loop's `body` handle,
/// excluding anything only reachable via its `after` handle.
struct BodySubgraph {
    entry: NodeId,
    definition: Definition,
}

impl BodySubgraph {
    fn extract(definition: &Definition, graph: &DependencyGraph, loop_id: NodeId) -> Result<Self> {
        let body_edge = definition
            .outgoing(loop_id)
            .find(|e| e.source_handle.as_deref() == Some(BODY_HANDLE))
            .ok_or_else(|| Error::validation("loop node has no 'body' outgoing edge"))?;
        let entry = body_edge.target;
        let after_target = definition.outgoing(loop_id).find(|e| e.source_handle.as_deref() == Some(AFTER_HANDLE)).map(|e| e.target);

        let body_nodes: HashSet<NodeId> = graph
            .node_ids()
            .into_iter()
            .filter(|&id| id == entry || graph.is_reachable(entry, id))
            .filter(|&id| match after_target {
                Some(after) => id != after && !graph.is_reachable(after, id),
                None => true,
            })
            .collect();

        let nodes = definition.nodes.iter().filter(|n| body_nodes.contains(&n.id)).cloned().collect();
        let edges = definition
            .edges
            .iter()
            .filter(|e| body_nodes.contains(&e.source) && body_nodes.contains(&e.target))
            .cloned()
            .collect();

        Ok(Self { entry, definition: Definition { nodes, edges, viewport: None } })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use n3n_core::{CredentialId, EdgeId};
    use n3n_dag::{Edge, NodeData, Position};
    use n3n_registry::{Handler, HandlerContext, HandlerMetadata};

    struct DoubleHandler;

    #[async_trait]
    impl Handler for DoubleHandler {
        fn r#type(&self) -> &str {
            "double"
        }
        fn metadata(&self) -> HandlerMetadata {
            HandlerMetadata::new("Double", "multiplies by two", "test")
        }
        async fn execute(&self, ctx: HandlerContext<'_>) -> n3n_error::Result<Value> {
            let n = ctx.input_data.as_i64().unwrap_or(0);
            Ok(serde_json::json!(n * 2))
        }
    }

    struct NoopResolver;

    #[async_trait]
    impl CredentialResolver for NoopResolver {
        async fn resolve(&self, _credential_id: CredentialId, _user_id: UserId) -> n3n_error::Result<Value> {
            Ok(serde_json::json!({}))
        }
    }

    fn node(id: NodeId, type_name: &str) -> Node {
        Node {
            id,
            r#type: type_name.to_string(),
            data: NodeData { label: type_name.to_string(), config: serde_json::json!({}), credential_id: None, node_type: None },
            position: Position { x: 0.0, y: 0.0 },
        }
    }

    fn edge(source: NodeId, target: NodeId, handle: Option<&str>) -> Edge {
        Edge { id: EdgeId::v4(), source, target, source_handle: handle.map(str::to_string), target_handle: None }
    }

    #[tokio::test]
    async fn doubles_each_item_and_accumulates() {
        let loop_id = NodeId::v4();
        let body_entry = NodeId::v4();
        let after = NodeId::v4();

        let loop_node = Node {
            id: loop_id,
            r#type: "loop".to_string(),
            data: NodeData { label: "loop".to_string(), config: serde_json::json!({}), credential_id: None, node_type: None },
            position: Position { x: 0.0, y: 0.0 },
        };
        let definition = Definition {
            nodes: vec![loop_node.clone(), node(body_entry, "double"), node(after, "output")],
            edges: vec![edge(loop_id, body_entry, Some(BODY_HANDLE)), edge(loop_id, after, Some(AFTER_HANDLE))],
            viewport: None,
        };
        let graph = DependencyGraph::build(&definition);
        let registry = Arc::new(HandlerRegistry::new());
        registry.register(Arc::new(DoubleHandler)).unwrap();

        let request = LoopRequest {
            execution_id: ExecutionId::v4(),
            loop_node: &loop_node,
            definition: &definition,
            graph: &graph,
            loop_input: serde_json::json!([1, 2, 3]),
            user_id: UserId::v4(),
            registry,
            credential_resolver: Arc::new(NoopResolver),
            hub: Arc::new(StreamHub::new()),
            retry_policy: RetryPolicy::default(),
            node_timeout: None,
            cancellation: CancellationToken::new(),
        };
        let output = run_loop(request).await.unwrap();
        assert_eq!(output, serde_json::json!([2, 4, 6]));
    }

    #[test]
    fn resolve_items_rejects_non_array() {
        let err = resolve_items(&serde_json::json!({}), &serde_json::json!({"a": 1})).unwrap_err();
        assert_eq!(err.kind, n3n_error::ErrorKind::Validation);
    }
}
