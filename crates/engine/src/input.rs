//! Predecessor-output merging (spec §4.3 "input resolution"): a node with
//! no predecessors gets the execution's trigger input verbatim, a node with
//! exactly one predecessor gets that predecessor's output flattened, and a
//! node with several predecessors gets an object keyed by each incoming
//! edge's `targetHandle` (falling back to the predecessor's id when the
//! edge carries no handle).

use n3n_core::NodeId;
use n3n_dag::Definition;
use n3n_execution::ExecutionContext;
use serde_json::Value;

#[must_use]
pub fn merge_inputs(
    definition: &Definition,
    node_id: NodeId,
    execution_input: &Value,
    ctx: &ExecutionContext,
) -> Value {
    let incoming: Vec<_> = definition.incoming(node_id).collect();
    match incoming.as_slice() {
        [] => execution_input.clone(),
        [only] => ctx.output_of(only.source).map(|o| o.data).unwrap_or(Value::Null),
        many => {
            let mut map = serde_json::Map::with_capacity(many.len());
            for edge in many {
                let key = edge.target_handle.clone().unwrap_or_else(|| edge.source.to_string());
                let value = ctx.output_of(edge.source).map(|o| o.data).unwrap_or(Value::Null);
                map.insert(key, value);
            }
            Value::Object(map)
        }
    }
}
