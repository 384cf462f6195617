//! Flow definition model, structural DAG validation and deterministic
//! execution-order planning (spec component C2).

mod graph;
mod model;
mod validate;

pub use graph::DependencyGraph;
pub use model::{Definition, Edge, Node, NodeData, NodeKind, NodeState, Position, Viewport};
pub use validate::{validate, ParseResult};
