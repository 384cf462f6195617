//! Handler discovery, metadata and dispatch (spec component C1).

mod dynamic;
mod handler;
mod registry;

pub use dynamic::{DynamicHandler, DynamicHandlerSpec, FieldSpec, OperationSpec, ResourceSpec};
pub use handler::{CredentialResolver, Handler, HandlerContext, HandlerMetadata};
pub use registry::HandlerRegistry;
