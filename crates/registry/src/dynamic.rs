//! Dynamic plug-in handlers built from a declarative `(resource, operation)`
//! spec, installed at runtime rather than compiled in. Implements the same
//! [`Handler`] contract as a statically-typed handler.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use async_trait::async_trait;
use n3n_error::Error;
use serde::{Deserialize, Serialize};

use crate::handler::{Handler, HandlerContext, HandlerMetadata};

/// One field a resource/operation pair accepts in its config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub required: bool,
}

/// One operation available on a resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationSpec {
    pub name: String,
    #[serde(default)]
    pub fields: Vec<FieldSpec>,
}

/// One resource a dynamic handler exposes, with its operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceSpec {
    pub name: String,
    pub operations: Vec<OperationSpec>,
}

/// The declarative table a [`DynamicHandler`] is built from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DynamicHandlerSpec {
    pub type_name: String,
    pub metadata: HandlerMetadata,
    pub resources: Vec<ResourceSpec>,
}

type OperationFn = Arc<
    dyn Fn(HandlerContext<'_>) -> Pin<Box<dyn Future<Output = n3n_error::Result<serde_json::Value>> + Send + '_>>
        + Send
        + Sync,
>;

use std::sync::Arc;

/// A handler whose behavior is interpreted from a `(resource, operation)`
/// table at dispatch time, rather than a compiled-in implementation.
///
/// The node's `config` must carry `{"resource": "...", "operation": "..."}`;
/// the handler validates that pair against the declared spec, then invokes
/// the registered implementation function for that pair.
pub struct DynamicHandler {
    spec: DynamicHandlerSpec,
    implementations: HashMap<(String, String), OperationFn>,
}

impl DynamicHandler {
    #[must_use]
    pub fn new(spec: DynamicHandlerSpec) -> Self {
        Self {
            spec,
            implementations: HashMap::new(),
        }
    }

    /// Register the implementation invoked for a given `(resource, operation)`.
    pub fn with_operation<F, Fut>(mut self, resource: impl Into<String>, operation: impl Into<String>, f: F) -> Self
    where
        F: Fn(HandlerContext<'_>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = n3n_error::Result<serde_json::Value>> + Send + 'static,
    {
        self.implementations
            .insert((resource.into(), operation.into()), Arc::new(move |ctx| Box::pin(f(ctx))));
        self
    }

    fn find_resource(&self, resource: &str) -> Option<&ResourceSpec> {
        self.spec.resources.iter().find(|r| r.name == resource)
    }
}

#[async_trait]
impl Handler for DynamicHandler {
    fn r#type(&self) -> &str {
        &self.spec.type_name
    }

    fn metadata(&self) -> HandlerMetadata {
        self.spec.metadata.clone()
    }

    async fn execute(&self, ctx: HandlerContext<'_>) -> n3n_error::Result<serde_json::Value> {
        let resource = ctx
            .node_config
            .get("resource")
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| Error::validation("dynamic handler config missing 'resource'"))?;
        let operation = ctx
            .node_config
            .get("operation")
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| Error::validation("dynamic handler config missing 'operation'"))?;

        let resource_spec = self
            .find_resource(resource)
            .ok_or_else(|| Error::validation(format!("unknown resource '{resource}'")))?;
        if !resource_spec.operations.iter().any(|op| op.name == operation) {
            return Err(Error::validation(format!(
                "resource '{resource}' has no operation '{operation}'"
            )));
        }

        let key = (resource.to_string(), operation.to_string());
        let implementation = self
            .implementations
            .get(&key)
            .ok_or_else(|| Error::handler_error(format!("no implementation bound for {resource}.{operation}")))?;
        implementation(ctx).await
    }
}
