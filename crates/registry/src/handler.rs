//! The handler contract (spec §4.1): the uniform interface every node type,
//! static or dynamic, implements.

use async_trait::async_trait;
use n3n_core::{CredentialId, UserId};
use tokio_util::sync::CancellationToken;

/// Resolves a credential id into its decrypted payload. The engine never
/// stores or logs the result; it is handed to handler context only.
#[async_trait]
pub trait CredentialResolver: Send + Sync {
    async fn resolve(&self, credential_id: CredentialId, user_id: UserId) -> n3n_error::Result<serde_json::Value>;
}

/// UI/validation-facing description of a handler.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct HandlerMetadata {
    pub display_name: String,
    pub description: String,
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default)]
    pub inputs: Vec<String>,
    #[serde(default)]
    pub outputs: Vec<String>,
    #[serde(default)]
    pub config_schema: serde_json::Value,
}

impl HandlerMetadata {
    #[must_use]
    pub fn new(display_name: impl Into<String>, description: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            description: description.into(),
            category: category.into(),
            icon: None,
            inputs: Vec::new(),
            outputs: Vec::new(),
            config_schema: serde_json::json!({}),
        }
    }
}

/// Per-call context a handler receives from the engine.
pub struct HandlerContext<'a> {
    pub node_config: &'a serde_json::Value,
    pub input_data: &'a serde_json::Value,
    pub user_id: UserId,
    pub credential_id: Option<CredentialId>,
    pub credential_resolver: &'a dyn CredentialResolver,
    pub cancellation: CancellationToken,
}

impl<'a> HandlerContext<'a> {
    /// Resolve this node's bound credential, if any.
    pub async fn resolve_credential(&self) -> n3n_error::Result<Option<serde_json::Value>> {
        match self.credential_id {
            Some(id) => Ok(Some(self.credential_resolver.resolve(id, self.user_id).await?)),
            None => Ok(None),
        }
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }
}

/// The uniform contract every node handler implements.
///
/// Unknown types never reach a handler — the registry reports
/// `UNKNOWN_HANDLER` before dispatch. Handler-internal panics/errors are
/// trapped by the engine and converted to `HANDLER_ERROR`.
#[async_trait]
pub trait Handler: Send + Sync {
    /// Unique node type string, stable per process.
    fn r#type(&self) -> &str;

    fn metadata(&self) -> HandlerMetadata;

    async fn execute(&self, ctx: HandlerContext<'_>) -> n3n_error::Result<serde_json::Value>;
}
