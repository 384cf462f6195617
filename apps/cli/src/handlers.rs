//! A handful of built-in node handlers, enough to run the example flows
//! this wrapper ships with. Real deployments register the handler catalogue
//! (spec §1: "the library of individual node handlers") separately; this
//! crate only needs a minimal set conforming to the same [`Handler`]
//! contract to demonstrate the engine end to end.

use std::time::Duration;

use async_trait::async_trait;
use n3n_error::Result;
use n3n_registry::{Handler, HandlerContext, HandlerMetadata};
use serde_json::Value;

/// Returns its input unchanged. Registered for every structural entry type
/// (`trigger`, `scheduleTrigger`, `webhook`) and for `output` nodes, since
/// the scheduler dispatches every non-condition, non-loop node through the
/// registry regardless of its structural role.
pub struct EchoHandler {
    type_name: &'static str,
}

impl EchoHandler {
    #[must_use]
    pub fn new(type_name: &'static str) -> Self {
        Self { type_name }
    }
}

#[async_trait]
impl Handler for EchoHandler {
    fn r#type(&self) -> &str {
        self.type_name
    }

    fn metadata(&self) -> HandlerMetadata {
        HandlerMetadata::new("Echo", "Returns its input unchanged", "utility")
    }

    async fn execute(&self, ctx: HandlerContext<'_>) -> Result<Value> {
        Ok(ctx.input_data.clone())
    }
}

/// Logs its config's `message` field via `tracing` and returns `{"logged": true}`.
pub struct LogHandler;

#[async_trait]
impl Handler for LogHandler {
    fn r#type(&self) -> &str {
        "log"
    }

    fn metadata(&self) -> HandlerMetadata {
        HandlerMetadata::new("Log", "Writes a message to the process log", "utility")
    }

    async fn execute(&self, ctx: HandlerContext<'_>) -> Result<Value> {
        let message = ctx.node_config.get("message").and_then(Value::as_str).unwrap_or("(no message)");
        tracing::info!(target: "n3n::handler::log", %message);
        Ok(serde_json::json!({"logged": true}))
    }
}

/// Sleeps for `config.ms` milliseconds, honoring cancellation.
pub struct DelayHandler;

#[async_trait]
impl Handler for DelayHandler {
    fn r#type(&self) -> &str {
        "delay"
    }

    fn metadata(&self) -> HandlerMetadata {
        HandlerMetadata::new("Delay", "Waits a configured number of milliseconds", "flow-control")
    }

    async fn execute(&self, ctx: HandlerContext<'_>) -> Result<Value> {
        let ms = ctx.node_config.get("ms").and_then(Value::as_u64).unwrap_or(0);
        tokio::select! {
            () = tokio::time::sleep(Duration::from_millis(ms)) => Ok(serde_json::json!({"slept_ms": ms})),
            () = ctx.cancellation.cancelled() => Err(n3n_error::Error::cancelled()),
        }
    }
}

/// A stand-in for the real HTTP-call handler: echoes back a configurable
/// status code rather than reaching an external service, for local flow
/// demos and S1-style scenarios.
pub struct HttpStubHandler;

#[async_trait]
impl Handler for HttpStubHandler {
    fn r#type(&self) -> &str {
        "httpRequest"
    }

    fn metadata(&self) -> HandlerMetadata {
        HandlerMetadata::new("HTTP Request (stub)", "Simulates an HTTP call without a network", "network")
    }

    async fn execute(&self, ctx: HandlerContext<'_>) -> Result<Value> {
        let status = ctx.node_config.get("status").and_then(Value::as_u64).unwrap_or(200);
        Ok(serde_json::json!({"status": status}))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use n3n_core::UserId;
    use n3n_registry::CredentialResolver;
    use tokio_util::sync::CancellationToken;

    struct NoopResolver;
    #[async_trait]
    impl CredentialResolver for NoopResolver {
        async fn resolve(&self, _credential_id: n3n_core::CredentialId, _user_id: UserId) -> Result<Value> {
            Ok(serde_json::json!({}))
        }
    }

    fn ctx<'a>(config: &'a Value, input: &'a Value) -> HandlerContext<'a> {
        HandlerContext {
            node_config: config,
            input_data: input,
            user_id: UserId::v4(),
            credential_id: None,
            credential_resolver: &NoopResolver,
            cancellation: CancellationToken::new(),
        }
    }

    #[tokio::test]
    async fn echo_returns_input_verbatim() {
        let handler = EchoHandler::new("trigger");
        let input = serde_json::json!({"a": 1});
        let output = handler.execute(ctx(&serde_json::json!({}), &input)).await.unwrap();
        assert_eq!(output, input);
    }

    #[tokio::test]
    async fn http_stub_defaults_to_200() {
        let output = HttpStubHandler.execute(ctx(&serde_json::json!({}), &Value::Null)).await.unwrap();
        assert_eq!(output, serde_json::json!({"status": 200}));
    }

    #[tokio::test]
    async fn http_stub_honors_configured_status() {
        let output =
            HttpStubHandler.execute(ctx(&serde_json::json!({"status": 404}), &Value::Null)).await.unwrap();
        assert_eq!(output, serde_json::json!({"status": 404}));
    }

    #[tokio::test]
    async fn delay_reports_slept_duration() {
        let output = DelayHandler.execute(ctx(&serde_json::json!({"ms": 5}), &Value::Null)).await.unwrap();
        assert_eq!(output, serde_json::json!({"slept_ms": 5}));
    }
}
