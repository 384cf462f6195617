//! Single-node dispatch: merges predecessor outputs into an input value,
//! calls the handler registry, and owns the retry-with-backoff loop (spec
//! §4.3 "Retry"). Runs inside one spawned task per node so concurrent
//! dispatches (bounded by the engine's global semaphore and the
//! execution's own concurrency cap) don't block each other on backoff
//! sleeps.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use n3n_core::{CredentialId, NodeId, RetryPolicy, UserId};
use n3n_error::ErrorKind;
use n3n_execution::{IdempotencyKey, NodeAttempt, NodeOutput};
use n3n_registry::{CredentialResolver, Handler, HandlerContext};
use n3n_stream::StreamEvent;
use n3n_stream::StreamHub;
use tokio_util::sync::CancellationToken;

/// The terminal result of dispatching one node to completion (success,
/// exhausted retries, or a non-retryable failure).
pub enum DispatchOutcome {
    Completed(NodeOutput),
    Failed { kind: ErrorKind, message: String },
    Cancelled,
}

/// Everything [`dispatch_node`] needs that doesn't change between attempts.
pub struct DispatchRequest {
    pub execution_id: n3n_core::ExecutionId,
    pub node_id: NodeId,
    pub user_id: UserId,
    pub credential_id: Option<CredentialId>,
    pub node_config: serde_json::Value,
    pub input_data: serde_json::Value,
    pub retry_policy: RetryPolicy,
    pub node_timeout: Option<Duration>,
    pub cancellation: CancellationToken,
}

/// Dispatch one node to its handler, retrying `TRANSIENT` failures with
/// exponential backoff up to `retry_policy.max_attempts`, and enforcing a
/// per-node timeout if configured. Returns the outcome plus the full
/// attempt history for the caller to persist.
pub async fn dispatch_node(
    request: DispatchRequest,
    handler: Arc<dyn Handler>,
    credential_resolver: Arc<dyn CredentialResolver>,
    hub: Arc<StreamHub>,
) -> (DispatchOutcome, Vec<NodeAttempt>) {
    let mut attempts = Vec::new();
    let mut attempt_number = 1u32;

    loop {
        if request.cancellation.is_cancelled() {
            return (DispatchOutcome::Cancelled, attempts);
        }

        let key = IdempotencyKey::generate(request.execution_id, request.node_id, attempt_number);
        let started_at = Utc::now();
        let mut attempt = NodeAttempt::start(attempt_number, key.to_string(), started_at);

        hub.publish(StreamEvent::NodeStatus {
            execution_id: request.execution_id,
            node_id: request.node_id,
            status: n3n_execution::NodeStatus::Running,
            started_at: Some(started_at),
            completed_at: None,
            attempts: attempt_number,
        });

        let ctx = HandlerContext {
            node_config: &request.node_config,
            input_data: &request.input_data,
            user_id: request.user_id,
            credential_id: request.credential_id,
            credential_resolver: credential_resolver.as_ref(),
            cancellation: request.cancellation.child_token(),
        };

        let call = handler.execute(ctx);
        let outcome = match request.node_timeout {
            Some(duration) => match tokio::time::timeout(duration, call).await {
                Ok(result) => result,
                Err(_) => Err(n3n_error::Error::timeout(format!(
                    "node {} exceeded its {duration:?} timeout",
                    request.node_id
                ))),
            },
            None => call.await,
        };

        let now = Utc::now();
        match outcome {
            Ok(value) => {
                let output = NodeOutput::new(value);
                attempt.complete_ok(output.clone(), now);
                attempts.push(attempt);
                return (DispatchOutcome::Completed(output), attempts);
            }
            Err(err) => {
                attempt.complete_err(err.message.clone(), now);
                attempts.push(attempt);

                let can_retry = err.kind == ErrorKind::Transient && attempt_number < request.retry_policy.max_attempts;
                if !can_retry {
                    return (DispatchOutcome::Failed { kind: err.kind, message: err.message }, attempts);
                }

                let delay_ms = request.retry_policy.backoff_for_attempt(attempt_number);
                hub.publish(StreamEvent::NodeStatus {
                    execution_id: request.execution_id,
                    node_id: request.node_id,
                    status: n3n_execution::NodeStatus::Running,
                    started_at: Some(started_at),
                    completed_at: None,
                    attempts: attempt_number,
                });
                tracing::debug!(node_id = %request.node_id, delay_ms, "retrying transient node failure");

                tokio::select! {
                    () = tokio::time::sleep(Duration::from_millis(delay_ms)) => {}
                    () = request.cancellation.cancelled() => return (DispatchOutcome::Cancelled, attempts),
                }
                attempt_number += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use n3n_core::UserId;
    use n3n_registry::HandlerMetadata;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakyHandler {
        fail_until: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl Handler for FlakyHandler {
        fn r#type(&self) -> &str {
            "flaky"
        }
        fn metadata(&self) -> HandlerMetadata {
            HandlerMetadata::new("Flaky", "fails then succeeds", "test")
        }
        async fn execute(&self, _ctx: HandlerContext<'_>) -> n3n_error::Result<serde_json::Value> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call < self.fail_until {
                Err(n3n_error::Error::transient("not yet"))
            } else {
                Ok(serde_json::json!({"ok": true}))
            }
        }
    }

    struct NoopResolver;

    #[async_trait]
    impl CredentialResolver for NoopResolver {
        async fn resolve(&self, _credential_id: CredentialId, _user_id: UserId) -> n3n_error::Result<serde_json::Value> {
            Ok(serde_json::json!({}))
        }
    }

    fn request(node_id: NodeId, retry_policy: RetryPolicy) -> DispatchRequest {
        DispatchRequest {
            execution_id: n3n_core::ExecutionId::v4(),
            node_id,
            user_id: UserId::v4(),
            credential_id: None,
            node_config: serde_json::json!({}),
            input_data: serde_json::json!({}),
            retry_policy,
            node_timeout: None,
            cancellation: CancellationToken::new(),
        }
    }

    #[tokio::test]
    async fn succeeds_after_transient_retries() {
        let handler: Arc<dyn Handler> = Arc::new(FlakyHandler { fail_until: 3, calls: AtomicU32::new(0) });
        let retry_policy = RetryPolicy { max_attempts: 3, base_delay_ms: 1, max_delay_ms: 5 };
        let (outcome, attempts) = dispatch_node(
            request(NodeId::v4(), retry_policy),
            handler,
            Arc::new(NoopResolver),
            Arc::new(StreamHub::new()),
        )
        .await;
        assert!(matches!(outcome, DispatchOutcome::Completed(_)));
        assert_eq!(attempts.len(), 3);
    }

    #[tokio::test]
    async fn exhausts_budget_and_fails() {
        let handler: Arc<dyn Handler> = Arc::new(FlakyHandler { fail_until: 10, calls: AtomicU32::new(0) });
        let retry_policy = RetryPolicy { max_attempts: 2, base_delay_ms: 1, max_delay_ms: 5 };
        let (outcome, attempts) = dispatch_node(
            request(NodeId::v4(), retry_policy),
            handler,
            Arc::new(NoopResolver),
            Arc::new(StreamHub::new()),
        )
        .await;
        match outcome {
            DispatchOutcome::Failed { kind, .. } => assert_eq!(kind, ErrorKind::Transient),
            _ => panic!("expected failure"),
        }
        assert_eq!(attempts.len(), 2);
    }

    struct AlwaysHandlerError;

    #[async_trait]
    impl Handler for AlwaysHandlerError {
        fn r#type(&self) -> &str {
            "broken"
        }
        fn metadata(&self) -> HandlerMetadata {
            HandlerMetadata::new("Broken", "always fails non-transiently", "test")
        }
        async fn execute(&self, _ctx: HandlerContext<'_>) -> n3n_error::Result<serde_json::Value> {
            Err(n3n_error::Error::handler_error("boom"))
        }
    }

    #[tokio::test]
    async fn non_transient_failure_does_not_retry() {
        let handler: Arc<dyn Handler> = Arc::new(AlwaysHandlerError);
        let retry_policy = RetryPolicy { max_attempts: 5, base_delay_ms: 1, max_delay_ms: 5 };
        let (outcome, attempts) = dispatch_node(
            request(NodeId::v4(), retry_policy),
            handler,
            Arc::new(NoopResolver),
            Arc::new(StreamHub::new()),
        )
        .await;
        assert!(matches!(outcome, DispatchOutcome::Failed { kind: ErrorKind::HandlerError, .. }));
        assert_eq!(attempts.len(), 1);
    }
}
