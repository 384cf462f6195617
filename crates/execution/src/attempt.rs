//! One record per dispatch of a node, so `NodeExecution.attempts` can report
//! retry history without creating new `NodeExecution` rows (the data model's
//! one-row-per-`(executionId, nodeId)` invariant).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::output::NodeOutput;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeAttempt {
    pub attempt_number: u32,
    pub idempotency_key: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub output: Option<NodeOutput>,
    pub error: Option<String>,
}

impl NodeAttempt {
    #[must_use]
    pub fn start(attempt_number: u32, idempotency_key: String, now: DateTime<Utc>) -> Self {
        Self {
            attempt_number,
            idempotency_key,
            started_at: now,
            completed_at: None,
            output: None,
            error: None,
        }
    }

    pub fn complete_ok(&mut self, output: NodeOutput, now: DateTime<Utc>) {
        self.output = Some(output);
        self.completed_at = Some(now);
    }

    pub fn complete_err(&mut self, error: impl Into<String>, now: DateTime<Utc>) {
        self.error = Some(error.into());
        self.completed_at = Some(now);
    }

    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.completed_at.is_some()
    }

    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.output.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_is_unsettled() {
        let attempt = NodeAttempt::start(1, "k".to_string(), Utc::now());
        assert!(!attempt.is_settled());
    }

    #[test]
    fn complete_ok_marks_succeeded() {
        let mut attempt = NodeAttempt::start(1, "k".to_string(), Utc::now());
        attempt.complete_ok(NodeOutput::new(serde_json::json!({})), Utc::now());
        assert!(attempt.is_settled());
        assert!(attempt.succeeded());
    }

    #[test]
    fn complete_err_marks_not_succeeded() {
        let mut attempt = NodeAttempt::start(1, "k".to_string(), Utc::now());
        attempt.complete_err("boom", Utc::now());
        assert!(attempt.is_settled());
        assert!(!attempt.succeeded());
    }
}
