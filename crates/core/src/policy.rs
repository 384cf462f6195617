//! Small shared enums used across the dag/execution/engine crates.

use serde::{Deserialize, Serialize};
use std::fmt;

/// How the engine responds when a node fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnFailure {
    /// Fail the whole execution after already-inflight nodes settle.
    Abort,
    /// Mark the failed node's entire downstream subtree as skipped.
    Continue,
    /// Mark only the failed node's direct successors as skipped; unrelated
    /// parallel branches still run to completion.
    Isolate,
}

impl Default for OnFailure {
    fn default() -> Self {
        Self::Abort
    }
}

impl fmt::Display for OnFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Abort => "abort",
            Self::Continue => "continue",
            Self::Isolate => "isolate",
        };
        write!(f, "{s}")
    }
}

/// How an execution was started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TriggerType {
    Manual,
    Schedule,
    Webhook,
}

impl fmt::Display for TriggerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Manual => "manual",
            Self::Schedule => "schedule",
            Self::Webhook => "webhook",
        };
        write!(f, "{s}")
    }
}

/// Retry policy attached to a node's settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
        }
    }
}

impl RetryPolicy {
    /// Backoff delay for the given 1-indexed attempt number, capped at
    /// `max_delay_ms`.
    #[must_use]
    pub fn backoff_for_attempt(&self, attempt: u32) -> u64 {
        let exp = self.base_delay_ms.saturating_mul(1u64 << attempt.saturating_sub(1).min(32));
        exp.min(self.max_delay_ms)
    }
}
