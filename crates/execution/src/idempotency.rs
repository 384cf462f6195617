//! Deterministic dedup key for `(execution, node, attempt)`, so a re-dispatch
//! caused by a crash-and-resume never runs the same attempt twice.

use std::collections::HashSet;

use n3n_core::{ExecutionId, NodeId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    #[must_use]
    pub fn generate(execution_id: ExecutionId, node_id: NodeId, attempt: u32) -> Self {
        Self(format!("{execution_id}:{node_id}:{attempt}"))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Tracks which `(execution, node, attempt)` triples have already been
/// dispatched within one engine's lifetime.
#[derive(Debug, Default)]
pub struct IdempotencyManager {
    seen: HashSet<String>,
}

impl IdempotencyManager {
    #[must_use]
    pub fn new() -> Self {
        Self { seen: HashSet::new() }
    }

    /// Returns `true` if this is the first time `key` has been seen, marking
    /// it seen as a side effect.
    pub fn check_and_mark(&mut self, key: &IdempotencyKey) -> bool {
        self.seen.insert(key.as_str().to_string())
    }

    #[must_use]
    pub fn is_seen(&self, key: &IdempotencyKey) -> bool {
        self.seen.contains(key.as_str())
    }

    pub fn clear(&mut self) {
        self.seen.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_format_is_stable() {
        let execution_id = ExecutionId::nil();
        let node_id = NodeId::nil();
        let key = IdempotencyKey::generate(execution_id, node_id, 2);
        assert_eq!(key.as_str(), format!("{execution_id}:{node_id}:2"));
    }

    #[test]
    fn check_and_mark_is_true_once() {
        let mut manager = IdempotencyManager::new();
        let key = IdempotencyKey::generate(ExecutionId::v4(), NodeId::v4(), 1);
        assert!(manager.check_and_mark(&key));
        assert!(!manager.check_and_mark(&key));
        assert!(manager.is_seen(&key));
    }

    #[test]
    fn clear_resets_state() {
        let mut manager = IdempotencyManager::new();
        let key = IdempotencyKey::generate(ExecutionId::v4(), NodeId::v4(), 1);
        manager.check_and_mark(&key);
        manager.clear();
        assert!(manager.is_empty());
    }
}
