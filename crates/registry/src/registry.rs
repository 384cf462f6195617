//! In-memory, concurrency-safe handler registry (spec component C1).
//!
//! Registrations take `DashMap`'s internal per-shard write lock; lookups are
//! effectively lock-free after startup, matching the concurrency model's
//! "registrations take a write lock; lookups are lock-free after init".

use std::sync::Arc;

use dashmap::DashMap;
use n3n_error::{Error, Result};

use crate::handler::{Handler, HandlerMetadata};

/// Maps node `type` strings to a handler implementation.
///
/// The registry guarantees at most one handler per type; [`register`] fails
/// if the type is already taken, [`register_or_replace`] always succeeds.
///
/// [`register`]: HandlerRegistry::register
/// [`register_or_replace`]: HandlerRegistry::register_or_replace
pub struct HandlerRegistry {
    handlers: DashMap<String, Arc<dyn Handler>>,
}

impl HandlerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            handlers: DashMap::new(),
        }
    }

    /// Register a handler. Fails with `CONFLICT` if the type already exists.
    pub fn register(&self, handler: Arc<dyn Handler>) -> Result<()> {
        let type_name = handler.r#type().to_string();
        if self.handlers.contains_key(&type_name) {
            return Err(Error::conflict(format!("handler already registered for type '{type_name}'")));
        }
        self.handlers.insert(type_name, handler);
        Ok(())
    }

    /// Register a handler, replacing any existing one for the same type.
    pub fn register_or_replace(&self, handler: Arc<dyn Handler>) {
        self.handlers.insert(handler.r#type().to_string(), handler);
    }

    /// Look up a handler by type string. Fails with `UNKNOWN_HANDLER`.
    pub fn get(&self, type_name: &str) -> Result<Arc<dyn Handler>> {
        self.handlers
            .get(type_name)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| Error::unknown_handler(type_name))
    }

    #[must_use]
    pub fn contains(&self, type_name: &str) -> bool {
        self.handlers.contains_key(type_name)
    }

    pub fn remove(&self, type_name: &str) -> Result<Arc<dyn Handler>> {
        self.handlers
            .remove(type_name)
            .map(|(_, handler)| handler)
            .ok_or_else(|| Error::not_found(format!("no handler registered for type '{type_name}'")))
    }

    /// Metadata for every registered handler, for validation/UI/AI recommendation.
    #[must_use]
    pub fn all_metadata(&self) -> Vec<(String, HandlerMetadata)> {
        self.handlers
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().metadata()))
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::HandlerContext;
    use async_trait::async_trait;

    struct EchoHandler;

    #[async_trait]
    impl Handler for EchoHandler {
        fn r#type(&self) -> &str {
            "echo"
        }

        fn metadata(&self) -> HandlerMetadata {
            HandlerMetadata::new("Echo", "Returns its input unchanged", "utility")
        }

        async fn execute(&self, ctx: HandlerContext<'_>) -> n3n_error::Result<serde_json::Value> {
            Ok(ctx.input_data.clone())
        }
    }

    #[test]
    fn register_and_get() {
        let registry = HandlerRegistry::new();
        registry.register(Arc::new(EchoHandler)).unwrap();
        let handler = registry.get("echo").unwrap();
        assert_eq!(handler.r#type(), "echo");
    }

    #[test]
    fn unknown_type_is_unknown_handler_error() {
        let registry = HandlerRegistry::new();
        let err = registry.get("missing").unwrap_err();
        assert_eq!(err.kind, n3n_error::ErrorKind::UnknownHandler);
    }

    #[test]
    fn duplicate_register_is_conflict() {
        let registry = HandlerRegistry::new();
        registry.register(Arc::new(EchoHandler)).unwrap();
        let err = registry.register(Arc::new(EchoHandler)).unwrap_err();
        assert_eq!(err.kind, n3n_error::ErrorKind::Conflict);
    }

    #[test]
    fn register_or_replace_does_not_error() {
        let registry = HandlerRegistry::new();
        registry.register_or_replace(Arc::new(EchoHandler));
        registry.register_or_replace(Arc::new(EchoHandler));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn remove_and_contains() {
        let registry = HandlerRegistry::new();
        registry.register(Arc::new(EchoHandler)).unwrap();
        assert!(registry.contains("echo"));
        registry.remove("echo").unwrap();
        assert!(!registry.contains("echo"));
    }

    #[test]
    fn remove_missing_is_not_found() {
        let registry = HandlerRegistry::new();
        assert!(registry.remove("missing").is_err());
    }

    #[test]
    fn all_metadata_lists_registered_types() {
        let registry = HandlerRegistry::new();
        registry.register(Arc::new(EchoHandler)).unwrap();
        let metadata = registry.all_metadata();
        assert_eq!(metadata.len(), 1);
        assert_eq!(metadata[0].0, "echo");
    }
}
