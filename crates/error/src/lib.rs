//! The error-kind taxonomy shared by every n3n crate.
//!
//! Every public fallible function in the workspace returns [`Result<T>`].
//! Each error carries a stable, machine-readable [`ErrorKind`] and a human
//! message; no stack traces or internal identifiers cross this boundary.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// A stable, machine-readable error token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// User input violates a declared constraint (bad edge, unknown node type).
    Validation,
    /// Requested entity absent.
    NotFound,
    /// Caller lacks the capability.
    PermissionDenied,
    /// Optimistic/atomicity violation (duplicate name, stale version).
    Conflict,
    /// Node type has no handler in the registry.
    UnknownHandler,
    /// Handler signalled failure; non-transient by default.
    HandlerError,
    /// Handler signalled that a retry might succeed.
    Transient,
    /// Scope-bound deadline elapsed.
    Timeout,
    /// User or parent scope requested cancellation.
    Cancelled,
    /// Secure-channel: sequence number already seen.
    Replay,
    /// Secure-channel: AEAD decryption failed.
    Tampered,
    /// Secure-channel: message timestamp outside the acceptance window.
    Expired,
    /// Secure-channel: device key has been revoked.
    Revoked,
    /// Secure-channel: envelope version not supported.
    UnsupportedVersion,
    /// Secure-channel: no DeviceKey for the given device id.
    UnknownDevice,
    /// Import package integrity check failed.
    ChecksumMismatch,
}

impl ErrorKind {
    /// Whether this error kind is potentially resolved by retrying.
    #[must_use]
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::Transient)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Validation => "VALIDATION",
            Self::NotFound => "NOT_FOUND",
            Self::PermissionDenied => "PERMISSION_DENIED",
            Self::Conflict => "CONFLICT",
            Self::UnknownHandler => "UNKNOWN_HANDLER",
            Self::HandlerError => "HANDLER_ERROR",
            Self::Transient => "TRANSIENT",
            Self::Timeout => "TIMEOUT",
            Self::Cancelled => "CANCELLED",
            Self::Replay => "REPLAY",
            Self::Tampered => "TAMPERED",
            Self::Expired => "EXPIRED",
            Self::Revoked => "REVOKED",
            Self::UnsupportedVersion => "UNSUPPORTED_VERSION",
            Self::UnknownDevice => "UNKNOWN_DEVICE",
            Self::ChecksumMismatch => "CHECKSUM_MISMATCH",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The workspace-wide error type: a stable [`ErrorKind`] plus a human
/// message and an optional source error.
#[derive(Debug, Error)]
#[error("{kind}: {message}")]
pub struct Error {
    pub kind: ErrorKind,
    pub message: String,
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl Error {
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    #[must_use]
    pub fn with_source(
        kind: ErrorKind,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            kind,
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conflict, message)
    }

    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::PermissionDenied, message)
    }

    pub fn unknown_handler(type_name: impl fmt::Display) -> Self {
        Self::new(ErrorKind::UnknownHandler, format!("no handler registered for type '{type_name}'"))
    }

    pub fn handler_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::HandlerError, message)
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Transient, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }

    pub fn cancelled() -> Self {
        Self::new(ErrorKind::Cancelled, "execution cancelled")
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::with_source(ErrorKind::Validation, "invalid json", err)
    }
}

/// Convenience alias used by every public fallible function in the workspace.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_tokens_match_taxonomy() {
        assert_eq!(ErrorKind::Validation.as_str(), "VALIDATION");
        assert_eq!(ErrorKind::UnknownHandler.as_str(), "UNKNOWN_HANDLER");
        assert_eq!(ErrorKind::ChecksumMismatch.as_str(), "CHECKSUM_MISMATCH");
    }

    #[test]
    fn only_transient_is_retryable() {
        assert!(ErrorKind::Transient.is_retryable());
        assert!(!ErrorKind::HandlerError.is_retryable());
        assert!(!ErrorKind::Validation.is_retryable());
    }

    #[test]
    fn display_includes_kind_and_message() {
        let err = Error::validation("missing field 'type'");
        assert_eq!(err.to_string(), "VALIDATION: missing field 'type'");
    }

    #[test]
    fn unknown_handler_message_names_the_type() {
        let err = Error::unknown_handler("httpRequest");
        assert_eq!(err.kind, ErrorKind::UnknownHandler);
        assert!(err.to_string().contains("httpRequest"));
    }

    #[test]
    fn from_serde_error_is_validation() {
        let serde_err = serde_json::from_str::<String>("not json").unwrap_err();
        let err = Error::from(serde_err);
        assert_eq!(err.kind, ErrorKind::Validation);
        assert!(err.source.is_some());
    }

    #[test]
    fn cancelled_has_stable_message() {
        let err = Error::cancelled();
        assert_eq!(err.kind, ErrorKind::Cancelled);
        assert_eq!(err.to_string(), "CANCELLED: execution cancelled");
    }

    #[test]
    fn kind_serde_roundtrip() {
        let kind = ErrorKind::Revoked;
        let json = serde_json::to_string(&kind).unwrap();
        assert_eq!(json, "\"REVOKED\"");
        let back: ErrorKind = serde_json::from_str(&json).unwrap();
        assert_eq!(kind, back);
    }
}
