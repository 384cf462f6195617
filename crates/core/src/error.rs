//! Error type local to `n3n-core` (JSON encoding failures only — the
//! workspace-wide error taxonomy lives in `n3n-error`).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("serialization: {0}")]
    Serialization(#[from] serde_json::Error),
}
