//! Shared identifiers, value types, and small enums used across the n3n
//! workflow engine crates.

mod canonical;
mod error;
mod id;
mod policy;
mod value;

pub use canonical::{canonical_checksum, to_canonical_json, to_canonical_json_of};
pub use error::CoreError;
pub use id::{
    CredentialId, DeviceId, EdgeId, ExecutionId, FlowId, FlowVersionId, NodeExecutionId, NodeId,
    TenantId, UserId, UuidParseError, WebhookId,
};
pub use policy::{OnFailure, RetryPolicy, TriggerType};
pub use value::Value;
