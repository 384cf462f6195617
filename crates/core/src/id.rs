//! Strongly-typed identifiers for n3n entities.
//!
//! Each identifier wraps a [`domain-key`](https://crates.io/crates/domain-key)
//! `Uuid<D>` parameterized by a private domain marker, so two identifier
//! types can never be mixed up even though both are backed by a UUID.
//!
//! All ID types are `Copy` (16 bytes), support `v4()`/`nil()`/`parse(&str)`,
//! and serialize as a UUID string.

use domain_key::define_uuid;

pub use domain_key::UuidParseError;

define_uuid!(UserIdDomain => UserId);
define_uuid!(TenantIdDomain => TenantId);
define_uuid!(FlowIdDomain => FlowId);
define_uuid!(FlowVersionIdDomain => FlowVersionId);
define_uuid!(NodeIdDomain => NodeId);
define_uuid!(EdgeIdDomain => EdgeId);
define_uuid!(ExecutionIdDomain => ExecutionId);
define_uuid!(NodeExecutionIdDomain => NodeExecutionId);
define_uuid!(CredentialIdDomain => CredentialId);
define_uuid!(DeviceIdDomain => DeviceId);
define_uuid!(WebhookIdDomain => WebhookId);
