//! The Export/Import Pipeline (spec component C6): checksummed flow
//! packages, dependency analysis, and atomic import with credential
//! re-binding.

mod import;
mod package;
mod preview;

pub use import::{import, reject_if_checksum_invalid, ImportRecord, ImportRequest, ImportResult};
pub use package::{
    credential_placeholders, ComponentDependency, CredentialPlaceholder, Dependencies, ExportPackage, FlowSettings,
    FlowSnapshot,
};
pub use preview::{preview, CredentialCatalog, CredentialChoice, CredentialStatus, ComponentStatus, PreviewReport};
