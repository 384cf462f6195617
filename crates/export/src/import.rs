//! Atomic import: name resolution, credential re-binding, and the
//! import-record kept for audit (spec §4.6, S6).

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use n3n_core::{CredentialId, FlowId, FlowVersionId, NodeId, UserId};
use n3n_dag::{Definition, Node};
use n3n_error::{Error, ErrorKind, Result};
use serde::{Deserialize, Serialize};

use crate::package::{ExportPackage, FlowSettings};

/// Caller-supplied parameters for an import.
#[derive(Debug, Clone, Default)]
pub struct ImportRequest {
    pub new_flow_name: Option<String>,
    /// Maps a node id carrying a credential placeholder to the importer's
    /// own credential id. A placeholder with no entry has its
    /// `credentialId` stripped rather than left dangling.
    pub credential_mappings: HashMap<NodeId, CredentialId>,
}

/// The newly created flow, ready to persist, plus the audit record.
#[derive(Debug, Clone)]
pub struct ImportResult {
    pub flow_id: FlowId,
    pub flow_version_id: FlowVersionId,
    pub flow_version: semver::Version,
    /// Always `draft`: an imported FlowVersion is never created pre-published.
    pub status: &'static str,
    pub flow_name: String,
    pub definition: Definition,
    pub settings: FlowSettings,
    pub record: ImportRecord,
}

/// Persisted alongside the new Flow/FlowVersion for audit (S6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportRecord {
    pub flow_id: FlowId,
    pub package_checksum: String,
    pub credential_mappings: HashMap<NodeId, CredentialId>,
    pub imported_at: DateTime<Utc>,
}

/// Import a package. `name_taken` reports whether a candidate flow name
/// collides with an existing non-deleted flow (the caller owns storage, so
/// name uniqueness is checked through this callback rather than a trait
/// object this crate can't implement meaningfully on its own).
pub fn import(
    package: &ExportPackage,
    request: &ImportRequest,
    name_taken: impl Fn(&str) -> bool,
    now: DateTime<Utc>,
) -> Result<ImportResult> {
    package.verify_checksum()?;

    let name = resolve_name(package, request, name_taken, now);

    let mut definition = package.flow.definition.clone();
    rewrite_credentials(&mut definition, &request.credential_mappings);

    let flow_id = FlowId::v4();
    let record = ImportRecord {
        flow_id,
        package_checksum: package.checksum.clone(),
        credential_mappings: request.credential_mappings.clone(),
        imported_at: now,
    };

    Ok(ImportResult {
        flow_id,
        flow_version_id: FlowVersionId::v4(),
        flow_version: semver::Version::new(1, 0, 0),
        status: "draft",
        flow_name: name,
        definition,
        settings: package.flow.settings.clone(),
        record,
    })
}

fn resolve_name(package: &ExportPackage, request: &ImportRequest, name_taken: impl Fn(&str) -> bool, now: DateTime<Utc>) -> String {
    let candidate = request
        .new_flow_name
        .clone()
        .unwrap_or_else(|| format!("{} (Imported)", package.flow.name));

    if name_taken(&candidate) {
        format!("{candidate} {}", now.format("%Y%m%d%H%M%S"))
    } else {
        candidate
    }
}

/// Rewrite each node's `credentialId` per `mappings`; a node with a
/// placeholder but no mapping has the field stripped rather than pointing
/// at a credential the importer never granted.
fn rewrite_credentials(definition: &mut Definition, mappings: &HashMap<NodeId, CredentialId>) {
    for node in &mut definition.nodes {
        if node.data.credential_id.is_some() {
            node.data.credential_id = mappings.get(&node.id).copied();
        }
    }
}

/// Reject an import outright if the checksum is bad, before any of the
/// above runs — used by callers that want a fast-fail `CHECKSUM_MISMATCH`
/// without constructing an [`ImportRequest`].
pub fn reject_if_checksum_invalid(package: &ExportPackage) -> Result<()> {
    package.verify_checksum().map_err(|_| Error::new(ErrorKind::ChecksumMismatch, "import package failed checksum verification"))
}
