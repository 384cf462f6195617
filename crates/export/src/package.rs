//! The `ExportPackage` shape (spec §4.2/§4.6): a checksummed, self-contained
//! snapshot of one flow's published version.

use chrono::{DateTime, Utc};
use n3n_core::{canonical_checksum, CredentialId, NodeId, UserId};
use n3n_dag::Definition;
use n3n_error::{Error, ErrorKind, Result};
use serde::{Deserialize, Serialize};

/// A declared runtime dependency on an installable component image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentDependency {
    pub name: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

/// A credential binding the exported flow needs, with the secret value
/// deliberately omitted — only enough to let the importer pick a
/// compatible credential of their own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialPlaceholder {
    pub node_id: NodeId,
    pub node_name: String,
    pub credential_type: String,
    pub credential_name: String,
}

/// Flow-level settings carried verbatim through export/import.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowSettings {
    #[serde(default = "default_concurrency")]
    pub concurrency: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_execution_time_ms: Option<u64>,
}

fn default_concurrency() -> u32 {
    16
}

impl Default for FlowSettings {
    fn default() -> Self {
        Self { concurrency: default_concurrency(), max_execution_time_ms: None }
    }
}

/// The flow snapshot carried inside a package: name, description,
/// structural definition, and settings. Everything the checksum covers
/// apart from `dependencies`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowSnapshot {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub definition: Definition,
    pub settings: FlowSettings,
}

/// Dependency analysis attached to a package.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Dependencies {
    pub components: Vec<ComponentDependency>,
    pub credential_placeholders: Vec<CredentialPlaceholder>,
}

/// A self-contained, checksummed export of one flow version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportPackage {
    pub version: semver::Version,
    pub exported_at: DateTime<Utc>,
    pub exported_by: UserId,
    pub flow: FlowSnapshot,
    pub dependencies: Dependencies,
    pub checksum: String,
}

/// Only the fields covered by the checksum, in the order the spec names
/// them (`{flow, dependencies}` — `checksum` itself is excluded).
#[derive(Serialize)]
struct Checksummed<'a> {
    flow: &'a FlowSnapshot,
    dependencies: &'a Dependencies,
}

impl ExportPackage {
    /// Build a package from a flow snapshot and its dependency analysis,
    /// computing the checksum over `{flow, dependencies}`.
    pub fn new(exported_by: UserId, flow: FlowSnapshot, dependencies: Dependencies, now: DateTime<Utc>) -> Result<Self> {
        let checksum = compute_checksum(&flow, &dependencies)?;
        Ok(Self {
            version: semver::Version::new(1, 0, 0),
            exported_at: now,
            exported_by,
            flow,
            dependencies,
            checksum,
        })
    }

    /// Recompute the checksum over this package's `{flow, dependencies}`
    /// and compare against the stored value.
    pub fn verify_checksum(&self) -> Result<()> {
        let expected = compute_checksum(&self.flow, &self.dependencies)?;
        if expected == self.checksum {
            Ok(())
        } else {
            Err(Error::new(ErrorKind::ChecksumMismatch, "export package checksum does not match its contents"))
        }
    }
}

fn compute_checksum(flow: &FlowSnapshot, dependencies: &Dependencies) -> Result<String> {
    canonical_checksum(&Checksummed { flow, dependencies })
        .map_err(|e| Error::with_source(ErrorKind::Validation, "failed to compute export checksum", e))
}

/// Derive the credential placeholders for a definition: one entry per node
/// that carries a `credentialId`, naming the node and the requested
/// credential type (taken from the node's `type`/`nodeType`) but never the
/// credential's value.
#[must_use]
pub fn credential_placeholders(definition: &Definition) -> Vec<CredentialPlaceholder> {
    definition
        .nodes
        .iter()
        .filter_map(|node| {
            node.data.credential_id.map(|_: CredentialId| CredentialPlaceholder {
                node_id: node.id,
                node_name: node.data.label.clone(),
                credential_type: node.data.node_type.clone().unwrap_or_else(|| node.r#type.clone()),
                credential_name: node.data.label.clone(),
            })
        })
        .collect()
}
