//! Pre-import dependency and validity analysis (spec §4.6 steps 1-5).

use async_trait::async_trait;
use n3n_core::UserId;
use n3n_dag::validate;
use n3n_error::Result;
use n3n_registry::HandlerRegistry;
use serde::{Deserialize, Serialize};

use crate::package::{ComponentDependency, CredentialPlaceholder, ExportPackage};

/// Lists a user's credentials compatible with a requested credential type.
/// Preview-time only — resolving a credential's decrypted value is
/// `n3n_registry::CredentialResolver`'s job, at execution time.
#[async_trait]
pub trait CredentialCatalog: Send + Sync {
    async fn compatible_credentials(&self, user_id: UserId, credential_type: &str) -> Result<Vec<CredentialChoice>>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialChoice {
    pub credential_id: String,
    pub name: String,
}

/// A component dependency's installation status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentStatus {
    pub dependency: ComponentDependency,
    pub installed: bool,
    pub can_auto_install: bool,
}

/// A credential placeholder's compatible choices for this user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialStatus {
    pub placeholder: CredentialPlaceholder,
    pub compatible: Vec<CredentialChoice>,
}

/// The result of previewing an import.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreviewReport {
    pub blockers: Vec<String>,
    pub components: Vec<ComponentStatus>,
    pub credentials: Vec<CredentialStatus>,
    pub can_import: bool,
}

/// Preview a package for `user_id`: verify the checksum, parse-validate the
/// embedded definition, check each component dependency against the
/// registry, and list compatible credentials for each placeholder.
pub async fn preview(
    package: &ExportPackage,
    user_id: UserId,
    registry: &HandlerRegistry,
    credentials: &dyn CredentialCatalog,
) -> Result<PreviewReport> {
    package.verify_checksum()?;

    let mut blockers = Vec::new();

    let parse_result = validate(&package.flow.definition, None);
    blockers.extend(parse_result.errors.iter().cloned());

    let mut components = Vec::with_capacity(package.dependencies.components.len());
    for dependency in &package.dependencies.components {
        let installed = registry.contains(&dependency.name);
        let can_auto_install = !installed && dependency.image.is_some();
        if !installed && !can_auto_install {
            blockers.push(format!("component '{}' is not installed and has no installable image", dependency.name));
        }
        components.push(ComponentStatus { dependency: dependency.clone(), installed, can_auto_install });
    }

    let mut credential_statuses = Vec::with_capacity(package.dependencies.credential_placeholders.len());
    for placeholder in &package.dependencies.credential_placeholders {
        let compatible = credentials.compatible_credentials(user_id, &placeholder.credential_type).await?;
        credential_statuses.push(CredentialStatus { placeholder: placeholder.clone(), compatible });
    }

    let can_import = blockers.is_empty();

    Ok(PreviewReport { blockers, components, credentials: credential_statuses, can_import })
}
