//! Export — serialize registry subtrees to declarative documents.
//!
//! Absolute names are rewritten to relative form on the way out: a
//! recommended version under the exported API becomes its bare id, a
//! recommended deployment becomes its path under the API. Artifacts whose
//! MIME type does not name a typed YAML kind are logged and skipped.

use crate::doc::{
    kind_of_mime, ApiData, ApiDoc, ArtifactDoc, DeploymentData, DeploymentDoc, Metadata, SpecData,
    SpecDoc, VersionData, VersionDoc, API_VERSION,
};
use apidex_core::{Entity, Error, RegistryResource, ResourceBody, ResourceName, Result};
use apidex_registry::RegistryLister;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Export one API, optionally with its whole subtree embedded.
pub async fn export_api(
    lister: &dyn RegistryLister,
    api_name: &ResourceName,
    nested: bool,
    cancel: &CancellationToken,
) -> Result<ApiDoc> {
    let resource = lister
        .get(api_name, false, cancel)
        .await?
        .ok_or_else(|| Error::not_found(api_name.to_string()))?;
    let api = match &resource.body {
        ResourceBody::Api(api) => api.clone(),
        _ => {
            return Err(Error::validation(format!(
                "{} is not an API",
                api_name
            )))
        }
    };
    let parent = api_name
        .parent()
        .ok_or_else(|| Error::validation(format!("{} has no parent", api_name)))?;

    let mut data = ApiData {
        display_name: api.display_name,
        description: api.description,
        availability: api.availability,
        recommended_version: api
            .recommended_version
            .map(|v| relative_version(api_name, &v)),
        recommended_deployment: api
            .recommended_deployment
            .map(|d| relative_deployment(api_name, &d)),
        versions: Vec::new(),
        artifacts: Vec::new(),
    };

    if nested {
        data.versions = export_versions(lister, api_name, cancel).await?;
        data.artifacts = export_artifacts(lister, api_name, cancel).await?;
    }

    Ok(ApiDoc {
        api_version: Some(API_VERSION.to_string()),
        kind: Some("API".to_string()),
        metadata: Metadata {
            name: api_name
                .api_id()
                .unwrap_or_default()
                .to_string(),
            parent: Some(parent.to_string()),
            labels: resource.labels,
            annotations: resource.annotations,
        },
        data,
    })
}

/// A recommended version under this API exports as its bare id.
fn relative_version(api_name: &ResourceName, value: &str) -> String {
    if let Ok(name) = ResourceName::parse(value) {
        if name.truncate_to(Entity::Api).ok().as_ref() == Some(api_name) {
            if let Some(version_id) = name.version_id() {
                return version_id.to_string();
            }
        }
    }
    value.to_string()
}

/// A recommended deployment under this API exports as its path below the API.
fn relative_deployment(api_name: &ResourceName, value: &str) -> String {
    if let Ok(name) = ResourceName::parse(value) {
        if name.truncate_to(Entity::Api).ok().as_ref() == Some(api_name) {
            let prefix = format!("{}/", api_name);
            let canonical = name.to_string();
            if let Some(rest) = canonical.strip_prefix(&prefix) {
                return rest.to_string();
            }
        }
    }
    value.to_string()
}

async fn export_versions(
    lister: &dyn RegistryLister,
    api_name: &ResourceName,
    cancel: &CancellationToken,
) -> Result<Vec<VersionDoc>> {
    let pattern = ResourceName::parse(&format!("{}/versions/-", api_name))?;
    let mut versions = Vec::new();
    for resource in lister.list(&pattern, None, false, cancel).await? {
        let version = match &resource.body {
            ResourceBody::Version(version) => version.clone(),
            _ => continue,
        };
        versions.push(VersionDoc {
            api_version: None,
            kind: None,
            metadata: Metadata {
                name: resource.name.version_id().unwrap_or_default().to_string(),
                parent: None,
                labels: resource.labels,
                annotations: resource.annotations,
            },
            data: VersionData {
                display_name: version.display_name,
                description: version.description,
                state: version.state,
                specs: export_specs(lister, &resource.name, cancel).await?,
                deployments: export_deployments(lister, &resource.name, cancel).await?,
                artifacts: export_artifacts(lister, &resource.name, cancel).await?,
            },
        });
    }
    Ok(versions)
}

async fn export_specs(
    lister: &dyn RegistryLister,
    version_name: &ResourceName,
    cancel: &CancellationToken,
) -> Result<Vec<SpecDoc>> {
    let pattern = ResourceName::parse(&format!("{}/specs/-", version_name))?;
    let mut specs = Vec::new();
    for resource in lister.list(&pattern, None, true, cancel).await? {
        let spec = match &resource.body {
            ResourceBody::Spec(spec) => spec.clone(),
            _ => continue,
        };
        let contents = match spec.contents {
            Some(bytes) => match String::from_utf8(bytes) {
                Ok(text) => Some(text),
                Err(_) => {
                    warn!(spec = %resource.name, "spec payload is not text, omitting contents");
                    None
                }
            },
            None => None,
        };
        specs.push(SpecDoc {
            api_version: None,
            kind: None,
            metadata: Metadata {
                name: resource.name.spec_id().unwrap_or_default().to_string(),
                parent: None,
                labels: resource.labels,
                annotations: resource.annotations,
            },
            data: SpecData {
                filename: spec.filename,
                mime_type: spec.mime_type,
                source_uri: spec.source_uri,
                contents,
                artifacts: export_artifacts(lister, &resource.name, cancel).await?,
            },
        });
    }
    Ok(specs)
}

async fn export_deployments(
    lister: &dyn RegistryLister,
    version_name: &ResourceName,
    cancel: &CancellationToken,
) -> Result<Vec<DeploymentDoc>> {
    let pattern = ResourceName::parse(&format!("{}/deployments/-", version_name))?;
    let mut deployments = Vec::new();
    for resource in lister.list(&pattern, None, false, cancel).await? {
        let deployment = match &resource.body {
            ResourceBody::Deployment(deployment) => deployment.clone(),
            _ => continue,
        };
        deployments.push(DeploymentDoc {
            api_version: None,
            kind: None,
            metadata: Metadata {
                name: resource
                    .name
                    .deployment_id()
                    .unwrap_or_default()
                    .to_string(),
                parent: None,
                labels: resource.labels,
                annotations: resource.annotations,
            },
            data: DeploymentData {
                api_spec_revision: deployment.api_spec_revision,
                endpoint_uri: deployment.endpoint_uri,
                artifacts: export_artifacts(lister, &resource.name, cancel).await?,
            },
        });
    }
    Ok(deployments)
}

/// Export the typed artifacts directly under `parent`. Unknown kinds and
/// malformed payloads are skipped, not fatal.
async fn export_artifacts(
    lister: &dyn RegistryLister,
    parent: &ResourceName,
    cancel: &CancellationToken,
) -> Result<Vec<ArtifactDoc>> {
    let pattern = ResourceName::parse(&format!("{}/artifacts/-", parent))?;
    let mut artifacts = Vec::new();
    for resource in lister.list(&pattern, None, true, cancel).await? {
        artifacts.extend(artifact_doc(&resource));
    }
    Ok(artifacts)
}

fn artifact_doc(resource: &RegistryResource) -> Option<ArtifactDoc> {
    let mime_type = resource.mime_type().unwrap_or_default();
    let kind = match kind_of_mime(mime_type) {
        Some(kind) => kind.to_string(),
        None => {
            warn!(artifact = %resource.name, mime_type, "unknown artifact kind, skipping");
            return None;
        }
    };
    let payload = resource.contents()?;
    let data: serde_yaml::Value = match serde_yaml::from_slice(payload) {
        Ok(data) => data,
        Err(e) => {
            warn!(artifact = %resource.name, error = %e, "malformed artifact payload, skipping");
            return None;
        }
    };
    Some(ArtifactDoc {
        kind,
        metadata: Metadata {
            name: resource.name.artifact_id().unwrap_or_default().to_string(),
            parent: None,
            labels: resource.labels.clone(),
            annotations: resource.annotations.clone(),
        },
        data,
    })
}
