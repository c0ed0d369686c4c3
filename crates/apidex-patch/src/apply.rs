//! Apply — upsert a declarative document into the registry.
//!
//! The document's API lands under `parent` (the document's own
//! `metadata.parent` wins when present), then versions, specs, deployments,
//! and artifacts recurse parent-before-child. Every write is an idempotent
//! upsert; the first failure aborts the apply so no deeper child is written
//! under a missing parent.

use crate::doc::{
    mime_for_kind, ApiDoc, ArtifactDoc, DeploymentDoc, SpecDoc, VersionDoc, API_VERSION,
};
use apidex_core::{
    ApiBody, DeploymentBody, Error, RegistryResource, ResourceBody, ResourceName, Result, SpecBody,
    VersionBody,
};
use apidex_registry::RegistryLister;
use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Apply an API document. Returns the name of the API that was written.
pub async fn apply_api(
    lister: &dyn RegistryLister,
    bytes: &[u8],
    default_parent: &ResourceName,
    cancel: &CancellationToken,
) -> Result<ResourceName> {
    let doc: ApiDoc = serde_yaml::from_slice(bytes)?;
    if let Some(api_version) = &doc.api_version {
        if api_version != API_VERSION {
            return Err(Error::validation(format!(
                "unsupported apiVersion {:?}",
                api_version
            )));
        }
    }
    if let Some(kind) = &doc.kind {
        if kind != "API" {
            return Err(Error::validation(format!(
                "expected kind API, got {:?}",
                kind
            )));
        }
    }
    let parent = match &doc.metadata.parent {
        Some(parent) => ResourceName::parse(parent)?,
        None => default_parent.clone(),
    };
    let api_name = ResourceName::parse(&format!("{}/apis/{}", parent, doc.metadata.name))?;

    let mut resource = RegistryResource::empty(api_name.clone(), Utc::now());
    resource.labels = doc.metadata.labels.clone();
    resource.annotations = doc.metadata.annotations.clone();
    resource.body = ResourceBody::Api(ApiBody {
        display_name: doc.data.display_name.clone(),
        description: doc.data.description.clone(),
        availability: doc.data.availability.clone(),
        recommended_version: doc
            .data
            .recommended_version
            .as_deref()
            .map(|v| version_name(&api_name, v)),
        recommended_deployment: doc
            .data
            .recommended_deployment
            .as_deref()
            .map(|d| deployment_name(&api_name, d)),
    });
    lister.put(resource, cancel).await?;

    for version in &doc.data.versions {
        apply_version(lister, &api_name, version, cancel).await?;
    }
    for artifact in &doc.data.artifacts {
        apply_artifact(lister, &api_name, artifact, cancel).await?;
    }
    info!(api = %api_name, "applied api document");
    Ok(api_name)
}

/// Join a version id onto its API. The id is not validated against full
/// names: a misused full name joins anyway and is surfaced as a warning.
fn version_name(api_name: &ResourceName, id: &str) -> String {
    if id.contains('/') {
        warn!(api = %api_name, value = id, "expected a version id, got a path; joining verbatim");
    }
    format!("{}/versions/{}", api_name, id)
}

/// Join a deployment path (`versions/<v>/deployments/<d>`) onto its API.
/// Full names join anyway and are surfaced as a warning.
fn deployment_name(api_name: &ResourceName, path: &str) -> String {
    if path.starts_with("projects/") {
        warn!(api = %api_name, value = path, "expected a deployment path, got a full name; joining verbatim");
    }
    format!("{}/{}", api_name, path)
}

async fn apply_version(
    lister: &dyn RegistryLister,
    api_name: &ResourceName,
    doc: &VersionDoc,
    cancel: &CancellationToken,
) -> Result<()> {
    let name = ResourceName::parse(&format!("{}/versions/{}", api_name, doc.metadata.name))?;
    let mut resource = RegistryResource::empty(name.clone(), Utc::now());
    resource.labels = doc.metadata.labels.clone();
    resource.annotations = doc.metadata.annotations.clone();
    resource.body = ResourceBody::Version(VersionBody {
        display_name: doc.data.display_name.clone(),
        description: doc.data.description.clone(),
        state: doc.data.state.clone(),
    });
    lister.put(resource, cancel).await?;

    for spec in &doc.data.specs {
        apply_spec(lister, &name, spec, cancel).await?;
    }
    for deployment in &doc.data.deployments {
        apply_deployment(lister, &name, deployment, cancel).await?;
    }
    for artifact in &doc.data.artifacts {
        apply_artifact(lister, &name, artifact, cancel).await?;
    }
    Ok(())
}

async fn apply_spec(
    lister: &dyn RegistryLister,
    version_name: &ResourceName,
    doc: &SpecDoc,
    cancel: &CancellationToken,
) -> Result<()> {
    let name = ResourceName::parse(&format!("{}/specs/{}", version_name, doc.metadata.name))?;
    let mut resource = RegistryResource::empty(name.clone(), Utc::now());
    resource.labels = doc.metadata.labels.clone();
    resource.annotations = doc.metadata.annotations.clone();
    resource.body = ResourceBody::Spec(SpecBody {
        filename: doc.data.filename.clone(),
        mime_type: doc.data.mime_type.clone(),
        source_uri: doc.data.source_uri.clone(),
        contents: doc.data.contents.as_ref().map(|c| c.clone().into_bytes()),
        ..Default::default()
    });
    lister.put(resource, cancel).await?;

    for artifact in &doc.data.artifacts {
        apply_artifact(lister, &name, artifact, cancel).await?;
    }
    Ok(())
}

async fn apply_deployment(
    lister: &dyn RegistryLister,
    version_name: &ResourceName,
    doc: &DeploymentDoc,
    cancel: &CancellationToken,
) -> Result<()> {
    let name = ResourceName::parse(&format!(
        "{}/deployments/{}",
        version_name, doc.metadata.name
    ))?;
    let mut resource = RegistryResource::empty(name.clone(), Utc::now());
    resource.labels = doc.metadata.labels.clone();
    resource.annotations = doc.metadata.annotations.clone();
    resource.body = ResourceBody::Deployment(DeploymentBody {
        revision_id: String::new(),
        api_spec_revision: doc.data.api_spec_revision.clone(),
        endpoint_uri: doc.data.endpoint_uri.clone(),
    });
    lister.put(resource, cancel).await?;

    for artifact in &doc.data.artifacts {
        apply_artifact(lister, &name, artifact, cancel).await?;
    }
    Ok(())
}

async fn apply_artifact(
    lister: &dyn RegistryLister,
    parent: &ResourceName,
    doc: &ArtifactDoc,
    cancel: &CancellationToken,
) -> Result<()> {
    let name = parent.with_artifact(&doc.metadata.name)?;
    let payload = serde_yaml::to_string(&doc.data)?.into_bytes();
    let mut resource =
        RegistryResource::artifact(name, mime_for_kind(&doc.kind), payload, Utc::now())?;
    resource.labels = doc.metadata.labels.clone();
    resource.annotations = doc.metadata.annotations.clone();
    lister.put(resource, cancel).await
}
