//! YAML fixtures — seed an in-memory registry from a flat resource list.
//!
//! Fixtures keep the CLI exercisable without a live registry: each entry is
//! a name plus whatever fields its entity kind uses; everything else
//! defaults. Timestamps are preserved as given so staleness scenarios can be
//! scripted precisely.

use crate::memory::MemoryRegistry;
use apidex_core::{
    content_hash, ApiBody, ArtifactBody, DeploymentBody, Entity, Error, RegistryResource,
    ResourceBody, ResourceName, Result, SpecBody, VersionBody,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::BTreeMap;

#[derive(Debug, Deserialize)]
struct FixtureFile {
    resources: Vec<FixtureEntry>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FixtureEntry {
    name: String,
    #[serde(default)]
    display_name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    availability: String,
    #[serde(default)]
    state: String,
    #[serde(default)]
    filename: String,
    #[serde(default)]
    mime_type: String,
    #[serde(default)]
    revision_id: Option<String>,
    #[serde(default)]
    recommended_version: Option<String>,
    #[serde(default)]
    recommended_deployment: Option<String>,
    #[serde(default)]
    api_spec_revision: Option<String>,
    #[serde(default)]
    endpoint_uri: Option<String>,
    #[serde(default)]
    source_uri: Option<String>,
    #[serde(default)]
    contents: Option<String>,
    #[serde(default)]
    labels: BTreeMap<String, String>,
    #[serde(default)]
    annotations: BTreeMap<String, String>,
    #[serde(default)]
    create_time: Option<DateTime<Utc>>,
    #[serde(default)]
    update_time: Option<DateTime<Utc>>,
}

impl FixtureEntry {
    fn into_resource(self) -> Result<RegistryResource> {
        let name = ResourceName::parse(&self.name)?;
        if !name.is_concrete() {
            return Err(Error::validation(format!(
                "fixture name {} contains wildcards",
                name
            )));
        }
        let update_time = self.update_time.unwrap_or_else(Utc::now);
        let create_time = self.create_time.unwrap_or(update_time);
        let contents = self.contents.map(|c| c.into_bytes());
        let body = match name.entity() {
            Entity::Project => ResourceBody::Project,
            Entity::Api => ResourceBody::Api(ApiBody {
                display_name: self.display_name,
                description: self.description,
                availability: self.availability,
                recommended_version: self.recommended_version,
                recommended_deployment: self.recommended_deployment,
            }),
            Entity::Version => ResourceBody::Version(VersionBody {
                display_name: self.display_name,
                description: self.description,
                state: self.state,
            }),
            Entity::Spec => {
                let (hash, size_bytes) = hash_and_size(&contents);
                ResourceBody::Spec(SpecBody {
                    filename: self.filename,
                    mime_type: self.mime_type,
                    revision_id: self.revision_id.unwrap_or_default(),
                    source_uri: self.source_uri,
                    contents,
                    hash,
                    size_bytes,
                })
            }
            Entity::Deployment => ResourceBody::Deployment(DeploymentBody {
                revision_id: self.revision_id.unwrap_or_default(),
                api_spec_revision: self.api_spec_revision,
                endpoint_uri: self.endpoint_uri,
            }),
            Entity::Artifact => {
                let (hash, size_bytes) = hash_and_size(&contents);
                ResourceBody::Artifact(ArtifactBody {
                    mime_type: self.mime_type,
                    contents,
                    hash,
                    size_bytes,
                })
            }
        };
        Ok(RegistryResource {
            name,
            labels: self.labels,
            annotations: self.annotations,
            create_time,
            update_time,
            body,
        })
    }
}

fn hash_and_size(contents: &Option<Vec<u8>>) -> (String, u64) {
    match contents {
        Some(bytes) => (content_hash(bytes), bytes.len() as u64),
        None => (String::new(), 0),
    }
}

/// Build an in-memory registry from fixture YAML.
pub async fn load_fixture(yaml: &str) -> Result<MemoryRegistry> {
    let file: FixtureFile = serde_yaml::from_str(yaml)?;
    let registry = MemoryRegistry::new();
    for entry in file.resources {
        registry.seed(entry.into_resource()?).await;
    }
    Ok(registry)
}
