//! Registry resource records — the typed values the lister returns.
//!
//! Every record carries the common envelope (name, labels, annotations,
//! timestamps) plus a body matching its entity kind. Spec and artifact
//! payloads are content-addressed: the stored hash is the SHA-256 of the
//! payload bytes.

use crate::error::{Error, Result};
use crate::names::{Entity, ResourceName};
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Hex SHA-256 of a payload.
pub fn content_hash(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

#[derive(Clone, Debug, PartialEq)]
pub struct RegistryResource {
    pub name: ResourceName,
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
    pub create_time: DateTime<Utc>,
    pub update_time: DateTime<Utc>,
    pub body: ResourceBody,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ResourceBody {
    Project,
    Api(ApiBody),
    Version(VersionBody),
    Spec(SpecBody),
    Deployment(DeploymentBody),
    Artifact(ArtifactBody),
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ApiBody {
    pub display_name: String,
    pub description: String,
    pub availability: String,
    /// Relative or full version name; resolved against the API on use.
    pub recommended_version: Option<String>,
    pub recommended_deployment: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct VersionBody {
    pub display_name: String,
    pub description: String,
    pub state: String,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct SpecBody {
    pub filename: String,
    pub mime_type: String,
    pub revision_id: String,
    pub source_uri: Option<String>,
    pub contents: Option<Vec<u8>>,
    pub hash: String,
    pub size_bytes: u64,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct DeploymentBody {
    pub revision_id: String,
    pub api_spec_revision: Option<String>,
    pub endpoint_uri: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ArtifactBody {
    pub mime_type: String,
    pub contents: Option<Vec<u8>>,
    pub hash: String,
    pub size_bytes: u64,
}

impl RegistryResource {
    /// A new artifact record with hash and size derived from the payload.
    pub fn artifact(
        name: ResourceName,
        mime_type: impl Into<String>,
        contents: Vec<u8>,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        if name.entity() != Entity::Artifact {
            return Err(Error::validation(format!("{} is not an artifact name", name)));
        }
        let hash = content_hash(&contents);
        let size_bytes = contents.len() as u64;
        Ok(Self {
            name,
            labels: BTreeMap::new(),
            annotations: BTreeMap::new(),
            create_time: now,
            update_time: now,
            body: ResourceBody::Artifact(ArtifactBody {
                mime_type: mime_type.into(),
                contents: Some(contents),
                hash,
                size_bytes,
            }),
        })
    }

    /// An empty body matching the name's entity kind.
    pub fn empty(name: ResourceName, now: DateTime<Utc>) -> Self {
        let body = match name.entity() {
            Entity::Project => ResourceBody::Project,
            Entity::Api => ResourceBody::Api(ApiBody::default()),
            Entity::Version => ResourceBody::Version(VersionBody::default()),
            Entity::Spec => ResourceBody::Spec(SpecBody::default()),
            Entity::Deployment => ResourceBody::Deployment(DeploymentBody::default()),
            Entity::Artifact => ResourceBody::Artifact(ArtifactBody::default()),
        };
        Self {
            name,
            labels: BTreeMap::new(),
            annotations: BTreeMap::new(),
            create_time: now,
            update_time: now,
            body,
        }
    }

    /// Revision id of a spec or deployment body.
    pub fn revision_id(&self) -> Option<&str> {
        match &self.body {
            ResourceBody::Spec(s) if !s.revision_id.is_empty() => Some(&s.revision_id),
            ResourceBody::Deployment(d) if !d.revision_id.is_empty() => Some(&d.revision_id),
            _ => None,
        }
    }

    pub fn mime_type(&self) -> Option<&str> {
        match &self.body {
            ResourceBody::Spec(s) => Some(&s.mime_type),
            ResourceBody::Artifact(a) => Some(&a.mime_type),
            _ => None,
        }
    }

    pub fn contents(&self) -> Option<&[u8]> {
        match &self.body {
            ResourceBody::Spec(s) => s.contents.as_deref(),
            ResourceBody::Artifact(a) => a.contents.as_deref(),
            _ => None,
        }
    }

    /// Copy with payload bytes dropped, for listings that skip contents.
    pub fn without_contents(&self) -> Self {
        let mut out = self.clone();
        match &mut out.body {
            ResourceBody::Spec(s) => s.contents = None,
            ResourceBody::Artifact(a) => a.contents = None,
            _ => {}
        }
        out
    }
}
