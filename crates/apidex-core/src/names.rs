//! Resource names — parse, render, and relate the registry hierarchy.
//!
//! Names follow the slash form
//! `projects/{p}/locations/global/apis/{a}/versions/{v}/specs/{s}@{rev}/artifacts/{x}`,
//! with deployments as an alternative to specs under a version, and artifacts
//! attachable at every level. A single `-` segment is the collection wildcard
//! used by patterns; concrete names never contain one. Revision suffixes
//! (`@{rev}`) attach only to specs and deployments and are orthogonal to
//! identity: `specs/s` and `specs/s@abc` refer to the same logical resource.

use crate::error::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// The wildcard identifier accepted in patterns.
pub const WILDCARD: &str = "-";

/// The kind of a name: its deepest non-empty component.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Entity {
    Project,
    Api,
    Version,
    Spec,
    Deployment,
    Artifact,
}

impl Entity {
    /// Keyword used by `$resource.<entity>` references.
    pub fn keyword(&self) -> &'static str {
        match self {
            Self::Project => "project",
            Self::Api => "api",
            Self::Version => "version",
            Self::Spec => "spec",
            Self::Deployment => "deployment",
            Self::Artifact => "artifact",
        }
    }

    pub fn from_keyword(s: &str) -> Option<Self> {
        match s {
            "project" => Some(Self::Project),
            "api" => Some(Self::Api),
            "version" => Some(Self::Version),
            "spec" => Some(Self::Spec),
            "deployment" => Some(Self::Deployment),
            "artifact" => Some(Self::Artifact),
            _ => None,
        }
    }

    /// Position in the hierarchy. Specs and deployments share a level.
    pub fn depth(&self) -> u8 {
        match self {
            Self::Project => 0,
            Self::Api => 1,
            Self::Version => 2,
            Self::Spec | Self::Deployment => 3,
            Self::Artifact => 4,
        }
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.keyword())
    }
}

/// A hierarchical registry name. May contain `-` wildcard segments when used
/// as a pattern; see [`ResourceName::is_concrete`].
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ResourceName {
    project: String,
    api: Option<String>,
    version: Option<String>,
    spec: Option<String>,
    deployment: Option<String>,
    revision: Option<String>,
    artifact: Option<String>,
}

fn valid_id(s: &str) -> bool {
    !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || "-._~%".contains(c))
}

fn valid_revision(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
}

fn check_id(kind: &str, s: &str) -> Result<String> {
    if valid_id(s) {
        Ok(s.to_string())
    } else {
        Err(Error::name_parse(format!("invalid {} id {:?}", kind, s)))
    }
}

/// Split a `specs/{s}@{rev}` style identifier into id and revision.
fn split_revision(kind: &str, s: &str) -> Result<(String, Option<String>)> {
    match s.split_once('@') {
        None => Ok((check_id(kind, s)?, None)),
        Some((id, rev)) => {
            if !valid_revision(rev) {
                return Err(Error::name_parse(format!("invalid revision {:?}", rev)));
            }
            Ok((check_id(kind, id)?, Some(rev.to_string())))
        }
    }
}

impl ResourceName {
    /// The name of a project root: `projects/{p}/locations/global`.
    pub fn project(project_id: &str) -> Result<Self> {
        Ok(Self {
            project: check_id("project", project_id)?,
            api: None,
            version: None,
            spec: None,
            deployment: None,
            revision: None,
            artifact: None,
        })
    }

    /// Parse a slash-form name. Accepts an omitted `locations/global` pair
    /// and renders it back canonically; every other shape error is fatal.
    pub fn parse(s: &str) -> Result<Self> {
        let segs: Vec<&str> = s.trim_matches('/').split('/').collect();
        if segs.len() < 2 || segs[0] != "projects" {
            return Err(Error::name_parse(format!(
                "expected projects/{{id}}..., got {:?}",
                s
            )));
        }
        let mut name = Self::project(segs[1])?;
        let mut i = 2;
        if segs.get(i) == Some(&"locations") {
            if segs.get(i + 1) != Some(&"global") {
                return Err(Error::name_parse(format!(
                    "unsupported location in {:?}, only locations/global is recognized",
                    s
                )));
            }
            i += 2;
        }
        while i < segs.len() {
            let collection = segs[i];
            let id = *segs
                .get(i + 1)
                .ok_or_else(|| Error::name_parse(format!("dangling collection in {:?}", s)))?;
            i += 2;
            if name.artifact.is_some() {
                return Err(Error::name_parse(format!(
                    "nothing may follow an artifact in {:?}",
                    s
                )));
            }
            match (collection, name.entity()) {
                ("apis", Entity::Project) => name.api = Some(check_id("api", id)?),
                ("versions", Entity::Api) => name.version = Some(check_id("version", id)?),
                ("specs", Entity::Version) => {
                    let (id, rev) = split_revision("spec", id)?;
                    name.spec = Some(id);
                    name.revision = rev;
                }
                ("deployments", Entity::Version) => {
                    let (id, rev) = split_revision("deployment", id)?;
                    name.deployment = Some(id);
                    name.revision = rev;
                }
                ("artifacts", _) => name.artifact = Some(check_id("artifact", id)?),
                _ => {
                    return Err(Error::name_parse(format!(
                        "collection {:?} is not valid after a {} in {:?}",
                        collection,
                        name.entity(),
                        s
                    )))
                }
            }
        }
        Ok(name)
    }

    pub fn project_id(&self) -> &str {
        &self.project
    }

    pub fn api_id(&self) -> Option<&str> {
        self.api.as_deref()
    }

    pub fn version_id(&self) -> Option<&str> {
        self.version.as_deref()
    }

    pub fn spec_id(&self) -> Option<&str> {
        self.spec.as_deref()
    }

    pub fn deployment_id(&self) -> Option<&str> {
        self.deployment.as_deref()
    }

    pub fn revision(&self) -> Option<&str> {
        self.revision.as_deref()
    }

    pub fn artifact_id(&self) -> Option<&str> {
        self.artifact.as_deref()
    }

    /// The deepest non-empty component.
    pub fn entity(&self) -> Entity {
        if self.artifact.is_some() {
            Entity::Artifact
        } else if self.spec.is_some() {
            Entity::Spec
        } else if self.deployment.is_some() {
            Entity::Deployment
        } else if self.version.is_some() {
            Entity::Version
        } else if self.api.is_some() {
            Entity::Api
        } else {
            Entity::Project
        }
    }

    /// True when no populated segment is the `-` wildcard.
    pub fn is_concrete(&self) -> bool {
        let wild = |s: &Option<String>| s.as_deref() == Some(WILDCARD);
        self.project != WILDCARD
            && !wild(&self.api)
            && !wild(&self.version)
            && !wild(&self.spec)
            && !wild(&self.deployment)
            && !wild(&self.artifact)
    }

    /// The enclosing resource, or None for a project root.
    pub fn parent(&self) -> Option<Self> {
        let mut p = self.clone();
        if p.artifact.take().is_some() {
            return Some(p);
        }
        p.revision = None;
        if p.spec.take().is_some() || p.deployment.take().is_some() {
            return Some(p);
        }
        if p.version.take().is_some() {
            return Some(p);
        }
        if p.api.take().is_some() {
            return Some(p);
        }
        None
    }

    /// Drop components below `entity`. Fails when the name does not reach
    /// that entity, which makes it unusable as a reference for it.
    pub fn truncate_to(&self, entity: Entity) -> Result<Self> {
        let missing = |what: &str| {
            Err(Error::unbound(format!(
                "{} has no {} to refer to",
                self, what
            )))
        };
        let mut out = self.clone();
        match entity {
            Entity::Project => {
                out.api = None;
                out.version = None;
                out.spec = None;
                out.deployment = None;
                out.revision = None;
                out.artifact = None;
            }
            Entity::Api => {
                if out.api.is_none() {
                    return missing("api");
                }
                out.version = None;
                out.spec = None;
                out.deployment = None;
                out.revision = None;
                out.artifact = None;
            }
            Entity::Version => {
                if out.version.is_none() {
                    return missing("version");
                }
                out.spec = None;
                out.deployment = None;
                out.revision = None;
                out.artifact = None;
            }
            Entity::Spec => {
                if out.spec.is_none() {
                    return missing("spec");
                }
                out.artifact = None;
            }
            Entity::Deployment => {
                if out.deployment.is_none() {
                    return missing("deployment");
                }
                out.artifact = None;
            }
            Entity::Artifact => {
                if out.artifact.is_none() {
                    return missing("artifact");
                }
            }
        }
        Ok(out)
    }

    /// Attach an artifact id. Fails on names that already end in one.
    pub fn with_artifact(&self, artifact_id: &str) -> Result<Self> {
        if self.artifact.is_some() {
            return Err(Error::name_parse(format!(
                "{} already names an artifact",
                self
            )));
        }
        let mut out = self.clone();
        out.artifact = Some(check_id("artifact", artifact_id)?);
        Ok(out)
    }

    /// Pin the spec or deployment component to a revision.
    pub fn with_revision(&self, revision_id: &str) -> Result<Self> {
        if self.spec.is_none() && self.deployment.is_none() {
            return Err(Error::name_parse(format!(
                "{} has no spec or deployment to pin",
                self
            )));
        }
        if !valid_revision(revision_id) {
            return Err(Error::name_parse(format!(
                "invalid revision {:?}",
                revision_id
            )));
        }
        let mut out = self.clone();
        out.revision = Some(revision_id.to_string());
        Ok(out)
    }

    pub fn without_revision(&self) -> Self {
        let mut out = self.clone();
        out.revision = None;
        out
    }

    /// Pattern match: `self` (possibly containing wildcards) against a
    /// concrete name. Revisions are ignored, shapes must align exactly.
    pub fn matches(&self, concrete: &Self) -> bool {
        fn seg(pattern: &str, id: &str) -> bool {
            pattern == WILDCARD || pattern == id
        }
        fn opt(pattern: &Option<String>, id: &Option<String>) -> bool {
            match (pattern, id) {
                (None, None) => true,
                (Some(p), Some(i)) => seg(p, i),
                _ => false,
            }
        }
        seg(&self.project, &concrete.project)
            && opt(&self.api, &concrete.api)
            && opt(&self.version, &concrete.version)
            && opt(&self.spec, &concrete.spec)
            && opt(&self.deployment, &concrete.deployment)
            && opt(&self.artifact, &concrete.artifact)
    }
}

impl fmt::Display for ResourceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "projects/{}/locations/global", self.project)?;
        if let Some(api) = &self.api {
            write!(f, "/apis/{}", api)?;
        }
        if let Some(version) = &self.version {
            write!(f, "/versions/{}", version)?;
        }
        if let Some(spec) = &self.spec {
            write!(f, "/specs/{}", spec)?;
        } else if let Some(deployment) = &self.deployment {
            write!(f, "/deployments/{}", deployment)?;
        }
        if let Some(rev) = &self.revision {
            write!(f, "@{}", rev)?;
        }
        if let Some(artifact) = &self.artifact {
            write!(f, "/artifacts/{}", artifact)?;
        }
        Ok(())
    }
}

impl FromStr for ResourceName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Serialize for ResourceName {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ResourceName {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}
