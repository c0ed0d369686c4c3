//! In-memory registry — the offline lister used by tests and fixtures.
//!
//! Resources live in a name-keyed BTreeMap, so listings are sorted without
//! extra work and plans over the same seeded state are reproducible.

use crate::lister::{RegistryLister, Revision};
use apidex_core::expression::{self, Value};
use apidex_core::{content_hash, Error, RegistryResource, ResourceBody, ResourceName, Result};
use chrono::Utc;
use serde_json::json;
use std::collections::BTreeMap;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

#[derive(Default)]
pub struct MemoryRegistry {
    resources: RwLock<BTreeMap<String, RegistryResource>>,
}

/// Fields a listing filter expression may reference.
fn filter_context(resource: &RegistryResource) -> serde_json::Value {
    json!({
        "name": resource.name.to_string(),
        "mime_type": resource.mime_type().unwrap_or_default(),
        "labels": resource.labels,
        "annotations": resource.annotations,
    })
}

fn filter_matches(filter: &str, resource: &RegistryResource) -> Result<bool> {
    match expression::evaluate(filter, &filter_context(resource))? {
        Value::Bool(b) => Ok(b),
        other => Err(Error::validation(format!(
            "filter {:?} evaluated to {}, expected bool",
            filter,
            other.type_name()
        ))),
    }
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a resource as-is, keeping its timestamps. Seeding is how tests
    /// and fixtures construct precise registry states.
    pub async fn seed(&self, resource: RegistryResource) {
        let mut map = self.resources.write().await;
        map.insert(resource.name.to_string(), resource);
    }

    pub async fn seed_all(&self, resources: impl IntoIterator<Item = RegistryResource>) {
        let mut map = self.resources.write().await;
        for resource in resources {
            map.insert(resource.name.to_string(), resource);
        }
    }

    pub async fn len(&self) -> usize {
        self.resources.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.resources.read().await.is_empty()
    }
}

#[async_trait::async_trait]
impl RegistryLister for MemoryRegistry {
    async fn list(
        &self,
        pattern: &ResourceName,
        filter: Option<&str>,
        with_contents: bool,
        cancel: &CancellationToken,
    ) -> Result<Vec<RegistryResource>> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let map = self.resources.read().await;
        let mut out = Vec::new();
        for resource in map.values() {
            if !pattern.matches(&resource.name) {
                continue;
            }
            if let Some(f) = filter {
                if !filter_matches(f, resource)? {
                    continue;
                }
            }
            out.push(if with_contents {
                resource.clone()
            } else {
                resource.without_contents()
            });
        }
        Ok(out)
    }

    async fn get(
        &self,
        name: &ResourceName,
        with_contents: bool,
        cancel: &CancellationToken,
    ) -> Result<Option<RegistryResource>> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let map = self.resources.read().await;
        Ok(map.get(&name.without_revision().to_string()).map(|r| {
            if with_contents {
                r.clone()
            } else {
                r.without_contents()
            }
        }))
    }

    async fn put(&self, mut resource: RegistryResource, cancel: &CancellationToken) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        if !resource.name.is_concrete() {
            return Err(Error::validation(format!(
                "cannot write to the pattern {}",
                resource.name
            )));
        }
        let now = Utc::now();
        resource.name = resource.name.without_revision();
        resource.update_time = now;
        match &mut resource.body {
            ResourceBody::Spec(spec) => {
                if let Some(contents) = &spec.contents {
                    spec.hash = content_hash(contents);
                    spec.size_bytes = contents.len() as u64;
                    spec.revision_id = spec.hash.chars().take(8).collect();
                }
            }
            ResourceBody::Artifact(artifact) => {
                if let Some(contents) = &artifact.contents {
                    artifact.hash = content_hash(contents);
                    artifact.size_bytes = contents.len() as u64;
                }
            }
            _ => {}
        }
        let mut map = self.resources.write().await;
        if let Some(existing) = map.get(&resource.name.to_string()) {
            resource.create_time = existing.create_time;
        } else {
            resource.create_time = now;
        }
        map.insert(resource.name.to_string(), resource);
        Ok(())
    }

    async fn resolve_revision(
        &self,
        name: &ResourceName,
        cancel: &CancellationToken,
    ) -> Result<Revision> {
        let resource = self
            .get(name, false, cancel)
            .await?
            .ok_or_else(|| Error::not_found(name.to_string()))?;
        match resource.revision_id() {
            Some(revision_id) => Ok(Revision {
                revision_id: revision_id.to_string(),
                update_time: resource.update_time,
            }),
            None => Err(Error::validation(format!(
                "{} is not a revisioned resource",
                name
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use apidex_core::SpecBody;
    use chrono::{DateTime, Utc};

    fn ts(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn spec(name: &str, revision_id: &str, updated: &str) -> RegistryResource {
        let mut resource =
            RegistryResource::empty(ResourceName::parse(name).unwrap(), ts(updated));
        resource.body = ResourceBody::Spec(SpecBody {
            filename: "openapi.yaml".to_string(),
            mime_type: "application/x.openapi".to_string(),
            revision_id: revision_id.to_string(),
            ..Default::default()
        });
        resource
    }

    fn artifact(name: &str, mime: &str, contents: &str, updated: &str) -> RegistryResource {
        RegistryResource::artifact(
            ResourceName::parse(name).unwrap(),
            mime,
            contents.as_bytes().to_vec(),
            ts(updated),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn listings_are_sorted_and_wildcard_filtered() {
        let registry = MemoryRegistry::new();
        registry
            .seed_all([
                spec(
                    "projects/p/locations/global/apis/b/versions/v1/specs/s",
                    "r1",
                    "2026-01-02T00:00:00Z",
                ),
                spec(
                    "projects/p/locations/global/apis/a/versions/v1/specs/s",
                    "r2",
                    "2026-01-01T00:00:00Z",
                ),
            ])
            .await;
        let pattern =
            ResourceName::parse("projects/p/locations/global/apis/-/versions/-/specs/-").unwrap();
        let cancel = CancellationToken::new();
        let listed = registry.list(&pattern, None, false, &cancel).await.unwrap();
        let names: Vec<String> = listed.iter().map(|r| r.name.to_string()).collect();
        assert_eq!(
            names,
            vec![
                "projects/p/locations/global/apis/a/versions/v1/specs/s",
                "projects/p/locations/global/apis/b/versions/v1/specs/s",
            ]
        );
    }

    #[tokio::test]
    async fn filters_evaluate_against_resource_fields() {
        let registry = MemoryRegistry::new();
        registry
            .seed_all([
                artifact(
                    "projects/p/locations/global/artifacts/a",
                    "application/json",
                    "{}",
                    "2026-01-01T00:00:00Z",
                ),
                artifact(
                    "projects/p/locations/global/artifacts/b",
                    "application/yaml",
                    "{}",
                    "2026-01-01T00:00:00Z",
                ),
            ])
            .await;
        let pattern = ResourceName::parse("projects/p/locations/global/artifacts/-").unwrap();
        let cancel = CancellationToken::new();
        let listed = registry
            .list(
                &pattern,
                Some("mime_type == 'application/json'"),
                false,
                &cancel,
            )
            .await
            .unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(
            listed[0].name.to_string(),
            "projects/p/locations/global/artifacts/a"
        );
    }

    #[tokio::test]
    async fn get_ignores_revision_suffix() {
        let registry = MemoryRegistry::new();
        registry
            .seed(spec(
                "projects/p/locations/global/apis/a/versions/v/specs/s",
                "r9",
                "2026-01-01T00:00:00Z",
            ))
            .await;
        let pinned =
            ResourceName::parse("projects/p/locations/global/apis/a/versions/v/specs/s@r9")
                .unwrap();
        let cancel = CancellationToken::new();
        assert!(registry.get(&pinned, false, &cancel).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn put_bumps_spec_revision_from_contents() {
        let registry = MemoryRegistry::new();
        let name = "projects/p/locations/global/apis/a/versions/v/specs/s";
        let mut resource = spec(name, "", "2026-01-01T00:00:00Z");
        if let ResourceBody::Spec(body) = &mut resource.body {
            body.contents = Some(b"openapi: 3.0.0".to_vec());
        }
        let cancel = CancellationToken::new();
        registry.put(resource, &cancel).await.unwrap();
        let revision = registry
            .resolve_revision(&ResourceName::parse(name).unwrap(), &cancel)
            .await
            .unwrap();
        assert_eq!(revision.revision_id.len(), 8);
    }

    #[tokio::test]
    async fn cancelled_token_aborts() {
        let registry = MemoryRegistry::new();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let pattern = ResourceName::parse("projects/p/locations/global/artifacts/-").unwrap();
        let err = registry.list(&pattern, None, false, &cancel).await.unwrap_err();
        assert!(err.is_cancelled());
    }
}
