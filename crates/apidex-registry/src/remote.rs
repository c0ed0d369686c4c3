//! Remote registry adapter — JSON client over the registry's HTTP front door.
//!
//! The gRPC service sits behind a transcoding proxy, so every operation maps
//! to a REST call: `GET /v1/{name}`, `GET /v1/{parent}/{collection}` with
//! paging, `PUT`/`PATCH /v1/{name}` for upserts, and `:getContents` for
//! payload bytes. The adapter owns the fan-out bound (a semaphore, default
//! 10 permits) and retries 429/5xx responses with exponential backoff.

use crate::lister::{RegistryLister, Revision};
use apidex_core::{
    ApiBody, ArtifactBody, DeploymentBody, Entity, Error, RegistryResource, ResourceBody,
    ResourceName, Result, SpecBody, VersionBody,
};
use base64::Engine;
use chrono::{DateTime, Utc};
use reqwest::{Client, Method, StatusCode};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

#[derive(Clone, Debug)]
pub struct RemoteConfig {
    /// Base URL of the transcoding front door, e.g. `https://registry.example.com`.
    pub base_url: String,
    /// Bearer token attached to every request, when present.
    pub token: Option<String>,
    /// Maximum concurrent in-flight operations.
    pub max_inflight: usize,
    pub max_retries: u32,
    pub retry_base_ms: u64,
    pub page_size: u32,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            token: None,
            max_inflight: 10,
            max_retries: 3,
            retry_base_ms: 500,
            page_size: 200,
        }
    }
}

pub struct RemoteRegistry {
    client: Client,
    config: RemoteConfig,
    permits: Arc<Semaphore>,
}

impl RemoteRegistry {
    pub fn new(config: RemoteConfig) -> Self {
        let permits = Arc::new(Semaphore::new(config.max_inflight.max(1)));
        Self {
            client: Client::new(),
            config,
            permits,
        }
    }

    pub fn with_base_url(url: impl Into<String>) -> Self {
        Self::new(RemoteConfig {
            base_url: url.into(),
            ..Default::default()
        })
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}/v1/{}", self.config.base_url.trim_end_matches('/'), path);
        let builder = self.client.request(method, url);
        match &self.config.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Issue a request, retrying retryable failures until the budget runs
    /// out. 404 is returned to the caller, not retried.
    async fn send_with_retry<F>(&self, cancel: &CancellationToken, build: F) -> Result<reqwest::Response>
    where
        F: Fn() -> reqwest::RequestBuilder,
    {
        let mut attempt: u32 = 0;
        loop {
            let outcome = tokio::select! {
                r = build().send() => r,
                _ = cancel.cancelled() => return Err(Error::Cancelled),
            };
            match outcome {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() || status == StatusCode::NOT_FOUND {
                        return Ok(response);
                    }
                    let retryable =
                        status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error();
                    if !retryable || attempt >= self.config.max_retries {
                        let text = response.text().await.unwrap_or_default();
                        return Err(Error::transport(format!("{}: {}", status, text)));
                    }
                    warn!(%status, attempt, "registry request failed, retrying");
                }
                Err(e) => {
                    if attempt >= self.config.max_retries {
                        return Err(Error::transport(e.to_string()));
                    }
                    warn!(error = %e, attempt, "registry request failed, retrying");
                }
            }
            attempt += 1;
            let delay = Duration::from_millis(
                self.config.retry_base_ms.saturating_mul(1u64 << attempt.min(6)),
            );
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancel.cancelled() => return Err(Error::Cancelled),
            }
        }
    }

    async fn fetch_contents(
        &self,
        name: &ResourceName,
        cancel: &CancellationToken,
    ) -> Result<Option<Vec<u8>>> {
        let path = format!("{}:getContents", name);
        let response = self
            .send_with_retry(cancel, || self.request(Method::GET, &path))
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::transport(e.to_string()))?;
        Ok(Some(bytes.to_vec()))
    }
}

/// Collection path for one page of a listing: the pattern minus its deepest
/// component, plus that component's collection. Wildcard parents pass
/// through; the service treats `-` as "all".
fn list_path(pattern: &ResourceName) -> Result<String> {
    let collection = match pattern.entity() {
        Entity::Project => {
            return Err(Error::validation(format!(
                "cannot list the project collection from {}",
                pattern
            )))
        }
        Entity::Api => "apis",
        Entity::Version => "versions",
        Entity::Spec => "specs",
        Entity::Deployment => "deployments",
        Entity::Artifact => "artifacts",
    };
    let parent = pattern
        .parent()
        .ok_or_else(|| Error::validation(format!("{} has no parent collection", pattern)))?;
    Ok(format!("{}/{}", parent, collection))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ResourceJson {
    name: String,
    display_name: String,
    description: String,
    availability: String,
    state: String,
    filename: String,
    mime_type: String,
    revision_id: String,
    source_uri: String,
    endpoint_uri: String,
    api_spec_revision: String,
    recommended_version: String,
    recommended_deployment: String,
    hash: String,
    size_bytes: u64,
    contents: String,
    labels: BTreeMap<String, String>,
    annotations: BTreeMap<String, String>,
    create_time: Option<DateTime<Utc>>,
    update_time: Option<DateTime<Utc>>,
}

fn optional(s: String) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

impl ResourceJson {
    fn into_resource(self) -> Result<RegistryResource> {
        let name = ResourceName::parse(&self.name)?;
        let contents = if self.contents.is_empty() {
            None
        } else {
            Some(
                base64::engine::general_purpose::STANDARD
                    .decode(&self.contents)
                    .map_err(|e| Error::transport(format!("invalid payload encoding: {}", e)))?,
            )
        };
        let body = match name.entity() {
            Entity::Project => ResourceBody::Project,
            Entity::Api => ResourceBody::Api(ApiBody {
                display_name: self.display_name,
                description: self.description,
                availability: self.availability,
                recommended_version: optional(self.recommended_version),
                recommended_deployment: optional(self.recommended_deployment),
            }),
            Entity::Version => ResourceBody::Version(VersionBody {
                display_name: self.display_name,
                description: self.description,
                state: self.state,
            }),
            Entity::Spec => ResourceBody::Spec(SpecBody {
                filename: self.filename,
                mime_type: self.mime_type,
                revision_id: self.revision_id,
                source_uri: optional(self.source_uri),
                contents,
                hash: self.hash,
                size_bytes: self.size_bytes,
            }),
            Entity::Deployment => ResourceBody::Deployment(DeploymentBody {
                revision_id: self.revision_id,
                api_spec_revision: optional(self.api_spec_revision),
                endpoint_uri: optional(self.endpoint_uri),
            }),
            Entity::Artifact => ResourceBody::Artifact(ArtifactBody {
                mime_type: self.mime_type,
                contents,
                hash: self.hash,
                size_bytes: self.size_bytes,
            }),
        };
        let update_time = self.update_time.unwrap_or_else(Utc::now);
        Ok(RegistryResource {
            name,
            labels: self.labels,
            annotations: self.annotations,
            create_time: self.create_time.unwrap_or(update_time),
            update_time,
            body,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ListResponse {
    apis: Vec<ResourceJson>,
    api_versions: Vec<ResourceJson>,
    api_specs: Vec<ResourceJson>,
    api_deployments: Vec<ResourceJson>,
    artifacts: Vec<ResourceJson>,
    next_page_token: String,
}

impl ListResponse {
    fn into_page(self) -> (Vec<ResourceJson>, String) {
        let token = self.next_page_token;
        for items in [
            self.apis,
            self.api_versions,
            self.api_specs,
            self.api_deployments,
            self.artifacts,
        ] {
            if !items.is_empty() {
                return (items, token);
            }
        }
        (Vec::new(), token)
    }
}

fn upsert_body(resource: &RegistryResource) -> serde_json::Value {
    let mut body = serde_json::json!({
        "labels": resource.labels,
        "annotations": resource.annotations,
    });
    let fields = match &resource.body {
        ResourceBody::Project => serde_json::json!({}),
        ResourceBody::Api(api) => serde_json::json!({
            "displayName": api.display_name,
            "description": api.description,
            "availability": api.availability,
            "recommendedVersion": api.recommended_version,
            "recommendedDeployment": api.recommended_deployment,
        }),
        ResourceBody::Version(version) => serde_json::json!({
            "displayName": version.display_name,
            "description": version.description,
            "state": version.state,
        }),
        ResourceBody::Spec(spec) => serde_json::json!({
            "filename": spec.filename,
            "mimeType": spec.mime_type,
            "sourceUri": spec.source_uri,
            "contents": spec.contents.as_ref().map(|c| {
                base64::engine::general_purpose::STANDARD.encode(c)
            }),
        }),
        ResourceBody::Deployment(deployment) => serde_json::json!({
            "apiSpecRevision": deployment.api_spec_revision,
            "endpointUri": deployment.endpoint_uri,
        }),
        ResourceBody::Artifact(artifact) => serde_json::json!({
            "mimeType": artifact.mime_type,
            "contents": artifact.contents.as_ref().map(|c| {
                base64::engine::general_purpose::STANDARD.encode(c)
            }),
        }),
    };
    if let (Some(body), Some(fields)) = (body.as_object_mut(), fields.as_object()) {
        for (k, v) in fields {
            body.insert(k.clone(), v.clone());
        }
    }
    body
}

#[async_trait::async_trait]
impl RegistryLister for RemoteRegistry {
    async fn list(
        &self,
        pattern: &ResourceName,
        filter: Option<&str>,
        with_contents: bool,
        cancel: &CancellationToken,
    ) -> Result<Vec<RegistryResource>> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| Error::Cancelled)?;
        let path = list_path(pattern)?;
        let mut out = Vec::new();
        let mut page_token = String::new();
        loop {
            let token = page_token.clone();
            let response = self
                .send_with_retry(cancel, || {
                    let mut request = self
                        .request(Method::GET, &path)
                        .query(&[("pageSize", self.config.page_size.to_string())]);
                    if let Some(f) = filter {
                        request = request.query(&[("filter", f)]);
                    }
                    if !token.is_empty() {
                        request = request.query(&[("pageToken", token.as_str())]);
                    }
                    request
                })
                .await?;
            if response.status() == StatusCode::NOT_FOUND {
                break;
            }
            let page: ListResponse = response
                .json()
                .await
                .map_err(|e| Error::transport(e.to_string()))?;
            let (items, next) = page.into_page();
            for item in items {
                let resource = item.into_resource()?;
                if pattern.matches(&resource.name) {
                    out.push(resource);
                }
            }
            if next.is_empty() {
                break;
            }
            page_token = next;
        }
        if with_contents {
            for resource in &mut out {
                if resource.contents().is_none()
                    && matches!(resource.name.entity(), Entity::Spec | Entity::Artifact)
                {
                    if let Some(bytes) = self.fetch_contents(&resource.name, cancel).await? {
                        match &mut resource.body {
                            ResourceBody::Spec(spec) => spec.contents = Some(bytes),
                            ResourceBody::Artifact(artifact) => artifact.contents = Some(bytes),
                            _ => {}
                        }
                    }
                }
            }
        }
        out.sort_by_key(|r| r.name.to_string());
        debug!(pattern = %pattern, results = out.len(), "listed registry resources");
        Ok(out)
    }

    async fn get(
        &self,
        name: &ResourceName,
        with_contents: bool,
        cancel: &CancellationToken,
    ) -> Result<Option<RegistryResource>> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| Error::Cancelled)?;
        let path = name.without_revision().to_string();
        let response = self
            .send_with_retry(cancel, || self.request(Method::GET, &path))
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let json: ResourceJson = response
            .json()
            .await
            .map_err(|e| Error::transport(e.to_string()))?;
        let mut resource = json.into_resource()?;
        if with_contents
            && resource.contents().is_none()
            && matches!(resource.name.entity(), Entity::Spec | Entity::Artifact)
        {
            if let Some(bytes) = self.fetch_contents(&resource.name, cancel).await? {
                match &mut resource.body {
                    ResourceBody::Spec(spec) => spec.contents = Some(bytes),
                    ResourceBody::Artifact(artifact) => artifact.contents = Some(bytes),
                    _ => {}
                }
            }
        }
        Ok(Some(resource))
    }

    async fn put(&self, resource: RegistryResource, cancel: &CancellationToken) -> Result<()> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| Error::Cancelled)?;
        let path = resource.name.without_revision().to_string();
        let body = upsert_body(&resource);
        let is_artifact = matches!(resource.body, ResourceBody::Artifact(_));
        let response = self
            .send_with_retry(cancel, || {
                if is_artifact {
                    self.request(Method::PUT, &path).json(&body)
                } else {
                    self.request(Method::PATCH, &path)
                        .query(&[("allowMissing", "true")])
                        .json(&body)
                }
            })
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(Error::not_found(path));
        }
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

    #[test]
    fn list_paths_follow_the_collection_of_the_deepest_segment() {
        let pattern = ResourceName::parse(
            "projects/p/locations/global/apis/-/versions/-/specs/-",
        )
        .unwrap();
        assert_eq!(
            list_path(&pattern).unwrap(),
            "projects/p/locations/global/apis/-/versions/-/specs"
        );

        let artifacts =
            ResourceName::parse("projects/p/locations/global/artifacts/-").unwrap();
        assert_eq!(
            list_path(&artifacts).unwrap(),
            "projects/p/locations/global/artifacts"
        );

        let project = ResourceName::parse("projects/p/locations/global").unwrap();
        assert!(list_path(&project).is_err());
    }

    #[test]
    fn wire_records_decode_into_typed_bodies() {
        let json = serde_json::json!({
            "name": "projects/p/locations/global/apis/a/versions/v/specs/s",
            "mimeType": "application/x.openapi",
            "revisionId": "abc123",
            "updateTime": "2026-03-01T10:00:00Z",
            "contents": base64::engine::general_purpose::STANDARD.encode(b"openapi: 3.0.0"),
        });
        let parsed: ResourceJson = serde_json::from_value(json).unwrap();
        let resource = parsed.into_resource().unwrap();
        assert_eq!(resource.revision_id(), Some("abc123"));
        assert_eq!(resource.contents(), Some(&b"openapi: 3.0.0"[..]));
    }

    #[test]
    fn list_pages_surface_whichever_collection_is_populated() {
        let json = serde_json::json!({
            "apiSpecs": [{"name": "projects/p/locations/global/apis/a/versions/v/specs/s"}],
            "nextPageToken": "tok",
        });
        let parsed: ListResponse = serde_json::from_value(json).unwrap();
        let (items, token) = parsed.into_page();
        assert_eq!(items.len(), 1);
        assert_eq!(token, "tok");
    }

    #[test]
    fn upsert_bodies_carry_entity_fields() {
        let name = ResourceName::parse("projects/p/locations/global/apis/a").unwrap();
        let mut resource = RegistryResource::empty(name, Utc::now());
        if let ResourceBody::Api(api) = &mut resource.body {
            api.display_name = "Petstore".to_string();
            api.recommended_version = Some("1.0.0".to_string());
        }
        let body = upsert_body(&resource);
        assert_eq!(body["displayName"], "Petstore");
        assert_eq!(body["recommendedVersion"], "1.0.0");
    }
}
