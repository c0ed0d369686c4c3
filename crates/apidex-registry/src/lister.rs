//! Lister trait — the narrow registry interface every component depends on.

use apidex_core::{RegistryResource, ResourceName, Result};
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

/// The current revision of a spec or deployment.
#[derive(Clone, Debug, PartialEq)]
pub struct Revision {
    pub revision_id: String,
    pub update_time: DateTime<Utc>,
}

/// Read/write access to the registry.
///
/// Implementations own their concurrency bound: callers may issue operations
/// from many tasks, and outstanding work is limited by the adapter, not the
/// caller. Cancelling the token aborts in-flight work with `Error::Cancelled`;
/// whatever the caller accumulated so far stays valid.
#[async_trait::async_trait]
pub trait RegistryLister: Send + Sync {
    /// Enumerate resources matching a pattern, where a `-` segment is the
    /// collection wildcard. Pages are drained to completion and results are
    /// sorted by full name, so identical registry states yield identical
    /// listings.
    async fn list(
        &self,
        pattern: &ResourceName,
        filter: Option<&str>,
        with_contents: bool,
        cancel: &CancellationToken,
    ) -> Result<Vec<RegistryResource>>;

    /// Fetch one resource by concrete name. `Ok(None)` when it does not exist.
    async fn get(
        &self,
        name: &ResourceName,
        with_contents: bool,
        cancel: &CancellationToken,
    ) -> Result<Option<RegistryResource>>;

    /// Idempotent upsert keyed by name.
    async fn put(&self, resource: RegistryResource, cancel: &CancellationToken) -> Result<()>;

    /// Current revision id and update time of a spec or deployment.
    async fn resolve_revision(
        &self,
        name: &ResourceName,
        cancel: &CancellationToken,
    ) -> Result<Revision>;
}
