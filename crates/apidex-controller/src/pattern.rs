//! Pattern engine — wildcard and reference expansion over the registry.
//!
//! A pattern is a slash-form name fragment where a `-` segment matches every
//! member of its collection and `$resource.<entity>` stands for the bound
//! reference resource truncated to that entity. Patterns written without a
//! `projects/` prefix are relative to the project root.

use apidex_core::manifest::{references, RESOURCE_REF};
use apidex_core::{Entity, Error, RegistryResource, ResourceName, Result};
use apidex_registry::RegistryLister;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Prefix a relative pattern with its project root.
pub fn resolve_relative(project_id: &str, pattern: &str) -> String {
    if pattern.starts_with("projects/") {
        pattern.to_string()
    } else {
        format!("projects/{}/locations/global/{}", project_id, pattern)
    }
}

/// Replace every `$resource.<entity>` in `text` with the reference truncated
/// to that entity. Fails with `UnboundReference` when no reference is bound
/// but a placeholder is present, or when the reference is too shallow.
pub fn substitute(text: &str, reference: Option<&ResourceName>) -> Result<String> {
    let entities = references(text)?;
    if entities.is_empty() {
        return Ok(text.to_string());
    }
    let reference = reference.ok_or_else(|| {
        Error::unbound(format!("{:?} used with no reference resource bound", text))
    })?;
    let mut out = text.to_string();
    // Longest keyword first so `deployment` is never clipped by a shorter one.
    let mut keywords: Vec<Entity> = entities;
    keywords.sort_by_key(|e| std::cmp::Reverse(e.keyword().len()));
    keywords.dedup_by_key(|e| e.keyword());
    for entity in keywords {
        let token = format!("{}{}", RESOURCE_REF, entity.keyword());
        let replacement = reference.truncate_to(entity)?.to_string();
        out = out.replace(&token, &replacement);
    }
    Ok(out)
}

pub struct PatternEngine {
    lister: Arc<dyn RegistryLister>,
}

impl PatternEngine {
    pub fn new(lister: Arc<dyn RegistryLister>) -> Self {
        Self { lister }
    }

    /// Expand a dependency-style pattern to the concrete resources it names.
    ///
    /// Placeholders are substituted against `reference` first; a concrete
    /// result is fetched directly, a wildcard result is listed. Output is
    /// sorted by full name so expansion order never depends on the transport.
    pub async fn expand(
        &self,
        project_id: &str,
        pattern: &str,
        filter: Option<&str>,
        reference: Option<&ResourceName>,
        cancel: &CancellationToken,
    ) -> Result<Vec<RegistryResource>> {
        let substituted = substitute(pattern, reference)?;
        let full = resolve_relative(project_id, &substituted);
        let parsed = ResourceName::parse(&full)?;
        let mut resources = if parsed.is_concrete() && filter.is_none() {
            match self.lister.get(&parsed, false, cancel).await? {
                Some(resource) => vec![resource],
                None => Vec::new(),
            }
        } else {
            self.lister.list(&parsed, filter, false, cancel).await?
        };
        resources.sort_by_key(|r| r.name.to_string());
        debug!(pattern = %parsed, results = resources.len(), "expanded pattern");
        Ok(resources)
    }

    /// Expand a target pattern to candidate artifact names.
    ///
    /// The artifact itself may not exist yet, so expansion enumerates the
    /// pattern's parents and appends the literal artifact id to each.
    pub async fn expand_targets(
        &self,
        project_id: &str,
        pattern: &str,
        filter: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Vec<ResourceName>> {
        if pattern.contains(RESOURCE_REF) {
            return Err(Error::validation(format!(
                "target pattern {:?} must not contain references",
                pattern
            )));
        }
        let full = resolve_relative(project_id, pattern);
        let parsed = ResourceName::parse(&full)?;
        let artifact_id = parsed.artifact_id().ok_or_else(|| {
            Error::validation(format!("target pattern {:?} must end at an artifact", pattern))
        })?;
        if artifact_id == "-" {
            return Err(Error::validation(format!(
                "target pattern {:?} must name a literal artifact id",
                pattern
            )));
        }
        let artifact_id = artifact_id.to_string();
        let parent = parsed
            .parent()
            .ok_or_else(|| Error::validation(format!("{} has no parent", parsed)))?;

        if parent.is_concrete() && filter.is_none() {
            return Ok(vec![parent.with_artifact(&artifact_id)?]);
        }
        let parents = self.lister.list(&parent, filter, false, cancel).await?;
        let mut targets = Vec::with_capacity(parents.len());
        for parent in parents {
            targets.push(parent.name.with_artifact(&artifact_id)?);
        }
        targets.sort_by_key(|n| n.to_string());
        targets.dedup();
        Ok(targets)
    }
}
