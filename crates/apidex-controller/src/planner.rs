//! Action planner — turns a manifest into the bounded list of commands to run.
//!
//! Planning is read-only and deterministic: for a fixed registry state and
//! manifest, two runs produce byte-identical plans. Each generated resource
//! is planned independently; a failing entry is recorded and the rest of the
//! manifest still plans. Cancellation stops planning and returns whatever
//! was produced so far.

use crate::pattern::PatternEngine;
use crate::staleness;
use apidex_core::manifest::{references, RESOURCE_REF};
use apidex_core::{Entity, Error, GeneratedResource, Manifest, ResourceName, Result};
use apidex_registry::RegistryLister;
use chrono::Utc;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// One command the runner must execute to converge the registry.
#[derive(Clone, Debug, PartialEq)]
pub struct Action {
    /// Fully substituted shell command.
    pub command: String,
    /// Fully qualified target artifact, revision-qualified when the target
    /// sits under a spec or deployment.
    pub generated_resource: String,
    /// True when the runner must refresh the receipt artifact itself after
    /// the command succeeds.
    pub requires_receipt: bool,
}

/// A manifest entry that could not be planned. The others still were.
#[derive(Debug)]
pub struct EntryError {
    pub pattern: String,
    pub error: Error,
}

#[derive(Debug, Default)]
pub struct Plan {
    pub actions: Vec<Action>,
    pub errors: Vec<EntryError>,
}

pub struct Planner {
    lister: Arc<dyn RegistryLister>,
    engine: PatternEngine,
    slack: chrono::Duration,
}

impl Planner {
    pub fn new(lister: Arc<dyn RegistryLister>) -> Self {
        Self {
            engine: PatternEngine::new(lister.clone()),
            lister,
            slack: staleness::default_slack(),
        }
    }

    pub fn with_slack(mut self, slack: chrono::Duration) -> Self {
        self.slack = slack;
        self
    }

    /// Compute the actions that bring `project_id` in line with `manifest`,
    /// emitting at most `max_actions`. Actions are sorted by command string.
    pub async fn plan(
        &self,
        manifest: &Manifest,
        project_id: &str,
        max_actions: usize,
        cancel: &CancellationToken,
    ) -> Plan {
        let mut actions: Vec<Action> = Vec::new();
        let mut errors = Vec::new();
        for entry in &manifest.generated_resources {
            if actions.len() >= max_actions {
                debug!(cap = max_actions, "action cap reached, planning halted");
                break;
            }
            if let Err(error) = entry.validate() {
                errors.push(EntryError {
                    pattern: entry.pattern.clone(),
                    error,
                });
                continue;
            }
            let budget = max_actions - actions.len();
            match self.plan_entry(entry, project_id, budget, cancel).await {
                Ok(batch) => actions.extend(batch),
                Err(error) if error.is_cancelled() => {
                    debug!("planning cancelled, returning partial plan");
                    break;
                }
                Err(error) => errors.push(EntryError {
                    pattern: entry.pattern.clone(),
                    error,
                }),
            }
        }
        actions.sort_by(|a, b| a.command.cmp(&b.command));
        info!(
            project = project_id,
            manifest = %manifest.id,
            actions = actions.len(),
            errors = errors.len(),
            "plan complete"
        );
        Plan { actions, errors }
    }

    async fn plan_entry(
        &self,
        entry: &GeneratedResource,
        project_id: &str,
        budget: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<Action>> {
        let targets = self
            .engine
            .expand_targets(project_id, &entry.pattern, entry.filter.as_deref(), cancel)
            .await?;
        let reference_entity = entry.reference_entity()?;
        debug!(
            pattern = %entry.pattern,
            candidates = targets.len(),
            "expanded generated-resource targets"
        );

        // Candidates evaluate concurrently; the lister bounds the fan-out.
        // Results are merged in candidate order to keep plans reproducible.
        let evaluations = targets
            .iter()
            .map(|target| self.plan_candidate(entry, project_id, target, reference_entity, cancel));
        let results = futures::future::join_all(evaluations).await;

        let mut out = Vec::new();
        for result in results {
            if let Some(action) = result? {
                if out.len() < budget {
                    out.push(action);
                }
            }
        }
        Ok(out)
    }

    async fn plan_candidate(
        &self,
        entry: &GeneratedResource,
        project_id: &str,
        target: &ResourceName,
        reference_entity: Option<Entity>,
        cancel: &CancellationToken,
    ) -> Result<Option<Action>> {
        let reference = match reference_entity {
            None => ResourceName::project(project_id)?,
            Some(entity) => target.truncate_to(entity).map_err(|_| {
                Error::validation(format!(
                    "target {} is too shallow to bind $resource.{}",
                    target,
                    entity.keyword()
                ))
            })?,
        };

        // Every dependency pattern must land on at least one concrete
        // resource, or the candidate is unrealizable and silently skipped.
        let mut dependency_times = Vec::new();
        for dependency in &entry.dependencies {
            let resources = self
                .engine
                .expand(
                    project_id,
                    &dependency.pattern,
                    dependency.filter.as_deref(),
                    Some(&reference),
                    cancel,
                )
                .await?;
            if resources.is_empty() {
                debug!(target = %target, dependency = %dependency.pattern, "dependency unmatched, candidate skipped");
                return Ok(None);
            }
            dependency_times.extend(resources.iter().map(|r| r.update_time));
        }

        let target_time = self
            .lister
            .get(target, false, cancel)
            .await?
            .map(|r| r.update_time);
        let stale = staleness::needs_action(target_time, dependency_times, self.slack)
            || staleness::needs_refresh(target_time, entry.refresh_interval()?, Utc::now());
        if !stale {
            return Ok(None);
        }

        let command = self.qualify_command(&entry.action, &reference, cancel).await?;
        let generated_resource = self.qualify_target(target, cancel).await?;
        Ok(Some(Action {
            command,
            generated_resource,
            requires_receipt: entry.receipt,
        }))
    }

    /// Substitute `$resource.<entity>` in the command, pinning spec and
    /// deployment references to their current revision.
    async fn qualify_command(
        &self,
        action: &str,
        reference: &ResourceName,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let entities = references(action)?;
        if entities.is_empty() {
            return Ok(action.to_string());
        }
        let mut out = action.to_string();
        let mut keywords: Vec<Entity> = entities;
        keywords.sort_by_key(|e| std::cmp::Reverse(e.keyword().len()));
        keywords.dedup_by_key(|e| e.keyword());
        for entity in keywords {
            let token = format!("{}{}", RESOURCE_REF, entity.keyword());
            if !out.contains(&token) {
                continue;
            }
            let mut name = reference.truncate_to(entity)?;
            if matches!(entity, Entity::Spec | Entity::Deployment) {
                match self.lister.resolve_revision(&name.without_revision(), cancel).await {
                    Ok(revision) => name = name.with_revision(&revision.revision_id)?,
                    Err(e) if e.is_not_found() => {}
                    Err(e) => return Err(e),
                }
            }
            out = out.replace(&token, &name.to_string());
        }
        Ok(out)
    }

    /// Render the target name, pinned to the revision of the spec or
    /// deployment it sits under, when there is one.
    async fn qualify_target(
        &self,
        target: &ResourceName,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let holder = if target.spec_id().is_some() {
            target.truncate_to(Entity::Spec)?
        } else if target.deployment_id().is_some() {
            target.truncate_to(Entity::Deployment)?
        } else {
            return Ok(target.to_string());
        };
        match self
            .lister
            .resolve_revision(&holder.without_revision(), cancel)
            .await
        {
            Ok(revision) => Ok(target.with_revision(&revision.revision_id)?.to_string()),
            Err(e) if e.is_not_found() => Ok(target.to_string()),
            Err(e) => Err(e),
        }
    }
}
