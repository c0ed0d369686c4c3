//! Scoring engine — evaluate a definition against a resource and upload.
//!
//! The engine is as lazy as the planner: a score is recomputed only when the
//! definition changed or a source artifact is newer than the existing score,
//! with the same slack window the staleness oracle uses. No partial score is
//! ever uploaded; any formula error aborts the evaluation by value.

use crate::definition::{Formula, ScoreDefinition, ScoreFormula};
use crate::score::Score;
use apidex_controller::pattern::PatternEngine;
use apidex_controller::staleness;
use apidex_core::expression::{self, Value};
use apidex_core::{Error, RegistryResource, ResourceName, Result};
use apidex_registry::RegistryLister;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub struct ScoringEngine {
    lister: Arc<dyn RegistryLister>,
    engine: PatternEngine,
    slack: chrono::Duration,
}

/// One formula's outcome: the value, the source artifact's update time, and
/// whether that artifact is newer than the existing score.
struct FormulaResult {
    value: Value,
    needs_update: bool,
}

impl ScoringEngine {
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

    /// Evaluate the definition stored at `definition_name` against `target`.
    ///
    /// Returns `Ok(None)` when the existing score is already current. On
    /// `dry_run` the computed score is returned without touching the
    /// registry; otherwise it is uploaded under
    /// `<target>/artifacts/score-<definition id>` first.
    pub async fn evaluate(
        &self,
        definition_name: &ResourceName,
        target: &ResourceName,
        dry_run: bool,
        cancel: &CancellationToken,
    ) -> Result<Option<Score>> {
        let definition_artifact = self
            .lister
            .get(definition_name, true, cancel)
            .await?
            .ok_or_else(|| {
                Error::not_found(format!("score definition {}", definition_name))
            })?;
        let contents = definition_artifact
            .contents()
            .ok_or_else(|| Error::InvalidDefinition(format!("{} has no payload", definition_name)))?;
        let definition = ScoreDefinition::from_yaml(contents)?;

        let score_name = target
            .without_revision()
            .with_artifact(&format!("score-{}", definition.id))?;
        let score_time = self
            .lister
            .get(&score_name, false, cancel)
            .await?
            .map(|r| r.update_time);

        // The definition itself is a dependency of every score derived from it.
        let definition_changed = staleness::needs_action(
            score_time,
            [definition_artifact.update_time],
            self.slack,
        );

        let value = match &definition.formula {
            Formula::Score(formula) => {
                let result = self
                    .evaluate_formula(formula, target, score_time, definition_changed, cancel)
                    .await?;
                if !definition_changed && !result.needs_update {
                    debug!(score = %score_name, "score is current, skipping");
                    return Ok(None);
                }
                result.value
            }
            Formula::Rollup(rollup) => {
                let mut context = serde_json::Map::new();
                let mut any_update = definition_changed;
                for formula in &rollup.score_formulas {
                    let result = self
                        .evaluate_formula(formula, target, score_time, true, cancel)
                        .await?;
                    any_update = any_update || result.needs_update;
                    context.insert(formula.reference_id.clone(), value_to_json(&result.value));
                }
                if !any_update {
                    debug!(score = %score_name, "score is current, skipping");
                    return Ok(None);
                }
                expression::evaluate(
                    &rollup.rollup_expression,
                    &serde_json::Value::Object(context),
                )?
            }
        };

        let score = Score::from_value(&definition, value)?;
        if dry_run {
            return Ok(Some(score));
        }
        let payload = score.to_yaml()?.into_bytes();
        let artifact = RegistryResource::artifact(
            score_name.clone(),
            "application/yaml;type=Score",
            payload,
            Utc::now(),
        )?;
        self.lister.put(artifact, cancel).await?;
        info!(score = %score_name, severity = %score.severity, "score uploaded");
        Ok(Some(score))
    }

    /// Expand and fetch the formula's artifact, then evaluate its expression
    /// over the decoded payload. Decoding is skipped when neither the
    /// definition nor the artifact requires an update.
    async fn evaluate_formula(
        &self,
        formula: &ScoreFormula,
        target: &ResourceName,
        score_time: Option<DateTime<Utc>>,
        force: bool,
        cancel: &CancellationToken,
    ) -> Result<FormulaResult> {
        let matches = self
            .engine
            .expand(
                target.project_id(),
                &formula.artifact.pattern,
                formula.artifact.filter.as_deref(),
                Some(target),
                cancel,
            )
            .await?;
        let source = matches.first().ok_or_else(|| {
            Error::not_found(format!(
                "no artifact matches {:?} under {}",
                formula.artifact.pattern, target
            ))
        })?;
        let needs_update = staleness::needs_action(score_time, [source.update_time], self.slack);
        if !force && !needs_update {
            // The caller will skip; the value is never read.
            return Ok(FormulaResult {
                value: Value::Bool(false),
                needs_update,
            });
        }
        let full = self
            .lister
            .get(&source.name, true, cancel)
            .await?
            .ok_or_else(|| Error::not_found(source.name.to_string()))?;
        let mime_type = full
            .mime_type()
            .unwrap_or_default()
            .to_string();
        let payload = full
            .contents()
            .ok_or_else(|| Error::not_found(format!("{} has no payload", full.name)))?;
        let context = decode_payload(&mime_type, payload)?;
        let value = expression::evaluate(&formula.score_expression, &context)?;
        Ok(FormulaResult { value, needs_update })
    }
}

/// Decode an artifact payload into the expression context by MIME type.
fn decode_payload(mime_type: &str, payload: &[u8]) -> Result<serde_json::Value> {
    if mime_type.contains("json") {
        Ok(serde_json::from_slice(payload)?)
    } else if mime_type.contains("yaml") {
        let value: serde_yaml::Value = serde_yaml::from_slice(payload)?;
        Ok(serde_json::to_value(value)?)
    } else {
        Err(Error::validation(format!(
            "cannot decode payload of type {:?}",
            mime_type
        )))
    }
}

fn value_to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Int(i) => serde_json::json!(i),
        Value::Float(f) => serde_json::json!(f),
        Value::Bool(b) => serde_json::json!(b),
        Value::Str(s) => serde_json::json!(s),
    }
}
