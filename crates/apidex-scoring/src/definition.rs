//! Score definitions — what to measure and how to grade it.
//!
//! Definitions are stored as YAML artifacts in the registry. A definition
//! names a value type (integer range, percent, or boolean) with severity
//! thresholds, and a formula: either a single expression over one artifact's
//! payload, or a rollup combining several such expressions keyed by
//! `reference_id`.

use crate::score::Severity;
use apidex_core::{Error, Result};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScoreDefinition {
    pub id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub display_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    #[serde(rename = "type")]
    pub value_type: ValueType,
    pub formula: Formula,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    Integer(IntegerType),
    Percent(PercentType),
    Boolean(BooleanType),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IntegerType {
    #[serde(default)]
    pub min_value: i32,
    pub max_value: i32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub thresholds: Vec<NumberThreshold>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PercentType {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub thresholds: Vec<NumberThreshold>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BooleanType {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub display_true: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub display_false: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub thresholds: Vec<BooleanThreshold>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NumberThreshold {
    pub severity: Severity,
    pub range: ThresholdRange,
}

/// Inclusive on both ends.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ThresholdRange {
    pub min: f64,
    pub max: f64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BooleanThreshold {
    pub severity: Severity,
    pub value: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Formula {
    Score(ScoreFormula),
    Rollup(RollupFormula),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScoreFormula {
    pub artifact: ArtifactRef,
    pub score_expression: String,
    /// Key this formula's value takes in a rollup's expression context.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reference_id: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ArtifactRef {
    pub pattern: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RollupFormula {
    pub score_formulas: Vec<ScoreFormula>,
    pub rollup_expression: String,
}

impl ScoreDefinition {
    /// Parse a definition artifact. Any shape mismatch, including an unknown
    /// formula or value-type variant, is an invalid definition.
    pub fn from_yaml(bytes: &[u8]) -> Result<Self> {
        let definition: Self = serde_yaml::from_slice(bytes)
            .map_err(|e| Error::InvalidDefinition(e.to_string()))?;
        definition.validate()?;
        Ok(definition)
    }

    pub fn validate(&self) -> Result<()> {
        if self.id.is_empty() {
            return Err(Error::InvalidDefinition("id must not be empty".to_string()));
        }
        if let ValueType::Integer(integer) = &self.value_type {
            if integer.min_value >= integer.max_value {
                return Err(Error::InvalidDefinition(format!(
                    "integer range [{}, {}] is empty",
                    integer.min_value, integer.max_value
                )));
            }
        }
        match &self.formula {
            Formula::Score(formula) => formula.validate(false),
            Formula::Rollup(rollup) => {
                if rollup.score_formulas.is_empty() {
                    return Err(Error::InvalidDefinition(
                        "rollup needs at least one score formula".to_string(),
                    ));
                }
                if rollup.rollup_expression.is_empty() {
                    return Err(Error::InvalidDefinition(
                        "rollup_expression must not be empty".to_string(),
                    ));
                }
                let mut seen = std::collections::BTreeSet::new();
                for formula in &rollup.score_formulas {
                    formula.validate(true)?;
                    if !seen.insert(formula.reference_id.as_str()) {
                        return Err(Error::InvalidDefinition(format!(
                            "duplicate reference_id {:?}",
                            formula.reference_id
                        )));
                    }
                }
                Ok(())
            }
        }
    }
}

impl ScoreFormula {
    fn validate(&self, in_rollup: bool) -> Result<()> {
        if self.artifact.pattern.is_empty() {
            return Err(Error::InvalidDefinition(
                "artifact pattern must not be empty".to_string(),
            ));
        }
        if self.score_expression.is_empty() {
            return Err(Error::InvalidDefinition(
                "score_expression must not be empty".to_string(),
            ));
        }
        if in_rollup && self.reference_id.is_empty() {
            return Err(Error::InvalidDefinition(
                "reference_id is required inside a rollup".to_string(),
            ));
        }
        if self.reference_id.contains('-') {
            return Err(Error::InvalidDefinition(format!(
                "reference_id {:?} must not contain '-'",
                self.reference_id
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROLLUP: &str = "\
id: quality
display_name: Quality
type:
  integer:
    min_value: 0
    max_value: 100
    thresholds:
    - severity: alert
      range: { min: 0, max: 59 }
    - severity: ok
      range: { min: 60, max: 100 }
formula:
  rollup:
    score_formulas:
    - artifact:
        pattern: $resource.spec/artifacts/lint
      score_expression: 100 - size(problems)
      reference_id: lint
    - artifact:
        pattern: $resource.spec/artifacts/audit
      score_expression: passed
      reference_id: audit
    rollup_expression: lint*0.7 + audit*0.3
";

    #[test]
    fn rollup_definition_parses() {
        let definition = ScoreDefinition::from_yaml(ROLLUP.as_bytes()).unwrap();
        assert_eq!(definition.id, "quality");
        match &definition.formula {
            Formula::Rollup(rollup) => assert_eq!(rollup.score_formulas.len(), 2),
            other => panic!("unexpected formula {:?}", other),
        }
    }

    #[test]
    fn unknown_formula_variant_is_invalid() {
        let yaml = "\
id: x
type:
  percent: {}
formula:
  magic:
    incantation: abracadabra
";
        let err = ScoreDefinition::from_yaml(yaml.as_bytes()).unwrap_err();
        assert!(matches!(err, Error::InvalidDefinition(_)));
    }

    #[test]
    fn reference_ids_reject_dashes_and_duplicates() {
        let dashed = ROLLUP.replace("reference_id: lint", "reference_id: lint-a");
        assert!(ScoreDefinition::from_yaml(dashed.as_bytes()).is_err());

        let duplicated = ROLLUP.replace("reference_id: audit", "reference_id: lint");
        assert!(ScoreDefinition::from_yaml(duplicated.as_bytes()).is_err());
    }

    #[test]
    fn missing_expression_is_invalid() {
        let yaml = "\
id: x
type:
  percent: {}
formula:
  score:
    artifact:
      pattern: $resource.spec/artifacts/lint
    score_expression: ''
";
        assert!(ScoreDefinition::from_yaml(yaml.as_bytes()).is_err());
    }

    #[test]
    fn empty_integer_range_is_invalid() {
        let yaml = "\
id: x
type:
  integer:
    min_value: 10
    max_value: 10
formula:
  score:
    artifact:
      pattern: $resource.spec/artifacts/lint
    score_expression: size(problems)
";
        assert!(ScoreDefinition::from_yaml(yaml.as_bytes()).is_err());
    }
}
