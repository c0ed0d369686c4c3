//! Score values — typed results with severity attached by thresholds.

use crate::definition::{BooleanType, IntegerType, NumberThreshold, PercentType, ScoreDefinition, ValueType};
use apidex_core::expression::Value;
use apidex_core::{Error, Result};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    #[default]
    Unspecified,
    Ok,
    Warning,
    Alert,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unspecified => write!(f, "unspecified"),
            Self::Ok => write!(f, "ok"),
            Self::Warning => write!(f, "warning"),
            Self::Alert => write!(f, "alert"),
        }
    }
}

/// The uploaded score artifact payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Score {
    #[serde(default = "score_kind")]
    pub kind: String,
    pub id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub display_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    pub severity: Severity,
    pub value: ScoreValue,
}

fn score_kind() -> String {
    "Score".to_string()
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreValue {
    Integer {
        value: i32,
        min_value: i32,
        max_value: i32,
    },
    Percent {
        value: f32,
    },
    Boolean {
        value: bool,
        display_value: String,
    },
}

impl Score {
    /// Coerce an expression result into the definition's value type and
    /// attach severity by its thresholds. Integer and float results coerce
    /// to numeric types (floats truncate toward zero); boolean definitions
    /// accept only booleans.
    pub fn from_value(definition: &ScoreDefinition, value: Value) -> Result<Self> {
        let (score_value, severity) = match (&definition.value_type, value) {
            (ValueType::Integer(integer), Value::Int(i)) => integer_score(integer, i as i32),
            (ValueType::Integer(integer), Value::Float(f)) => integer_score(integer, f as i32),
            (ValueType::Percent(percent), Value::Int(i)) => percent_score(percent, i as f32),
            (ValueType::Percent(percent), Value::Float(f)) => percent_score(percent, f as f32),
            (ValueType::Boolean(boolean), Value::Bool(b)) => boolean_score(boolean, b),
            (value_type, value) => {
                return Err(Error::expression(format!(
                    "formula produced {} for a {} definition",
                    value.type_name(),
                    match value_type {
                        ValueType::Integer(_) => "integer",
                        ValueType::Percent(_) => "percent",
                        ValueType::Boolean(_) => "boolean",
                    }
                )))
            }
        };
        Ok(Self {
            kind: score_kind(),
            id: format!("score-{}", definition.id),
            display_name: definition.display_name.clone(),
            description: definition.description.clone(),
            uri: definition.uri.clone(),
            severity,
            value: score_value,
        })
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }
}

fn number_severity(thresholds: &[NumberThreshold], value: f64, min: f64, max: f64) -> Severity {
    if value < min || value > max {
        return Severity::Alert;
    }
    thresholds
        .iter()
        .find(|t| value >= t.range.min && value <= t.range.max)
        .map(|t| t.severity)
        .unwrap_or_default()
}

fn integer_score(integer: &IntegerType, value: i32) -> (ScoreValue, Severity) {
    let severity = number_severity(
        &integer.thresholds,
        value as f64,
        integer.min_value as f64,
        integer.max_value as f64,
    );
    (
        ScoreValue::Integer {
            value,
            min_value: integer.min_value,
            max_value: integer.max_value,
        },
        severity,
    )
}

fn percent_score(percent: &PercentType, value: f32) -> (ScoreValue, Severity) {
    let severity = number_severity(&percent.thresholds, value as f64, 0.0, 100.0);
    (ScoreValue::Percent { value }, severity)
}

fn boolean_score(boolean: &BooleanType, value: bool) -> (ScoreValue, Severity) {
    let severity = boolean
        .thresholds
        .iter()
        .find(|t| t.value == value)
        .map(|t| t.severity)
        .unwrap_or_default();
    let display_value = if value {
        defaulted(&boolean.display_true, "true")
    } else {
        defaulted(&boolean.display_false, "false")
    };
    (ScoreValue::Boolean { value, display_value }, severity)
}

fn defaulted(configured: &str, fallback: &str) -> String {
    if configured.is_empty() {
        fallback.to_string()
    } else {
        configured.to_string()
    }
}
