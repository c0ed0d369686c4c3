//! Generated-resource manifests — the declarative input to the planner.
//!
//! A manifest lists artifacts that should exist in the registry, the
//! dependency patterns each one is derived from, and the command that
//! (re)computes it. Patterns are written relative to the project; dependency
//! patterns and actions may use `$resource.<entity>` references, target
//! patterns may not.

use crate::error::{Error, Result};
use crate::names::Entity;
use serde::{Deserialize, Serialize};

/// Marker introducing an entity reference inside patterns and actions.
pub const RESOURCE_REF: &str = "$resource.";

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Manifest {
    pub id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    pub generated_resources: Vec<GeneratedResource>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GeneratedResource {
    /// Target artifact pattern, relative to the project. May contain `-`
    /// wildcards in parent segments; the artifact id itself is literal.
    pub pattern: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<Dependency>,
    /// Command template. `$resource.<entity>` expands to the bound reference.
    pub action: String,
    /// True when the command's real output is a side effect and the target
    /// artifact is only a receipt recording that it ran.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub receipt: bool,
    /// Re-run interval ("300s", "10m", "2h") even when dependencies are unchanged.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Dependency {
    pub pattern: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
}

/// Every `$resource.<entity>` reference in `text`, in order of appearance.
pub fn references(text: &str) -> Result<Vec<Entity>> {
    let mut out = Vec::new();
    for (at, _) in text.match_indices(RESOURCE_REF) {
        let rest = &text[at + RESOURCE_REF.len()..];
        let keyword: String = rest
            .chars()
            .take_while(|c| c.is_ascii_lowercase())
            .collect();
        let entity = Entity::from_keyword(&keyword).ok_or_else(|| {
            Error::validation(format!(
                "unknown entity {:?} in reference near {:?}",
                keyword, text
            ))
        })?;
        out.push(entity);
    }
    Ok(out)
}

/// Parse a duration like `300s`, `10m`, or `2h`.
pub fn parse_duration(s: &str) -> Result<chrono::Duration> {
    let (digits, unit) = s.split_at(s.len().saturating_sub(1));
    let n: i64 = digits
        .parse()
        .map_err(|_| Error::validation(format!("invalid duration {:?}", s)))?;
    if n < 0 {
        return Err(Error::validation(format!("negative duration {:?}", s)));
    }
    match unit {
        "s" => Ok(chrono::Duration::seconds(n)),
        "m" => Ok(chrono::Duration::minutes(n)),
        "h" => Ok(chrono::Duration::hours(n)),
        _ => Err(Error::validation(format!(
            "invalid duration {:?}, expected an s/m/h suffix",
            s
        ))),
    }
}

impl Manifest {
    pub fn from_yaml(text: &str) -> Result<Self> {
        let manifest: Self = serde_yaml::from_str(text)?;
        if manifest.id.is_empty() {
            return Err(Error::validation("manifest id must not be empty".to_string()));
        }
        Ok(manifest)
    }
}

impl GeneratedResource {
    /// Structural checks that make an entry plannable. Failing entries are
    /// reported per entry; the rest of the manifest still plans.
    pub fn validate(&self) -> Result<()> {
        if self.pattern.is_empty() {
            return Err(Error::validation("target pattern must not be empty".to_string()));
        }
        if self.pattern.contains(RESOURCE_REF) {
            return Err(Error::validation(format!(
                "target pattern {:?} must not contain references",
                self.pattern
            )));
        }
        let (_, artifact_id) = self
            .pattern
            .rsplit_once("artifacts/")
            .ok_or_else(|| {
                Error::validation(format!(
                    "target pattern {:?} must end at an artifact",
                    self.pattern
                ))
            })
            .and_then(|(prefix, id)| {
                if prefix.is_empty() || prefix.ends_with('/') {
                    Ok((prefix, id))
                } else {
                    Err(Error::validation(format!(
                        "target pattern {:?} must end at an artifact",
                        self.pattern
                    )))
                }
            })?;
        if artifact_id.is_empty() || artifact_id == "-" || artifact_id.contains('/') {
            return Err(Error::validation(format!(
                "target pattern {:?} must name a literal artifact id",
                self.pattern
            )));
        }
        if self.action.is_empty() {
            return Err(Error::validation(format!(
                "generated resource {:?} has no action",
                self.pattern
            )));
        }
        references(&self.action)?;
        for dependency in &self.dependencies {
            if dependency.pattern.is_empty() {
                return Err(Error::validation(format!(
                    "generated resource {:?} has an empty dependency pattern",
                    self.pattern
                )));
            }
            references(&dependency.pattern)?;
        }
        if let Some(refresh) = &self.refresh {
            parse_duration(refresh)?;
        }
        Ok(())
    }

    /// The deepest entity referenced by any dependency pattern, which is the
    /// entity the reference resource is truncated to. None means no
    /// dependency uses a reference and the project itself is the reference.
    pub fn reference_entity(&self) -> Result<Option<Entity>> {
        let mut deepest: Option<Entity> = None;
        for dependency in &self.dependencies {
            for entity in references(&dependency.pattern)? {
                if deepest.map_or(true, |d| entity.depth() > d.depth()) {
                    deepest = Some(entity);
                }
            }
        }
        Ok(deepest)
    }

    pub fn refresh_interval(&self) -> Result<Option<chrono::Duration>> {
        self.refresh.as_deref().map(parse_duration).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lint_entry() -> GeneratedResource {
        GeneratedResource {
            pattern: "apis/-/versions/-/specs/-/artifacts/lint-gnostic".to_string(),
            filter: None,
            dependencies: vec![Dependency {
                pattern: "$resource.spec".to_string(),
                filter: None,
            }],
            action: "registry compute lint $resource.spec --linter gnostic".to_string(),
            receipt: false,
            refresh: None,
        }
    }

    #[test]
    fn manifest_parses_from_yaml() {
        let manifest = Manifest::from_yaml(
            "id: controller-test\n\
             generated_resources:\n\
             - pattern: apis/-/versions/-/specs/-/artifacts/lint-gnostic\n\
             \x20 dependencies:\n\
             \x20 - pattern: $resource.spec\n\
             \x20 action: registry compute lint $resource.spec --linter gnostic\n",
        )
        .unwrap();
        assert_eq!(manifest.id, "controller-test");
        assert_eq!(manifest.generated_resources.len(), 1);
        manifest.generated_resources[0].validate().unwrap();
    }

    #[test]
    fn target_pattern_must_end_at_literal_artifact() {
        let mut entry = lint_entry();
        entry.pattern = "apis/-/versions/-/specs/-".to_string();
        assert!(entry.validate().is_err());

        entry.pattern = "apis/-/versions/-/specs/-/artifacts/-".to_string();
        assert!(entry.validate().is_err());

        entry.pattern = "$resource.spec/artifacts/lint".to_string();
        assert!(entry.validate().is_err());
    }

    #[test]
    fn unknown_reference_entity_is_rejected() {
        let mut entry = lint_entry();
        entry.dependencies[0].pattern = "$resource.endpoint/artifacts/x".to_string();
        assert!(entry.validate().is_err());
    }

    #[test]
    fn reference_entity_is_deepest_across_dependencies() {
        let mut entry = lint_entry();
        entry.dependencies = vec![
            Dependency {
                pattern: "$resource.api/versions/-/specs/-".to_string(),
                filter: None,
            },
            Dependency {
                pattern: "$resource.version/artifacts/summary".to_string(),
                filter: None,
            },
        ];
        assert_eq!(entry.reference_entity().unwrap(), Some(Entity::Version));

        entry.dependencies.clear();
        assert_eq!(entry.reference_entity().unwrap(), None);
    }

    #[test]
    fn durations() {
        assert_eq!(parse_duration("300s").unwrap(), chrono::Duration::seconds(300));
        assert_eq!(parse_duration("10m").unwrap(), chrono::Duration::minutes(10));
        assert_eq!(parse_duration("2h").unwrap(), chrono::Duration::hours(2));
        assert!(parse_duration("5d").is_err());
        assert!(parse_duration("").is_err());
        assert!(parse_duration("s").is_err());
    }
}
