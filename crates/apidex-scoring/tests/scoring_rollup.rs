//! Integration scenarios: score evaluation against a seeded registry.

use apidex_core::{RegistryResource, ResourceBody, ResourceName, SpecBody};
use apidex_registry::{MemoryRegistry, RegistryLister};
use apidex_scoring::{Score, ScoreValue, ScoringEngine, Severity};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

const DEFINITION: &str = "\
id: quality
display_name: Quality
type:
  integer:
    min_value: 0
    max_value: 100
    thresholds:
    - severity: alert
      range: { min: 0, max: 59 }
    - severity: warning
      range: { min: 60, max: 79 }
    - severity: ok
      range: { min: 80, max: 100 }
formula:
  rollup:
    score_formulas:
    - artifact:
        pattern: $resource.spec/artifacts/lint
      score_expression: score
      reference_id: a
    - artifact:
        pattern: $resource.spec/artifacts/audit
      score_expression: score
      reference_id: b
    rollup_expression: a*0.7 + b*0.3
";

fn ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
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

const SPEC: &str = "projects/demo/locations/global/apis/petstore/versions/1.0.0/specs/openapi";
const DEFINITION_NAME: &str = "projects/demo/locations/global/artifacts/score-definition-quality";

async fn seeded_registry() -> Arc<MemoryRegistry> {
    let registry = Arc::new(MemoryRegistry::new());
    let mut spec = RegistryResource::empty(
        ResourceName::parse(SPEC).unwrap(),
        ts("2026-03-01T10:00:00Z"),
    );
    spec.body = ResourceBody::Spec(SpecBody {
        mime_type: "application/x.openapi".to_string(),
        revision_id: "r1".to_string(),
        ..Default::default()
    });
    registry.seed(spec).await;
    registry
        .seed(artifact(
            &format!("{}/artifacts/lint", SPEC),
            "application/json",
            "{\"score\": 80}",
            "2026-03-01T11:00:00Z",
        ))
        .await;
    registry
        .seed(artifact(
            &format!("{}/artifacts/audit", SPEC),
            "application/yaml;type=Audit",
            "score: 60\n",
            "2026-03-01T11:00:00Z",
        ))
        .await;
    registry
        .seed(artifact(
            DEFINITION_NAME,
            "application/yaml;type=ScoreDefinition",
            DEFINITION,
            "2026-03-01T09:00:00Z",
        ))
        .await;
    registry
}

fn assert_weighted_score(score: &Score) {
    match score.value {
        ScoreValue::Integer {
            value,
            min_value,
            max_value,
        } => {
            assert_eq!(value, 74);
            assert_eq!(min_value, 0);
            assert_eq!(max_value, 100);
        }
        ref other => panic!("unexpected value {:?}", other),
    }
    assert_eq!(score.severity, Severity::Warning);
    assert_eq!(score.id, "score-quality");
}

#[tokio::test]
async fn rollup_combines_reference_ids_with_truncation() {
    let registry = seeded_registry().await;
    let engine = ScoringEngine::new(registry.clone());
    let cancel = CancellationToken::new();
    let score = engine
        .evaluate(
            &ResourceName::parse(DEFINITION_NAME).unwrap(),
            &ResourceName::parse(SPEC).unwrap(),
            false,
            &cancel,
        )
        .await
        .unwrap()
        .expect("score should be computed");
    assert_weighted_score(&score);

    // The upload landed under the scored resource.
    let uploaded = registry
        .get(
            &ResourceName::parse(&format!("{}/artifacts/score-quality", SPEC)).unwrap(),
            true,
            &cancel,
        )
        .await
        .unwrap()
        .expect("score artifact uploaded");
    assert_eq!(uploaded.mime_type(), Some("application/yaml;type=Score"));
    let body: Score = serde_yaml::from_slice(uploaded.contents().unwrap()).unwrap();
    assert_weighted_score(&body);
}

#[tokio::test]
async fn dry_run_computes_without_uploading() {
    let registry = seeded_registry().await;
    let engine = ScoringEngine::new(registry.clone());
    let cancel = CancellationToken::new();
    let score = engine
        .evaluate(
            &ResourceName::parse(DEFINITION_NAME).unwrap(),
            &ResourceName::parse(SPEC).unwrap(),
            true,
            &cancel,
        )
        .await
        .unwrap()
        .expect("score should be computed");
    assert_weighted_score(&score);
    let stored = registry
        .get(
            &ResourceName::parse(&format!("{}/artifacts/score-quality", SPEC)).unwrap(),
            false,
            &cancel,
        )
        .await
        .unwrap();
    assert!(stored.is_none());
}

#[tokio::test]
async fn current_scores_are_not_recomputed() {
    let registry = seeded_registry().await;
    let engine = ScoringEngine::new(registry.clone());
    let cancel = CancellationToken::new();
    let spec_name = ResourceName::parse(SPEC).unwrap();
    let definition_name = ResourceName::parse(DEFINITION_NAME).unwrap();

    let first = engine
        .evaluate(&definition_name, &spec_name, false, &cancel)
        .await
        .unwrap();
    assert!(first.is_some());

    // The freshly uploaded score is newer than both inputs and the
    // definition, so a second evaluation skips.
    let second = engine
        .evaluate(&definition_name, &spec_name, false, &cancel)
        .await
        .unwrap();
    assert!(second.is_none());
}

#[tokio::test]
async fn missing_source_artifacts_fail_with_context() {
    let registry = seeded_registry().await;
    let engine = ScoringEngine::new(registry.clone());
    let cancel = CancellationToken::new();
    let other_spec = "projects/demo/locations/global/apis/petstore/versions/2.0.0/specs/openapi";
    let mut spec = RegistryResource::empty(
        ResourceName::parse(other_spec).unwrap(),
        ts("2026-03-01T10:00:00Z"),
    );
    spec.body = ResourceBody::Spec(SpecBody::default());
    registry.seed(spec).await;

    let err = engine
        .evaluate(
            &ResourceName::parse(DEFINITION_NAME).unwrap(),
            &ResourceName::parse(other_spec).unwrap(),
            false,
            &cancel,
        )
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}
