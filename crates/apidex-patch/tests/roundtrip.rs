//! Integration scenarios: apply a nested document, export it back, compare.

use apidex_core::{RegistryResource, ResourceName};
use apidex_patch::doc::{
    ApiData, ApiDoc, ArtifactDoc, DeploymentData, DeploymentDoc, Metadata, SpecData, SpecDoc,
    VersionData, VersionDoc, API_VERSION,
};
use apidex_patch::{apply_api, export_api};
use apidex_registry::{MemoryRegistry, RegistryLister};
use chrono::Utc;
use tokio_util::sync::CancellationToken;

fn petstore_doc() -> ApiDoc {
    ApiDoc {
        api_version: Some(API_VERSION.to_string()),
        kind: Some("API".to_string()),
        metadata: Metadata {
            name: "petstore".to_string(),
            parent: Some("projects/demo/locations/global".to_string()),
            labels: [("team".to_string(), "pets".to_string())].into(),
            ..Default::default()
        },
        data: ApiData {
            display_name: "Petstore".to_string(),
            description: "Demo pet store".to_string(),
            availability: "GENERAL".to_string(),
            recommended_version: Some("1.0.0".to_string()),
            recommended_deployment: Some("versions/1.0.0/deployments/prod".to_string()),
            versions: vec![VersionDoc {
                api_version: None,
                kind: None,
                metadata: Metadata {
                    name: "1.0.0".to_string(),
                    ..Default::default()
                },
                data: VersionData {
                    display_name: "v1".to_string(),
                    state: "PRODUCTION".to_string(),
                    specs: vec![SpecDoc {
                        api_version: None,
                        kind: None,
                        metadata: Metadata {
                            name: "openapi".to_string(),
                            ..Default::default()
                        },
                        data: SpecData {
                            filename: "openapi.yaml".to_string(),
                            mime_type: "application/x.openapi".to_string(),
                            contents: Some("openapi: 3.0.0\n".to_string()),
                            artifacts: vec![ArtifactDoc {
                                kind: "Lint".to_string(),
                                metadata: Metadata {
                                    name: "lint".to_string(),
                                    ..Default::default()
                                },
                                data: serde_yaml::from_str("errors: 0\n").unwrap(),
                            }],
                            ..Default::default()
                        },
                    }],
                    deployments: vec![DeploymentDoc {
                        api_version: None,
                        kind: None,
                        metadata: Metadata {
                            name: "prod".to_string(),
                            ..Default::default()
                        },
                        data: DeploymentData {
                            endpoint_uri: Some("https://pets.example.com".to_string()),
                            ..Default::default()
                        },
                    }],
                    ..Default::default()
                },
            }],
            artifacts: vec![ArtifactDoc {
                kind: "DisplaySettings".to_string(),
                metadata: Metadata {
                    name: "display-settings".to_string(),
                    ..Default::default()
                },
                data: serde_yaml::from_str("visibility: public\n").unwrap(),
            }],
        },
    }
}

fn project() -> ResourceName {
    ResourceName::parse("projects/demo/locations/global").unwrap()
}

#[tokio::test]
async fn apply_then_export_is_identity_on_known_fields() {
    let registry = MemoryRegistry::new();
    let cancel = CancellationToken::new();
    let original = petstore_doc();
    let bytes = serde_yaml::to_string(&original).unwrap().into_bytes();

    let api_name = apply_api(&registry, &bytes, &project(), &cancel)
        .await
        .unwrap();
    assert_eq!(
        api_name.to_string(),
        "projects/demo/locations/global/apis/petstore"
    );

    let exported = export_api(&registry, &api_name, true, &cancel).await.unwrap();
    assert_eq!(exported, original);
}

#[tokio::test]
async fn apply_stores_absolute_recommended_names() {
    let registry = MemoryRegistry::new();
    let cancel = CancellationToken::new();
    let bytes = serde_yaml::to_string(&petstore_doc()).unwrap().into_bytes();
    let api_name = apply_api(&registry, &bytes, &project(), &cancel)
        .await
        .unwrap();

    let api = registry.get(&api_name, false, &cancel).await.unwrap().unwrap();
    match &api.body {
        apidex_core::ResourceBody::Api(body) => {
            assert_eq!(
                body.recommended_version.as_deref(),
                Some("projects/demo/locations/global/apis/petstore/versions/1.0.0")
            );
            assert_eq!(
                body.recommended_deployment.as_deref(),
                Some(
                    "projects/demo/locations/global/apis/petstore/versions/1.0.0/deployments/prod"
                )
            );
        }
        other => panic!("unexpected body {:?}", other),
    }
}

#[tokio::test]
async fn unknown_artifact_kinds_are_skipped_on_export() {
    let registry = MemoryRegistry::new();
    let cancel = CancellationToken::new();
    let bytes = serde_yaml::to_string(&petstore_doc()).unwrap().into_bytes();
    let api_name = apply_api(&registry, &bytes, &project(), &cancel)
        .await
        .unwrap();

    // An untyped JSON artifact sits next to the typed one.
    registry
        .seed(
            RegistryResource::artifact(
                api_name.with_artifact("stats").unwrap(),
                "application/json",
                b"{\"calls\": 10}".to_vec(),
                Utc::now(),
            )
            .unwrap(),
        )
        .await;

    let exported = export_api(&registry, &api_name, true, &cancel).await.unwrap();
    let kinds: Vec<&str> = exported
        .data
        .artifacts
        .iter()
        .map(|a| a.kind.as_str())
        .collect();
    assert_eq!(kinds, vec!["DisplaySettings"]);
}

#[tokio::test]
async fn wrong_kind_is_rejected() {
    let registry = MemoryRegistry::new();
    let cancel = CancellationToken::new();
    let mut doc = petstore_doc();
    doc.kind = Some("Version".to_string());
    let bytes = serde_yaml::to_string(&doc).unwrap().into_bytes();
    assert!(apply_api(&registry, &bytes, &project(), &cancel)
        .await
        .is_err());
}

#[tokio::test]
async fn flat_export_omits_children() {
    let registry = MemoryRegistry::new();
    let cancel = CancellationToken::new();
    let bytes = serde_yaml::to_string(&petstore_doc()).unwrap().into_bytes();
    let api_name = apply_api(&registry, &bytes, &project(), &cancel)
        .await
        .unwrap();

    let exported = export_api(&registry, &api_name, false, &cancel).await.unwrap();
    assert!(exported.data.versions.is_empty());
    assert!(exported.data.artifacts.is_empty());
    assert_eq!(exported.data.display_name, "Petstore");
}
