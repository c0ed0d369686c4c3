//! Apidex Patch - declarative YAML export and apply

pub mod apply;
pub mod doc;
pub mod export;

pub use apply::apply_api;
pub use doc::{ApiDoc, ArtifactDoc, DeploymentDoc, SpecDoc, VersionDoc, API_VERSION};
pub use export::export_api;
