//! Apidex Core - names, resources, manifests, and error handling

pub mod error;
pub mod expression;
pub mod manifest;
pub mod names;
pub mod resource;

pub use error::{Error, Result};
pub use manifest::{Dependency, GeneratedResource, Manifest};
pub use names::{Entity, ResourceName};
pub use resource::{
    content_hash, ApiBody, ArtifactBody, DeploymentBody, RegistryResource, ResourceBody, SpecBody,
    VersionBody,
};
