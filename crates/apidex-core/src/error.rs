//! Error types for Apidex

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid resource name: {0}")]
    NameParse(String),

    #[error("unbound reference: {0}")]
    UnboundReference(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("invalid score definition: {0}")]
    InvalidDefinition(String),

    #[error("expression error: {0}")]
    Expression(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn name_parse(msg: impl Into<String>) -> Self {
        Self::NameParse(msg.into())
    }

    pub fn unbound(msg: impl Into<String>) -> Self {
        Self::UnboundReference(msg.into())
    }

    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn expression(msg: impl Into<String>) -> Self {
        Self::Expression(msg.into())
    }

    /// NotFound is absence, not failure, for the planner and staleness oracle.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
