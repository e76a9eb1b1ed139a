//! Error types for the context engine
//!
//! Only fatal conditions live here. Recoverable problems found in the data
//! (schema violations, dangling references, cycles) are collected as
//! diagnostics and returned next to partial results instead.

use thiserror::Error;

use crate::artifact::ArtifactKind;

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// Fatal engine errors
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("No schema registered for kind '{0}'")]
    MissingSchema(ArtifactKind),

    #[error("Schema for kind '{kind}' failed to compile: {message}")]
    SchemaCompile { kind: ArtifactKind, message: String },

    #[error("Invalid rule '{rule_id}': {message}")]
    RuleConfiguration { rule_id: String, message: String },

    #[error("Duplicate artifact ids: {}", .0.join(", "))]
    DuplicateIds(Vec<String>),

    #[error("Repository not found: {0}")]
    RepositoryNotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config_crate::ConfigError),
}

impl EngineError {
    /// Stable machine-readable code, used in structured CLI output
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingSchema(_) => "missing-schema",
            Self::SchemaCompile { .. } => "schema-compile",
            Self::RuleConfiguration { .. } => "rule-configuration",
            Self::DuplicateIds(_) => "duplicate-id",
            Self::RepositoryNotFound(_) => "repository-not-found",
            Self::Io(_) => "io",
            Self::Json(_) => "json",
            Self::Yaml(_) => "yaml",
            Self::Config(_) => "config",
        }
    }

    pub(crate) fn rule(rule_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::RuleConfiguration {
            rule_id: rule_id.into(),
            message: message.into(),
        }
    }
}
