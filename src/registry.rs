//! Schema Registry
//!
//! Holds one compiled JSON Schema per artifact kind. Schemas are compiled
//! once when registered; every validation call reuses the compiled form.
//!
//! Built-in schemas for all kinds are embedded at compile time. A repository
//! can replace any of them by dropping `<kind>.schema.json` into its schemas
//! directory.

use include_dir::{include_dir, Dir};
use jsonschema::{Draft, JSONSchema};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

use crate::artifact::ArtifactKind;
use crate::error::{EngineError, Result};

static BUILTIN_SCHEMAS: Dir<'_> = include_dir!("$CARGO_MANIFEST_DIR/schemas");

/// A single schema violation inside a document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    /// JSON pointer to the offending value (`""` is the document root)
    pub pointer: String,
    pub message: String,
}

impl FieldError {
    pub fn new(pointer: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            pointer: pointer.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.pointer.is_empty() {
            write!(f, "<root>: {}", self.message)
        } else {
            write!(f, "{}: {}", self.pointer, self.message)
        }
    }
}

struct CompiledSchema {
    raw: Value,
    compiled: JSONSchema,
}

/// Compiled schemas indexed by artifact kind
#[derive(Default)]
pub struct SchemaRegistry {
    schemas: HashMap<ArtifactKind, CompiledSchema>,
}

impl SchemaRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry populated with the embedded schemas for every kind
    pub fn builtin() -> Result<Self> {
        let mut registry = Self::new();
        for kind in ArtifactKind::ALL {
            let file = BUILTIN_SCHEMAS
                .get_file(kind.schema_file())
                .ok_or(EngineError::MissingSchema(kind))?;
            let content = file.contents_utf8().ok_or_else(|| EngineError::SchemaCompile {
                kind,
                message: "embedded schema is not valid UTF-8".to_string(),
            })?;
            registry.register(kind, serde_json::from_str(content)?)?;
        }
        Ok(registry)
    }

    /// Built-in schemas, overridden by any `<kind>.schema.json` in `schemas_dir`
    pub fn with_overrides(schemas_dir: &Path) -> Result<Self> {
        let mut registry = Self::builtin()?;
        if !schemas_dir.is_dir() {
            return Ok(registry);
        }

        for kind in ArtifactKind::ALL {
            let path = schemas_dir.join(kind.schema_file());
            if !path.is_file() {
                continue;
            }
            let content = fs::read_to_string(&path)?;
            let schema: Value = serde_json::from_str(&content)?;
            registry.register(kind, schema)?;
            info!(kind = %kind, path = %path.display(), "using repository schema override");
        }
        Ok(registry)
    }

    /// Compile and store the schema for a kind, replacing any previous one
    pub fn register(&mut self, kind: ArtifactKind, schema: Value) -> Result<()> {
        let compiled = JSONSchema::options()
            .with_draft(Draft::Draft7)
            .compile(&schema)
            .map_err(|e| EngineError::SchemaCompile {
                kind,
                message: e.to_string(),
            })?;

        debug!(kind = %kind, "compiled schema");
        self.schemas.insert(kind, CompiledSchema { raw: schema, compiled });
        Ok(())
    }

    /// Validate a document against the schema of its kind.
    ///
    /// Malformed data never fails this call; violations come back as
    /// [`FieldError`]s. Only a missing schema is an error.
    pub fn validate(&self, kind: ArtifactKind, document: &Value) -> Result<Vec<FieldError>> {
        let schema = self
            .schemas
            .get(&kind)
            .ok_or(EngineError::MissingSchema(kind))?;

        let errors = match schema.compiled.validate(document) {
            Ok(()) => Vec::new(),
            Err(errors) => errors
                .map(|e| FieldError::new(e.instance_path.to_string(), e.to_string()))
                .collect(),
        };
        Ok(errors)
    }

    /// Raw schema document for a kind
    pub fn schema(&self, kind: ArtifactKind) -> Option<&Value> {
        self.schemas.get(&kind).map(|s| &s.raw)
    }

    /// Registered kinds, in declaration order
    pub fn kinds(&self) -> Vec<ArtifactKind> {
        ArtifactKind::ALL
            .into_iter()
            .filter(|k| self.schemas.contains_key(k))
            .collect()
    }
}
