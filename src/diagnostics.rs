//! Diagnostics
//!
//! Structured records for every recoverable problem the engine finds.
//! They serialize as tagged JSON objects so CI annotations and UI panels can
//! render them without parsing free text.

use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::path::PathBuf;

use crate::artifact::{ArtifactId, ArtifactKind, Relation};
use crate::registry::FieldError;

// =============================================================================
// Diagnostic Codes
// =============================================================================

/// Diagnostic code for categorizing issues
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DiagnosticCode {
    /// Document does not satisfy the schema of its kind
    SchemaValidation,
    /// Document is not parseable YAML/JSON
    Parse,
    /// Kind could not be determined from directory or `kind` field
    UnknownKind,
    /// Relationship field points at an artifact that does not exist
    DanglingReference,
    /// Two or more documents declare the same id
    DuplicateId,
    /// Cycle among `requires`/`depends-on` edges
    CircularDependency,
    /// Changed id passed to impact analysis is not in the graph
    UnknownChangedId,
}

impl DiagnosticCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SchemaValidation => "E001",
            Self::Parse => "E002",
            Self::UnknownKind => "E003",
            Self::DanglingReference => "E004",
            Self::DuplicateId => "F001",
            Self::CircularDependency => "W001",
            Self::UnknownChangedId => "W002",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            Self::SchemaValidation
            | Self::Parse
            | Self::UnknownKind
            | Self::DanglingReference => Severity::Error,

            Self::DuplicateId => Severity::Fatal,

            Self::CircularDependency | Self::UnknownChangedId => Severity::Warning,
        }
    }
}

impl fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Severity
// =============================================================================

/// Diagnostic severity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Error,
    /// Aborts graph construction and impact analysis
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
            Self::Fatal => write!(f, "fatal"),
        }
    }
}

/// Common surface of every diagnostic record
pub trait Diagnostic: fmt::Display {
    fn code(&self) -> DiagnosticCode;

    fn severity(&self) -> Severity {
        self.code().severity()
    }

    fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }
}

// =============================================================================
// Load errors
// =============================================================================

/// Problems found while loading a repository
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum LoadError {
    #[serde(rename_all = "camelCase")]
    SchemaValidation {
        source_location: PathBuf,
        #[serde(skip_serializing_if = "Option::is_none")]
        kind: Option<ArtifactKind>,
        field_errors: Vec<FieldError>,
    },

    #[serde(rename_all = "camelCase")]
    Parse {
        source_location: PathBuf,
        message: String,
    },

    #[serde(rename_all = "camelCase")]
    UnknownKind {
        source_location: PathBuf,
        message: String,
    },

    #[serde(rename_all = "camelCase")]
    DuplicateId {
        id: ArtifactId,
        source_locations: Vec<PathBuf>,
    },

    #[serde(rename_all = "camelCase")]
    DanglingReference {
        from_id: ArtifactId,
        field: String,
        target_id: ArtifactId,
        source_location: PathBuf,
    },
}

impl Diagnostic for LoadError {
    fn code(&self) -> DiagnosticCode {
        match self {
            Self::SchemaValidation { .. } => DiagnosticCode::SchemaValidation,
            Self::Parse { .. } => DiagnosticCode::Parse,
            Self::UnknownKind { .. } => DiagnosticCode::UnknownKind,
            Self::DuplicateId { .. } => DiagnosticCode::DuplicateId,
            Self::DanglingReference { .. } => DiagnosticCode::DanglingReference,
        }
    }
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] ", self.code())?;
        match self {
            Self::SchemaValidation { source_location, field_errors, .. } => {
                write!(f, "{}: {} schema violation(s)", source_location.display(), field_errors.len())?;
                for e in field_errors {
                    write!(f, "\n  - {}", e)?;
                }
                Ok(())
            }
            Self::Parse { source_location, message } => {
                write!(f, "{}: unparseable document: {}", source_location.display(), message)
            }
            Self::UnknownKind { source_location, message } => {
                write!(f, "{}: {}", source_location.display(), message)
            }
            Self::DuplicateId { id, source_locations } => {
                let locations: Vec<_> = source_locations
                    .iter()
                    .map(|p| p.display().to_string())
                    .collect();
                write!(f, "id '{}' declared by {}", id, locations.join(", "))
            }
            Self::DanglingReference { from_id, field, target_id, .. } => {
                write!(f, "{}.{} references missing artifact '{}'", from_id, field, target_id)
            }
        }
    }
}

// =============================================================================
// Graph errors
// =============================================================================

/// Problems found while building the relationship graph
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum GraphError {
    /// The path starts and ends at the same id; `relations[i]` labels the
    /// edge `cycle_path[i] -> cycle_path[i + 1]`
    #[serde(rename_all = "camelCase")]
    CircularDependency {
        cycle_path: Vec<ArtifactId>,
        relations: Vec<Relation>,
    },

    #[serde(rename_all = "camelCase")]
    DanglingReference {
        from_id: ArtifactId,
        field: String,
        target_id: ArtifactId,
    },
}

impl Diagnostic for GraphError {
    fn code(&self) -> DiagnosticCode {
        match self {
            Self::CircularDependency { .. } => DiagnosticCode::CircularDependency,
            Self::DanglingReference { .. } => DiagnosticCode::DanglingReference,
        }
    }
}

impl fmt::Display for GraphError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] ", self.code())?;
        match self {
            Self::CircularDependency { cycle_path, relations } => {
                let mut names: Vec<String> = Vec::new();
                for relation in relations {
                    let name = format!("'{}'", relation);
                    if !names.contains(&name) {
                        names.push(name);
                    }
                }
                write!(f, "circular {} chain: {}", names.join("/"), cycle_path.join(" -> "))
            }
            Self::DanglingReference { from_id, field, target_id } => {
                write!(f, "{}.{} references missing artifact '{}'", from_id, field, target_id)
            }
        }
    }
}

// =============================================================================
// Impact warnings
// =============================================================================

/// Non-fatal conditions surfaced inside an impact report
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ImpactWarning {
    UnknownChangedId { id: ArtifactId },
}

impl Diagnostic for ImpactWarning {
    fn code(&self) -> DiagnosticCode {
        match self {
            Self::UnknownChangedId { .. } => DiagnosticCode::UnknownChangedId,
        }
    }
}

impl fmt::Display for ImpactWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownChangedId { id } => {
                write!(f, "[{}] changed id '{}' is not in the graph", self.code(), id)
            }
        }
    }
}

// =============================================================================
// Serialized form
// =============================================================================

/// A record serialized with its diagnostic code and severity next to its
/// own fields: `{"code": "E004", "severity": "error", "type": ..., ...}`
pub struct Coded<'a, T>(pub &'a T);

impl<T: Diagnostic + Serialize> Serialize for Coded<'_, T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        struct Record<'a, T> {
            code: &'static str,
            severity: Severity,
            #[serde(flatten)]
            record: &'a T,
        }

        Record {
            code: self.0.code().as_str(),
            severity: self.0.severity(),
            record: self.0,
        }
        .serialize(serializer)
    }
}

/// `serialize_with` helper for lists of diagnostics
pub fn serialize_coded<T, S>(records: &[T], serializer: S) -> Result<S::Ok, S::Error>
where
    T: Diagnostic + Serialize,
    S: Serializer,
{
    serializer.collect_seq(records.iter().map(Coded))
}
