//! Entity Loading
//!
//! Scans a repository's contexts directory, parses every artifact document,
//! determines its kind, validates it against the schema registry and then
//! runs a global pass for duplicate ids and dangling references.
//!
//! Validation is collect-all: a broken document is recorded and the scan
//! carries on. Only configuration problems (missing repository, missing
//! schema) abort a load.

use rayon::prelude::*;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::artifact::{Artifact, ArtifactId, ArtifactKind};
use crate::config::{LoaderConfig, RepositoryConfig};
use crate::diagnostics::LoadError;
use crate::error::{EngineError, Result};
use crate::registry::{FieldError, SchemaRegistry};

/// A document found on disk (or handed in by the caller)
#[derive(Debug, Clone)]
pub struct DocumentSource {
    /// Path reported in diagnostics
    pub path: PathBuf,
    /// Kind implied by the containing directory
    pub dir_kind: Option<ArtifactKind>,
}

/// Result of loading one repository
#[derive(Debug, Clone, Default)]
pub struct LoadOutcome {
    /// Usable artifacts, sorted by id
    pub entities: Vec<Artifact>,
    pub errors: Vec<LoadError>,
    /// SHA-256 over every document read, in path order
    pub fingerprint: String,
    /// Documents that were read (valid or not)
    pub documents: usize,
}

impl LoadOutcome {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    /// Ids declared by more than one document
    pub fn duplicate_ids(&self) -> Vec<ArtifactId> {
        self.errors
            .iter()
            .filter_map(|e| match e {
                LoadError::DuplicateId { id, .. } => Some(id.clone()),
                _ => None,
            })
            .collect()
    }

    /// Fail with [`EngineError::DuplicateIds`] if the load had fatal errors
    pub fn require_usable(&self) -> Result<()> {
        let duplicates = self.duplicate_ids();
        if duplicates.is_empty() {
            Ok(())
        } else {
            Err(EngineError::DuplicateIds(duplicates))
        }
    }
}

/// Artifacts indexed by id, as seen at one point in time
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    artifacts: BTreeMap<ArtifactId, Artifact>,
}

impl Snapshot {
    pub fn from_entities(entities: impl IntoIterator<Item = Artifact>) -> Self {
        Self {
            artifacts: entities.into_iter().map(|a| (a.id.clone(), a)).collect(),
        }
    }

    pub fn get(&self, id: &str) -> Option<&Artifact> {
        self.artifacts.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.artifacts.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Artifact> {
        self.artifacts.values()
    }
}

/// Outcome of parsing and validating a single document
enum DocumentOutcome {
    Valid(Artifact),
    Invalid(LoadError),
    Skipped,
}

struct ParsedDocument {
    digest: Vec<u8>,
    outcome: DocumentOutcome,
}

/// Loads artifacts and validates them against a [`SchemaRegistry`]
pub struct EntityLoader<'a> {
    registry: &'a SchemaRegistry,
    repository: RepositoryConfig,
    config: LoaderConfig,
}

impl<'a> EntityLoader<'a> {
    pub fn new(registry: &'a SchemaRegistry) -> Self {
        Self {
            registry,
            repository: RepositoryConfig::default(),
            config: LoaderConfig::default(),
        }
    }

    pub fn with_config(mut self, repository: &RepositoryConfig, config: &LoaderConfig) -> Self {
        self.repository = repository.clone();
        self.config = config.clone();
        self
    }

    /// Load every artifact under `root`'s contexts directory
    pub fn load(&self, root: &Path) -> Result<LoadOutcome> {
        if !root.is_dir() {
            return Err(EngineError::RepositoryNotFound(root.display().to_string()));
        }

        let contexts_dir = self.repository.contexts_path(root);
        let sources = self.discover(&contexts_dir);
        info!(root = %root.display(), documents = sources.len(), "discovered artifact documents");

        let parsed: Vec<ParsedDocument> = if self.config.parallel {
            sources
                .par_iter()
                .map(|source| self.read_document(source))
                .collect::<Result<_>>()?
        } else {
            sources
                .iter()
                .map(|source| self.read_document(source))
                .collect::<Result<_>>()?
        };

        Ok(self.finish(parsed))
    }

    /// Load artifacts supplied in memory instead of from disk
    pub fn load_documents(
        &self,
        documents: impl IntoIterator<Item = (DocumentSource, Value)>,
    ) -> Result<LoadOutcome> {
        let mut parsed = Vec::new();
        for (source, value) in documents {
            let digest = Sha256::digest(value.to_string().as_bytes()).to_vec();
            let outcome = self.validate_document(&source, value)?;
            parsed.push(ParsedDocument { digest, outcome });
        }
        Ok(self.finish(parsed))
    }

    /// Walk the contexts directory and collect candidate documents in path order
    pub fn discover(&self, contexts_dir: &Path) -> Vec<DocumentSource> {
        if !contexts_dir.is_dir() {
            warn!(path = %contexts_dir.display(), "contexts directory does not exist");
            return Vec::new();
        }

        let mut sources: Vec<DocumentSource> = WalkDir::new(contexts_dir)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter(|e| {
                e.path()
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .map(|ext| self.repository.extensions.iter().any(|x| x == ext))
                    .unwrap_or(false)
            })
            .filter_map(|e| {
                let relative = e.path().strip_prefix(contexts_dir).ok()?;
                let relative_str = relative.to_string_lossy();
                if self.config.skip_prefixes.iter().any(|p| relative_str.starts_with(p.as_str())) {
                    return None;
                }
                let dir_kind = relative
                    .components()
                    .next()
                    .filter(|_| relative.components().count() > 1)
                    .and_then(|c| c.as_os_str().to_str())
                    .and_then(ArtifactKind::from_dir);
                Some(DocumentSource {
                    path: e.path().to_path_buf(),
                    dir_kind,
                })
            })
            .collect();

        sources.sort_by(|a, b| a.path.cmp(&b.path));
        sources
    }

    fn read_document(&self, source: &DocumentSource) -> Result<ParsedDocument> {
        let content = match fs::read_to_string(&source.path) {
            Ok(content) => content,
            Err(e) => {
                return Ok(ParsedDocument {
                    digest: Vec::new(),
                    outcome: DocumentOutcome::Invalid(LoadError::Parse {
                        source_location: source.path.clone(),
                        message: e.to_string(),
                    }),
                })
            }
        };

        let mut hasher = Sha256::new();
        hasher.update(source.path.to_string_lossy().as_bytes());
        hasher.update(content.as_bytes());
        let digest = hasher.finalize().to_vec();

        let value = match parse_content(&source.path, &content) {
            Ok(value) => value,
            Err(message) => {
                return Ok(ParsedDocument {
                    digest,
                    outcome: DocumentOutcome::Invalid(LoadError::Parse {
                        source_location: source.path.clone(),
                        message,
                    }),
                })
            }
        };

        let outcome = self.validate_document(source, value)?;
        Ok(ParsedDocument { digest, outcome })
    }

    fn validate_document(&self, source: &DocumentSource, value: Value) -> Result<DocumentOutcome> {
        if value.is_null() {
            debug!(path = %source.path.display(), "skipping empty document");
            return Ok(DocumentOutcome::Skipped);
        }

        let kind = match resolve_kind(source, &value) {
            Ok(kind) => kind,
            Err(error) => return Ok(DocumentOutcome::Invalid(error)),
        };

        if !self.config.include_kinds.is_empty() && !self.config.include_kinds.contains(&kind) {
            return Ok(DocumentOutcome::Skipped);
        }

        let field_errors = self.registry.validate(kind, &value)?;
        if !field_errors.is_empty() {
            debug!(path = %source.path.display(), errors = field_errors.len(), "schema validation failed");
            return Ok(DocumentOutcome::Invalid(LoadError::SchemaValidation {
                source_location: source.path.clone(),
                kind: Some(kind),
                field_errors,
            }));
        }

        // a repository schema override may be looser than the typed payload
        match Artifact::from_document(kind, value, source.path.clone()) {
            Ok(artifact) => Ok(DocumentOutcome::Valid(artifact)),
            Err(e) => Ok(DocumentOutcome::Invalid(LoadError::SchemaValidation {
                source_location: source.path.clone(),
                kind: Some(kind),
                field_errors: vec![FieldError::new("", e.to_string())],
            })),
        }
    }

    /// Global pass: duplicate ids, then dangling references
    fn finish(&self, parsed: Vec<ParsedDocument>) -> LoadOutcome {
        let documents = parsed.len();
        let mut hasher = Sha256::new();
        let mut errors = Vec::new();
        let mut candidates = Vec::new();

        for doc in parsed {
            hasher.update(&doc.digest);
            match doc.outcome {
                DocumentOutcome::Valid(artifact) => candidates.push(artifact),
                DocumentOutcome::Invalid(error) => errors.push(error),
                DocumentOutcome::Skipped => {}
            }
        }

        let mut by_id: BTreeMap<ArtifactId, Vec<Artifact>> = BTreeMap::new();
        for artifact in candidates {
            by_id.entry(artifact.id.clone()).or_default().push(artifact);
        }

        // every declared id, including ambiguous ones, counts as existing
        let known: BTreeSet<ArtifactId> = by_id.keys().cloned().collect();

        let mut entities = Vec::with_capacity(by_id.len());
        for (id, mut group) in by_id {
            if group.len() == 1 {
                entities.extend(group.pop());
                continue;
            }
            let mut source_locations: Vec<PathBuf> =
                group.into_iter().map(|a| a.source_location).collect();
            source_locations.sort();
            warn!(id = %id, count = source_locations.len(), "duplicate artifact id");
            errors.push(LoadError::DuplicateId { id, source_locations });
        }

        if self.config.include_kinds.is_empty() {
            for artifact in &entities {
                for rel in artifact.relationships() {
                    for target in rel.targets {
                        if !known.contains(target) {
                            errors.push(LoadError::DanglingReference {
                                from_id: artifact.id.clone(),
                                field: rel.field.to_string(),
                                target_id: target.clone(),
                                source_location: artifact.source_location.clone(),
                            });
                        }
                    }
                }
            }
        } else {
            debug!("kind filter active, skipping dangling reference check");
        }

        info!(
            entities = entities.len(),
            errors = errors.len(),
            "loaded repository"
        );

        LoadOutcome {
            entities,
            errors,
            fingerprint: format!("{:x}", hasher.finalize()),
            documents,
        }
    }
}

fn parse_content(path: &Path, content: &str) -> std::result::Result<Value, String> {
    let is_json = path.extension().map(|e| e == "json").unwrap_or(false);
    if is_json {
        serde_json::from_str(content).map_err(|e| e.to_string())
    } else {
        serde_yaml::from_str(content).map_err(|e| e.to_string())
    }
}

/// Directory kind wins when present; an explicit `kind` field must agree with it
fn resolve_kind(source: &DocumentSource, value: &Value) -> std::result::Result<ArtifactKind, LoadError> {
    let declared = value.get("kind").map(|v| {
        v.as_str()
            .ok_or_else(|| "kind must be a string".to_string())
            .and_then(|s| s.parse::<ArtifactKind>())
    });

    match (source.dir_kind, declared) {
        (Some(dir_kind), None) => Ok(dir_kind),
        (Some(dir_kind), Some(Ok(kind))) if kind == dir_kind => Ok(dir_kind),
        (Some(dir_kind), Some(Ok(kind))) => Err(LoadError::SchemaValidation {
            source_location: source.path.clone(),
            kind: Some(dir_kind),
            field_errors: vec![FieldError::new(
                "/kind",
                format!("kind '{}' does not match directory '{}'", kind, dir_kind.dir_name()),
            )],
        }),
        (Some(dir_kind), Some(Err(message))) => Err(LoadError::SchemaValidation {
            source_location: source.path.clone(),
            kind: Some(dir_kind),
            field_errors: vec![FieldError::new("/kind", message)],
        }),
        (None, Some(Ok(kind))) => Ok(kind),
        (None, Some(Err(message))) => Err(LoadError::UnknownKind {
            source_location: source.path.clone(),
            message,
        }),
        (None, None) => Err(LoadError::UnknownKind {
            source_location: source.path.clone(),
            message: "document is outside a kind directory and has no 'kind' field".to_string(),
        }),
    }
}
