//! Pipeline operations
//!
//! The four end-to-end operations exposed by the CLI. Each wires the stages
//! together for one repository root and returns a serializable value; fatal
//! conditions come back as [`EngineError`].

use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::artifact::ArtifactId;
use crate::config::EngineConfig;
use crate::diagnostics::{serialize_coded, GraphError, LoadError};
use crate::error::{EngineError, Result};
use crate::graph::{build, Edge, GraphBuild, Node};
use crate::impact::{analyze, ImpactOptions, ImpactReport};
use crate::inspect::{inspect, InspectReport};
use crate::loader::{EntityLoader, LoadOutcome, Snapshot};
use crate::registry::SchemaRegistry;
use crate::rules::{load_rules_file, ChangeComparator, Comparators, RuleTable};

/// Output of `validate`
#[derive(Debug, Clone, Serialize)]
pub struct ValidateOutput {
    pub ok: bool,
    #[serde(serialize_with = "serialize_coded")]
    pub errors: Vec<LoadError>,
    /// SHA-256 over every document read; equal fingerprints mean an
    /// unchanged repository
    pub fingerprint: String,
    pub documents: usize,
}

impl ValidateOutput {
    pub fn exit_code(&self) -> i32 {
        if self.ok {
            0
        } else {
            1
        }
    }
}

/// Output of `build-graph`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphOutput {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    #[serde(serialize_with = "serialize_coded")]
    pub errors: Vec<GraphError>,
    /// Hash over nodes and edges
    pub bundle_hash: String,
    #[serde(skip)]
    pub build: GraphBuild,
}

impl GraphOutput {
    /// Fatal problems never reach this value
    pub fn exit_code(&self) -> i32 {
        0
    }
}

/// One repository root plus the configuration and schemas used to read it
pub struct Engine {
    root: PathBuf,
    config: EngineConfig,
    registry: SchemaRegistry,
    comparators: Comparators,
}

impl Engine {
    /// Open a repository, applying any schema overrides it carries
    pub fn open(root: impl Into<PathBuf>, config: EngineConfig) -> Result<Self> {
        let root = root.into();
        if !root.is_dir() {
            return Err(EngineError::RepositoryNotFound(root.display().to_string()));
        }
        let registry = SchemaRegistry::with_overrides(&config.repository.schemas_path(&root))?;
        Ok(Self {
            root,
            config,
            registry,
            comparators: Comparators::builtin(),
        })
    }

    /// Make `comparator` selectable as `whenChangeClassifier: <name>` in rule tables
    pub fn with_comparator(mut self, name: impl Into<String>, comparator: impl ChangeComparator + 'static) -> Self {
        self.comparators.register(name, comparator);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    /// Load the repository at this engine's root
    pub fn load(&self) -> Result<LoadOutcome> {
        self.load_root(&self.root)
    }

    fn load_root(&self, root: &Path) -> Result<LoadOutcome> {
        EntityLoader::new(&self.registry)
            .with_config(&self.config.repository, &self.config.loader)
            .load(root)
    }

    /// Schema and reference checks, every problem collected
    pub fn validate(&self) -> Result<ValidateOutput> {
        let outcome = self.load()?;
        Ok(ValidateOutput {
            ok: outcome.is_ok(),
            errors: outcome.errors,
            fingerprint: outcome.fingerprint,
            documents: outcome.documents,
        })
    }

    /// Relationship graph plus dangling references and cycles.
    ///
    /// Duplicate ids abort with [`EngineError::DuplicateIds`].
    pub fn build_graph(&self) -> Result<GraphOutput> {
        let outcome = self.load()?;
        outcome.require_usable()?;

        let build = build(&outcome.entities);
        let mut errors: Vec<GraphError> = outcome
            .errors
            .iter()
            .filter_map(|e| match e {
                LoadError::DanglingReference { from_id, field, target_id, .. } => {
                    Some(GraphError::DanglingReference {
                        from_id: from_id.clone(),
                        field: field.clone(),
                        target_id: target_id.clone(),
                    })
                }
                _ => None,
            })
            .collect();
        errors.extend(build.errors.iter().cloned());

        let view = build.graph.view();
        Ok(GraphOutput {
            nodes: view.nodes,
            edges: view.edges,
            errors,
            bundle_hash: build.graph.bundle_hash.clone(),
            build,
        })
    }

    /// Rule table at `rules_path`, or the configured one.
    ///
    /// A missing configured table means no rules; a missing explicit table is fatal.
    pub fn rules(&self, rules_path: Option<&Path>) -> Result<RuleTable> {
        match rules_path {
            Some(path) => load_rules_file(path, &self.registry, &self.comparators),
            None => {
                let path = self.config.rules_path(&self.root);
                if path.is_file() {
                    load_rules_file(&path, &self.registry, &self.comparators)
                } else {
                    info!(path = %path.display(), "no rule table, reporting stale artifacts only");
                    Ok(RuleTable::empty())
                }
            }
        }
    }

    /// Impact of `changed_ids`, comparing against the repository at
    /// `before_root` when one is given
    pub fn impact(
        &self,
        changed_ids: &[ArtifactId],
        rules_path: Option<&Path>,
        before_root: Option<&Path>,
        options: Option<ImpactOptions>,
    ) -> Result<ImpactReport> {
        let rules = self.rules(rules_path)?;

        let outcome = self.load()?;
        outcome.require_usable()?;
        let build = build(&outcome.entities);
        let after = Snapshot::from_entities(outcome.entities);

        let before = match before_root {
            Some(root) => {
                let previous = self.load_root(root)?;
                if !previous.duplicate_ids().is_empty() {
                    warn!(root = %root.display(), "before snapshot has duplicate ids; they are left out");
                }
                Some(Snapshot::from_entities(previous.entities))
            }
            None => None,
        };

        let options = options.unwrap_or_else(|| ImpactOptions::from(&self.config.impact));
        Ok(analyze(&build.graph, &rules, changed_ids, before.as_ref(), &after, &options))
    }

    /// Overview, gaps and recommendations
    pub fn inspect(&self) -> Result<InspectReport> {
        let outcome = self.load()?;
        outcome.require_usable()?;
        let build = build(&outcome.entities);
        Ok(inspect(&outcome.entities, &build))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write(root: &Path, relative: &str, content: &str) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_open_missing_root() {
        let err = Engine::open("/no/such/repo", EngineConfig::default()).err().unwrap();
        assert_eq!(err.code(), "repository-not-found");
    }

    #[test]
    fn test_build_graph_reports_dangling_as_graph_error() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "contexts/features/f.yaml", "id: FEAT-002\nstatus: proposed\nrequires: [svc-missing]\n");

        let engine = Engine::open(dir.path(), EngineConfig::default()).unwrap();
        let output = engine.build_graph().unwrap();
        assert_eq!(output.nodes.len(), 1);
        assert!(output.edges.is_empty());
        assert_eq!(
            output.errors,
            vec![GraphError::DanglingReference {
                from_id: "FEAT-002".into(),
                field: "requires".into(),
                target_id: "svc-missing".into(),
            }]
        );
        assert_eq!(output.exit_code(), 0);
    }

    #[test]
    fn test_duplicates_abort_graph_and_impact() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "contexts/features/a.yaml", "id: FEAT-001\nstatus: proposed\n");
        write(dir.path(), "contexts/features/b.yaml", "id: FEAT-001\nstatus: proposed\n");

        let engine = Engine::open(dir.path(), EngineConfig::default()).unwrap();
        assert_eq!(engine.validate().unwrap().exit_code(), 1);
        assert!(matches!(engine.build_graph(), Err(EngineError::DuplicateIds(_))));
        assert!(matches!(
            engine.impact(&["FEAT-001".to_string()], None, None, None),
            Err(EngineError::DuplicateIds(_))
        ));
    }

    #[test]
    fn test_explicit_missing_rules_file_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("contexts")).unwrap();
        let engine = Engine::open(dir.path(), EngineConfig::default()).unwrap();

        assert!(engine.rules(None).unwrap().is_empty());
        assert!(engine.rules(Some(&dir.path().join("missing.yaml"))).is_err());
    }

    #[test]
    fn test_schema_override_from_repository() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            ".context-kit/schemas/task.schema.json",
            r#"{ "type": "object", "required": ["id", "status", "assignee"] }"#,
        );
        write(dir.path(), "contexts/tasks/t.yaml", "id: T-1001\nstatus: done\n");

        let engine = Engine::open(dir.path(), EngineConfig::default()).unwrap();
        let output = engine.validate().unwrap();
        assert!(!output.ok);
        assert!(matches!(output.errors[0], LoadError::SchemaValidation { .. }));
    }

    #[test]
    fn test_outputs_carry_codes_and_hashes() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "contexts/features/f.yaml", "id: FEAT-002\nstatus: proposed\nrequires: [svc-missing]\n");
        let engine = Engine::open(dir.path(), EngineConfig::default()).unwrap();

        let validate = engine.validate().unwrap();
        assert_eq!(validate.documents, 1);
        assert_eq!(validate.fingerprint.len(), 64);
        let json = serde_json::to_value(&validate).unwrap();
        assert_eq!(json["errors"][0]["code"], "E004");
        assert_eq!(json["errors"][0]["severity"], "error");
        assert_eq!(json["fingerprint"], validate.fingerprint.as_str());

        let graph = engine.build_graph().unwrap();
        assert_eq!(graph.bundle_hash, graph.build.graph.bundle_hash);
        let json = serde_json::to_value(&graph).unwrap();
        assert_eq!(json["errors"][0]["code"], "E004");
        assert_eq!(json["bundleHash"], graph.bundle_hash.as_str());
        assert!(json.get("build").is_none());

        write(dir.path(), "contexts/services/svc.yaml", "id: svc-missing\nstatus: active\n");
        let changed = engine.validate().unwrap();
        assert!(changed.ok);
        assert_ne!(changed.fingerprint, validate.fingerprint);
    }

    #[derive(Debug)]
    struct StepCountChanged;

    impl ChangeComparator for StepCountChanged {
        fn accepts(&self, before: Option<&serde_json::Value>, after: Option<&serde_json::Value>) -> bool {
            let count = |v: Option<&serde_json::Value>| v.and_then(|v| v.as_array()).map_or(0, Vec::len);
            count(before) != count(after)
        }
    }

    #[test]
    fn test_rule_tables_see_registered_comparators() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            ".context-kit/rules.yaml",
            "rules:\n  - id: step-count\n    whenKind: task\n    whenFieldPath: steps\n    whenChangeClassifier: step-count\n    thenStatus: needs-review\n    reason: Step count changed\n",
        );
        fs::create_dir_all(dir.path().join("contexts")).unwrap();

        let plain = Engine::open(dir.path(), EngineConfig::default()).unwrap();
        assert_eq!(plain.rules(None).unwrap_err().code(), "rule-configuration");

        let engine = Engine::open(dir.path(), EngineConfig::default())
            .unwrap()
            .with_comparator("step-count", StepCountChanged);
        let table = engine.rules(None).unwrap();
        assert_eq!(table.get("step-count").unwrap().when_change_classifier, "step-count");
    }
}
