//! Consistency Rules
//!
//! Declarative condition/action pairs: when a field of some kind changes,
//! related artifacts of given kinds should move to a given status. Rule
//! documents are parsed into an immutable [`RuleTable`] that has been fully
//! checked against the schema registry, so evaluation never fails.
//!
//! ```yaml
//! rules:
//!   - id: api-major-bump
//!     whenKind: service
//!     whenFieldPath: api.version
//!     whenChangeClassifier: major
//!     thenKinds: [feature, spec]
//!     thenRelation: requires
//!     thenDirection: incoming
//!     thenStatus: needs-review
//!     reason: Service API had a breaking version change
//! ```

pub mod classifier;
pub mod path;

pub use classifier::{parse_lenient, ChangeClassifier, ChangeComparator, Comparators};
pub use path::{FieldPath, FieldPathSegment};

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

use crate::artifact::{Artifact, ArtifactKind, Relation, Status};
use crate::error::{EngineError, Result};
use crate::graph::TraversalDirection;
use crate::registry::SchemaRegistry;

// =============================================================================
// Definitions (as written)
// =============================================================================

/// A rule as it appears in a rule document, before any checking
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleDefinition {
    pub id: String,
    pub when_kind: String,
    pub when_field_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub when_change_classifier: Option<String>,
    #[serde(default)]
    pub then_kinds: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub then_relation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub then_direction: Option<String>,
    pub then_status: String,
    pub reason: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RuleDocument {
    Table { rules: Vec<RuleDefinition> },
    List(Vec<RuleDefinition>),
}

impl From<RuleDocument> for Vec<RuleDefinition> {
    fn from(doc: RuleDocument) -> Self {
        match doc {
            RuleDocument::Table { rules } => rules,
            RuleDocument::List(rules) => rules,
        }
    }
}

/// Parse a rule document: either `rules: [...]` or a bare list, in YAML or JSON
pub fn parse_rule_document(content: &str, json: bool) -> Result<Vec<RuleDefinition>> {
    if content.trim().is_empty() {
        return Ok(Vec::new());
    }
    let doc: RuleDocument = if json {
        serde_json::from_str(content)?
    } else {
        serde_yaml::from_str(content)?
    };
    Ok(doc.into())
}

/// Read and check a rule document from disk
pub fn load_rules_file(
    path: &Path,
    registry: &SchemaRegistry,
    comparators: &Comparators,
) -> Result<RuleTable> {
    let content = fs::read_to_string(path)?;
    let json = path.extension().map(|e| e == "json").unwrap_or(false);
    let definitions = parse_rule_document(&content, json)?;
    info!(path = %path.display(), rules = definitions.len(), "read rule document");
    load_rules_with(definitions, registry, comparators)
}

// =============================================================================
// Rule table
// =============================================================================

/// A checked rule
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    pub id: String,
    pub when_kind: ArtifactKind,
    #[serde(serialize_with = "serialize_path")]
    pub when_field_path: FieldPath,
    /// Name the comparator was registered under
    pub when_change_classifier: String,
    #[serde(skip)]
    comparator: Arc<dyn ChangeComparator>,
    /// Empty means any kind
    pub then_kinds: Vec<ArtifactKind>,
    pub then_relation: Option<Relation>,
    pub then_direction: TraversalDirection,
    pub then_status: Status,
    pub reason: String,
}

fn serialize_path<S: serde::Serializer>(path: &FieldPath, s: S) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_str(path.as_str())
}

impl Rule {
    /// Check one definition against the registry
    pub fn from_definition(
        def: RuleDefinition,
        registry: &SchemaRegistry,
        comparators: &Comparators,
    ) -> Result<Self> {
        let id = def.id.trim().to_string();
        if id.is_empty() {
            return Err(EngineError::rule("<unnamed>", "rule id is empty"));
        }
        let fail = |message: String| EngineError::rule(id.clone(), message);

        let when_kind: ArtifactKind = def.when_kind.parse().map_err(fail)?;

        let when_field_path = FieldPath::parse(&def.when_field_path).map_err(fail)?;
        let schema = registry
            .schema(when_kind)
            .ok_or(EngineError::MissingSchema(when_kind))?;
        when_field_path
            .check_against(schema)
            .map_err(|e| fail(format!("field path '{}' on {}: {}", when_field_path, when_kind, e)))?;

        let (when_change_classifier, comparator) = comparators
            .resolve(def.when_change_classifier.as_deref())
            .map_err(fail)?;

        let then_kinds = def
            .then_kinds
            .iter()
            .map(|k| k.parse::<ArtifactKind>())
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(fail)?;

        let then_relation = def
            .then_relation
            .as_deref()
            .map(str::parse::<Relation>)
            .transpose()
            .map_err(fail)?;

        let then_direction = def
            .then_direction
            .as_deref()
            .map(str::parse::<TraversalDirection>)
            .transpose()
            .map_err(fail)?
            .unwrap_or(TraversalDirection::Both);

        let then_status: Status = def.then_status.parse().map_err(fail)?;

        let reason = def.reason.trim().to_string();
        if reason.is_empty() {
            return Err(fail("reason is empty".to_string()));
        }

        Ok(Self {
            id,
            when_kind,
            when_field_path,
            when_change_classifier,
            comparator,
            then_kinds,
            then_relation,
            then_direction,
            then_status,
            reason,
        })
    }

    /// Whether the change from `before` to `after` fires this rule
    pub fn fires(&self, before: &Artifact, after: &Artifact) -> bool {
        if self.when_kind != after.kind {
            return false;
        }
        let old = self.when_field_path.resolve(&before.data);
        let new = self.when_field_path.resolve(&after.data);
        old != new && self.comparator.accepts(old, new)
    }
}

/// Immutable, checked rule set for one run
#[derive(Debug, Clone, Default, Serialize)]
pub struct RuleTable {
    rules: Vec<Rule>,
}

impl RuleTable {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn get(&self, id: &str) -> Option<&Rule> {
        self.rules.iter().find(|r| r.id == id)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Check every definition against the built-in comparators
pub fn load_rules(definitions: Vec<RuleDefinition>, registry: &SchemaRegistry) -> Result<RuleTable> {
    load_rules_with(definitions, registry, &Comparators::builtin())
}

/// Check every definition; the first problem aborts the load
pub fn load_rules_with(
    definitions: Vec<RuleDefinition>,
    registry: &SchemaRegistry,
    comparators: &Comparators,
) -> Result<RuleTable> {
    let mut seen = HashSet::new();
    let mut rules = Vec::with_capacity(definitions.len());
    for def in definitions {
        let rule = Rule::from_definition(def, registry, comparators)?;
        if !seen.insert(rule.id.clone()) {
            return Err(EngineError::rule(rule.id, "duplicate rule id"));
        }
        rules.push(rule);
    }
    debug!(rules = rules.len(), "loaded rule table");
    Ok(RuleTable { rules })
}

// =============================================================================
// Evaluation
// =============================================================================

/// What a fired rule asks for. Resolution to concrete artifacts happens in
/// impact analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggeredRule {
    pub rule_id: String,
    pub reason: String,
    pub then_kinds: Vec<ArtifactKind>,
    pub then_relation: Option<Relation>,
    pub then_direction: TraversalDirection,
    pub then_status: Status,
}

impl From<&Rule> for TriggeredRule {
    fn from(rule: &Rule) -> Self {
        Self {
            rule_id: rule.id.clone(),
            reason: rule.reason.clone(),
            then_kinds: rule.then_kinds.clone(),
            then_relation: rule.then_relation,
            then_direction: rule.then_direction,
            then_status: rule.then_status,
        }
    }
}

impl TriggeredRule {
    /// Whether a neighbor of `kind` reached over `relation` is targeted
    pub fn targets(&self, kind: ArtifactKind, relation: Relation) -> bool {
        (self.then_kinds.is_empty() || self.then_kinds.contains(&kind))
            && self.then_relation.map_or(true, |r| r == relation)
    }
}

/// Rules fired by the change from `before` to `after`, in table order
pub fn evaluate(table: &RuleTable, before: &Artifact, after: &Artifact) -> Vec<TriggeredRule> {
    table
        .rules
        .iter()
        .filter(|rule| rule.fires(before, after))
        .map(|rule| {
            debug!(rule = %rule.id, artifact = %after.id, "rule fired");
            TriggeredRule::from(rule)
        })
        .collect()
}
