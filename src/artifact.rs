//! Artifact types
//!
//! Every document in a context repository is one of a fixed set of kinds.
//! Each kind has a typed payload that names its relationship fields, so the
//! graph builder never looks relationships up by string.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Canonical artifact identifier (`FEAT-001`, `US-101`, `svc-auth`)
pub type ArtifactId = String;

// =============================================================================
// Kind
// =============================================================================

/// The fixed set of artifact kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArtifactKind {
    Feature,
    UserStory,
    Spec,
    Task,
    Service,
    Package,
}

impl ArtifactKind {
    /// All kinds, in declaration order
    pub const ALL: [ArtifactKind; 6] = [
        ArtifactKind::Feature,
        ArtifactKind::UserStory,
        ArtifactKind::Spec,
        ArtifactKind::Task,
        ArtifactKind::Service,
        ArtifactKind::Package,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Feature => "feature",
            Self::UserStory => "user-story",
            Self::Spec => "spec",
            Self::Task => "task",
            Self::Service => "service",
            Self::Package => "package",
        }
    }

    /// Directory under `contexts/` holding documents of this kind
    pub fn dir_name(&self) -> &'static str {
        match self {
            Self::Feature => "features",
            Self::UserStory => "userstories",
            Self::Spec => "specs",
            Self::Task => "tasks",
            Self::Service => "services",
            Self::Package => "packages",
        }
    }

    /// Resolve a kind from its directory name
    pub fn from_dir(dir: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.dir_name() == dir)
    }

    /// File name of the schema for this kind
    pub fn schema_file(&self) -> String {
        format!("{}.schema.json", self.as_str())
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArtifactKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "feature" => Ok(Self::Feature),
            // the original repository layout spells it without a dash
            "user-story" | "userstory" => Ok(Self::UserStory),
            "spec" => Ok(Self::Spec),
            "task" => Ok(Self::Task),
            "service" => Ok(Self::Service),
            "package" => Ok(Self::Package),
            other => Err(format!("unknown artifact kind '{}'", other)),
        }
    }
}

// =============================================================================
// Status
// =============================================================================

/// Lifecycle status. Which values a kind accepts is decided by its schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Status {
    Draft,
    Proposed,
    InProgress,
    Active,
    Done,
    Blocked,
    NeedsReview,
    Deprecated,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Proposed => "proposed",
            Self::InProgress => "in-progress",
            Self::Active => "active",
            Self::Done => "done",
            Self::Blocked => "blocked",
            Self::NeedsReview => "needs-review",
            Self::Deprecated => "deprecated",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(Self::Draft),
            "proposed" => Ok(Self::Proposed),
            "in-progress" => Ok(Self::InProgress),
            "active" => Ok(Self::Active),
            "done" => Ok(Self::Done),
            "blocked" => Ok(Self::Blocked),
            "needs-review" => Ok(Self::NeedsReview),
            "deprecated" => Ok(Self::Deprecated),
            other => Err(format!("unknown status '{}'", other)),
        }
    }
}

// =============================================================================
// Relation
// =============================================================================

/// Edge label derived from a relationship field
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Relation {
    Requires,
    HasStory,
    HasSpec,
    HasTask,
    BelongsTo,
    Produces,
    Impacts,
    Uses,
    Consumes,
    DependsOn,
}

impl Relation {
    /// Relations that must not form cycles
    pub fn is_acyclic(&self) -> bool {
        matches!(self, Self::Requires | Self::DependsOn)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Requires => "requires",
            Self::HasStory => "has-story",
            Self::HasSpec => "has-spec",
            Self::HasTask => "has-task",
            Self::BelongsTo => "belongs-to",
            Self::Produces => "produces",
            Self::Impacts => "impacts",
            Self::Uses => "uses",
            Self::Consumes => "consumes",
            Self::DependsOn => "depends-on",
        }
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Relation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "requires" => Ok(Self::Requires),
            "has-story" => Ok(Self::HasStory),
            "has-spec" => Ok(Self::HasSpec),
            "has-task" => Ok(Self::HasTask),
            "belongs-to" => Ok(Self::BelongsTo),
            "produces" => Ok(Self::Produces),
            "impacts" => Ok(Self::Impacts),
            "uses" => Ok(Self::Uses),
            "consumes" => Ok(Self::Consumes),
            "depends-on" | "dependencies" => Ok(Self::DependsOn),
            other => Err(format!("unknown relation '{}'", other)),
        }
    }
}

// =============================================================================
// Typed payloads
// =============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeaturePayload {
    #[serde(default)]
    pub requires: Vec<ArtifactId>,
    #[serde(default)]
    pub user_stories: Vec<ArtifactId>,
    #[serde(default)]
    pub specs: Vec<ArtifactId>,
    #[serde(default)]
    pub tasks: Vec<ArtifactId>,
    #[serde(default)]
    pub impacts: Vec<ArtifactId>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStoryPayload {
    #[serde(default)]
    pub feature: Option<ArtifactId>,
    #[serde(default)]
    pub specs: Vec<ArtifactId>,
    #[serde(default)]
    pub tasks: Vec<ArtifactId>,
    #[serde(default)]
    pub impacts: Vec<ArtifactId>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpecPayload {
    #[serde(default)]
    pub requires: Vec<ArtifactId>,
    #[serde(default)]
    pub produces: Vec<ArtifactId>,
    #[serde(default)]
    pub impacts: Vec<ArtifactId>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskPayload {
    #[serde(default)]
    pub dependencies: Vec<ArtifactId>,
    #[serde(default)]
    pub uses: Vec<ArtifactId>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServicePayload {
    #[serde(default)]
    pub dependencies: Vec<ArtifactId>,
    #[serde(default)]
    pub consumes: Vec<ArtifactId>,
    #[serde(default)]
    pub uses: Vec<ArtifactId>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackagePayload {
    #[serde(default)]
    pub dependencies: Vec<ArtifactId>,
    #[serde(default)]
    pub uses: Vec<ArtifactId>,
}

/// Kind-discriminated payload
#[derive(Debug, Clone)]
pub enum ArtifactPayload {
    Feature(FeaturePayload),
    UserStory(UserStoryPayload),
    Spec(SpecPayload),
    Task(TaskPayload),
    Service(ServicePayload),
    Package(PackagePayload),
}

/// One relationship field of an artifact, with the edge label it produces
#[derive(Debug, Clone, Copy)]
pub struct RelationshipField<'a> {
    pub field: &'static str,
    pub relation: Relation,
    pub targets: &'a [ArtifactId],
}

impl ArtifactPayload {
    /// Decode the payload for `kind` out of a document
    pub fn decode(kind: ArtifactKind, data: &Value) -> Result<Self, serde_json::Error> {
        let data = data.clone();
        Ok(match kind {
            ArtifactKind::Feature => Self::Feature(serde_json::from_value(data)?),
            ArtifactKind::UserStory => Self::UserStory(serde_json::from_value(data)?),
            ArtifactKind::Spec => Self::Spec(serde_json::from_value(data)?),
            ArtifactKind::Task => Self::Task(serde_json::from_value(data)?),
            ArtifactKind::Service => Self::Service(serde_json::from_value(data)?),
            ArtifactKind::Package => Self::Package(serde_json::from_value(data)?),
        })
    }

    pub fn kind(&self) -> ArtifactKind {
        match self {
            Self::Feature(_) => ArtifactKind::Feature,
            Self::UserStory(_) => ArtifactKind::UserStory,
            Self::Spec(_) => ArtifactKind::Spec,
            Self::Task(_) => ArtifactKind::Task,
            Self::Service(_) => ArtifactKind::Service,
            Self::Package(_) => ArtifactKind::Package,
        }
    }

    /// Relationship fields in their fixed declared order
    pub fn relationships(&self) -> Vec<RelationshipField<'_>> {
        fn rel<'a>(field: &'static str, relation: Relation, targets: &'a [ArtifactId]) -> RelationshipField<'a> {
            RelationshipField { field, relation, targets }
        }

        match self {
            Self::Feature(p) => vec![
                rel("requires", Relation::Requires, &p.requires),
                rel("userStories", Relation::HasStory, &p.user_stories),
                rel("specs", Relation::HasSpec, &p.specs),
                rel("tasks", Relation::HasTask, &p.tasks),
                rel("impacts", Relation::Impacts, &p.impacts),
            ],
            Self::UserStory(p) => vec![
                rel("feature", Relation::BelongsTo, match &p.feature {
                    Some(feature) => std::slice::from_ref(feature),
                    None => &[],
                }),
                rel("specs", Relation::HasSpec, &p.specs),
                rel("tasks", Relation::HasTask, &p.tasks),
                rel("impacts", Relation::Impacts, &p.impacts),
            ],
            Self::Spec(p) => vec![
                rel("requires", Relation::Requires, &p.requires),
                rel("produces", Relation::Produces, &p.produces),
                rel("impacts", Relation::Impacts, &p.impacts),
            ],
            Self::Task(p) => vec![
                rel("dependencies", Relation::DependsOn, &p.dependencies),
                rel("uses", Relation::Uses, &p.uses),
            ],
            Self::Service(p) => vec![
                rel("dependencies", Relation::DependsOn, &p.dependencies),
                rel("consumes", Relation::Consumes, &p.consumes),
                rel("uses", Relation::Uses, &p.uses),
            ],
            Self::Package(p) => vec![
                rel("dependencies", Relation::DependsOn, &p.dependencies),
                rel("uses", Relation::Uses, &p.uses),
            ],
        }
    }
}

// =============================================================================
// Artifact
// =============================================================================

#[derive(Deserialize)]
struct CoreFields {
    id: ArtifactId,
    status: Status,
    #[serde(default)]
    title: Option<String>,
}

/// A validated artifact
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    pub id: ArtifactId,
    pub kind: ArtifactKind,
    pub status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Full validated document
    pub data: Value,
    pub source_location: PathBuf,
    #[serde(skip)]
    pub payload: ArtifactPayload,
}

impl Artifact {
    /// Build an artifact from a document that already passed schema validation
    pub fn from_document(
        kind: ArtifactKind,
        data: Value,
        source_location: impl Into<PathBuf>,
    ) -> Result<Self, serde_json::Error> {
        let core: CoreFields = serde_json::from_value(data.clone())?;
        let payload = ArtifactPayload::decode(kind, &data)?;

        Ok(Self {
            id: core.id,
            kind,
            status: core.status,
            title: core.title,
            data,
            source_location: source_location.into(),
            payload,
        })
    }

    pub fn relationships(&self) -> Vec<RelationshipField<'_>> {
        self.payload.relationships()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_kind_dir_round_trip() {
        for kind in ArtifactKind::ALL {
            assert_eq!(ArtifactKind::from_dir(kind.dir_name()), Some(kind));
        }
        assert_eq!(ArtifactKind::from_dir("governance"), None);
    }

    #[test]
    fn test_kind_accepts_legacy_spelling() {
        assert_eq!("userstory".parse::<ArtifactKind>(), Ok(ArtifactKind::UserStory));
        assert!("epic".parse::<ArtifactKind>().is_err());
    }

    #[test]
    fn test_only_dependency_relations_are_acyclic() {
        assert!(Relation::Requires.is_acyclic());
        assert!(Relation::DependsOn.is_acyclic());
        assert!(!Relation::HasStory.is_acyclic());
        assert!(!Relation::Impacts.is_acyclic());
    }

    #[test]
    fn test_feature_relationships_in_declared_order() {
        let data = json!({
            "id": "FEAT-001",
            "status": "proposed",
            "title": "Login",
            "userStories": ["US-101"],
            "requires": ["svc-auth"]
        });
        let artifact = Artifact::from_document(ArtifactKind::Feature, data, "features/login.yaml").unwrap();

        let fields: Vec<_> = artifact
            .relationships()
            .into_iter()
            .map(|r| (r.field, r.relation, r.targets.to_vec()))
            .collect();

        assert_eq!(fields[0], ("requires", Relation::Requires, vec!["svc-auth".to_string()]));
        assert_eq!(fields[1], ("userStories", Relation::HasStory, vec!["US-101".to_string()]));
        assert!(fields[2..].iter().all(|(_, _, t)| t.is_empty()));
    }

    #[test]
    fn test_user_story_feature_link_is_single_target() {
        let data = json!({ "id": "US-101", "status": "done", "feature": "FEAT-001" });
        let artifact = Artifact::from_document(ArtifactKind::UserStory, data, "us.yaml").unwrap();
        let belongs: Vec<_> = artifact
            .relationships()
            .into_iter()
            .filter(|r| r.relation == Relation::BelongsTo)
            .collect();
        assert_eq!(belongs.len(), 1);
        assert_eq!(belongs[0].targets, ["FEAT-001".to_string()]);
    }

    #[test]
    fn test_status_serializes_kebab_case() {
        let s = serde_json::to_string(&Status::NeedsReview).unwrap();
        assert_eq!(s, "\"needs-review\"");
        assert_eq!("in-progress".parse::<Status>(), Ok(Status::InProgress));
    }
}
