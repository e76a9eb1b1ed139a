//! Repository overview: counts, per-artifact summaries, gaps and
//! recommendations for improving context quality.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::artifact::{Artifact, ArtifactId, ArtifactKind, Status};
use crate::diagnostics::GraphError;
use crate::graph::GraphBuild;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Overview {
    pub total: usize,
    pub by_kind: BTreeMap<ArtifactKind, usize>,
    pub by_status: BTreeMap<Status, usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntitySummary {
    pub id: ArtifactId,
    pub kind: ArtifactKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub status: Status,
    /// Non-empty relationship fields, keyed by field name
    pub relationships: BTreeMap<String, Vec<ArtifactId>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InspectReport {
    pub overview: Overview,
    pub entities: Vec<EntitySummary>,
    pub gaps: Vec<String>,
    pub recommendations: Vec<String>,
}

/// Summarise a loaded repository
pub fn inspect(entities: &[Artifact], build: &GraphBuild) -> InspectReport {
    let mut sorted: Vec<&Artifact> = entities.iter().collect();
    sorted.sort_by(|a, b| a.id.cmp(&b.id));

    let mut overview = Overview {
        total: sorted.len(),
        ..Overview::default()
    };
    for artifact in &sorted {
        *overview.by_kind.entry(artifact.kind).or_default() += 1;
        *overview.by_status.entry(artifact.status).or_default() += 1;
    }

    let summaries = sorted.iter().map(|a| summarize(a)).collect();
    let gaps: Vec<String> = sorted.iter().flat_map(|a| gaps_for(a)).collect();

    let mut recommendations = Vec::new();
    if !gaps.is_empty() {
        recommendations.push(format!("Address {} identified gaps", gaps.len()));
    }
    if let Some(blocked) = overview.by_status.get(&Status::Blocked) {
        recommendations.push(format!("Review {} blocked items", blocked));
    }
    let cycles = build
        .errors
        .iter()
        .filter(|e| matches!(e, GraphError::CircularDependency { .. }))
        .count();
    if cycles > 0 {
        recommendations.push(format!("Resolve {} circular dependencies", cycles));
    }

    InspectReport {
        overview,
        entities: summaries,
        gaps,
        recommendations,
    }
}

fn summarize(artifact: &Artifact) -> EntitySummary {
    let relationships = artifact
        .relationships()
        .into_iter()
        .filter(|r| !r.targets.is_empty())
        .map(|r| (r.field.to_string(), r.targets.to_vec()))
        .collect();

    EntitySummary {
        id: artifact.id.clone(),
        kind: artifact.kind,
        title: artifact.title.clone(),
        status: artifact.status,
        relationships,
    }
}

fn gaps_for(artifact: &Artifact) -> Vec<String> {
    let has = |field: &str| {
        artifact
            .data
            .get(field)
            .and_then(|v| v.as_str())
            .map_or(false, |s| !s.trim().is_empty())
    };

    let mut gaps = Vec::new();
    if !has("title") && !has("objective") {
        gaps.push(format!("{}: Missing title/objective", artifact.id));
    }
    if artifact.kind == ArtifactKind::Spec && !has("overview") {
        gaps.push(format!("{}: Missing overview", artifact.id));
    }
    gaps
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::build;
    use serde_json::json;

    fn artifact(kind: ArtifactKind, data: serde_json::Value) -> Artifact {
        Artifact::from_document(kind, data, "test.yaml").unwrap()
    }

    #[test]
    fn test_overview_counts_and_gaps() {
        let entities = vec![
            artifact(ArtifactKind::Feature, json!({ "id": "FEAT-001", "status": "blocked", "title": "SSO", "requires": ["svc-auth"] })),
            artifact(ArtifactKind::Service, json!({ "id": "svc-auth", "status": "active" })),
            artifact(ArtifactKind::Spec, json!({ "id": "SPEC-101", "status": "draft", "title": "Token format" })),
        ];
        let report = inspect(&entities, &build(&entities));

        assert_eq!(report.overview.total, 3);
        assert_eq!(report.overview.by_kind[&ArtifactKind::Feature], 1);
        assert_eq!(report.overview.by_status[&Status::Blocked], 1);
        assert_eq!(
            report.gaps,
            vec!["SPEC-101: Missing overview".to_string(), "svc-auth: Missing title/objective".to_string()]
        );
        assert_eq!(
            report.recommendations,
            vec!["Address 2 identified gaps".to_string(), "Review 1 blocked items".to_string()]
        );

        let feature = &report.entities[0];
        assert_eq!(feature.id, "FEAT-001");
        assert_eq!(feature.relationships["requires"], vec!["svc-auth".to_string()]);
        assert_eq!(feature.relationships.len(), 1);
    }

    #[test]
    fn test_cycles_produce_recommendation() {
        let entities = vec![
            artifact(ArtifactKind::Task, json!({ "id": "T-1001", "status": "done", "title": "a", "dependencies": ["T-1002"] })),
            artifact(ArtifactKind::Task, json!({ "id": "T-1002", "status": "done", "title": "b", "dependencies": ["T-1001"] })),
        ];
        let report = inspect(&entities, &build(&entities));
        assert_eq!(report.recommendations, vec!["Resolve 1 circular dependencies".to_string()]);
    }

    #[test]
    fn test_overview_serializes_kind_keys() {
        let entities = vec![artifact(ArtifactKind::UserStory, json!({ "id": "US-101", "status": "in-progress", "title": "x" }))];
        let json = serde_json::to_value(inspect(&entities, &build(&entities))).unwrap();
        assert_eq!(json["overview"]["byKind"]["user-story"], 1);
        assert_eq!(json["overview"]["byStatus"]["in-progress"], 1);
    }
}
