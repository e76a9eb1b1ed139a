//! Impact Analysis
//!
//! Given the changed ids, walks the graph to find every stale artifact and
//! applies the rule table to the before/after pair of each changed artifact
//! to decide which neighbors get flagged, and why.
//!
//! The report is fully sorted, so the same inputs always serialize to the
//! same bytes.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

use crate::artifact::{ArtifactId, ArtifactKind, Status};
use crate::config::ImpactConfig;
use crate::diagnostics::{serialize_coded, ImpactWarning};
use crate::graph::{ArtifactGraph, TraversalDirection};
use crate::loader::Snapshot;
use crate::rules::{evaluate, RuleTable, TriggeredRule};

/// Traversal settings for one analysis
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImpactOptions {
    /// Cap on edges followed from a changed artifact
    pub max_depth: Option<usize>,
    /// Edge direction followed when collecting stale artifacts
    pub direction: TraversalDirection,
}

impl From<&ImpactConfig> for ImpactOptions {
    fn from(config: &ImpactConfig) -> Self {
        Self {
            max_depth: config.max_depth,
            direction: config.direction,
        }
    }
}

/// An artifact flagged by a rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Issue {
    pub id: ArtifactId,
    pub kind: ArtifactKind,
    pub reason: String,
    pub rule_id: String,
    /// Status the rule asks for
    pub status: Status,
    /// Changed artifact whose diff fired the rule
    pub triggered_by: ArtifactId,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImpactReport {
    pub issues: Vec<Issue>,
    pub stale: Vec<ArtifactId>,
    #[serde(serialize_with = "serialize_coded")]
    pub warnings: Vec<ImpactWarning>,
}

/// Run impact analysis.
///
/// Unknown changed ids become warnings. Rules are only evaluated for changed
/// ids present in both snapshots; otherwise the id contributes stale
/// artifacts only. Changed ids are never reported as stale or flagged.
pub fn analyze(
    graph: &ArtifactGraph,
    rules: &RuleTable,
    changed_ids: &[ArtifactId],
    before: Option<&Snapshot>,
    after: &Snapshot,
    options: &ImpactOptions,
) -> ImpactReport {
    let changed: BTreeSet<&str> = changed_ids.iter().map(|s| s.as_str()).collect();

    let mut warnings = Vec::new();
    let mut known = Vec::new();
    for id in &changed {
        if graph.contains(id) {
            known.push(*id);
        } else {
            warn!(id = %id, "changed id is not in the graph");
            warnings.push(ImpactWarning::UnknownChangedId { id: id.to_string() });
        }
    }

    let mut stale: BTreeSet<ArtifactId> = graph
        .closure(&known, options.direction, options.max_depth)
        .into_iter()
        .map(|n| n.id)
        .collect();

    let mut issues: BTreeMap<(ArtifactId, String), Issue> = BTreeMap::new();
    for id in &known {
        let (Some(old), Some(new)) = (before.and_then(|s| s.get(id)), after.get(id)) else {
            debug!(id = %id, "no before/after pair, skipping rule evaluation");
            continue;
        };

        for triggered in evaluate(rules, old, new) {
            for issue in resolve(graph, &changed, id, &triggered) {
                stale.insert(issue.id.clone());
                issues
                    .entry((issue.id.clone(), issue.rule_id.clone()))
                    .or_insert(issue);
            }
        }
    }

    warnings.sort();
    let report = ImpactReport {
        issues: issues.into_values().collect(),
        stale: stale.into_iter().collect(),
        warnings,
    };

    info!(
        changed = changed.len(),
        stale = report.stale.len(),
        issues = report.issues.len(),
        warnings = report.warnings.len(),
        "impact analysis complete"
    );
    report
}

/// Direct neighbors of `changed_id` that a fired rule targets
fn resolve(
    graph: &ArtifactGraph,
    changed: &BTreeSet<&str>,
    changed_id: &str,
    triggered: &TriggeredRule,
) -> Vec<Issue> {
    graph
        .adjacent(changed_id, triggered.then_direction)
        .into_iter()
        .filter(|adj| !changed.contains(adj.id.as_str()))
        .filter_map(|adj| graph.get(adj.id).map(|artifact| (artifact, adj.relation)))
        .filter(|(artifact, relation)| triggered.targets(artifact.kind, *relation))
        .map(|(artifact, _)| Issue {
            id: artifact.id.clone(),
            kind: artifact.kind,
            reason: triggered.reason.clone(),
            rule_id: triggered.rule_id.clone(),
            status: triggered.then_status,
            triggered_by: changed_id.to_string(),
        })
        .collect()
}
