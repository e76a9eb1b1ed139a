//! Cycle detection over the relations that must stay acyclic
//!
//! Iterative depth-first search with an explicit recursion-stack set over the
//! combined `requires`/`depends-on` subgraph, so a loop that mixes both
//! relations is caught too. Each back edge closes a cycle; cycles are
//! normalised to start at their smallest id so a cycle found from two entry
//! points is reported once.

use petgraph::graph::NodeIndex;
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use std::collections::HashSet;
use tracing::warn;

use super::ArtifactGraph;
use crate::artifact::{ArtifactId, Relation};
use crate::diagnostics::GraphError;

/// One `CircularDependency` per distinct cycle
pub fn detect_cycles(graph: &ArtifactGraph) -> Vec<GraphError> {
    find_cycles(graph)
        .into_iter()
        .map(|(cycle_path, relations)| {
            warn!(cycle = %cycle_path.join(" -> "), "circular dependency");
            GraphError::CircularDependency { cycle_path, relations }
        })
        .collect()
}

struct Frame {
    node: NodeIndex,
    successors: Vec<(NodeIndex, Relation)>,
    next: usize,
}

/// Cycles as (ids with the first repeated at the end, relation of each edge)
fn find_cycles(graph: &ArtifactGraph) -> Vec<(Vec<ArtifactId>, Vec<Relation>)> {
    let mut visited: HashSet<NodeIndex> = HashSet::new();
    let mut reported: HashSet<Vec<NodeIndex>> = HashSet::new();
    let mut found = Vec::new();

    for start in graph.graph.node_indices() {
        if !visited.insert(start) {
            continue;
        }

        let mut on_stack: HashSet<NodeIndex> = HashSet::from([start]);
        let mut path = vec![start];
        // path_relations[i] labels the edge path[i] -> path[i + 1]
        let mut path_relations: Vec<Relation> = Vec::new();
        let mut stack = vec![Frame {
            node: start,
            successors: successors(graph, start),
            next: 0,
        }];

        while let Some(frame) = stack.last_mut() {
            let Some(&(next, relation)) = frame.successors.get(frame.next) else {
                on_stack.remove(&frame.node);
                path.pop();
                path_relations.pop();
                stack.pop();
                continue;
            };
            frame.next += 1;

            if on_stack.contains(&next) {
                let begin = path.iter().position(|n| *n == next).unwrap_or(0);
                let mut relations = path_relations[begin..].to_vec();
                relations.push(relation);
                let (cycle, relations) = canonical(graph, &path[begin..], relations);
                if reported.insert(cycle.clone()) {
                    let mut ids: Vec<ArtifactId> =
                        cycle.iter().map(|idx| graph.graph[*idx].clone()).collect();
                    ids.push(graph.graph[cycle[0]].clone());
                    found.push((ids, relations));
                }
            } else if visited.insert(next) {
                on_stack.insert(next);
                path.push(next);
                path_relations.push(relation);
                stack.push(Frame {
                    node: next,
                    successors: successors(graph, next),
                    next: 0,
                });
            }
        }
    }
    found
}

/// Targets of acyclic-relation edges leaving `node`, in insertion order
fn successors(graph: &ArtifactGraph, node: NodeIndex) -> Vec<(NodeIndex, Relation)> {
    let mut edges: Vec<_> = graph
        .graph
        .edges_directed(node, Direction::Outgoing)
        .filter(|e| e.weight().is_acyclic())
        .map(|e| (e.id(), e.target(), *e.weight()))
        .collect();
    edges.sort_by_key(|(idx, _, _)| *idx);
    edges.into_iter().map(|(_, target, relation)| (target, relation)).collect()
}

/// Rotate a cycle and its edge relations so it starts at its smallest id
fn canonical(
    graph: &ArtifactGraph,
    cycle: &[NodeIndex],
    mut relations: Vec<Relation>,
) -> (Vec<NodeIndex>, Vec<Relation>) {
    let start = cycle
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| graph.graph[**a].cmp(&graph.graph[**b]))
        .map(|(i, _)| i)
        .unwrap_or(0);
    let mut rotated = cycle.to_vec();
    rotated.rotate_left(start);
    relations.rotate_left(start);
    (rotated, relations)
}

#[cfg(test)]
mod tests {
    use crate::artifact::{ArtifactKind, Relation};
    use crate::diagnostics::GraphError;
    use crate::graph::build;
    use crate::graph::tests::artifact;
    use serde_json::json;

    fn feature(id: &str, requires: &[&str]) -> crate::artifact::Artifact {
        artifact(ArtifactKind::Feature, json!({ "id": id, "status": "proposed", "requires": requires }))
    }

    #[test]
    fn test_two_node_cycle_reported_once() {
        let build = build(&[feature("FEAT-001", &["FEAT-002"]), feature("FEAT-002", &["FEAT-001"])]);

        assert_eq!(build.errors.len(), 1);
        assert_eq!(
            build.errors[0],
            GraphError::CircularDependency {
                cycle_path: vec!["FEAT-001".into(), "FEAT-002".into(), "FEAT-001".into()],
                relations: vec![Relation::Requires, Relation::Requires],
            }
        );
        // cyclic edges stay in the graph
        assert_eq!(build.graph.edge_count(), 2);
    }

    #[test]
    fn test_self_reference_is_a_cycle() {
        let build = build(&[feature("FEAT-001", &["FEAT-001"])]);
        assert_eq!(build.errors.len(), 1);
        match &build.errors[0] {
            GraphError::CircularDependency { cycle_path, .. } => {
                assert_eq!(cycle_path, &vec!["FEAT-001".to_string(), "FEAT-001".to_string()]);
            }
            other => panic!("Expected CircularDependency, got {:?}", other),
        }
    }

    #[test]
    fn test_cycles_through_other_relations_are_ignored() {
        let build = build(&[
            artifact(ArtifactKind::Feature, json!({ "id": "FEAT-001", "status": "proposed", "userStories": ["US-101"] })),
            artifact(ArtifactKind::UserStory, json!({ "id": "US-101", "status": "draft", "feature": "FEAT-001" })),
        ]);
        assert!(build.errors.is_empty());
    }

    #[test]
    fn test_depends_on_cycle_and_diamond() {
        let task = |id: &str, deps: &[&str]| {
            artifact(ArtifactKind::Task, json!({ "id": id, "status": "done", "dependencies": deps }))
        };
        // diamond T1 -> {T2, T3} -> T4 is acyclic; T4 -> T5 -> T4 is not
        let build = build(&[
            task("T-1001", &["T-1002", "T-1003"]),
            task("T-1002", &["T-1004"]),
            task("T-1003", &["T-1004"]),
            task("T-1004", &["T-1005"]),
            task("T-1005", &["T-1004"]),
        ]);

        assert_eq!(build.errors.len(), 1);
        match &build.errors[0] {
            GraphError::CircularDependency { cycle_path, relations } => {
                assert_eq!(relations, &vec![Relation::DependsOn, Relation::DependsOn]);
                assert_eq!(cycle_path.join(" -> "), "T-1004 -> T-1005 -> T-1004");
            }
            other => panic!("Expected CircularDependency, got {:?}", other),
        }
    }

    #[test]
    fn test_three_node_cycle_entered_midway() {
        let build = build(&[
            feature("FEAT-001", &["FEAT-003"]),
            feature("FEAT-002", &["FEAT-001"]),
            feature("FEAT-003", &["FEAT-002"]),
        ]);
        assert_eq!(build.errors.len(), 1);
        assert_eq!(
            build.errors[0].to_string(),
            "[W001] circular 'requires' chain: FEAT-001 -> FEAT-003 -> FEAT-002 -> FEAT-001"
        );
    }

    #[test]
    fn test_cycle_across_requires_and_depends_on() {
        let build = build(&[
            feature("FEAT-001", &["T-1001"]),
            artifact(ArtifactKind::Task, json!({ "id": "T-1001", "status": "done", "dependencies": ["FEAT-001"] })),
        ]);

        assert_eq!(build.graph.edge_count(), 2);
        assert_eq!(
            build.errors,
            vec![GraphError::CircularDependency {
                cycle_path: vec!["FEAT-001".into(), "T-1001".into(), "FEAT-001".into()],
                relations: vec![Relation::Requires, Relation::DependsOn],
            }]
        );
        assert_eq!(
            build.errors[0].to_string(),
            "[W001] circular 'requires'/'depends-on' chain: FEAT-001 -> T-1001 -> FEAT-001"
        );
    }

    #[test]
    fn test_mixed_cycle_rotates_relations_with_ids() {
        // entered at FEAT-003 through FEAT-001, reported from FEAT-002
        let build = build(&[
            feature("FEAT-001", &["FEAT-003"]),
            feature("FEAT-002", &["FEAT-003"]),
            feature("FEAT-003", &["T-1001"]),
            artifact(ArtifactKind::Task, json!({ "id": "T-1001", "status": "done", "dependencies": ["FEAT-002"] })),
        ]);

        assert_eq!(build.errors.len(), 1);
        match &build.errors[0] {
            GraphError::CircularDependency { cycle_path, relations } => {
                assert_eq!(cycle_path.join(" -> "), "FEAT-002 -> FEAT-003 -> T-1001 -> FEAT-002");
                assert_eq!(relations, &vec![Relation::Requires, Relation::Requires, Relation::DependsOn]);
            }
            other => panic!("Expected CircularDependency, got {:?}", other),
        }
    }
}
