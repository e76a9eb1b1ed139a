//! Graph construction from a validated entity set

use petgraph::graph::DiGraph;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, info, warn};

use super::{cycles, ArtifactGraph};
use crate::artifact::{Artifact, ArtifactId};
use crate::diagnostics::GraphError;

/// Result of a graph build: the graph plus any recoverable problems
#[derive(Debug, Clone)]
pub struct GraphBuild {
    pub graph: ArtifactGraph,
    pub errors: Vec<GraphError>,
}

/// Build the relationship graph.
///
/// Nodes are added in id order and edges in each artifact's declared field
/// order, so two builds over the same entities produce identical graphs.
/// References to unknown ids are skipped; the loader has already reported
/// them.
pub fn build(entities: &[Artifact]) -> GraphBuild {
    let mut artifacts: BTreeMap<ArtifactId, Artifact> = BTreeMap::new();
    for artifact in entities {
        if artifacts.contains_key(&artifact.id) {
            warn!(id = %artifact.id, "duplicate id passed to graph builder, keeping first");
            continue;
        }
        artifacts.insert(artifact.id.clone(), artifact.clone());
    }

    let mut graph = DiGraph::new();
    let mut node_indices = HashMap::new();
    for id in artifacts.keys() {
        let idx = graph.add_node(id.clone());
        node_indices.insert(id.clone(), idx);
    }

    let mut seen = HashSet::new();
    let mut skipped = 0usize;
    for artifact in artifacts.values() {
        let from_idx = node_indices[&artifact.id];
        for rel in artifact.relationships() {
            for target in rel.targets {
                let Some(&to_idx) = node_indices.get(target) else {
                    debug!(from = %artifact.id, field = rel.field, target = %target, "skipping dangling edge");
                    skipped += 1;
                    continue;
                };
                if seen.insert((from_idx, to_idx, rel.relation)) {
                    graph.add_edge(from_idx, to_idx, rel.relation);
                }
            }
        }
    }

    let mut result = ArtifactGraph {
        graph,
        node_indices,
        artifacts,
        bundle_hash: String::new(),
    };
    result.bundle_hash = compute_bundle_hash(&result);

    let errors = cycles::detect_cycles(&result);
    info!(
        nodes = result.node_count(),
        edges = result.edge_count(),
        skipped,
        cycles = errors.len(),
        "built artifact graph"
    );

    GraphBuild { graph: result, errors }
}

fn compute_bundle_hash(graph: &ArtifactGraph) -> String {
    let mut hasher = Sha256::new();
    for artifact in graph.artifacts.values() {
        hasher.update(artifact.id.as_bytes());
        hasher.update(b":");
        hasher.update(artifact.kind.as_str().as_bytes());
        hasher.update(b"\n");
    }
    for edge in graph.edges() {
        hasher.update(format!("{}->{}:{}\n", edge.from, edge.to, edge.relation).as_bytes());
    }
    format!("{:x}", hasher.finalize())
}
