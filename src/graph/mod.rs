//! Artifact Relationship Graph
//!
//! Flat, index-based directed graph (petgraph `DiGraph`) with an id → index
//! map for constant-time lookup. Nodes are artifact ids; edge weights are the
//! [`Relation`] derived from the relationship field that produced them.
//!
//! The graph is built once per run by [`builder::build`] and is read-only
//! afterwards. Cycles are allowed to stay in the graph; every traversal
//! carries a visited set.

pub mod builder;
pub mod cycles;

pub use builder::{build, GraphBuild};
pub use cycles::detect_cycles;

use petgraph::graph::{DiGraph, EdgeIndex, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use crate::artifact::{Artifact, ArtifactId, ArtifactKind, Relation};

/// Which edges a traversal follows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TraversalDirection {
    /// From an artifact to what it references
    #[default]
    Outgoing,
    /// From an artifact to what references it
    Incoming,
    Both,
}

impl TraversalDirection {
    fn directions(&self) -> &'static [Direction] {
        match self {
            Self::Outgoing => &[Direction::Outgoing],
            Self::Incoming => &[Direction::Incoming],
            Self::Both => &[Direction::Outgoing, Direction::Incoming],
        }
    }
}

impl std::str::FromStr for TraversalDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "outgoing" => Ok(Self::Outgoing),
            "incoming" => Ok(Self::Incoming),
            "both" => Ok(Self::Both),
            other => Err(format!("unknown direction '{}' (expected outgoing, incoming or both)", other)),
        }
    }
}

/// Serializable node view
#[derive(Debug, Clone, Serialize)]
pub struct Node {
    pub id: ArtifactId,
    pub kind: ArtifactKind,
    pub data: Value,
}

/// Serializable edge view
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Edge {
    pub from: ArtifactId,
    pub to: ArtifactId,
    pub relation: Relation,
}

/// `{nodes, edges}` with nodes sorted by id and edges in insertion order
#[derive(Debug, Clone, Serialize)]
pub struct GraphView {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

/// A neighbor reached over one edge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Adjacent<'a> {
    pub id: &'a ArtifactId,
    pub relation: Relation,
    /// Direction the edge was followed in
    pub outgoing: bool,
}

/// Node in a closure result
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClosureNode {
    pub id: ArtifactId,
    pub depth: usize,
}

/// The artifact relationship graph
#[derive(Debug, Clone, Default)]
pub struct ArtifactGraph {
    pub(crate) graph: DiGraph<ArtifactId, Relation>,

    /// Node index lookup: id -> NodeIndex
    pub(crate) node_indices: HashMap<ArtifactId, NodeIndex>,

    /// Artifacts indexed by id
    pub(crate) artifacts: BTreeMap<ArtifactId, Artifact>,

    /// Hash over nodes and edges, stable across runs
    pub bundle_hash: String,
}

impl ArtifactGraph {
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.node_indices.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&Artifact> {
        self.artifacts.get(id)
    }

    /// All node ids, sorted
    pub fn all_nodes(&self) -> Vec<&ArtifactId> {
        self.artifacts.keys().collect()
    }

    /// All artifacts, sorted by id
    pub fn artifacts(&self) -> impl Iterator<Item = &Artifact> {
        self.artifacts.values()
    }

    /// Edges in insertion order
    pub fn edges(&self) -> Vec<Edge> {
        self.graph
            .edge_references()
            .map(|e| Edge {
                from: self.graph[e.source()].clone(),
                to: self.graph[e.target()].clone(),
                relation: *e.weight(),
            })
            .collect()
    }

    /// Outgoing neighbors, optionally restricted to one relation, in edge insertion order
    pub fn neighbors(&self, id: &str, relation: Option<Relation>) -> Vec<&ArtifactId> {
        let mut seen = HashSet::new();
        self.adjacent(id, TraversalDirection::Outgoing)
            .into_iter()
            .filter(|a| relation.map_or(true, |r| a.relation == r))
            .filter(|a| seen.insert(a.id))
            .map(|a| a.id)
            .collect()
    }

    /// Direct neighbors over incoming and outgoing edges
    pub fn related(&self, id: &str) -> Vec<&ArtifactId> {
        let mut seen = HashSet::new();
        self.adjacent(id, TraversalDirection::Both)
            .into_iter()
            .filter(|a| seen.insert(a.id))
            .map(|a| a.id)
            .collect()
    }

    /// Every edge touching `id` in the given direction. Outgoing edges come
    /// first; within a direction, edges are in insertion order.
    pub fn adjacent(&self, id: &str, direction: TraversalDirection) -> Vec<Adjacent<'_>> {
        let Some(&node_idx) = self.node_indices.get(id) else {
            return Vec::new();
        };

        let mut result = Vec::new();
        for &dir in direction.directions() {
            for (_, other, relation) in self.sorted_edges(node_idx, dir) {
                result.push(Adjacent {
                    id: &self.graph[other],
                    relation,
                    outgoing: dir == Direction::Outgoing,
                });
            }
        }
        result
    }

    /// Shortest path over outgoing edges; ties go to the earlier-inserted edge
    pub fn find_path(&self, from: &str, to: &str) -> Option<Vec<ArtifactId>> {
        let &start = self.node_indices.get(from)?;
        let &goal = self.node_indices.get(to)?;
        if start == goal {
            return Some(vec![self.graph[start].clone()]);
        }

        let mut parent: HashMap<NodeIndex, NodeIndex> = HashMap::new();
        let mut visited = HashSet::from([start]);
        let mut queue = VecDeque::from([start]);

        while let Some(node_idx) = queue.pop_front() {
            for (_, next, _) in self.sorted_edges(node_idx, Direction::Outgoing) {
                if !visited.insert(next) {
                    continue;
                }
                parent.insert(next, node_idx);
                if next == goal {
                    let mut path = vec![self.graph[goal].clone()];
                    let mut current = goal;
                    while let Some(&prev) = parent.get(&current) {
                        path.push(self.graph[prev].clone());
                        current = prev;
                    }
                    path.reverse();
                    return Some(path);
                }
                queue.push_back(next);
            }
        }
        None
    }

    /// Breadth-first closure from a set of start ids.
    ///
    /// Start ids are excluded from the result. Unknown start ids are ignored.
    /// `max_depth` caps the number of edges followed from the nearest start.
    pub fn closure(
        &self,
        starts: &[&str],
        direction: TraversalDirection,
        max_depth: Option<usize>,
    ) -> Vec<ClosureNode> {
        let mut visited = HashSet::new();
        let mut queue = VecDeque::new();
        for id in starts {
            if let Some(&idx) = self.node_indices.get(*id) {
                if visited.insert(idx) {
                    queue.push_back((idx, 0usize));
                }
            }
        }

        let mut result = Vec::new();
        while let Some((node_idx, depth)) = queue.pop_front() {
            if max_depth.map_or(false, |max| depth >= max) {
                continue;
            }
            for &dir in direction.directions() {
                for (_, next, _) in self.sorted_edges(node_idx, dir) {
                    if visited.insert(next) {
                        result.push(ClosureNode {
                            id: self.graph[next].clone(),
                            depth: depth + 1,
                        });
                        queue.push_back((next, depth + 1));
                    }
                }
            }
        }
        result
    }

    /// Serializable `{nodes, edges}` view
    pub fn view(&self) -> GraphView {
        GraphView {
            nodes: self
                .artifacts
                .values()
                .map(|a| Node {
                    id: a.id.clone(),
                    kind: a.kind,
                    data: a.data.clone(),
                })
                .collect(),
            edges: self.edges(),
        }
    }

    /// Export the relationship graph to GraphViz DOT format
    pub fn to_dot(&self) -> String {
        let mut output = String::new();

        output.push_str("digraph ContextGraph {\n");
        output.push_str("  rankdir=LR;\n");
        output.push_str("  node [shape=box, style=\"filled,rounded\", fontname=\"Helvetica\", fontsize=10];\n");
        output.push_str("  edge [fontname=\"Helvetica\", fontsize=8, fontcolor=\"#606060\"];\n");
        output.push('\n');

        for artifact in self.artifacts.values() {
            let label = match &artifact.title {
                Some(title) => format!("{}\\n{}", artifact.id, escape_dot(title)),
                None => artifact.id.clone(),
            };
            output.push_str(&format!(
                "  \"{}\" [label=\"{}\", fillcolor=\"{}\"];\n",
                escape_dot(&artifact.id),
                label,
                kind_color(artifact.kind)
            ));
        }

        output.push('\n');

        for edge in self.edges() {
            let style = if edge.relation.is_acyclic() { "bold" } else { "solid" };
            output.push_str(&format!(
                "  \"{}\" -> \"{}\" [label=\"{}\", style={}];\n",
                escape_dot(&edge.from),
                escape_dot(&edge.to),
                edge.relation,
                style
            ));
        }

        output.push_str("}\n");
        output
    }

    /// Edges of one node in one direction, sorted by insertion order.
    /// petgraph walks adjacency lists newest-first.
    fn sorted_edges(&self, node_idx: NodeIndex, direction: Direction) -> Vec<(EdgeIndex, NodeIndex, Relation)> {
        let mut edges: Vec<_> = self
            .graph
            .edges_directed(node_idx, direction)
            .map(|e| {
                let other = match direction {
                    Direction::Outgoing => e.target(),
                    Direction::Incoming => e.source(),
                };
                (e.id(), other, *e.weight())
            })
            .collect();
        edges.sort_by_key(|(idx, _, _)| *idx);
        edges
    }
}

fn kind_color(kind: ArtifactKind) -> &'static str {
    match kind {
        ArtifactKind::Feature => "#FFB74D",
        ArtifactKind::UserStory => "#81C784",
        ArtifactKind::Spec => "#64B5F6",
        ArtifactKind::Task => "#E0E0E0",
        ArtifactKind::Service => "#BA68C8",
        ArtifactKind::Package => "#4DB6AC",
    }
}

fn escape_dot(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}
