//! Context Engine
//!
//! Validation, dependency-graph and impact-analysis engine for context
//! repositories: collections of YAML/JSON artifacts (features, user stories,
//! specs, tasks, services, packages) that reference each other by id.
//!
//! ## Pipeline
//!
//! ```text
//! contexts/**/*.yaml ──► EntityLoader ──► SchemaRegistry (validation gate)
//!                                │
//!                                ▼
//!                          graph::build ──► ArtifactGraph (+ cycle check)
//!                                │
//!         RuleTable ─────────────┼──── changed ids, before/after snapshots
//!                                ▼
//!                          impact::analyze ──► ImpactReport
//! ```
//!
//! Every stage is synchronous and holds no state between runs. Recoverable
//! problems are returned as diagnostics next to partial results; fatal ones
//! are an [`EngineError`].
//!
//! ## Repository layout
//!
//! ```text
//! <root>/
//! ├── contexts/
//! │   ├── features/      FEAT-001.yaml ...
//! │   ├── userstories/
//! │   ├── specs/
//! │   ├── tasks/
//! │   ├── services/
//! │   └── packages/
//! └── .context-kit/
//!     ├── rules.yaml     consistency rules
//!     └── schemas/       optional <kind>.schema.json overrides
//! ```

pub mod artifact;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod graph;
pub mod impact;
pub mod inspect;
pub mod loader;
pub mod pipeline;
pub mod registry;
pub mod rules;

pub use artifact::{Artifact, ArtifactId, ArtifactKind, Relation, Status};
pub use config::EngineConfig;
pub use diagnostics::{Coded, Diagnostic, DiagnosticCode, GraphError, ImpactWarning, LoadError, Severity};
pub use error::{EngineError, Result};
pub use graph::{ArtifactGraph, GraphBuild, TraversalDirection};
pub use impact::{analyze, ImpactOptions, ImpactReport, Issue};
pub use inspect::{inspect, InspectReport};
pub use loader::{EntityLoader, LoadOutcome, Snapshot};
pub use pipeline::Engine;
pub use registry::{FieldError, SchemaRegistry};
pub use rules::{
    evaluate, load_rules, load_rules_with, ChangeComparator, Comparators, RuleDefinition, RuleTable, TriggeredRule,
};
