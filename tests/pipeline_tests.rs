//! End-to-end tests over fixture repositories
//!
//! `tests/fixtures/sample-repo` is a small, valid repository with a rule
//! table. Tests that need a modified repository copy it into a temp dir.

use std::fs;
use std::path::{Path, PathBuf};

use context_engine::diagnostics::{GraphError, ImpactWarning, LoadError};
use context_engine::graph::Edge;
use context_engine::{Engine, EngineConfig, EngineError, ImpactOptions, Relation, Status, TraversalDirection};
use tempfile::TempDir;
use walkdir::WalkDir;

fn fixture_repo() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/sample-repo")
}

fn copy_fixture() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    let source = fixture_repo();
    for entry in WalkDir::new(&source).into_iter().filter_map(|e| e.ok()) {
        let relative = entry.path().strip_prefix(&source).unwrap();
        let target = dir.path().join(relative);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target).unwrap();
        } else {
            fs::copy(entry.path(), &target).unwrap();
        }
    }
    dir
}

fn write(root: &Path, relative: &str, content: &str) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn engine(root: &Path) -> Engine {
    Engine::open(root, EngineConfig::default()).unwrap()
}

fn ids(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}

// =============================================================================
// Validation and graph
// =============================================================================

#[test]
fn test_fixture_repository_is_valid() {
    let output = engine(&fixture_repo()).validate().unwrap();
    assert!(output.ok, "{:?}", output.errors);
    assert_eq!(output.exit_code(), 0);
}

#[test]
fn test_fixture_graph_shape() {
    let output = engine(&fixture_repo()).build_graph().unwrap();
    assert!(output.errors.is_empty());
    assert_eq!(output.nodes.len(), 7);
    assert_eq!(output.edges.len(), 11);
    assert_eq!(
        output.edges[0],
        Edge { from: "FEAT-001".into(), to: "svc-auth".into(), relation: Relation::Requires }
    );

    let graph = &output.build.graph;
    assert_eq!(graph.neighbors("US-101", Some(Relation::HasTask)), vec!["T-1001"]);
    assert_eq!(
        graph.find_path("FEAT-001", "pkg-session"),
        Some(ids(&["FEAT-001", "svc-auth", "pkg-session"]))
    );
}

#[test]
fn test_feature_requires_service_yields_one_edge() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "contexts/features/feat-001.yaml", "id: FEAT-001\nstatus: proposed\nrequires: [svc-auth]\n");
    write(dir.path(), "contexts/services/svc-auth.yaml", "id: svc-auth\nstatus: active\n");

    let output = engine(dir.path()).build_graph().unwrap();
    assert!(output.errors.is_empty());
    assert_eq!(
        output.edges,
        vec![Edge { from: "FEAT-001".into(), to: "svc-auth".into(), relation: Relation::Requires }]
    );
}

#[test]
fn test_missing_reference_is_reported_by_validate() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "contexts/features/feat-002.yaml", "id: FEAT-002\nstatus: proposed\nrequires: [svc-missing]\n");

    let output = engine(dir.path()).validate().unwrap();
    assert_eq!(output.exit_code(), 1);
    assert_eq!(output.errors.len(), 1);
    match &output.errors[0] {
        LoadError::DanglingReference { from_id, field, target_id, .. } => {
            assert_eq!((from_id.as_str(), field.as_str(), target_id.as_str()), ("FEAT-002", "requires", "svc-missing"));
        }
        other => panic!("Expected DanglingReference, got {:?}", other),
    }
}

#[test]
fn test_duplicate_ids_name_both_sources() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "contexts/features/first.yaml", "id: FEAT-001\nstatus: proposed\n");
    write(dir.path(), "contexts/features/second.yaml", "id: FEAT-001\nstatus: draft\n");

    let engine = engine(dir.path());
    let outcome = engine.load().unwrap();
    assert!(outcome.entities.is_empty());
    assert_eq!(outcome.errors.len(), 1);
    match &outcome.errors[0] {
        LoadError::DuplicateId { id, source_locations } => {
            assert_eq!(id, "FEAT-001");
            assert!(source_locations[0].ends_with("first.yaml"));
            assert!(source_locations[1].ends_with("second.yaml"));
        }
        other => panic!("Expected DuplicateId, got {:?}", other),
    }

    let err = engine.build_graph().err().unwrap();
    assert!(matches!(err, EngineError::DuplicateIds(ref dup) if dup == &ids(&["FEAT-001"])));
}

#[test]
fn test_malformed_documents_never_panic() {
    let dir = tempfile::tempdir().unwrap();
    let garbage = [
        ("contexts/features/a.yaml", "- just\n- a\n- list\n"),
        ("contexts/features/b.yaml", "id: FEAT-010\nstatus: proposed\nrequires: svc-auth\n"),
        ("contexts/features/c.yaml", "id: FEAT-011\nstatus: 42\ntitle: [nested]\n"),
        ("contexts/features/d.yaml", "id: [unclosed\n"),
        ("contexts/tasks/e.json", "{\"id\": \"T-1\", \"status\": \"done\"}"),
        ("contexts/tasks/f.json", "{ not json"),
        ("contexts/services/g.yaml", "id: SVC_BAD\nstatus: active\napi: 12\n"),
        ("contexts/userstories/h.yaml", "id: US-200\nstatus: done\nfeature: [FEAT-001]\n"),
    ];
    for (path, content) in garbage {
        write(dir.path(), path, content);
    }

    let output = engine(dir.path()).validate().unwrap();
    assert!(!output.ok);
    assert_eq!(output.errors.len(), garbage.len());
}

#[test]
fn test_cycle_reported_once_and_impact_terminates() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "contexts/features/a.yaml", "id: FEAT-001\nstatus: proposed\nrequires: [FEAT-002]\n");
    write(dir.path(), "contexts/features/b.yaml", "id: FEAT-002\nstatus: proposed\nrequires: [FEAT-001]\n");

    let engine = engine(dir.path());
    let output = engine.build_graph().unwrap();
    let cycles: Vec<_> = output
        .errors
        .iter()
        .filter(|e| matches!(e, GraphError::CircularDependency { .. }))
        .collect();
    assert_eq!(cycles.len(), 1);

    let options = ImpactOptions { direction: TraversalDirection::Both, max_depth: None };
    let report = engine.impact(&ids(&["FEAT-001"]), None, None, Some(options)).unwrap();
    assert_eq!(report.stale, ids(&["FEAT-002"]));
}

#[test]
fn test_cycle_mixing_requires_and_dependencies() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "contexts/features/a.yaml", "id: FEAT-001\nstatus: proposed\nrequires: [T-1001]\n");
    write(dir.path(), "contexts/tasks/t.yaml", "id: T-1001\nstatus: done\ndependencies: [FEAT-001]\n");

    let output = engine(dir.path()).build_graph().unwrap();
    assert_eq!(
        output.errors,
        vec![GraphError::CircularDependency {
            cycle_path: ids(&["FEAT-001", "T-1001", "FEAT-001"]),
            relations: vec![Relation::Requires, Relation::DependsOn],
        }]
    );

    let json = serde_json::to_value(&output).unwrap();
    assert_eq!(json["errors"][0]["code"], "W001");
    assert_eq!(json["errors"][0]["severity"], "warning");
}

// =============================================================================
// Impact
// =============================================================================

#[test]
fn test_story_criteria_change_flags_task_and_spec() {
    let after = copy_fixture();
    let story = fs::read_to_string(after.path().join("contexts/userstories/US-101.yaml")).unwrap();
    write(
        after.path(),
        "contexts/userstories/US-101.yaml",
        &story.replace("  - Creates a session on successful login\n", "  - Creates a session on successful login\n  - Shows an error on denied consent\n"),
    );

    let report = engine(after.path())
        .impact(&ids(&["US-101"]), None, Some(&fixture_repo()), None)
        .unwrap();

    let flagged: Vec<_> = report.issues.iter().map(|i| (i.id.as_str(), i.rule_id.as_str())).collect();
    assert_eq!(flagged, vec![("SPEC-101", "story-criteria"), ("T-1001", "story-criteria")]);
    assert!(report.issues.iter().all(|i| i.reason.contains("Acceptance criteria") && i.status == Status::NeedsReview));
    assert_eq!(
        report.stale,
        ids(&["FEAT-001", "SPEC-101", "T-1001", "T-1002", "pkg-session", "svc-auth"])
    );
}

#[test]
fn test_major_api_bump_flags_requiring_artifacts() {
    let after = copy_fixture();
    let service = fs::read_to_string(after.path().join("contexts/services/svc-auth.yaml")).unwrap();
    write(after.path(), "contexts/services/svc-auth.yaml", &service.replace("version: 1.4.0", "version: 2.0.0"));

    let report = engine(after.path())
        .impact(&ids(&["svc-auth"]), None, Some(&fixture_repo()), None)
        .unwrap();

    let flagged: Vec<_> = report.issues.iter().map(|i| i.id.as_str()).collect();
    assert_eq!(flagged, vec!["FEAT-001", "SPEC-101"]);
    assert_eq!(report.stale, ids(&["FEAT-001", "SPEC-101", "pkg-session"]));
}

#[test]
fn test_minor_api_bump_is_stale_only() {
    let after = copy_fixture();
    let service = fs::read_to_string(after.path().join("contexts/services/svc-auth.yaml")).unwrap();
    write(after.path(), "contexts/services/svc-auth.yaml", &service.replace("version: 1.4.0", "version: 1.5.0"));

    let report = engine(after.path())
        .impact(&ids(&["svc-auth"]), None, Some(&fixture_repo()), None)
        .unwrap();
    assert!(report.issues.is_empty());
    assert_eq!(report.stale, ids(&["pkg-session"]));
}

#[test]
fn test_added_field_counts_as_change() {
    let after = copy_fixture();
    write(
        after.path(),
        "contexts/tasks/T-1002.yaml",
        "id: T-1002\ntitle: Register OAuth client\nstatus: done\nsteps:\n  - Rotate the client secret\n",
    );

    let report = engine(after.path())
        .impact(&ids(&["T-1002"]), None, Some(&fixture_repo()), None)
        .unwrap();
    let flagged: Vec<_> = report.issues.iter().map(|i| (i.id.as_str(), i.triggered_by.as_str())).collect();
    assert_eq!(flagged, vec![("T-1001", "T-1002")]);
    assert_eq!(report.stale, ids(&["T-1001"]));
}

#[test]
fn test_unknown_changed_id() {
    let report = engine(&fixture_repo())
        .impact(&ids(&["DOES-NOT-EXIST"]), None, None, None)
        .unwrap();
    assert!(report.stale.is_empty());
    assert!(report.issues.is_empty());
    assert_eq!(report.warnings, vec![ImpactWarning::UnknownChangedId { id: "DOES-NOT-EXIST".into() }]);
}

#[test]
fn test_impact_json_is_byte_identical() {
    let after = copy_fixture();
    let story = fs::read_to_string(after.path().join("contexts/userstories/US-101.yaml")).unwrap();
    write(after.path(), "contexts/userstories/US-101.yaml", &story.replace("Redirects", "Sends"));
    let engine = engine(after.path());
    let changed = ids(&["US-101", "svc-auth", "NOPE-001"]);

    let first = engine.impact(&changed, None, Some(&fixture_repo()), None).unwrap();
    let second = engine.impact(&changed, None, Some(&fixture_repo()), None).unwrap();
    assert_eq!(serde_json::to_string(&first).unwrap(), serde_json::to_string(&second).unwrap());
    assert!(first.issues.iter().all(|i| !i.rule_id.is_empty() && !i.reason.is_empty()));
}

#[test]
fn test_invalid_rule_table_is_fatal() {
    let repo = copy_fixture();
    write(
        repo.path(),
        ".context-kit/rules.yaml",
        "rules:\n  - id: bad\n    whenKind: service\n    whenFieldPath: api.owner\n    thenStatus: needs-review\n    reason: x\n",
    );

    let err = engine(repo.path()).impact(&ids(&["svc-auth"]), None, None, None).err().unwrap();
    assert_eq!(err.code(), "rule-configuration");
}

// =============================================================================
// Inspect
// =============================================================================

#[test]
fn test_inspect_fixture() {
    let report = engine(&fixture_repo()).inspect().unwrap();
    assert_eq!(report.overview.total, 7);
    assert!(report.gaps.is_empty());
    assert_eq!(report.recommendations, vec!["Review 1 blocked items".to_string()]);

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["overview"]["byKind"]["task"], 2);
}
