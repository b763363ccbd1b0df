//! Loader tests against the workspace fixture files.

use stackcheck_core::{EnvSource, MalformedInputError, MountKind, PortBinding, StepKind};
use stackcheck_load::{load, load_with, BuildFormat, LoadOptions};

fn fixture(relative: &str) -> String {
    let manifest_dir = std::env::var("CARGO_MANIFEST_DIR").unwrap();
    let workspace_root = std::path::Path::new(&manifest_dir).parent().unwrap().parent().unwrap();
    std::fs::read_to_string(workspace_root.join("fixtures").join(relative)).unwrap()
}

#[test]
fn test_dockerfile_fixture() {
    let text = fixture("builds/node-good.Dockerfile");
    let (build, topology) = load(Some(&text), None).unwrap();
    let build = build.unwrap();
    assert!(topology.is_none());

    assert_eq!(build.stages().len(), 2);
    assert_eq!(build.final_user(), "app");

    let stage_copy = build
        .steps()
        .iter()
        .find(|s| s.from_stage.is_some())
        .unwrap();
    assert_eq!(stage_copy.from_stage.as_deref(), Some("build"));
    assert!(stage_copy.sources.contains("/app/dist"));

    let runs = build.steps().iter().filter(|s| s.kind == StepKind::Run).count();
    assert_eq!(runs, 4);
}

#[test]
fn test_continuation_fixture() {
    let text = fixture("builds/node-bad.Dockerfile");
    let (build, _) = load(Some(&text), None).unwrap();
    let build = build.unwrap();
    let first_run = build.steps().iter().find(|s| s.kind == StepKind::Run).unwrap();
    assert_eq!(
        first_run.command,
        "apt-get update && apt-get install -y --no-install-recommends git && rm -rf /var/lib/apt/lists/*"
    );
}

#[test]
fn test_structured_fixture_keeps_its_name() {
    let options = LoadOptions::default().with_build_name("ignored");
    let (build, _) = load_with(&options, Some(&fixture("builds/python.yaml")), None).unwrap();
    let build = build.unwrap();
    assert_eq!(build.name, "worker");
    assert_eq!(build.final_user(), "worker");
}

#[test]
fn test_dockerfile_forced_as_structured_fails() {
    let options = LoadOptions::default().with_build_format(BuildFormat::Structured);
    let err = load_with(&options, Some(&fixture("builds/node-bad.Dockerfile")), None).unwrap_err();
    assert!(matches!(err, MalformedInputError::Parse { .. }));
}

#[test]
fn test_three_tier_fixture() {
    let options = LoadOptions::default().with_env_file("api.env", fixture("topologies/api.env"));
    let text = fixture("topologies/three-tier.yaml");
    let (_, topology) = load_with(&options, None, Some(&text)).unwrap();
    let topology = topology.unwrap();

    assert_eq!(topology.len(), 3);
    assert_eq!(topology.networks().len(), 2);
    assert!(topology.volumes().contains("pgdata"));

    let frontend = topology.service("frontend").unwrap();
    assert!(frontend.host_ports.contains(&PortBinding::new(80, 8080)));
    assert_eq!(frontend.listen_port, Some(8080));

    let api = topology.service("api").unwrap();
    assert_eq!(api.provided_env["DB_PASSWORD"], EnvSource::Interpolated);
    assert_eq!(
        api.provided_env["JWT_SECRET"],
        EnvSource::EnvFile { path: "api.env".to_string() }
    );
    assert_eq!(api.missing_env().count(), 0);
    assert!(api.depends_on.contains("db"));

    let db = topology.service("db").unwrap();
    assert_eq!(db.volumes.iter().next().unwrap().kind, MountKind::Named);
    assert!(topology.is_dependency_target("db"));
}
