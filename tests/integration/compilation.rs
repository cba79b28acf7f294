//! Integration tests for CompilationService against stub runners

use patchgate_common::Engine;
use patchgate_sandbox::testing::{StubContainerRunner, StubHostRunner};
use patchgate_sandbox::{parse_diagnostics, RunOutput};
use patchgate_tests::common::*;

#[test]
fn test_unity_error_line_parses() {
    let diagnostics = parse_diagnostics("Assets/Foo.cs(12,5): error CS1002: ; expected");

    assert_eq!(diagnostics.len(), 1);
    let diag = &diagnostics[0];
    assert_eq!(diag.line, 12);
    assert_eq!(diag.column, 5);
    assert_eq!(diag.message, "; expected");
    assert_eq!(diag.code, "CS1002");
    assert_eq!(diag.file, "Assets/Foo.cs");
}

#[tokio::test]
async fn test_unity_build_then_tests() {
    let harness = Harness::new(
        StubContainerRunner::new()
            .effect_when("-executeMethod", |root| {
                write_file(root, "Build/Game.x86_64", "ELF");
                write_file(root, "Build/Game_Data/level0", "level");
            })
            .effect_when("-runTests", |root| {
                write_file(root, "Build/test-results.xml", NUNIT_PASSING);
            }),
        StubHostRunner::new(),
    );
    let project = unity_project();
    let before = hash_tree(project.path());

    let response = harness.compiler().run(project.path(), Engine::Unity).await.unwrap();

    assert!(response.success);
    assert!(response.test_output.is_some());
    let summary = response.test_summary.unwrap();
    assert_eq!(summary.total, 2);
    assert_eq!(summary.failed, 0);
    let paths: Vec<&str> = response.artifacts.iter().map(|a| a.path.as_str()).collect();
    assert_eq!(paths, vec!["Build/Game.x86_64", "Build/Game_Data/level0"]);
    assert_eq!(response.artifacts[0].size_bytes, 3);

    let jobs = harness.containers.jobs();
    assert_eq!(jobs.len(), 2);
    assert_eq!(jobs[0].image, harness.config.images.unity_builder);
    assert_eq!(hash_tree(project.path()), before);
    assert_eq!(harness.live_sandboxes(), 0);
}

#[tokio::test]
async fn test_failing_nunit_case_fails_run() {
    let harness = Harness::new(
        StubContainerRunner::new().effect_when("-runTests", |root| {
            write_file(root, "Build/test-results.xml", NUNIT_FAILING);
        }),
        StubHostRunner::new(),
    );
    let project = unity_project();

    let response = harness.compiler().run(project.path(), Engine::Unity).await.unwrap();

    assert!(!response.success);
    assert_eq!(
        response.test_summary.unwrap().failures,
        vec!["PlayerTests.Jumps".to_string()]
    );
}

#[tokio::test]
async fn test_build_failure_skips_tests() {
    let harness = Harness::new(
        StubContainerRunner::new().fail_when(
            "cargo build --release",
            RunOutput::exited(101, "src/main.rs(2,5): error E0425: cannot find function `run`"),
        ),
        StubHostRunner::new(),
    );
    let project = bevy_project();

    let response = harness.compiler().run(project.path(), Engine::Bevy).await.unwrap();

    assert!(!response.success);
    assert!(response.test_output.is_none());
    assert!(response.compilation_output.contains("E0425"));
    assert_eq!(response.diagnostics.len(), 1);
    assert_eq!(response.diagnostics[0].line, 2);
    assert_eq!(harness.containers.calls_matching("cargo test"), 0);
    assert_eq!(harness.live_sandboxes(), 0);
}

#[tokio::test]
async fn test_bevy_run_without_results_document() {
    let harness = Harness::new(
        StubContainerRunner::new().effect_when("cargo build --release", |root| {
            write_file(root, "target/release/game", "ELF");
            write_file(root, "target/release/deps/libbevy.rlib", "rlib");
        }),
        StubHostRunner::new(),
    );
    let project = bevy_project();

    let response = harness.compiler().run(project.path(), Engine::Bevy).await.unwrap();

    assert!(response.success);
    assert!(response.test_summary.is_none());
    assert_eq!(response.artifacts.len(), 1);
    assert_eq!(response.artifacts[0].path, "target/release/game");
}

#[tokio::test]
async fn test_daemon_down_is_an_error() {
    let harness = Harness::new(StubContainerRunner::new().unavailable(), StubHostRunner::new());
    let project = bevy_project();

    let result = harness.compiler().run(project.path(), Engine::Bevy).await;

    assert_eq!(result.unwrap_err().kind(), "infrastructure");
    assert_eq!(harness.live_sandboxes(), 0);
}
