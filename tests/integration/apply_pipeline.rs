//! Integration tests for PatchApplier + EngineValidator against stub runners

use assert_matches::assert_matches;
use patchgate_common::{Engine, Patch, SceneObject, SceneSpec, Stage, Vec3};
use patchgate_sandbox::testing::{StubContainerRunner, StubHostRunner};
use patchgate_sandbox::{apply_response, parse_scene, PatchError, RunOutput};
use patchgate_tests::common::*;
use std::path::Path;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn file_url(path: &Path) -> String {
    Url::from_file_path(path).unwrap().to_string()
}

#[tokio::test]
async fn test_unity_code_patch_is_applied() {
    let harness = Harness::passing();
    let project = unity_project();

    let patch = Patch::code("class X {}", "X.cs");
    let report = harness
        .applier()
        .apply(project.path(), Engine::Unity, &patch)
        .await
        .unwrap();

    assert_eq!(report.applied_files, vec!["Assets/Scripts/X.cs".to_string()]);
    assert_eq!(
        std::fs::read_to_string(project.path().join("Assets/Scripts/X.cs")).unwrap(),
        "class X {}"
    );
    assert_eq!(report.outcome.attempted(), Stage::ALL.to_vec());
    assert_eq!(harness.containers.calls(), 2);
    assert_eq!(harness.host.calls(), 1);
    assert_eq!(harness.live_sandboxes(), 0);
}

#[tokio::test]
async fn test_target_under_build_output_name_is_applied() {
    let harness = Harness::passing();
    let project = unity_project();

    let patch = Patch::code("class Logger {}", "Logs/Logger.cs");
    let report = harness
        .applier()
        .apply(project.path(), Engine::Unity, &patch)
        .await
        .unwrap();

    assert_eq!(report.applied_files, vec!["Assets/Scripts/Logs/Logger.cs".to_string()]);
    assert_eq!(
        std::fs::read_to_string(project.path().join("Assets/Scripts/Logs/Logger.cs")).unwrap(),
        "class Logger {}"
    );
    assert_eq!(harness.live_sandboxes(), 0);
}

#[tokio::test]
async fn test_patch_file_lost_during_validation_is_not_reported_applied() {
    let harness = Harness::new(
        StubContainerRunner::new().effect_when("cargo build", |root| {
            std::fs::remove_file(root.join("src/enemy.rs")).unwrap();
        }),
        StubHostRunner::new(),
    );
    let project = bevy_project();
    let before = hash_tree(project.path());

    let result = harness
        .applier()
        .apply(project.path(), Engine::Bevy, &Patch::code("pub struct Enemy;", "enemy.rs"))
        .await;

    assert_matches!(&result, Err(PatchError::Infrastructure(msg)) if msg.contains("src/enemy.rs"));
    assert_eq!(hash_tree(project.path()), before);
    assert_eq!(harness.live_sandboxes(), 0);
}

#[tokio::test]
async fn test_unity_compile_failure_leaves_tree_untouched() {
    let harness = Harness::new(
        StubContainerRunner::new(),
        StubHostRunner::respond_with(RunOutput::exited(
            1,
            "Assets/Scripts/X.cs(1,7): error CS0001: compiler exploded",
        )),
    );
    let project = unity_project();
    let before = hash_tree(project.path());

    let result = harness
        .applier()
        .apply(project.path(), Engine::Unity, &Patch::code("class X {}", "X.cs"))
        .await;

    assert_matches!(&result, Err(PatchError::Validation { stage: Stage::Compile, log }) if log.contains("CS0001"));
    let response = apply_response(&result);
    assert!(!response.success);
    assert_eq!(response.stage, Some(Stage::Compile));
    assert!(response.error_log.unwrap().contains("CS0001"));

    assert_eq!(hash_tree(project.path()), before);
    assert!(!project.path().join("Assets/Scripts/X.cs").exists());
    assert_eq!(harness.live_sandboxes(), 0);
}

#[tokio::test]
async fn test_format_failure_skips_later_stages() {
    let harness = Harness::new(
        StubContainerRunner::new()
            .fail_when("cargo fmt", RunOutput::exited(1, "Diff in /workspace/src/enemy.rs")),
        StubHostRunner::new(),
    );
    let project = bevy_project();

    let result = harness
        .applier()
        .apply(project.path(), Engine::Bevy, &Patch::code("pub struct Enemy;", "enemy.rs"))
        .await;

    assert_matches!(result, Err(PatchError::Validation { stage: Stage::Format, .. }));
    assert_eq!(harness.containers.calls(), 1);
    assert_eq!(harness.containers.calls_matching("cargo clippy"), 0);
    assert_eq!(harness.containers.calls_matching("cargo build"), 0);
}

#[tokio::test]
async fn test_unity_format_failure_never_reaches_editor() {
    let harness = Harness::new(
        StubContainerRunner::new().fail_when("whitespace", RunOutput::exited(2, "Formatting errors")),
        StubHostRunner::new(),
    );
    let project = unity_project();

    let result = harness
        .applier()
        .apply(project.path(), Engine::Unity, &Patch::code("class  X {}", "X.cs"))
        .await;

    assert_matches!(result, Err(PatchError::Validation { stage: Stage::Format, .. }));
    assert_eq!(harness.containers.calls_matching("analyzers"), 0);
    assert_eq!(harness.host.calls(), 0);
}

#[tokio::test]
async fn test_timeout_is_reported_distinctly() {
    let harness = Harness::new(
        StubContainerRunner::new().fail_when("cargo clippy", RunOutput::timeout("Checking game v0.1.0")),
        StubHostRunner::new(),
    );
    let project = bevy_project();
    let before = hash_tree(project.path());

    let result = harness
        .applier()
        .apply(project.path(), Engine::Bevy, &Patch::code("pub struct Enemy;", "enemy.rs"))
        .await;

    let expected = harness.config.timeouts.analyze;
    assert_matches!(
        result,
        Err(PatchError::Timeout { stage: Stage::Analyze, timeout, .. }) if timeout == expected
    );
    assert_eq!(harness.containers.calls_matching("cargo build"), 0);
    assert_eq!(hash_tree(project.path()), before);
}

#[tokio::test]
async fn test_daemon_down_is_infrastructure_failure() {
    let harness = Harness::new(StubContainerRunner::new().unavailable(), StubHostRunner::new());
    let project = bevy_project();
    let before = hash_tree(project.path());

    let result = harness
        .applier()
        .apply(project.path(), Engine::Bevy, &Patch::code("pub struct Enemy;", "enemy.rs"))
        .await;

    assert_matches!(&result, Err(PatchError::Infrastructure(_)));
    assert_eq!(apply_response(&result).error_kind.as_deref(), Some("infrastructure"));
    assert_eq!(hash_tree(project.path()), before);
    assert_eq!(harness.live_sandboxes(), 0);
}

#[tokio::test]
async fn test_sandbox_removed_for_every_outcome() {
    let runners = vec![
        StubContainerRunner::new(),
        StubContainerRunner::new().fail_when("cargo fmt", RunOutput::exited(1, "diff")),
        StubContainerRunner::new().fail_when("cargo build", RunOutput::timeout("")),
        StubContainerRunner::new().unavailable(),
    ];
    for runner in runners {
        let harness = Harness::new(runner, StubHostRunner::new());
        let project = bevy_project();
        let _ = harness
            .applier()
            .apply(project.path(), Engine::Bevy, &Patch::code("pub struct Enemy;", "enemy.rs"))
            .await;
        assert_eq!(harness.live_sandboxes(), 0);
    }
}

#[tokio::test]
async fn test_only_patch_files_reach_the_live_tree() {
    // The formatter rewrites a pre-existing file inside the sandbox.
    let harness = Harness::new(
        StubContainerRunner::new().effect_when("cargo fmt", |root| {
            write_file(root, "src/main.rs", "fn main() { game::run(); }\n");
        }),
        StubHostRunner::new(),
    );
    let project = bevy_project();
    let assets = tempfile::tempdir().unwrap();
    write_file(assets.path(), "rock.png", "rock-bytes");
    let before = hash_tree(project.path());

    let patch = Patch::code("pub struct Enemy;\n", "enemy.rs")
        .with_asset(file_url(&assets.path().join("rock.png")), None)
        .with_scene(SceneSpec::new(vec![SceneObject::new("Rock").at(Vec3::new(1.0, 0.0, 2.0))]));
    harness
        .applier()
        .apply(project.path(), Engine::Bevy, &patch)
        .await
        .unwrap();

    let after = hash_tree(project.path());
    assert_eq!(
        changed_paths(&before, &after),
        vec![
            "assets/generated/rock.png".to_string(),
            "assets/scenes/generated.scn.ron".to_string(),
            "src/enemy.rs".to_string(),
        ]
    );
    assert_eq!(
        std::fs::read_to_string(project.path().join("src/main.rs")).unwrap(),
        "fn main() {\n    game::run();\n}\n"
    );
}

#[tokio::test]
async fn test_repeated_apply_is_byte_identical() {
    let patch = Patch::code("class Spawner {}", "Spawner.cs").with_scene(SceneSpec::new(vec![
        SceneObject::new("Spawner").at(Vec3::new(0.5, 1.0, -4.0)),
        SceneObject::new("Light").scaled(Vec3::new(2.0, 2.0, 2.0)),
    ]));

    let mut trees = Vec::new();
    for _ in 0..2 {
        let harness = Harness::passing();
        let project = unity_project();
        harness
            .applier()
            .apply(project.path(), Engine::Unity, &patch)
            .await
            .unwrap();
        trees.push(hash_tree(project.path()));
    }
    assert_eq!(trees[0], trees[1]);
}

#[tokio::test]
async fn test_applied_scene_round_trips() {
    let harness = Harness::passing();
    let project = unity_project();
    let scene = SceneSpec::new(vec![
        SceneObject::new("Tree").at(Vec3::new(3.0, 0.0, 7.25)),
        SceneObject::new("Boulder").scaled(Vec3::new(1.5, 1.5, 1.5)),
    ]);

    harness
        .applier()
        .apply(project.path(), Engine::Unity, &Patch::default().with_scene(scene.clone()))
        .await
        .unwrap();

    let document =
        std::fs::read_to_string(project.path().join("Assets/Scenes/Generated_Scene.unity")).unwrap();
    let parsed = parse_scene(Engine::Unity, &document).unwrap();
    assert_eq!(parsed.objects.len(), 2);
    for (a, b) in scene.objects.iter().zip(&parsed.objects) {
        assert!(a.same_transform(b, 1e-5));
    }
}

#[tokio::test]
async fn test_http_asset_is_downloaded() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/assets/tree.glb"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"glTF".to_vec()))
        .expect(1)
        .mount(&server)
        .await;

    let harness = Harness::passing();
    let project = unity_project();
    let patch = Patch::default().with_asset(format!("{}/assets/tree.glb", server.uri()), None);

    let report = harness
        .applier()
        .apply(project.path(), Engine::Unity, &patch)
        .await
        .unwrap();

    assert_eq!(report.applied_files, vec!["Assets/Generated/tree.glb".to_string()]);
    assert_eq!(
        std::fs::read(project.path().join("Assets/Generated/tree.glb")).unwrap(),
        b"glTF"
    );
}

#[tokio::test]
async fn test_unreachable_asset_rejects_patch() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let harness = Harness::passing();
    let project = unity_project();
    let before = hash_tree(project.path());
    let patch = Patch::code("class X {}", "X.cs")
        .with_asset(format!("{}/assets/tree.glb", server.uri()), None);

    let result = harness.applier().apply(project.path(), Engine::Unity, &patch).await;

    assert_matches!(result, Err(PatchError::Infrastructure(_)));
    assert_eq!(harness.containers.calls(), 0);
    assert_eq!(hash_tree(project.path()), before);
    assert_eq!(harness.live_sandboxes(), 0);
}

#[tokio::test]
async fn test_malformed_patches_never_allocate_sandbox() {
    let harness = Harness::passing();
    let project = unity_project();

    let patches = vec![
        Patch::default(),
        Patch::code("class X {}", "../../Evil.cs"),
        Patch::code("class X {}", "/etc/cron.d/evil"),
        Patch::default().with_scene(SceneSpec::new(vec![
            SceneObject::new("Broken").at(Vec3::new(f32::INFINITY, 0.0, 0.0)),
        ])),
    ];
    for patch in patches {
        let result = harness.applier().apply(project.path(), Engine::Unity, &patch).await;
        assert_matches!(result, Err(PatchError::InvalidPatch(_)));
    }
    assert_eq!(harness.live_sandboxes(), 0);
    assert_eq!(harness.containers.calls(), 0);
}

#[tokio::test]
async fn test_stage_receives_project_subset_only() {
    let harness = Harness::new(
        StubContainerRunner::new().effect_when("whitespace", |root| {
            assert!(root.join("Assets/Scripts/Player.cs").exists());
            assert!(root.join("Assets/Scripts/X.cs").exists());
            assert!(root.join("Game.sln").exists());
            assert!(!root.join("Assets/Textures/terrain.png").exists());
            assert!(!root.join("Library").exists());
        }),
        StubHostRunner::new(),
    );
    let project = unity_project();

    harness
        .applier()
        .apply(project.path(), Engine::Unity, &Patch::code("class X {}", "X.cs"))
        .await
        .unwrap();
    assert_eq!(harness.containers.calls_matching("whitespace"), 1);
}
