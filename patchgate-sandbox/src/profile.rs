//! Per-engine data tables: stage images, commands, and project layout

use crate::config::GateConfig;
use patchgate_common::{Engine, Stage};
use std::path::PathBuf;
use std::time::Duration;

/// One containerized stage: image plus the command sequence run in it
#[derive(Debug, Clone, PartialEq)]
pub struct StageSpec {
    pub image: String,
    pub commands: Vec<String>,
    pub timeout: Duration,
}

impl StageSpec {
    fn new(image: &str, commands: &[&str], timeout: Duration) -> Self {
        Self {
            image: image.to_string(),
            commands: commands.iter().map(|c| c.to_string()).collect(),
            timeout,
        }
    }
}

/// Where things live inside a project of a given engine.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectLayout {
    /// Include patterns copied into a sandbox before validation
    pub stage_patterns: Vec<String>,
    /// Directory receiving generated code files
    pub code_dir: String,
    /// Directory receiving downloaded assets
    pub assets_dir: String,
    /// Path of the generated scene document
    pub scene_path: String,
}

impl ProjectLayout {
    pub fn unity() -> Self {
        Self {
            stage_patterns: strings(&[
                "Assets/**/*.cs",
                "Assets/**/*.asmdef",
                "Assets/**/*.asmref",
                "ProjectSettings/**",
                "Packages/manifest.json",
                "Packages/packages-lock.json",
                "*.csproj",
                "*.sln",
            ]),
            code_dir: "Assets/Scripts".to_string(),
            assets_dir: "Assets/Generated".to_string(),
            scene_path: "Assets/Scenes/Generated_Scene.unity".to_string(),
        }
    }

    pub fn bevy() -> Self {
        Self {
            stage_patterns: strings(&[
                "Cargo.toml",
                "Cargo.lock",
                "build.rs",
                "rustfmt.toml",
                "clippy.toml",
                ".cargo/**",
                "src/**",
                "crates/**/*.rs",
                "crates/**/Cargo.toml",
                "benches/**",
                "tests/**",
            ]),
            code_dir: "src".to_string(),
            assets_dir: "assets/generated".to_string(),
            scene_path: "assets/scenes/generated.scn.ron".to_string(),
        }
    }

    pub fn code_path(&self, target_file_name: &str) -> String {
        format!("{}/{}", self.code_dir, target_file_name)
    }

    pub fn asset_path(&self, file_name: &str) -> String {
        format!("{}/{}", self.assets_dir, file_name)
    }
}

/// Host-side Unity editor invocation for the compile stage
#[derive(Debug, Clone, PartialEq)]
pub struct UnityBuild {
    pub editor_path: Option<String>,
    pub build_method: String,
    pub build_target: String,
    pub timeout: Duration,
}

impl UnityBuild {
    /// Editor arguments for a headless single-target build of `project`
    pub fn args(&self, project: &std::path::Path) -> Vec<String> {
        vec![
            "-batchmode".to_string(),
            "-nographics".to_string(),
            "-quit".to_string(),
            "-projectPath".to_string(),
            project.display().to_string(),
            "-buildTarget".to_string(),
            self.build_target.clone(),
            "-executeMethod".to_string(),
            self.build_method.clone(),
            "-logFile".to_string(),
            "-".to_string(),
        ]
    }
}

/// Static description of an engine's validation pipeline.
///
/// `compile` is `None` when the engine compiles outside any container.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineProfile {
    pub engine: Engine,
    pub layout: ProjectLayout,
    pub format: StageSpec,
    pub analyze: StageSpec,
    pub compile: Option<StageSpec>,
    pub work_dir: String,
}

impl EngineProfile {
    pub fn for_engine(engine: Engine, config: &GateConfig) -> Self {
        match engine {
            Engine::Bevy => Self::bevy(config),
            Engine::Unity => Self::unity(config),
        }
    }

    pub fn bevy(config: &GateConfig) -> Self {
        let image = config.images.rust.as_str();
        let t = &config.timeouts;
        Self {
            engine: Engine::Bevy,
            layout: ProjectLayout::bevy(),
            format: StageSpec::new(image, &["cargo fmt --all -- --check"], t.format),
            analyze: StageSpec::new(
                image,
                &["cargo clippy --all-targets -- -D warnings"],
                t.analyze,
            ),
            compile: Some(StageSpec::new(image, &["cargo build --release"], t.compile)),
            work_dir: config.sandbox.work_dir.clone(),
        }
    }

    pub fn unity(config: &GateConfig) -> Self {
        let image = config.images.dotnet.as_str();
        let t = &config.timeouts;
        Self {
            engine: Engine::Unity,
            layout: ProjectLayout::unity(),
            format: StageSpec::new(
                image,
                &["dotnet format whitespace Assets --folder --verify-no-changes"],
                t.format,
            ),
            analyze: StageSpec::new(
                image,
                &["dotnet format analyzers --verify-no-changes --severity warn"],
                t.analyze,
            ),
            compile: None,
            work_dir: config.sandbox.work_dir.clone(),
        }
    }

    /// Container spec for `stage`, if that stage is containerized
    pub fn stage(&self, stage: Stage) -> Option<&StageSpec> {
        match stage {
            Stage::Format => Some(&self.format),
            Stage::Analyze => Some(&self.analyze),
            Stage::Compile => self.compile.as_ref(),
        }
    }
}

/// Full build-and-test run of a project (CI style).
#[derive(Debug, Clone, PartialEq)]
pub struct CompileProfile {
    pub engine: Engine,
    pub image: String,
    pub build_commands: Vec<String>,
    pub test_commands: Vec<String>,
    /// NUnit results document written by the test step, relative to the sandbox
    pub results_path: Option<String>,
    /// Directory whose files are reported as build artifacts
    pub artifact_dir: String,
    /// How deep below `artifact_dir` to look (1 = top-level files only)
    pub artifact_depth: usize,
    pub stage_patterns: Vec<String>,
    pub build_timeout: Duration,
    pub test_timeout: Duration,
    pub work_dir: String,
}

impl CompileProfile {
    pub fn for_engine(engine: Engine, config: &GateConfig) -> Self {
        let t = &config.timeouts;
        let work_dir = config.sandbox.work_dir.clone();
        match engine {
            Engine::Unity => {
                let unity = &config.unity;
                let common = format!(
                    "unity-editor -batchmode -nographics -quit -projectPath {work_dir}"
                );
                Self {
                    engine,
                    image: config.images.unity_builder.clone(),
                    build_commands: vec![format!(
                        "{common} -buildTarget {} -executeMethod {} -logFile -",
                        unity.build_target, unity.build_method
                    )],
                    test_commands: vec![format!(
                        "{common} -runTests -testPlatform PlayMode -testResults Build/test-results.xml -logFile -"
                    )],
                    results_path: Some("Build/test-results.xml".to_string()),
                    artifact_dir: "Build".to_string(),
                    artifact_depth: usize::MAX,
                    stage_patterns: full_project(ProjectLayout::unity().stage_patterns, &["Assets/**"]),
                    build_timeout: t.build,
                    test_timeout: t.test,
                    work_dir,
                }
            }
            Engine::Bevy => Self {
                engine,
                image: config.images.rust.clone(),
                build_commands: strings(&["cargo build --release"]),
                test_commands: strings(&["cargo test --release"]),
                results_path: None,
                artifact_dir: "target/release".to_string(),
                artifact_depth: 1,
                stage_patterns: full_project(ProjectLayout::bevy().stage_patterns, &["assets/**"]),
                build_timeout: t.build,
                test_timeout: t.test,
                work_dir,
            },
        }
    }

    pub fn results_file(&self, sandbox: &std::path::Path) -> Option<PathBuf> {
        self.results_path.as_ref().map(|p| sandbox.join(p))
    }
}

fn full_project(mut patterns: Vec<String>, extra: &[&str]) -> Vec<String> {
    patterns.extend(extra.iter().map(|p| p.to_string()));
    patterns
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Unity compile settings derived from configuration
pub fn unity_build(config: &GateConfig) -> UnityBuild {
    UnityBuild {
        editor_path: config.unity.resolved_editor_path(),
        build_method: config.unity.build_method.clone(),
        build_target: config.unity.build_target.clone(),
        timeout: config.timeouts.compile,
    }
}
