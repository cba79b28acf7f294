//! Patchgate sandbox - validate generated patches before they touch a project
//!
//! Every request gets its own disposable sandbox directory. A bounded subset
//! of the live project is staged into it, the patch is materialized there,
//! and an engine-specific validator runs format, analyze and compile stages
//! in ephemeral containers. Only when every stage passes are the patch's own
//! files copied back into the live tree.

mod applier;
mod assets;
mod compilation;
mod config;
mod error;
mod limits;
mod profile;
mod runtime;
mod scene;
mod staging;
mod types;
mod validator;
mod workspace;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use applier::{apply_response, ApplyReport, PatchApplier};
pub use assets::{asset_file_name, AssetFetcher, HttpAssetFetcher};
pub use compilation::{collect_artifacts, parse_diagnostics, parse_test_results, CompilationService};
pub use config::{
    AssetConfig, DockerConfig, GateConfig, ImageConfig, SandboxConfig, TimeoutConfig, UnityConfig,
    UNITY_EDITOR_ENV,
};
pub use error::{
    AssetError, ConfigError, PatchError, PatchResult, RunnerError, SandboxError, SceneError,
};
pub use limits::{NetworkMode, ResourceLimits};
pub use profile::{unity_build, CompileProfile, EngineProfile, ProjectLayout, StageSpec, UnityBuild};
pub use runtime::{ContainerRunner, DockerRunner, HostRunner, ProcessRuntime};
pub use scene::{
    emit_bevy_scene, emit_scene, emit_unity_scene, parse_bevy_scene, parse_scene,
    parse_unity_scene,
};
pub use staging::{FileStager, DEFAULT_EXCLUDED_DIRS};
pub use types::{ContainerJob, HostCommand, RunOutput};
pub use validator::{ContainerValidator, EngineRegistry, EngineValidator, UnityValidator};
pub use workspace::{Sandbox, SandboxId, SandboxManager};
