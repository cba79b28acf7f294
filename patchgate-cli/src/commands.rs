//! CLI command implementations
//!
//! Every command prints JSON (or TOML for `config`) on stdout and returns the
//! process exit code.

use anyhow::{Context, Result};
use patchgate_common::{Engine, Patch};
use patchgate_sandbox::{
    apply_response, parse_diagnostics, CompilationService, ContainerRunner, DockerRunner,
    EngineRegistry, GateConfig, HttpAssetFetcher, PatchApplier, PatchError, ProcessRuntime,
    SandboxManager,
};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// Exit code for a patch rejected by a validation stage or a timeout
pub const EXIT_REJECTED: i32 = 2;
/// Exit code for infrastructure failures and bad input
pub const EXIT_FAILURE: i32 = 1;

pub fn load_config(path: Option<&Path>) -> Result<GateConfig> {
    let config = match path {
        Some(path) => GateConfig::load_from(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => GateConfig::load().context("Failed to load config")?,
    };
    Ok(config)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn docker(config: &GateConfig) -> Arc<DockerRunner> {
    Arc::new(DockerRunner::with_binary(&config.docker.binary))
}

fn sandboxes(config: &GateConfig) -> Result<SandboxManager> {
    Ok(SandboxManager::new(config.sandbox_root()?))
}

/// Exit code for an `apply` result
pub fn apply_exit_code(result: &Result<patchgate_sandbox::ApplyReport, PatchError>) -> i32 {
    match result {
        Ok(_) => 0,
        Err(PatchError::Validation { .. } | PatchError::Timeout { .. }) => EXIT_REJECTED,
        Err(_) => EXIT_FAILURE,
    }
}

pub fn read_patch(path: &Path) -> Result<Patch> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read patch {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Invalid patch JSON in {}", path.display()))
}

pub async fn execute_apply(
    config: &GateConfig,
    project: &Path,
    engine: Engine,
    patch_path: &Path,
) -> Result<i32> {
    let patch = read_patch(patch_path)?;
    let registry = EngineRegistry::from_config(config, docker(config), Arc::new(ProcessRuntime::new()));
    let assets = HttpAssetFetcher::new(&config.assets)?;
    let applier = PatchApplier::new(sandboxes(config)?, registry, Arc::new(assets));

    info!(project = %project.display(), engine = %engine, "Applying patch");
    let result = applier.apply(project, engine, &patch).await;
    print_json(&apply_response(&result))?;
    Ok(apply_exit_code(&result))
}

pub async fn execute_compile(config: &GateConfig, project: &Path, engine: Engine) -> Result<i32> {
    let service = CompilationService::new(sandboxes(config)?, docker(config), config.clone());
    match service.run(project, engine).await {
        Ok(response) => {
            print_json(&response)?;
            Ok(if response.success { 0 } else { EXIT_REJECTED })
        }
        Err(e) => {
            warn!(error = %e, "Compilation could not run");
            print_json(&serde_json::json!({
                "success": false,
                "errorKind": e.kind(),
                "errorLog": e.log(),
            }))?;
            Ok(EXIT_FAILURE)
        }
    }
}

pub fn execute_diagnostics(log: &Path) -> Result<i32> {
    let content = std::fs::read_to_string(log)
        .with_context(|| format!("Failed to read build log {}", log.display()))?;
    let diagnostics = parse_diagnostics(&content);
    print_json(&diagnostics)?;
    Ok(0)
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DoctorReport {
    runtime: String,
    available: bool,
    unity_editor: Option<String>,
    pulled: Vec<String>,
    pull_failures: Vec<String>,
}

pub async fn execute_doctor(config: &GateConfig, pull: bool) -> Result<i32> {
    let runner = docker(config);
    let available = runner.is_available().await;
    let mut report = DoctorReport {
        runtime: runner.binary().to_string(),
        available,
        unity_editor: config.unity.resolved_editor_path(),
        pulled: Vec::new(),
        pull_failures: Vec::new(),
    };

    if pull && available {
        for image in config.images.all() {
            match runner.pull(image).await {
                Ok(()) => report.pulled.push(image.to_string()),
                Err(e) => {
                    warn!(image, error = %e, "Pull failed");
                    report.pull_failures.push(format!("{image}: {e}"));
                }
            }
        }
    }

    print_json(&report)?;
    Ok(if available && report.pull_failures.is_empty() { 0 } else { EXIT_FAILURE })
}

pub fn execute_config(config: &GateConfig) -> Result<i32> {
    print!("{}", toml::to_string_pretty(config)?);
    Ok(0)
}

/// Write the default configuration unless a file already exists
pub fn init_config(path: Option<&Path>) -> Result<()> {
    let target = match path {
        Some(p) => p.to_path_buf(),
        None => GateConfig::config_path()?,
    };
    if target.exists() {
        println!("Config already exists at {}", target.display());
    } else {
        GateConfig::default().save_to(&target)?;
        println!("Wrote default config to {}", target.display());
    }
    Ok(())
}
