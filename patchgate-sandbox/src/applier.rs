//! Validate a patch in a sandbox and commit it to the live tree

use crate::assets::{asset_file_name, AssetFetcher};
use crate::error::{PatchError, PatchResult, SandboxError};
use crate::profile::ProjectLayout;
use crate::scene::emit_scene;
use crate::staging::FileStager;
use crate::validator::{EngineRegistry, EngineValidator};
use crate::workspace::{Sandbox, SandboxId, SandboxManager};
use patchgate_common::{ApplyResponse, Engine, Patch, PipelineOutcome};
use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Successful `apply`
#[derive(Debug, Clone)]
pub struct ApplyReport {
    pub sandbox_id: SandboxId,
    pub outcome: PipelineOutcome,
    /// Project-relative paths written into the live tree, sorted
    pub applied_files: Vec<String>,
}

/// Caller-facing response for an `apply` result
pub fn apply_response(result: &PatchResult<ApplyReport>) -> ApplyResponse {
    match result {
        Ok(report) => ApplyResponse::applied(report.applied_files.clone()),
        Err(e) => ApplyResponse::rejected(e.kind(), e.stage(), e.log()),
    }
}

enum Source {
    Text(String),
    Download(String),
}

/// One file the patch introduces, relative to the project root
struct PlannedFile {
    path: String,
    source: Source,
}

/// Top-level orchestrator for patch validation.
///
/// The live tree is written in exactly one place: after every stage has
/// passed, and only with the files the patch names. The sandbox is destroyed
/// on every path out of [`apply`](Self::apply).
pub struct PatchApplier {
    sandboxes: SandboxManager,
    stager: FileStager,
    registry: EngineRegistry,
    assets: Arc<dyn AssetFetcher>,
}

impl PatchApplier {
    pub fn new(
        sandboxes: SandboxManager,
        registry: EngineRegistry,
        assets: Arc<dyn AssetFetcher>,
    ) -> Self {
        Self {
            sandboxes,
            stager: FileStager::new(),
            registry,
            assets,
        }
    }

    pub fn with_stager(mut self, stager: FileStager) -> Self {
        self.stager = stager;
        self
    }

    pub async fn apply(
        &self,
        live_root: &Path,
        engine: Engine,
        patch: &Patch,
    ) -> PatchResult<ApplyReport> {
        let validator = self
            .registry
            .get(engine)
            .ok_or_else(|| PatchError::InvalidPatch(format!("no validator for {engine}")))?;
        let plan = plan(engine, &validator.profile().layout, patch)?;

        if !live_root.is_dir() {
            return Err(PatchError::Infrastructure(format!(
                "project root {} is not a directory",
                live_root.display()
            )));
        }

        let sandbox = self.sandboxes.create(&format!("apply-{engine}")).await?;
        info!(sandbox_id = %sandbox.id(), engine = %engine, files = plan.len(), "Applying patch");

        let result = self
            .apply_in(&sandbox, live_root, validator.as_ref(), &plan)
            .await;

        match &result {
            Ok(report) => info!(
                sandbox_id = %sandbox.id(),
                files = report.applied_files.len(),
                "Patch applied"
            ),
            Err(e) => warn!(sandbox_id = %sandbox.id(), kind = e.kind(), error = %e, "Patch rejected"),
        }
        self.sandboxes.destroy(sandbox).await;
        result
    }

    async fn apply_in(
        &self,
        sandbox: &Sandbox,
        live_root: &Path,
        validator: &dyn EngineValidator,
        plan: &[PlannedFile],
    ) -> PatchResult<ApplyReport> {
        let layout = &validator.profile().layout;
        let staged = self
            .stager
            .copy_in(live_root, sandbox.root(), &layout.stage_patterns)
            .await?;
        debug!(sandbox_id = %sandbox.id(), staged = staged.len(), "Project subset staged");

        for file in plan {
            self.materialize(sandbox.root(), file).await?;
        }

        let outcome = validator.validate(sandbox.root()).await?;
        if let Some(stage) = outcome.failing_stage {
            let log = outcome.log.clone().unwrap_or_default();
            return Err(if outcome.timed_out {
                PatchError::Timeout {
                    stage,
                    log,
                    timeout: validator.stage_timeout(stage),
                }
            } else {
                PatchError::Validation { stage, log }
            });
        }

        let mut paths: Vec<String> = plan.iter().map(|f| f.path.clone()).collect();
        paths.sort();
        let files: Vec<PathBuf> = paths.iter().map(PathBuf::from).collect();
        let copied = self
            .stager
            .copy_out(sandbox.root(), live_root, &files)
            .await?;
        if copied.len() != plan.len() {
            return Err(SandboxError::Incomplete {
                expected: plan.len(),
                copied: copied.len(),
            }
            .into());
        }

        Ok(ApplyReport {
            sandbox_id: sandbox.id(),
            outcome,
            applied_files: paths,
        })
    }

    async fn materialize(&self, sandbox_root: &Path, file: &PlannedFile) -> PatchResult<()> {
        let dest = sandbox_root.join(&file.path);
        match &file.source {
            Source::Text(content) => {
                if let Some(parent) = dest.parent() {
                    tokio::fs::create_dir_all(parent)
                        .await
                        .map_err(|e| SandboxError::io(parent, e))?;
                }
                tokio::fs::write(&dest, content)
                    .await
                    .map_err(|e| SandboxError::io(&dest, e))?;
            }
            Source::Download(url) => {
                self.assets.fetch(url, &dest).await?;
            }
        }
        debug!(path = %file.path, "Materialized patch file");
        Ok(())
    }
}

/// Decide every file the patch introduces before touching the filesystem.
fn plan(engine: Engine, layout: &ProjectLayout, patch: &Patch) -> PatchResult<Vec<PlannedFile>> {
    if patch.is_empty() {
        return Err(PatchError::InvalidPatch(
            "patch has no code, assets or scene".to_string(),
        ));
    }

    let mut files = Vec::new();
    if let Some(code) = &patch.code {
        check_target_name(&code.target_file_name)?;
        files.push(PlannedFile {
            path: layout.code_path(&code.target_file_name),
            source: Source::Text(code.content.clone()),
        });
    }

    let mut names = HashSet::new();
    for asset in &patch.assets {
        let name = asset_file_name(&asset.url, asset.name.as_deref()).ok_or_else(|| {
            PatchError::InvalidPatch(format!("cannot derive a file name for asset {}", asset.url))
        })?;
        if !names.insert(name.clone()) {
            return Err(PatchError::InvalidPatch(format!("duplicate asset name {name}")));
        }
        files.push(PlannedFile {
            path: layout.asset_path(&name),
            source: Source::Download(asset.url.clone()),
        });
    }

    if let Some(scene) = &patch.scene {
        files.push(PlannedFile {
            path: layout.scene_path.clone(),
            source: Source::Text(emit_scene(engine, scene)?),
        });
    }

    let mut seen = HashSet::new();
    for file in &files {
        if !seen.insert(file.path.as_str()) {
            return Err(PatchError::InvalidPatch(format!(
                "patch writes {} more than once",
                file.path
            )));
        }
    }
    Ok(files)
}

const GLOB_META: &[char] = &['*', '?', '[', ']', '{', '}', '\\'];

/// Relative, normal components only, and nothing a glob would interpret
fn check_target_name(name: &str) -> PatchResult<()> {
    let invalid = |reason: &str| PatchError::InvalidPatch(format!("target file '{name}' {reason}"));

    if name.trim().is_empty() {
        return Err(invalid("is empty"));
    }
    if name.contains(GLOB_META) {
        return Err(invalid("contains glob metacharacters"));
    }
    let path = Path::new(name);
    if !path.components().all(|c| matches!(c, Component::Normal(_))) {
        return Err(invalid("must be a relative path without '..'"));
    }
    Ok(())
}
