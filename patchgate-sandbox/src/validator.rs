//! Engine validators: the fixed format → analyze → compile pipeline

use crate::config::GateConfig;
use crate::error::RunnerError;
use crate::limits::ResourceLimits;
use crate::profile::{unity_build, EngineProfile, StageSpec, UnityBuild};
use crate::runtime::{ContainerRunner, HostRunner};
use crate::types::{ContainerJob, HostCommand, RunOutput};
use async_trait::async_trait;
use patchgate_common::{Engine, PipelineOutcome, Stage, ValidationResult};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Three-stage validation contract shared by every engine.
///
/// `Err` means a stage could not be launched at all; a stage that ran and
/// failed is a normal `Ok` outcome with `success == false`.
#[async_trait]
pub trait EngineValidator: Send + Sync {
    fn profile(&self) -> &EngineProfile;

    /// Run a single stage against the sandbox
    async fn run_stage(&self, stage: Stage, sandbox: &Path)
        -> Result<ValidationResult, RunnerError>;

    /// Time budget of `stage`
    fn stage_timeout(&self, stage: Stage) -> Duration;

    fn engine(&self) -> Engine {
        self.profile().engine
    }

    /// Run every stage in order, stopping at the first failure
    async fn validate(&self, sandbox: &Path) -> Result<PipelineOutcome, RunnerError> {
        let mut results = Vec::with_capacity(Stage::ALL.len());
        for stage in Stage::ALL {
            debug!(engine = %self.engine(), stage = %stage, "Running stage");
            let result = self.run_stage(stage, sandbox).await?;
            let passed = result.success;
            results.push(result);
            if !passed {
                warn!(engine = %self.engine(), stage = %stage, "Stage failed");
                break;
            }
        }
        let outcome = PipelineOutcome::from_results(results);
        if outcome.success {
            info!(engine = %self.engine(), "All stages passed");
        }
        Ok(outcome)
    }
}

fn stage_result(stage: Stage, output: RunOutput) -> ValidationResult {
    if output.success() {
        ValidationResult::passed(stage, output.duration_ms)
    } else {
        ValidationResult::failed(stage, output.log, output.timed_out, output.duration_ms)
    }
}

/// Validator driven entirely by an [`EngineProfile`] data table.
pub struct ContainerValidator {
    profile: EngineProfile,
    runner: Arc<dyn ContainerRunner>,
    limits: ResourceLimits,
}

impl ContainerValidator {
    pub fn new(profile: EngineProfile, runner: Arc<dyn ContainerRunner>) -> Self {
        Self {
            profile,
            runner,
            limits: ResourceLimits::default(),
        }
    }

    pub fn with_limits(mut self, limits: ResourceLimits) -> Self {
        self.limits = limits;
        self
    }

    fn job(&self, spec: &StageSpec, sandbox: &Path) -> ContainerJob {
        ContainerJob::new(&spec.image, sandbox)
            .with_commands(spec.commands.iter().cloned())
            .with_work_dir(&self.profile.work_dir)
            .with_timeout(spec.timeout)
            .with_limits(self.limits.clone())
    }

    async fn run_spec(
        &self,
        stage: Stage,
        spec: &StageSpec,
        sandbox: &Path,
    ) -> Result<ValidationResult, RunnerError> {
        let job = self.job(spec, sandbox);
        let output = self.runner.run(&job).await?;
        if output.timed_out {
            warn!(stage = %stage, image = %job.image, timeout = ?job.timeout, "Stage timed out");
        }
        Ok(stage_result(stage, output))
    }
}

#[async_trait]
impl EngineValidator for ContainerValidator {
    fn profile(&self) -> &EngineProfile {
        &self.profile
    }

    async fn run_stage(
        &self,
        stage: Stage,
        sandbox: &Path,
    ) -> Result<ValidationResult, RunnerError> {
        let spec = self.profile.stage(stage).ok_or_else(|| RunnerError::Launch {
            program: self.runner.name().to_string(),
            reason: format!("{} has no containerized {stage} stage", self.profile.engine),
        })?;
        self.run_spec(stage, spec, sandbox).await
    }

    fn stage_timeout(&self, stage: Stage) -> Duration {
        self.profile
            .stage(stage)
            .map(|s| s.timeout)
            .unwrap_or(Duration::ZERO)
    }
}

/// Unity: containerized format/analyze, editor build on the host.
pub struct UnityValidator {
    containers: ContainerValidator,
    host: Arc<dyn HostRunner>,
    build: UnityBuild,
}

impl UnityValidator {
    pub fn new(
        containers: ContainerValidator,
        host: Arc<dyn HostRunner>,
        build: UnityBuild,
    ) -> Self {
        Self {
            containers,
            host,
            build,
        }
    }

    fn compile_command(&self, sandbox: &Path) -> Result<HostCommand, RunnerError> {
        let editor = self
            .build
            .editor_path
            .as_deref()
            .ok_or_else(|| RunnerError::Launch {
                program: "unity".to_string(),
                reason: "no Unity editor configured (set UNITY_EDITOR_PATH)".to_string(),
            })?;
        Ok(HostCommand::new(editor, self.build.timeout)
            .args(self.build.args(sandbox))
            .current_dir(sandbox))
    }
}

#[async_trait]
impl EngineValidator for UnityValidator {
    fn profile(&self) -> &EngineProfile {
        self.containers.profile()
    }

    async fn run_stage(
        &self,
        stage: Stage,
        sandbox: &Path,
    ) -> Result<ValidationResult, RunnerError> {
        match stage {
            Stage::Format | Stage::Analyze => self.containers.run_stage(stage, sandbox).await,
            Stage::Compile => {
                let command = self.compile_command(sandbox)?;
                info!(editor = %command.program, runner = self.host.name(), "Running Unity batch build");
                let output = self.host.run(&command).await?;
                Ok(stage_result(stage, output))
            }
        }
    }

    fn stage_timeout(&self, stage: Stage) -> Duration {
        match stage {
            Stage::Compile => self.build.timeout,
            other => self.containers.stage_timeout(other),
        }
    }
}

/// Validators for every supported engine, built once and never mutated.
#[derive(Clone)]
pub struct EngineRegistry {
    validators: HashMap<Engine, Arc<dyn EngineValidator>>,
}

impl EngineRegistry {
    pub fn from_config(
        config: &GateConfig,
        containers: Arc<dyn ContainerRunner>,
        host: Arc<dyn HostRunner>,
    ) -> Self {
        let limits = config.docker.limits.clone();
        let bevy = ContainerValidator::new(EngineProfile::bevy(config), containers.clone())
            .with_limits(limits.clone());
        let unity = UnityValidator::new(
            ContainerValidator::new(EngineProfile::unity(config), containers).with_limits(limits),
            host,
            unity_build(config),
        );

        let mut validators: HashMap<Engine, Arc<dyn EngineValidator>> = HashMap::new();
        validators.insert(Engine::Bevy, Arc::new(bevy));
        validators.insert(Engine::Unity, Arc::new(unity));
        Self { validators }
    }

    /// Replace the validator for one engine
    pub fn with_validator(mut self, validator: Arc<dyn EngineValidator>) -> Self {
        self.validators.insert(validator.engine(), validator);
        self
    }

    pub fn get(&self, engine: Engine) -> Option<Arc<dyn EngineValidator>> {
        self.validators.get(&engine).cloned()
    }

    pub fn engines(&self) -> Vec<Engine> {
        let mut engines: Vec<Engine> = self.validators.keys().copied().collect();
        engines.sort();
        engines
    }
}
