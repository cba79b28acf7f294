//! Docker CLI container runner

use super::process::run_captured;
use crate::error::RunnerError;
use crate::types::{ContainerJob, RunOutput};
use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// `docker run` exits with this code when the daemon could not start the
/// container (unreachable daemon, unknown image, bad flags).
const DOCKER_RUN_FAILURE: i32 = 125;

const REMOVE_TIMEOUT: Duration = Duration::from_secs(30);

/// Runs jobs through the `docker` (or compatible) command line client.
#[derive(Debug, Clone)]
pub struct DockerRunner {
    binary: String,
    pull_timeout: Duration,
}

impl DockerRunner {
    pub fn new() -> Self {
        Self::with_binary("docker")
    }

    /// Use an alternative CLI such as `podman`
    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            pull_timeout: Duration::from_secs(1800),
        }
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }

    /// Arguments for `docker run`, excluding the binary itself
    pub fn run_args(&self, job: &ContainerJob, bind_path: &str, container_name: &str) -> Vec<String> {
        let mut args = vec![
            "run".to_string(),
            "--rm".to_string(),
            "--name".to_string(),
            container_name.to_string(),
            "-v".to_string(),
            format!("{}:{}", bind_path, job.work_dir),
            "-w".to_string(),
            job.work_dir.clone(),
        ];
        args.extend(job.limits.to_docker_args());
        args.push(job.image.clone());
        args.push("sh".to_string());
        args.push("-c".to_string());
        args.push(job.script());
        args
    }

    fn resolve_bind_path(&self, job: &ContainerJob) -> Result<PathBuf, RunnerError> {
        if job.bind_path.is_absolute() {
            return Ok(job.bind_path.clone());
        }
        std::fs::canonicalize(&job.bind_path).map_err(|e| RunnerError::Launch {
            program: self.binary.clone(),
            reason: format!("bind path {}: {}", job.bind_path.display(), e),
        })
    }

    /// Best-effort `docker rm -f`; a missing container is fine.
    async fn force_remove(&self, container_name: &str) {
        let mut cmd = Command::new(&self.binary);
        cmd.args(["rm", "-f", container_name]);
        match run_captured(cmd, &self.binary, REMOVE_TIMEOUT).await {
            Ok(out) if out.success() => debug!(container = container_name, "Container removed"),
            Ok(out) => debug!(
                container = container_name,
                exit_code = out.exit_code,
                "Container already gone"
            ),
            Err(e) => warn!(container = container_name, error = %e, "Failed to remove container"),
        }
    }
}

impl Default for DockerRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl super::ContainerRunner for DockerRunner {
    async fn run(&self, job: &ContainerJob) -> Result<RunOutput, RunnerError> {
        let bind_path = self.resolve_bind_path(job)?;
        let container_name = format!("patchgate-{}", Uuid::new_v4().simple());
        let args = self.run_args(job, &bind_path.to_string_lossy(), &container_name);

        info!(
            container = %container_name,
            image = %job.image,
            timeout_secs = job.timeout.as_secs(),
            "Starting container"
        );

        let mut cmd = Command::new(&self.binary);
        cmd.args(&args);
        let output = match run_captured(cmd, &self.binary, job.timeout).await {
            Ok(output) => output,
            Err(e) => {
                self.force_remove(&container_name).await;
                return Err(e);
            }
        };

        if output.timed_out {
            warn!(container = %container_name, image = %job.image, "Container timed out");
            self.force_remove(&container_name).await;
            return Ok(output);
        }

        if output.exit_code == DOCKER_RUN_FAILURE {
            self.force_remove(&container_name).await;
            return Err(RunnerError::Daemon {
                image: job.image.clone(),
                log: output.log,
            });
        }

        info!(
            container = %container_name,
            exit_code = output.exit_code,
            duration_ms = output.duration_ms,
            "Container finished"
        );
        Ok(output)
    }

    async fn is_available(&self) -> bool {
        let mut cmd = Command::new(&self.binary);
        cmd.arg("info");
        match run_captured(cmd, &self.binary, Duration::from_secs(15)).await {
            Ok(out) => out.success(),
            Err(_) => false,
        }
    }

    async fn pull(&self, image: &str) -> Result<(), RunnerError> {
        info!(image, "Pulling image");
        let mut cmd = Command::new(&self.binary);
        cmd.args(["pull", image]);
        let out = run_captured(cmd, &self.binary, self.pull_timeout).await?;
        if out.success() {
            Ok(())
        } else {
            Err(RunnerError::Daemon {
                image: image.to_string(),
                log: out.log,
            })
        }
    }

    fn name(&self) -> &str {
        "docker"
    }
}
