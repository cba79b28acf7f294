//! Runner traits and implementations

mod docker;
mod process;

use crate::error::RunnerError;
use crate::types::{ContainerJob, HostCommand, RunOutput};
use async_trait::async_trait;

pub use docker::DockerRunner;
pub use process::ProcessRuntime;

/// Runs one ephemeral container per call.
///
/// A container that starts and exits non-zero is `Ok`; `Err` means it never
/// ran (daemon unreachable, image missing). The container must not outlive
/// the call.
#[async_trait]
pub trait ContainerRunner: Send + Sync {
    async fn run(&self, job: &ContainerJob) -> Result<RunOutput, RunnerError>;

    /// Whether the container runtime answers at all
    async fn is_available(&self) -> bool {
        true
    }

    /// Fetch an image ahead of time
    async fn pull(&self, _image: &str) -> Result<(), RunnerError> {
        Ok(())
    }

    /// Get runtime name
    fn name(&self) -> &str;
}

/// Runs a process directly on the host.
#[async_trait]
pub trait HostRunner: Send + Sync {
    async fn run(&self, command: &HostCommand) -> Result<RunOutput, RunnerError>;

    fn name(&self) -> &str;
}
