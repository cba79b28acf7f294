//! Scripted runners for exercising validators and orchestrators without
//! a container runtime or a Unity installation.

use crate::error::RunnerError;
use crate::runtime::{ContainerRunner, HostRunner};
use crate::types::{ContainerJob, HostCommand, RunOutput};
use async_trait::async_trait;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

type Effect = Box<dyn Fn(&Path) + Send + Sync>;

struct Rule {
    needle: String,
    output: Option<RunOutput>,
    effect: Option<Effect>,
}

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Container runner answering from a script keyed on command text.
///
/// Jobs with no matching rule succeed with an empty log.
#[derive(Default)]
pub struct StubContainerRunner {
    rules: Vec<Rule>,
    unavailable: bool,
    calls: AtomicUsize,
    jobs: Mutex<Vec<ContainerJob>>,
}

impl StubContainerRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Jobs whose script contains `needle` return `output`
    pub fn fail_when(mut self, needle: impl Into<String>, output: RunOutput) -> Self {
        self.rules.push(Rule {
            needle: needle.into(),
            output: Some(output),
            effect: None,
        });
        self
    }

    /// Jobs whose script contains `needle` run `effect` on the bound directory
    pub fn effect_when<F>(mut self, needle: impl Into<String>, effect: F) -> Self
    where
        F: Fn(&Path) + Send + Sync + 'static,
    {
        self.rules.push(Rule {
            needle: needle.into(),
            output: None,
            effect: Some(Box::new(effect)),
        });
        self
    }

    /// Every job fails to launch, as if the daemon were down
    pub fn unavailable(mut self) -> Self {
        self.unavailable = true;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Number of jobs whose script contained `needle`
    pub fn calls_matching(&self, needle: &str) -> usize {
        locked(&self.jobs)
            .iter()
            .filter(|job| job.script().contains(needle))
            .count()
    }

    pub fn jobs(&self) -> Vec<ContainerJob> {
        locked(&self.jobs).clone()
    }
}

#[async_trait]
impl ContainerRunner for StubContainerRunner {
    async fn run(&self, job: &ContainerJob) -> Result<RunOutput, RunnerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        locked(&self.jobs).push(job.clone());

        if self.unavailable {
            return Err(RunnerError::Daemon {
                image: job.image.clone(),
                log: "Cannot connect to the Docker daemon".to_string(),
            });
        }

        let script = job.script();
        let mut output = RunOutput::exited(0, "");
        for rule in self.rules.iter().filter(|r| script.contains(&r.needle)) {
            if let Some(effect) = &rule.effect {
                effect(&job.bind_path);
            }
            if let Some(scripted) = &rule.output {
                output = scripted.clone();
            }
        }
        Ok(output)
    }

    async fn is_available(&self) -> bool {
        !self.unavailable
    }

    fn name(&self) -> &str {
        "stub"
    }
}

/// Host runner returning one scripted output for every command.
pub struct StubHostRunner {
    output: RunOutput,
    calls: AtomicUsize,
    commands: Mutex<Vec<HostCommand>>,
}

impl Default for StubHostRunner {
    fn default() -> Self {
        Self::respond_with(RunOutput::exited(0, "Build succeeded"))
    }
}

impl StubHostRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond_with(output: RunOutput) -> Self {
        Self {
            output,
            calls: AtomicUsize::new(0),
            commands: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_command(&self) -> Option<HostCommand> {
        locked(&self.commands).last().cloned()
    }
}

#[async_trait]
impl HostRunner for StubHostRunner {
    async fn run(&self, command: &HostCommand) -> Result<RunOutput, RunnerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        locked(&self.commands).push(command.clone());
        Ok(self.output.clone())
    }

    fn name(&self) -> &str {
        "stub-host"
    }
}
