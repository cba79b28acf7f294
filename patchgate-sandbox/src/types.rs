//! Core types for container and host execution

use crate::limits::ResourceLimits;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// One ephemeral container execution. Never reused.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerJob {
    pub image: String,

    /// Commands chained so each only runs if the previous one succeeded
    pub commands: Vec<String>,

    /// Host directory mounted read-write into the container
    pub bind_path: PathBuf,

    /// Mount point and working directory inside the container
    pub work_dir: String,

    #[serde(with = "humantime_serde")]
    pub timeout: Duration,

    #[serde(default)]
    pub limits: ResourceLimits,
}

impl ContainerJob {
    pub fn new(image: impl Into<String>, bind_path: impl Into<PathBuf>) -> Self {
        Self {
            image: image.into(),
            commands: Vec::new(),
            bind_path: bind_path.into(),
            work_dir: "/workspace".to_string(),
            timeout: Duration::from_secs(600),
            limits: ResourceLimits::default(),
        }
    }

    pub fn with_commands<I, S>(mut self, commands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.commands = commands.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_work_dir(mut self, work_dir: impl Into<String>) -> Self {
        self.work_dir = work_dir.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_limits(mut self, limits: ResourceLimits) -> Self {
        self.limits = limits;
        self
    }

    /// The command sequence as a single `sh -c` script
    pub fn script(&self) -> String {
        self.commands.join(" && ")
    }
}

/// A process run directly on the host (outside any container).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostCommand {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub current_dir: Option<PathBuf>,
    #[serde(default)]
    pub env: Vec<(String, String)>,
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl HostCommand {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            current_dir: None,
            env: Vec::new(),
            timeout,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }
}

/// Result of a finished (or killed) execution
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunOutput {
    /// Exit code (0 = success). Meaningless when `timed_out` is set.
    pub exit_code: i32,

    /// Interleaved stdout and stderr, in arrival order
    pub log: String,

    pub duration_ms: u64,

    /// Whether execution was killed after exceeding its timeout
    pub timed_out: bool,
}

impl RunOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0 && !self.timed_out
    }

    pub fn exited(exit_code: i32, log: impl Into<String>) -> Self {
        Self {
            exit_code,
            log: log.into(),
            duration_ms: 0,
            timed_out: false,
        }
    }

    pub fn timeout(log: impl Into<String>) -> Self {
        Self {
            exit_code: -1,
            log: log.into(),
            duration_ms: 0,
            timed_out: true,
        }
    }
}
