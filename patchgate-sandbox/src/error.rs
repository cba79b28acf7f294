//! Error taxonomy for sandboxed validation

use patchgate_common::Stage;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Sandbox allocation and file staging failures.
#[derive(Error, Debug)]
pub enum SandboxError {
    #[error("sandbox root {path} is not writable: {source}")]
    Unwritable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid include pattern '{pattern}': {reason}")]
    Pattern { pattern: String, reason: String },

    #[error("{} is not a regular file in the sandbox", .0.display())]
    NotAFile(PathBuf),

    #[error("copied {copied} of {expected} patch files back")]
    Incomplete { expected: usize, copied: usize },

    #[error("staging task failed: {0}")]
    Join(String),
}

impl SandboxError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SandboxError::Io {
            path: path.into(),
            source,
        }
    }
}

/// A process or container could not be started at all.
///
/// A command that starts and exits non-zero is not an error; it is reported
/// through [`crate::RunOutput`].
#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("failed to launch '{program}': {reason}")]
    Launch { program: String, reason: String },

    #[error("container runtime rejected '{image}': {log}")]
    Daemon { image: String, log: String },

    #[error("failed to collect output: {0}")]
    Output(String),
}

/// Scene document emit/parse failures.
#[derive(Error, Debug)]
pub enum SceneError {
    #[error("object '{0}' has a non-finite transform")]
    NonFinite(String),

    #[error("malformed scene document: {0}")]
    Malformed(String),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("RON error: {0}")]
    Ron(String),
}

/// Asset download failures.
#[derive(Error, Debug)]
pub enum AssetError {
    #[error("invalid asset URL '{0}'")]
    InvalidUrl(String),

    #[error("unsupported asset URL scheme '{0}'")]
    UnsupportedScheme(String),

    #[error("asset {url} returned status {status}")]
    Status { url: String, status: u16 },

    #[error("asset {url} exceeds {limit} bytes")]
    TooLarge { url: String, limit: u64 },

    #[error("request for {url} failed: {reason}")]
    Request { url: String, reason: String },

    #[error(transparent)]
    Io(#[from] SandboxError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Caller-facing outcome of a failed `apply` or compilation run.
#[derive(Error, Debug)]
pub enum PatchError {
    /// Container runtime unreachable, image missing, unwritable filesystem,
    /// asset source unreachable. Never retried here.
    #[error("infrastructure failure: {0}")]
    Infrastructure(String),

    /// A stage ran and reported failure.
    #[error("validation failed at {stage} stage")]
    Validation { stage: Stage, log: String },

    /// A stage exceeded its time budget and was killed.
    #[error("{stage} stage timed out after {timeout:?}")]
    Timeout {
        stage: Stage,
        log: String,
        timeout: Duration,
    },

    /// The patch itself is malformed.
    #[error("invalid patch: {0}")]
    InvalidPatch(String),
}

impl PatchError {
    /// Short machine-readable kind, used in JSON responses
    pub fn kind(&self) -> &'static str {
        match self {
            PatchError::Infrastructure(_) => "infrastructure",
            PatchError::Validation { .. } => "validation",
            PatchError::Timeout { .. } => "timeout",
            PatchError::InvalidPatch(_) => "invalid_patch",
        }
    }

    pub fn stage(&self) -> Option<Stage> {
        match self {
            PatchError::Validation { stage, .. } | PatchError::Timeout { stage, .. } => {
                Some(*stage)
            }
            _ => None,
        }
    }

    /// Raw log of the failing stage, or the error message otherwise
    pub fn log(&self) -> String {
        match self {
            PatchError::Validation { log, .. } | PatchError::Timeout { log, .. } => log.clone(),
            other => other.to_string(),
        }
    }
}

impl From<SandboxError> for PatchError {
    fn from(e: SandboxError) -> Self {
        PatchError::Infrastructure(e.to_string())
    }
}

impl From<RunnerError> for PatchError {
    fn from(e: RunnerError) -> Self {
        PatchError::Infrastructure(e.to_string())
    }
}

impl From<SceneError> for PatchError {
    fn from(e: SceneError) -> Self {
        match e {
            SceneError::NonFinite(_) => PatchError::InvalidPatch(e.to_string()),
            other => PatchError::Infrastructure(other.to_string()),
        }
    }
}

impl From<AssetError> for PatchError {
    fn from(e: AssetError) -> Self {
        match e {
            AssetError::InvalidUrl(_) | AssetError::UnsupportedScheme(_) => {
                PatchError::InvalidPatch(e.to_string())
            }
            other => PatchError::Infrastructure(other.to_string()),
        }
    }
}

pub type PatchResult<T> = std::result::Result<T, PatchError>;
