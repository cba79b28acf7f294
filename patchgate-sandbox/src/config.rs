//! Configuration management for patchgate

use crate::error::ConfigError;
use crate::limits::ResourceLimits;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable overriding `unity.editor_path`
pub const UNITY_EDITOR_ENV: &str = "UNITY_EDITOR_PATH";

/// Application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GateConfig {
    #[serde(default)]
    pub sandbox: SandboxConfig,
    #[serde(default)]
    pub docker: DockerConfig,
    #[serde(default)]
    pub images: ImageConfig,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    #[serde(default)]
    pub unity: UnityConfig,
    #[serde(default)]
    pub assets: AssetConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SandboxConfig {
    /// Directory holding per-request sandboxes
    #[serde(default = "SandboxConfig::default_root")]
    pub root: String,
    /// Mount point of the sandbox inside containers
    #[serde(default = "SandboxConfig::default_work_dir")]
    pub work_dir: String,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            root: Self::default_root(),
            work_dir: Self::default_work_dir(),
        }
    }
}

impl SandboxConfig {
    fn default_root() -> String {
        "~/.local/share/patchgate/sandboxes".to_string()
    }

    fn default_work_dir() -> String {
        "/workspace".to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DockerConfig {
    /// Container CLI (`docker`, `podman`)
    #[serde(default = "DockerConfig::default_binary")]
    pub binary: String,
    #[serde(default, flatten)]
    pub limits: ResourceLimits,
}

impl Default for DockerConfig {
    fn default() -> Self {
        Self {
            binary: Self::default_binary(),
            limits: ResourceLimits::default(),
        }
    }
}

impl DockerConfig {
    fn default_binary() -> String {
        "docker".to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageConfig {
    #[serde(default = "ImageConfig::default_rust")]
    pub rust: String,
    #[serde(default = "ImageConfig::default_dotnet")]
    pub dotnet: String,
    #[serde(default = "ImageConfig::default_unity_builder")]
    pub unity_builder: String,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            rust: Self::default_rust(),
            dotnet: Self::default_dotnet(),
            unity_builder: Self::default_unity_builder(),
        }
    }
}

impl ImageConfig {
    fn default_rust() -> String {
        "rust:latest".to_string()
    }

    fn default_dotnet() -> String {
        "mcr.microsoft.com/dotnet/sdk:6.0".to_string()
    }

    fn default_unity_builder() -> String {
        "unity-builder:latest".to_string()
    }

    pub fn all(&self) -> Vec<&str> {
        vec![&self.rust, &self.dotnet, &self.unity_builder]
    }
}

/// Per-stage time budgets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeoutConfig {
    #[serde(with = "humantime_serde", default = "TimeoutConfig::default_format")]
    pub format: Duration,
    #[serde(with = "humantime_serde", default = "TimeoutConfig::default_analyze")]
    pub analyze: Duration,
    #[serde(with = "humantime_serde", default = "TimeoutConfig::default_compile")]
    pub compile: Duration,
    #[serde(with = "humantime_serde", default = "TimeoutConfig::default_build")]
    pub build: Duration,
    #[serde(with = "humantime_serde", default = "TimeoutConfig::default_test")]
    pub test: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            format: Self::default_format(),
            analyze: Self::default_analyze(),
            compile: Self::default_compile(),
            build: Self::default_build(),
            test: Self::default_test(),
        }
    }
}

impl TimeoutConfig {
    fn default_format() -> Duration {
        Duration::from_secs(5 * 60)
    }

    fn default_analyze() -> Duration {
        Duration::from_secs(10 * 60)
    }

    fn default_compile() -> Duration {
        Duration::from_secs(30 * 60)
    }

    fn default_build() -> Duration {
        Duration::from_secs(60 * 60)
    }

    fn default_test() -> Duration {
        Duration::from_secs(60 * 60)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnityConfig {
    /// Host path of the Unity editor executable
    #[serde(default)]
    pub editor_path: Option<String>,
    /// Static method invoked by `-executeMethod`
    #[serde(default = "UnityConfig::default_build_method")]
    pub build_method: String,
    #[serde(default = "UnityConfig::default_build_target")]
    pub build_target: String,
}

impl Default for UnityConfig {
    fn default() -> Self {
        Self {
            editor_path: None,
            build_method: Self::default_build_method(),
            build_target: Self::default_build_target(),
        }
    }
}

impl UnityConfig {
    fn default_build_method() -> String {
        "Build.PerformBuild".to_string()
    }

    fn default_build_target() -> String {
        "StandaloneLinux64".to_string()
    }

    /// Editor path, with the environment taking precedence over the file
    pub fn resolved_editor_path(&self) -> Option<String> {
        std::env::var(UNITY_EDITOR_ENV)
            .ok()
            .filter(|p| !p.trim().is_empty())
            .or_else(|| self.editor_path.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetConfig {
    /// Largest accepted asset download
    #[serde(default = "AssetConfig::default_max_bytes")]
    pub max_bytes: u64,
    #[serde(with = "humantime_serde", default = "AssetConfig::default_request_timeout")]
    pub request_timeout: Duration,
}

impl Default for AssetConfig {
    fn default() -> Self {
        Self {
            max_bytes: Self::default_max_bytes(),
            request_timeout: Self::default_request_timeout(),
        }
    }
}

impl AssetConfig {
    fn default_max_bytes() -> u64 {
        256 * 1024 * 1024
    }

    fn default_request_timeout() -> Duration {
        Duration::from_secs(120)
    }
}

impl GateConfig {
    /// Load configuration from the default location, falling back to defaults
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::config_path()?;
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: GateConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ConfigError::Read {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Get the configuration file path
    pub fn config_path() -> Result<PathBuf, ConfigError> {
        let home = dirs::home_dir()
            .ok_or_else(|| ConfigError::Invalid("cannot determine home directory".to_string()))?;
        Ok(home.join(".config").join("patchgate").join("config.toml"))
    }

    /// Expanded sandbox root
    pub fn sandbox_root(&self) -> Result<PathBuf, ConfigError> {
        expand_path(&self.sandbox.root)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let t = &self.timeouts;
        for (name, value) in [
            ("format", t.format),
            ("analyze", t.analyze),
            ("compile", t.compile),
            ("build", t.build),
            ("test", t.test),
        ] {
            if value.is_zero() {
                return Err(ConfigError::Invalid(format!("timeouts.{name} must be non-zero")));
            }
        }
        for image in self.images.all() {
            if image.trim().is_empty() {
                return Err(ConfigError::Invalid("image names must not be empty".to_string()));
            }
        }
        if !self.sandbox.work_dir.starts_with('/') {
            return Err(ConfigError::Invalid(format!(
                "sandbox.work_dir must be absolute: {}",
                self.sandbox.work_dir
            )));
        }
        Ok(())
    }
}

fn expand_path(path: &str) -> Result<PathBuf, ConfigError> {
    if let Some(rest) = path.strip_prefix("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| ConfigError::Invalid("cannot determine home directory".to_string()))?;
        Ok(home.join(rest))
    } else if path == "~" {
        dirs::home_dir()
            .ok_or_else(|| ConfigError::Invalid("cannot determine home directory".to_string()))
    } else {
        Ok(PathBuf::from(path))
    }
}
