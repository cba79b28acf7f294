//! Resource limits applied to every validation container

use serde::{Deserialize, Serialize};

/// Container network mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkMode {
    /// No network at all
    None,
    /// Default bridge network (needed when stages fetch dependencies)
    Bridge,
}

impl NetworkMode {
    pub fn as_docker_arg(self) -> &'static str {
        match self {
            NetworkMode::None => "none",
            NetworkMode::Bridge => "bridge",
        }
    }
}

/// Resource limits for container execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceLimits {
    #[serde(default = "ResourceLimits::default_network")]
    pub network: NetworkMode,

    /// Memory cap in docker notation (e.g. `4g`)
    #[serde(default)]
    pub memory: Option<String>,

    /// CPU quota in cores
    #[serde(default)]
    pub cpus: Option<f32>,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            network: NetworkMode::Bridge,
            memory: Some("4g".to_string()),
            cpus: None,
        }
    }
}

impl ResourceLimits {
    fn default_network() -> NetworkMode {
        NetworkMode::Bridge
    }

    /// Offline execution for toolchains with vendored dependencies
    pub fn isolated() -> Self {
        Self {
            network: NetworkMode::None,
            memory: Some("4g".to_string()),
            cpus: Some(2.0),
        }
    }

    /// No caps at all
    pub fn unrestricted() -> Self {
        Self {
            network: NetworkMode::Bridge,
            memory: None,
            cpus: None,
        }
    }

    pub fn to_docker_args(&self) -> Vec<String> {
        let mut args = vec![format!("--network={}", self.network.as_docker_arg())];
        if let Some(memory) = &self.memory {
            args.push(format!("--memory={memory}"));
        }
        if let Some(cpus) = self.cpus {
            args.push(format!("--cpus={cpus}"));
        }
        args
    }
}
