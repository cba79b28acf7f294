//! Patch payloads proposed by the upstream generation layer.

use crate::scene::SceneSpec;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Game engine a project is built with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Engine {
    Bevy,
    Unity,
}

impl Engine {
    pub const ALL: [Engine; 2] = [Engine::Bevy, Engine::Unity];

    pub fn as_str(self) -> &'static str {
        match self {
            Engine::Bevy => "bevy",
            Engine::Unity => "unity",
        }
    }
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Engine {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bevy" => Ok(Engine::Bevy),
            "unity" => Ok(Engine::Unity),
            other => Err(format!("unsupported engine: {other}")),
        }
    }
}

/// Generated source file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodePatch {
    /// Full file content.
    pub content: String,
    /// File name relative to the engine's script directory (e.g. `Player.cs`).
    pub target_file_name: String,
}

/// Reference to a generated binary asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetRef {
    /// `http(s)://` or `file://` location of the asset bytes.
    pub url: String,
    /// Desired file name inside the generated-assets folder.
    #[serde(default)]
    pub name: Option<String>,
}

/// A bundle of generated content proposed for inclusion in a project.
///
/// Never persisted by the core; it only lives for one `apply` call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Patch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<CodePatch>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub assets: Vec<AssetRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scene: Option<SceneSpec>,
}

impl Patch {
    /// Patch carrying a single code file
    pub fn code(content: impl Into<String>, target_file_name: impl Into<String>) -> Self {
        Self {
            code: Some(CodePatch {
                content: content.into(),
                target_file_name: target_file_name.into(),
            }),
            ..Self::default()
        }
    }

    pub fn with_asset(mut self, url: impl Into<String>, name: Option<String>) -> Self {
        self.assets.push(AssetRef {
            url: url.into(),
            name,
        });
        self
    }

    pub fn with_scene(mut self, scene: SceneSpec) -> Self {
        self.scene = Some(scene);
        self
    }

    /// True when the patch introduces nothing at all
    pub fn is_empty(&self) -> bool {
        self.code.is_none() && self.assets.is_empty() && self.scene.is_none()
    }
}
