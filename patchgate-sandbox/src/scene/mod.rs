//! Conversion between [`SceneSpec`] and engine-native scene documents

mod bevy;
mod unity;

use crate::error::SceneError;
use patchgate_common::{Engine, SceneSpec};
use uuid::Uuid;

pub use bevy::{emit_bevy_scene, parse_bevy_scene};
pub use unity::{emit_unity_scene, parse_unity_scene};

/// Render `spec` as the native scene document of `engine`
pub fn emit_scene(engine: Engine, spec: &SceneSpec) -> Result<String, SceneError> {
    if let Some(name) = spec.first_non_finite() {
        return Err(SceneError::NonFinite(name.to_string()));
    }
    match engine {
        Engine::Bevy => emit_bevy_scene(spec),
        Engine::Unity => emit_unity_scene(spec),
    }
}

pub fn parse_scene(engine: Engine, document: &str) -> Result<SceneSpec, SceneError> {
    match engine {
        Engine::Bevy => parse_bevy_scene(document),
        Engine::Unity => parse_unity_scene(document),
    }
}

/// Stable identifier derived from the scene content.
pub(crate) fn scene_guid(spec: &SceneSpec) -> Result<Uuid, SceneError> {
    let canonical =
        serde_json::to_vec(spec).map_err(|e| SceneError::Malformed(e.to_string()))?;
    Ok(Uuid::new_v5(&Uuid::NAMESPACE_OID, &canonical))
}
