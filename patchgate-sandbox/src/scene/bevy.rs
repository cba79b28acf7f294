//! Bevy `DynamicScene` documents in RON

use crate::error::SceneError;
use patchgate_common::{Quat, SceneObject, SceneSpec, Vec3};
use ron::ser::PrettyConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const TRANSFORM: &str = "bevy_transform::components::transform::Transform";
const NAME: &str = "bevy_core::name::Name";

#[derive(Serialize, Deserialize)]
struct TransformComponent {
    translation: Vec3,
    /// glam serializes quaternions as `(x, y, z, w)`
    rotation: (f32, f32, f32, f32),
    scale: Vec3,
}

#[derive(Serialize, Deserialize)]
struct NameComponent {
    name: String,
}

#[derive(Serialize)]
#[serde(untagged)]
enum Component {
    Transform(TransformComponent),
    Name(NameComponent),
}

#[derive(Serialize)]
struct EntityOut {
    components: BTreeMap<&'static str, Component>,
}

#[derive(Serialize)]
struct SceneOut {
    resources: BTreeMap<String, String>,
    entities: BTreeMap<u64, EntityOut>,
}

#[derive(Deserialize)]
struct EntityIn {
    #[serde(default)]
    components: BTreeMap<String, ron::Value>,
}

#[derive(Deserialize)]
struct SceneIn {
    #[serde(default)]
    entities: BTreeMap<u64, EntityIn>,
}

/// Emit one entity per object, keyed by its index in the scene.
pub fn emit_bevy_scene(spec: &SceneSpec) -> Result<String, SceneError> {
    let entities = spec
        .objects
        .iter()
        .enumerate()
        .map(|(index, object)| (index as u64, entity(object)))
        .collect();
    let scene = SceneOut {
        resources: BTreeMap::new(),
        entities,
    };

    let config = PrettyConfig::new().struct_names(false);
    let mut out = ron::ser::to_string_pretty(&scene, config).map_err(|e| SceneError::Ron(e.to_string()))?;
    out.push('\n');
    Ok(out)
}

fn entity(object: &SceneObject) -> EntityOut {
    let r = object.rotation;
    let mut components = BTreeMap::new();
    components.insert(
        TRANSFORM,
        Component::Transform(TransformComponent {
            translation: object.position,
            rotation: (r.x, r.y, r.z, r.w),
            scale: object.scale,
        }),
    );
    components.insert(
        NAME,
        Component::Name(NameComponent {
            name: object.name.clone(),
        }),
    );
    EntityOut { components }
}

/// Recover objects from a scene, ordered by entity id.
///
/// Entities without a `Transform` are skipped; a missing `Name` becomes
/// `Entity <id>`.
pub fn parse_bevy_scene(document: &str) -> Result<SceneSpec, SceneError> {
    let scene: SceneIn = ron::from_str(document).map_err(|e| SceneError::Ron(e.to_string()))?;

    let mut objects = Vec::with_capacity(scene.entities.len());
    for (id, mut entity) in scene.entities {
        let Some(transform) = entity.components.remove(TRANSFORM) else {
            continue;
        };
        let transform: TransformComponent = transform
            .into_rust()
            .map_err(|e| SceneError::Ron(format!("entity {id} Transform: {e}")))?;
        let name = match entity.components.remove(NAME) {
            Some(value) => {
                value
                    .into_rust::<NameComponent>()
                    .map_err(|e| SceneError::Ron(format!("entity {id} Name: {e}")))?
                    .name
            }
            None => format!("Entity {id}"),
        };
        let (x, y, z, w) = transform.rotation;
        objects.push(SceneObject {
            name,
            position: transform.translation,
            rotation: Quat::new(x, y, z, w),
            scale: transform.scale,
        });
    }
    Ok(SceneSpec::new(objects))
}
