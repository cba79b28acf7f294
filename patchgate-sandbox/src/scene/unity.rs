//! Unity YAML scene documents

use super::scene_guid;
use crate::error::SceneError;
use patchgate_common::{Quat, SceneObject, SceneSpec, Vec3};
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt::Write;

const DOCUMENT_MARKER: &str = "--- !u!";
const FIRST_OBJECT_ID: u64 = 3;

const HEADER: &str = "%YAML 1.1
%TAG !u! tag:unity3d.com,2011:
--- !u!29 &1
OcclusionCullingSettings:
  m_ObjectHideFlags: 0
  serializedVersion: 2
  m_OcclusionBakeSettings:
    smallestOccluder: 5
    smallestHole: 0.25
    backfaceThreshold: 100
  m_SceneGUID: {guid}
  m_OcclusionCullingData: {fileID: 0}
--- !u!104 &2
RenderSettings:
  m_ObjectHideFlags: 0
  serializedVersion: 9
  m_Fog: 0
  m_FogColor: {r: 0.5, g: 0.5, b: 0.5, a: 1}
  m_FogMode: 3
  m_FogDensity: 0.01
  m_LinearFogStart: 0
  m_LinearFogEnd: 300
  m_AmbientSkyColor: {r: 0.212, g: 0.227, b: 0.259, a: 1}
  m_AmbientEquatorColor: {r: 0.114, g: 0.125, b: 0.133, a: 1}
  m_AmbientGroundColor: {r: 0.047, g: 0.043, b: 0.035, a: 1}
  m_AmbientIntensity: 1
  m_AmbientMode: 0
  m_SubtractiveShadowColor: {r: 0.42, g: 0.478, b: 0.627, a: 1}
  m_SkyboxMaterial: {fileID: 10304, guid: 0000000000000000f000000000000000, type: 0}
  m_HaloStrength: 0.5
  m_FlareStrength: 1
  m_FlareFadeSpeed: 3
  m_HaloTexture: {fileID: 0}
  m_SpotCookie: {fileID: 10001, guid: 0000000000000000e000000000000000, type: 0}
  m_DefaultReflectionMode: 0
  m_DefaultReflectionResolution: 128
  m_ReflectionBounces: 1
  m_ReflectionIntensity: 1
  m_CustomReflection: {fileID: 0}
  m_Sun: {fileID: 0}
  m_IndirectSpecularColor: {r: 0, g: 0, b: 0, a: 1}
  m_UseRadianceAmbientProbe: 0
";

/// Emit a scene with one GameObject/Transform pair per object.
///
/// File ids are allocated sequentially after the two settings documents,
/// so identical input yields an identical document.
pub fn emit_unity_scene(spec: &SceneSpec) -> Result<String, SceneError> {
    let guid = scene_guid(spec)?;
    let mut out = HEADER.replace("{guid}", &guid.simple().to_string());

    let mut file_id = FIRST_OBJECT_ID;
    for (order, object) in spec.objects.iter().enumerate() {
        write_object(&mut out, file_id, order, object)?;
        file_id += 2;
    }
    Ok(out)
}

fn write_object(
    out: &mut String,
    id: u64,
    order: usize,
    object: &SceneObject,
) -> Result<(), SceneError> {
    let name = yaml_scalar(&object.name)?;
    let (p, r, s) = (object.position, object.rotation, object.scale);
    let transform = id + 1;
    write!(
        out,
        "--- !u!1 &{id}
GameObject:
  m_ObjectHideFlags: 0
  m_CorrespondingSourceObject: {{fileID: 0}}
  m_PrefabInstance: {{fileID: 0}}
  m_PrefabAsset: {{fileID: 0}}
  serializedVersion: 6
  m_Component:
  - component: {{fileID: {transform}}}
  m_Layer: 0
  m_Name: {name}
  m_TagString: Untagged
  m_Icon: {{fileID: 0}}
  m_NavMeshLayer: 0
  m_StaticEditorFlags: 0
  m_IsActive: 1
--- !u!4 &{transform}
Transform:
  m_ObjectHideFlags: 0
  m_CorrespondingSourceObject: {{fileID: 0}}
  m_PrefabInstance: {{fileID: 0}}
  m_PrefabAsset: {{fileID: 0}}
  m_GameObject: {{fileID: {id}}}
  m_LocalRotation: {{x: {}, y: {}, z: {}, w: {}}}
  m_LocalPosition: {{x: {}, y: {}, z: {}}}
  m_LocalScale: {{x: {}, y: {}, z: {}}}
  m_Children: []
  m_Father: {{fileID: 0}}
  m_RootOrder: {order}
  m_LocalEulerAnglesHint: {{x: 0, y: 0, z: 0}}
",
        r.x, r.y, r.z, r.w, p.x, p.y, p.z, s.x, s.y, s.z,
    )
    .map_err(|e| SceneError::Malformed(e.to_string()))
}

/// Single-line YAML scalar, quoted only when YAML would otherwise misread it
fn yaml_scalar(value: &str) -> Result<String, SceneError> {
    let single_line = value.replace(['\n', '\r'], " ");
    Ok(serde_yaml::to_string(&single_line)?.trim_end().to_string())
}

#[derive(Deserialize)]
struct FileRef {
    #[serde(rename = "fileID")]
    file_id: u64,
}

#[derive(Deserialize)]
struct GameObjectBody {
    #[serde(rename = "m_Name")]
    name: String,
}

#[derive(Deserialize)]
struct TransformBody {
    #[serde(rename = "m_GameObject")]
    game_object: FileRef,
    #[serde(rename = "m_LocalPosition")]
    position: Vec3,
    #[serde(rename = "m_LocalRotation")]
    rotation: Quat,
    #[serde(rename = "m_LocalScale")]
    scale: Vec3,
}

#[derive(Deserialize)]
struct UnityDocument {
    #[serde(rename = "GameObject")]
    game_object: Option<GameObjectBody>,
    #[serde(rename = "Transform")]
    transform: Option<TransformBody>,
}

/// Recover objects from a Unity scene, in document order.
///
/// Documents other than GameObject and Transform are skipped.
pub fn parse_unity_scene(document: &str) -> Result<SceneSpec, SceneError> {
    let mut names: Vec<(u64, String)> = Vec::new();
    let mut transforms: HashMap<u64, TransformBody> = HashMap::new();

    for (header, body) in split_documents(document) {
        let file_id = parse_header(header)?;
        let doc: UnityDocument = serde_yaml::from_str(&body)?;

        if let Some(go) = doc.game_object {
            names.push((file_id, go.name));
        }
        if let Some(transform) = doc.transform {
            transforms.insert(transform.game_object.file_id, transform);
        }
    }

    let objects = names
        .into_iter()
        .map(|(id, name)| {
            let t = transforms
                .remove(&id)
                .ok_or_else(|| SceneError::Malformed(format!("GameObject &{id} has no Transform")))?;
            Ok(SceneObject {
                name,
                position: t.position,
                rotation: t.rotation,
                scale: t.scale,
            })
        })
        .collect::<Result<Vec<_>, SceneError>>()?;

    Ok(SceneSpec::new(objects))
}

/// Documents as (header after the marker, body) pairs.
///
/// Only lines beginning with the marker start a document; the preamble before
/// the first one is dropped.
fn split_documents(document: &str) -> Vec<(&str, String)> {
    let mut docs: Vec<(&str, String)> = Vec::new();
    for line in document.lines() {
        if let Some(header) = line.strip_prefix(DOCUMENT_MARKER) {
            docs.push((header, String::new()));
        } else if let Some((_, body)) = docs.last_mut() {
            body.push_str(line);
            body.push('\n');
        }
    }
    docs
}

/// `29 &1` → 1
fn parse_header(header: &str) -> Result<u64, SceneError> {
    header
        .split_once('&')
        .and_then(|(_, id)| id.split_whitespace().next())
        .and_then(|id| id.parse().ok())
        .ok_or_else(|| SceneError::Malformed(format!("bad document header '{header}'")))
}
