//! Meshes: one `NiTriShape` per material group, with its data, properties
//! and skin.

use std::collections::HashMap;

use tracing::warn;

use super::object::create_node;
use super::{armature, create_with, material};
use crate::nif::error::{ExportError, Result};
use crate::nif::host::{HostMesh, HostObject, HostScene, ObjectKind};
use crate::nif::registry::SourceKey;
use crate::nif::session::ExportSession;
use crate::nif::types::{
    BlockData, BlockKind, BlockRef, NiTransform, NiTriShapeData, Vector2, Vector3,
};

/// `CT_STATIC`: the data never changes after load.
pub const CONSISTENCY_STATIC: u16 = 0x4000;

/// Exports the mesh of `obj`. A single-material mesh without hierarchy
/// children is a bare shape; anything else is a node with one shape per
/// material group, named `name:index`.
#[allow(clippy::too_many_arguments)]
pub fn export_mesh(
    session: &mut ExportSession,
    scene: &HostScene,
    obj: &HostObject,
    mesh: &HostMesh,
    name: &str,
    transform: NiTransform,
    flags: u16,
    has_children: bool,
) -> Result<BlockRef> {
    let groups = mesh.material_groups();
    let key = Some(SourceKey::object(&obj.name));
    if groups.len() <= 1 && !has_children {
        let group = groups.first().copied().unwrap_or(0);
        return export_shape(session, scene, obj, mesh, group, name, transform, flags, key);
    }

    let node = create_node(session, BlockKind::NiNode, name, transform, flags, key)?;
    for (i, group) in groups.into_iter().enumerate() {
        let shape = export_shape(
            session,
            scene,
            obj,
            mesh,
            group,
            &format!("{name}:{i}"),
            NiTransform::default(),
            flags,
            None,
        )?;
        session.registry.add_child(node, shape)?;
    }
    Ok(node)
}

#[allow(clippy::too_many_arguments)]
fn export_shape(
    session: &mut ExportSession,
    scene: &HostScene,
    obj: &HostObject,
    mesh: &HostMesh,
    group: usize,
    name: &str,
    transform: NiTransform,
    flags: u16,
    key: Option<SourceKey>,
) -> Result<BlockRef> {
    let (data, remap) = shape_data(obj, mesh, group)?;
    let armature = skinning_armature(scene, obj).filter(|_| !mesh.vertex_groups.is_empty());
    let vertices = armature.map(|_| data.vertices.clone()).unwrap_or_default();

    let data_ref = create_with(session, BlockKind::NiTriShapeData, None, |block| {
        if let BlockData::TriShapeData(d) = &mut block.data {
            *d = data;
        }
    })?;
    let shape = create_with(session, BlockKind::NiTriShape, key, |block| {
        if let BlockData::TriShape(geometry) = &mut block.data {
            geometry.name = name.to_string();
            geometry.flags = flags;
            geometry.transform = transform;
            geometry.data = Some(data_ref);
        }
    })?;

    match obj.material_slots.get(group) {
        Some(slot) => match scene.material(slot) {
            Some(host_material) => {
                for property in material::export_material(session, scene, host_material)? {
                    material::attach(session, shape, property)?;
                }
            }
            None => warn!("{}: material '{}' not found", obj.name, slot),
        },
        None if !obj.material_slots.is_empty() => {
            warn!("{}: no material in slot {}", obj.name, group)
        }
        None => {}
    }

    if let Some(armature) = armature {
        armature::export_skin(
            session,
            obj,
            armature,
            &mesh.vertex_groups,
            &remap,
            &vertices,
            shape,
        )?;
    }
    Ok(shape)
}

/// Vertices, normals, UVs and triangles of one material group, with the
/// map from host vertex index to shape vertex index.
fn shape_data(
    obj: &HostObject,
    mesh: &HostMesh,
    group: usize,
) -> Result<(NiTriShapeData, HashMap<u32, u16>)> {
    let with_normals = mesh.normals.len() == mesh.vertices.len();
    let with_uvs = !mesh.uvs.is_empty() && mesh.uvs.len() == mesh.vertices.len();
    if !mesh.normals.is_empty() && !with_normals {
        warn!("{}: normal count does not match vertex count, dropping normals", obj.name);
    }

    let mut data = NiTriShapeData::default();
    let mut uvs = Vec::new();
    let mut remap: HashMap<u32, u16> = HashMap::new();
    for triangle in mesh.triangles.iter().filter(|t| t.material == group) {
        let mut indices = [0u16; 3];
        for (slot, &index) in indices.iter_mut().zip(triangle.indices.iter()) {
            if let Some(&local) = remap.get(&index) {
                *slot = local;
                continue;
            }
            let vertex = mesh.vertices.get(index as usize).ok_or_else(|| {
                ExportError::malformed(
                    &obj.name,
                    format!(
                        "triangle uses vertex {} but the mesh has {}",
                        index,
                        mesh.vertices.len()
                    ),
                )
            })?;
            let local = u16::try_from(data.vertices.len()).map_err(|_| {
                ExportError::malformed(
                    &obj.name,
                    format!("material group {group} has more than {} vertices", u16::MAX),
                )
            })?;
            remap.insert(index, local);
            data.vertices.push(Vector3(*vertex));
            if with_normals {
                data.normals.push(Vector3(mesh.normals[index as usize]));
            }
            if with_uvs {
                uvs.push(Vector2(mesh.uvs[index as usize]));
            }
            *slot = local;
        }
        data.triangles.push(indices);
    }
    if with_uvs {
        data.uv_sets.push(uvs);
    }
    data.consistency_flags = CONSISTENCY_STATIC;
    data.update_bound();
    Ok((data, remap))
}

/// The armature a mesh is skinned to: its parent, when that is an armature
/// and the mesh is not attached to a single bone.
fn skinning_armature<'a>(scene: &'a HostScene, obj: &HostObject) -> Option<&'a HostObject> {
    if obj.parent_bone.is_some() {
        return None;
    }
    obj.parent
        .as_deref()
        .and_then(|parent| scene.object(parent))
        .filter(|parent| parent.kind == ObjectKind::Armature)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nif::host::{HostMaterial, HostTriangle};
    use crate::nif::version::Game;

    fn quad(materials: [usize; 2]) -> HostMesh {
        HostMesh {
            vertices: vec![
                [0.0, 0.0, 0.0],
                [1.0, 0.0, 0.0],
                [1.0, 1.0, 0.0],
                [0.0, 1.0, 0.0],
            ],
            uvs: vec![[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]],
            triangles: vec![
                HostTriangle {
                    indices: [0, 1, 2],
                    material: materials[0],
                },
                HostTriangle {
                    indices: [0, 2, 3],
                    material: materials[1],
                },
            ],
            ..Default::default()
        }
    }

    fn mesh_object(mesh: HostMesh, slots: &[&str]) -> HostObject {
        HostObject {
            name: "Plane".into(),
            kind: ObjectKind::Mesh,
            mesh: Some(mesh),
            material_slots: slots.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn single_group_is_a_bare_shape() {
        let mut session = ExportSession::for_game(Game::Oblivion);
        let obj = mesh_object(quad([0, 0]), &[]);
        let scene = HostScene::default();
        let shape = export_mesh(
            &mut session,
            &scene,
            &obj,
            obj.mesh.as_ref().unwrap(),
            "Plane",
            NiTransform::default(),
            0x000E,
            false,
        )
        .unwrap();

        assert_eq!(session.registry[shape].kind, BlockKind::NiTriShape);
        let BlockData::TriShape(geometry) = &session.registry[shape].data else {
            panic!("not a shape");
        };
        let BlockData::TriShapeData(data) = &session.registry[geometry.data.unwrap()].data else {
            panic!("not shape data");
        };
        assert_eq!(data.vertices.len(), 4);
        assert_eq!(data.triangles, vec![[0, 1, 2], [0, 2, 3]]);
        assert_eq!(data.uv_sets.len(), 1);
        assert!(data.normals.is_empty());
        assert_eq!(data.consistency_flags, CONSISTENCY_STATIC);
    }

    #[test]
    fn material_groups_split_into_named_shapes() {
        let mut session = ExportSession::for_game(Game::Oblivion);
        let obj = mesh_object(quad([0, 1]), &["Red", "Blue"]);
        let scene = HostScene {
            materials: vec![
                HostMaterial {
                    name: "Red".into(),
                    diffuse_color: [1.0, 0.0, 0.0],
                    ..Default::default()
                },
                HostMaterial {
                    name: "Blue".into(),
                    diffuse_color: [0.0, 0.0, 1.0],
                    ..Default::default()
                },
            ],
            ..Default::default()
        };
        let node = export_mesh(
            &mut session,
            &scene,
            &obj,
            obj.mesh.as_ref().unwrap(),
            "Plane",
            NiTransform::default(),
            0x000E,
            false,
        )
        .unwrap();

        let BlockData::Node(parent) = &session.registry[node].data else {
            panic!("not a node");
        };
        assert_eq!(parent.children.len(), 2);
        assert_eq!(session.registry[parent.children[0]].name(), "Plane:0");
        assert_eq!(session.registry[parent.children[1]].name(), "Plane:1");
        let second = session.registry[parent.children[1]].av_object().unwrap();
        assert_eq!(second.properties.len(), 1);

        let BlockData::TriShape(geometry) = &session.registry[parent.children[1]].data else {
            panic!("not a shape");
        };
        let BlockData::TriShapeData(data) = &session.registry[geometry.data.unwrap()].data else {
            panic!("not shape data");
        };
        // Host vertices 0, 2, 3 renumbered in first-use order.
        assert_eq!(data.triangles, vec![[0, 1, 2]]);
        assert_eq!(data.vertices[2], Vector3([0.0, 1.0, 0.0]));
    }

    #[test]
    fn out_of_range_indices_are_malformed() {
        let mut session = ExportSession::for_game(Game::Oblivion);
        let mut mesh = quad([0, 0]);
        mesh.triangles[1].indices = [0, 2, 40];
        let obj = mesh_object(mesh, &[]);
        let err = export_mesh(
            &mut session,
            &HostScene::default(),
            &obj,
            obj.mesh.as_ref().unwrap(),
            "Plane",
            NiTransform::default(),
            0,
            false,
        )
        .unwrap_err();
        assert!(matches!(err, ExportError::MalformedSourceData { .. }));
        assert!(session.registry.is_empty());
    }
}
