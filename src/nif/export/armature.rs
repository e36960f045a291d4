//! Armatures: bone nodes below the armature node, and the skin blocks that
//! bind a mesh to them.

use std::collections::HashMap;

use glam::Vec3;
use tracing::{debug, warn};

use super::create_with;
use super::object::create_node;
use crate::nif::error::{ExportError, Result};
use crate::nif::host::{ni_transform_from_matrix, HostBone, HostObject, HostVertexGroup};
use crate::nif::names::full_name;
use crate::nif::registry::SourceKey;
use crate::nif::session::ExportSession;
use crate::nif::types::{
    BlockData, BlockKind, BlockRef, BoundingSphere, NiSkinData, NiSkinInstance, SkinBoneData,
    Vector3,
};

/// Exports the bone tree of `armature` as child nodes of `armature_node`.
/// Each bone is registered under `(armature, bone)`.
pub fn export_bones(
    session: &mut ExportSession,
    armature: &HostObject,
    armature_node: BlockRef,
) -> Result<()> {
    let roots: Vec<&HostBone> = armature
        .bones
        .iter()
        .filter(|bone| {
            bone.parent
                .as_deref()
                .is_none_or(|parent| armature.bone(parent).is_none())
        })
        .collect();
    if roots.is_empty() {
        return Err(ExportError::missing(
            &armature.name,
            "armature has no root bone",
        ));
    }
    for root in roots {
        export_bone(session, armature, root, armature_node)?;
    }
    Ok(())
}

fn export_bone(
    session: &mut ExportSession,
    armature: &HostObject,
    bone: &HostBone,
    parent: BlockRef,
) -> Result<BlockRef> {
    let name = full_name(&bone.name, bone.longname.as_deref());
    let flags = session.game().default_node_flags();
    let node = create_node(
        session,
        BlockKind::NiNode,
        &name,
        bone.transform.to_ni(&name),
        flags,
        Some(SourceKey::bone(&armature.name, &bone.name)),
    )?;
    session.registry.add_child(parent, node)?;

    for child in armature
        .bones
        .iter()
        .filter(|b| b.parent.as_deref() == Some(bone.name.as_str()) && b.name != bone.name)
    {
        export_bone(session, armature, child, node)?;
    }
    Ok(node)
}

// --- Skinning ---

/// Binds `shape` to the bones of `armature` its vertex groups name.
///
/// `remap` maps host vertex indices to the shape's own vertex indices and
/// `vertices` holds the shape's vertices, so a mesh split by material gets
/// one skin per shape with only the weights that apply to it.
pub fn export_skin(
    session: &mut ExportSession,
    mesh_obj: &HostObject,
    armature: &HostObject,
    groups: &[HostVertexGroup],
    remap: &HashMap<u32, u16>,
    vertices: &[Vector3],
    shape: BlockRef,
) -> Result<()> {
    let skeleton_root = session
        .registry
        .lookup_block_for(&SourceKey::object(&armature.name))?;
    let mesh_matrix = mesh_obj.transform.matrix();

    let mut bones = Vec::new();
    let mut bone_data = Vec::new();
    for group in groups {
        if armature.bone(&group.name).is_none() {
            debug!("{}: vertex group '{}' is not a bone", mesh_obj.name, group.name);
            continue;
        }
        let bone = session
            .registry
            .try_lookup_block_for(&SourceKey::bone(&armature.name, &group.name))
            .ok_or_else(|| {
                ExportError::missing(
                    &mesh_obj.name,
                    format!(
                        "bone '{}' of armature '{}' was not exported",
                        group.name, armature.name
                    ),
                )
            })?;

        let weights: Vec<(u16, f32)> = group
            .weights
            .iter()
            .filter_map(|(index, weight)| remap.get(index).map(|local| (*local, *weight)))
            .filter(|(_, weight)| *weight > 0.0)
            .collect();
        if weights.is_empty() {
            continue;
        }

        // Skin space is the mesh's own space; each bone maps it into bone space.
        let skin_to_bone = armature.bone_matrix(&group.name).inverse() * mesh_matrix;
        let bound = influence_bound(vertices, &weights, |v| skin_to_bone.transform_point3(v));
        bones.push(bone);
        bone_data.push(SkinBoneData {
            transform: ni_transform_from_matrix(skin_to_bone),
            bound,
            weights,
        });
    }
    if bones.is_empty() {
        warn!(
            "{}: no vertex group matches a bone of '{}', mesh is not skinned",
            mesh_obj.name, armature.name
        );
        return Ok(());
    }

    let data = create_with(session, BlockKind::NiSkinData, None, |block| {
        if let BlockData::SkinData(skin) = &mut block.data {
            *skin = NiSkinData {
                bones: bone_data,
                ..Default::default()
            };
        }
    })?;
    let instance = create_with(session, BlockKind::NiSkinInstance, None, |block| {
        if let BlockData::SkinInstance(skin) = &mut block.data {
            *skin = NiSkinInstance {
                data: Some(data),
                skin_partition: None,
                skeleton_root: Some(skeleton_root),
                bones,
            };
        }
    })?;
    if let BlockData::TriShape(geometry) = &mut session.registry[shape].data {
        geometry.skin_instance = Some(instance);
    }
    Ok(())
}

/// Sphere around the weighted vertices, in bone space.
fn influence_bound(
    vertices: &[Vector3],
    weights: &[(u16, f32)],
    to_bone: impl Fn(Vec3) -> Vec3,
) -> BoundingSphere {
    let points: Vec<Vec3> = weights
        .iter()
        .filter_map(|(index, _)| vertices.get(*index as usize))
        .map(|v| to_bone(Vec3::from_array(v.0)))
        .collect();
    if points.is_empty() {
        return BoundingSphere::default();
    }
    let (min, max) = points.iter().fold(
        (Vec3::splat(f32::MAX), Vec3::splat(f32::MIN)),
        |(min, max), p| (min.min(*p), max.max(*p)),
    );
    let center = (min + max) * 0.5;
    let radius = points
        .iter()
        .map(|p| p.distance(center))
        .fold(0.0, f32::max);
    BoundingSphere {
        center: Vector3::from(center),
        radius,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nif::host::HostTransform;
    use crate::nif::version::Game;

    fn bone(name: &str, parent: Option<&str>, z: f32) -> HostBone {
        HostBone {
            name: name.into(),
            parent: parent.map(str::to_string),
            transform: HostTransform {
                translation: [0.0, 0.0, z],
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn armature() -> HostObject {
        HostObject {
            name: "Armature".into(),
            kind: crate::nif::host::ObjectKind::Armature,
            bones: vec![
                bone("Bip01", None, 0.0),
                bone("Bip01 Spine", Some("Bip01"), 1.0),
                bone("Bip01 Hand.L", Some("Bip01 Spine"), 1.0),
            ],
            ..Default::default()
        }
    }

    #[test]
    fn bones_nest_and_translate_names() {
        let mut session = ExportSession::for_game(Game::Oblivion);
        let armature = armature();
        let node = session
            .create(BlockKind::NiNode, Some(SourceKey::object("Armature")))
            .unwrap();
        export_bones(&mut session, &armature, node).unwrap();

        let hand = session
            .registry
            .lookup_block_for(&SourceKey::bone("Armature", "Bip01 Hand.L"))
            .unwrap();
        assert_eq!(session.registry[hand].name(), "Bip01 L Hand");
        let spine = session
            .registry
            .lookup_block_for(&SourceKey::bone("Armature", "Bip01 Spine"))
            .unwrap();
        let BlockData::Node(spine_node) = &session.registry[spine].data else {
            panic!("spine is not a node");
        };
        assert_eq!(spine_node.children, vec![hand]);
    }

    #[test]
    fn armature_without_bones_is_missing_its_root() {
        let mut session = ExportSession::for_game(Game::Oblivion);
        let node = session.create(BlockKind::NiNode, None).unwrap();
        let empty = HostObject {
            name: "Empty Armature".into(),
            ..Default::default()
        };
        let err = export_bones(&mut session, &empty, node).unwrap_err();
        assert!(matches!(err, ExportError::MissingDependency { .. }));
    }

    #[test]
    fn skin_weights_follow_the_shape_indices() {
        let mut session = ExportSession::for_game(Game::Oblivion);
        let armature = armature();
        let node = session
            .create(BlockKind::NiNode, Some(SourceKey::object("Armature")))
            .unwrap();
        export_bones(&mut session, &armature, node).unwrap();
        let shape = session.create(BlockKind::NiTriShape, None).unwrap();

        let mesh_obj = HostObject {
            name: "Body".into(),
            ..Default::default()
        };
        let groups = vec![
            HostVertexGroup {
                name: "Bip01 Spine".into(),
                weights: vec![(7, 1.0), (9, 0.5)],
            },
            HostVertexGroup {
                name: "Hips".into(),
                weights: vec![(7, 1.0)],
            },
        ];
        // Host vertex 7 became shape vertex 0; vertex 9 is in another shape.
        let remap = HashMap::from([(7u32, 0u16)]);
        let vertices = [Vector3([0.0, 0.0, 1.0])];
        export_skin(&mut session, &mesh_obj, &armature, &groups, &remap, &vertices, shape).unwrap();

        let BlockData::TriShape(geometry) = &session.registry[shape].data else {
            panic!("not a shape");
        };
        let instance = geometry.skin_instance.unwrap();
        let BlockData::SkinInstance(skin) = &session.registry[instance].data else {
            panic!("not a skin instance");
        };
        assert_eq!(skin.skeleton_root, Some(node));
        assert_eq!(skin.bones.len(), 1);
        let BlockData::SkinData(data) = &session.registry[skin.data.unwrap()].data else {
            panic!("not skin data");
        };
        assert_eq!(data.bones[0].weights, vec![(0, 1.0)]);
        // The spine sits one unit up, so the vertex lands on its origin.
        assert!(data.bones[0].bound.center.0[2].abs() < 1e-5);
        assert!((data.bones[0].transform.translation.0[2] + 1.0).abs() < 1e-5);
    }
}
