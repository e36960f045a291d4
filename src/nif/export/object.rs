//! Scene hierarchy: one node per host object, the single-root rule and
//! bounding boxes.

use glam::{Mat3, Vec3};
use tracing::debug;

use super::{armature, create_with, geometry};
use crate::nif::error::{skip_unsupported, ExportError, Result};
use crate::nif::host::{HostObject, HostScene, ObjectKind};
use crate::nif::names::full_name;
use crate::nif::registry::SourceKey;
use crate::nif::session::ExportSession;
use crate::nif::types::{
    BlockData, BlockKind, BlockRef, BoundingBox, BoundingVolume, Matrix3x3, NiTransform, Vector3,
};
use crate::nif::version::Game;

/// Name of the container node used when the scene has several top-level objects.
pub const SCENE_ROOT: &str = "Scene Root";

/// Extra data name the Bethesda engines look up for the bounding box.
pub const BETHESDA_BOUND: &str = "BBX";

/// Exports every hierarchy object and returns the document root. A single
/// top-level object is the root itself; several get a `Scene Root` node.
pub fn export_hierarchy(session: &mut ExportSession, scene: &HostScene) -> Result<BlockRef> {
    let top: Vec<&HostObject> = scene
        .top_level()
        .filter(|obj| obj.is_hierarchy_node())
        .collect();
    match top.as_slice() {
        [] => Err(ExportError::missing(
            scene_label(scene),
            "the scene has no objects to export",
        )),
        [only] => export_object(session, scene, only, None),
        many => {
            debug!("{} top-level objects, adding '{}'", many.len(), SCENE_ROOT);
            let flags = session.game().default_node_flags();
            let root = create_node(
                session,
                BlockKind::NiNode,
                SCENE_ROOT,
                NiTransform::default(),
                flags,
                None,
            )?;
            for obj in many {
                export_object(session, scene, obj, Some(root))?;
            }
            Ok(root)
        }
    }
}

/// Depth-first export of `obj` and its hierarchy children below `parent`.
fn export_object(
    session: &mut ExportSession,
    scene: &HostScene,
    obj: &HostObject,
    parent: Option<BlockRef>,
) -> Result<BlockRef> {
    let name = full_name(&obj.name, obj.longname.as_deref());
    let transform = obj.transform.to_ni(&name);
    let flags = node_flags(session, obj);
    let children: Vec<&HostObject> = scene
        .children_of(&obj.name)
        .filter(|child| child.is_hierarchy_node())
        .collect();

    let block = match &obj.mesh {
        Some(mesh) if obj.kind == ObjectKind::Mesh => geometry::export_mesh(
            session,
            scene,
            obj,
            mesh,
            &name,
            transform,
            flags,
            !children.is_empty(),
        )?,
        _ => {
            let kind = node_kind(session, obj)?;
            create_node(
                session,
                kind,
                &name,
                transform,
                flags,
                Some(SourceKey::object(&obj.name)),
            )?
        }
    };
    if let Some(parent) = parent {
        session.registry.add_child(parent, block)?;
    }

    if obj.kind == ObjectKind::Armature {
        armature::export_bones(session, obj, block)?;
    }
    for child in children {
        // Objects parented to a bone hang below that bone's node.
        let parent_block = match &child.parent_bone {
            Some(bone) => session
                .registry
                .lookup_block_for(&SourceKey::bone(&obj.name, bone))?,
            None => block,
        };
        export_object(session, scene, child, Some(parent_block))?;
    }
    Ok(block)
}

fn node_kind(session: &ExportSession, obj: &HostObject) -> Result<BlockKind> {
    match obj.node_type.as_deref() {
        Some(tag) => {
            let kind: BlockKind = tag.parse()?;
            if kind.is_node() {
                Ok(kind)
            } else {
                Err(ExportError::UnknownBlockType(tag.to_string()))
            }
        }
        None if session.config.bs_animation_node && session.game() == Game::Morrowind => {
            Ok(BlockKind::NiBSAnimationNode)
        }
        None => Ok(BlockKind::NiNode),
    }
}

/// The object's own flags, or the game's default when it has none.
pub(crate) fn node_flags(session: &ExportSession, obj: &HostObject) -> u16 {
    if obj.flags != 0 {
        obj.flags
    } else {
        session.game().default_node_flags()
    }
}

/// Registers a node-like block (any kind with an `NiAVObject` base).
pub(crate) fn create_node(
    session: &mut ExportSession,
    kind: BlockKind,
    name: &str,
    transform: NiTransform,
    flags: u16,
    key: Option<SourceKey>,
) -> Result<BlockRef> {
    create_with(session, kind, key, |block| {
        if let Some(av) = block.av_object_mut() {
            av.name = name.to_string();
            av.flags = flags;
            av.transform = transform;
        }
    })
}

fn scene_label(scene: &HostScene) -> &str {
    if scene.name.is_empty() {
        "scene"
    } else {
        &scene.name
    }
}

// --- Bounding boxes ---

/// Turns every `bound` helper into a bounding volume on its parent (or
/// the root when it has none).
pub fn export_bounding_boxes(
    session: &mut ExportSession,
    scene: &HostScene,
    root: BlockRef,
) -> Result<()> {
    for obj in scene.objects.iter().filter(|obj| obj.is_bounding_box()) {
        let owner = obj
            .parent
            .as_deref()
            .and_then(|p| session.registry.try_lookup_block_for(&SourceKey::object(p)))
            .unwrap_or(root);
        skip_unsupported(export_bounding_box(session, obj, owner))?;
    }
    Ok(())
}

fn export_bounding_box(session: &mut ExportSession, obj: &HostObject, owner: BlockRef) -> Result<()> {
    let bounds = box_bounds(obj);
    match session.game() {
        Game::Morrowind => {
            let flags = session.game().default_node_flags();
            let node = create_with(session, BlockKind::NiNode, None, |block| {
                if let Some(av) = block.av_object_mut() {
                    av.name = "Bounding Box".to_string();
                    av.flags = flags;
                    av.bounding_volume = Some(BoundingVolume::Box(bounds));
                }
            })?;
            session.registry.add_child(owner, node)
        }
        game if game.is_bethesda() => {
            let bound = create_with(session, BlockKind::BSBound, None, |block| {
                if let BlockData::BSBound(bs) = &mut block.data {
                    bs.name = BETHESDA_BOUND.to_string();
                    bs.center = bounds.center;
                    bs.dimensions = bounds.extent;
                }
            })?;
            session.registry.add_extra_data(owner, bound)
        }
        game => Err(ExportError::unsupported(
            &obj.name,
            format!("bounding box export for {game}"),
        )),
    }
}

/// Box of the helper's mesh in its parent's space. Without a mesh the
/// helper is a unit cube scaled by its transform.
fn box_bounds(obj: &HostObject) -> BoundingBox {
    let (min, max) = match &obj.mesh {
        Some(mesh) if !mesh.vertices.is_empty() => mesh.bounds(),
        _ => (Vec3::splat(-1.0), Vec3::ONE),
    };
    let scale = Vec3::from_array(obj.transform.scale);
    let rotation = obj.transform.rotation();
    let local_center = (min + max) * 0.5 * scale;
    BoundingBox {
        center: Vector3::from(Vec3::from_array(obj.transform.translation) + rotation * local_center),
        axes: Matrix3x3::from(Mat3::from_quat(rotation)),
        extent: Vector3::from((max - min) * 0.5 * scale),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nif::host::HostTransform;

    fn empty(name: &str, parent: Option<&str>) -> HostObject {
        HostObject {
            name: name.into(),
            parent: parent.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn bone_parented_children_hang_below_the_bone() {
        let mut session = ExportSession::for_game(Game::Oblivion);
        let mut armature = empty("Skeleton", None);
        armature.kind = ObjectKind::Armature;
        armature.bones = vec![crate::nif::host::HostBone {
            name: "Bip01".into(),
            ..Default::default()
        }];
        let mut sword = empty("Sword", Some("Skeleton"));
        sword.parent_bone = Some("Bip01".into());
        let scene = HostScene {
            objects: vec![armature, sword],
            ..Default::default()
        };

        let root = export_hierarchy(&mut session, &scene).unwrap();
        let bone = session
            .registry
            .lookup_block_for(&SourceKey::bone("Skeleton", "Bip01"))
            .unwrap();
        let sword = session
            .registry
            .lookup_block_for(&SourceKey::object("Sword"))
            .unwrap();
        let BlockData::Node(bone_node) = &session.registry[bone].data else {
            panic!("bone is not a node");
        };
        assert_eq!(bone_node.children, vec![sword]);
        assert_eq!(session.registry[root].name(), "Skeleton");
    }

    #[test]
    fn node_types_must_be_node_classes() {
        let mut session = ExportSession::for_game(Game::Oblivion);
        let mut obj = empty("Sign", None);
        obj.node_type = Some("NiBillboardNode".into());
        let scene = HostScene {
            objects: vec![obj.clone()],
            ..Default::default()
        };
        let root = export_hierarchy(&mut session, &scene).unwrap();
        assert_eq!(session.registry[root].kind, BlockKind::NiBillboardNode);

        let mut session = ExportSession::for_game(Game::Oblivion);
        obj.node_type = Some("NiMaterialProperty".into());
        let scene = HostScene {
            objects: vec![obj],
            ..Default::default()
        };
        assert!(matches!(
            export_hierarchy(&mut session, &scene),
            Err(ExportError::UnknownBlockType(tag)) if tag == "NiMaterialProperty"
        ));
    }

    #[test]
    fn default_flags_follow_the_game() {
        let mut session = ExportSession::for_game(Game::Morrowind);
        let scene = HostScene {
            objects: vec![empty("Root", None)],
            ..Default::default()
        };
        let root = export_hierarchy(&mut session, &scene).unwrap();
        assert_eq!(session.registry[root].av_object().unwrap().flags, 0x000C);
    }

    #[test]
    fn morrowind_bounding_boxes_become_nodes() {
        let mut session = ExportSession::for_game(Game::Morrowind);
        let mut bound = empty("BoundingBox", Some("Root"));
        bound.transform = HostTransform {
            translation: [0.0, 0.0, 2.0],
            scale: [3.0; 3],
            ..Default::default()
        };
        let scene = HostScene {
            objects: vec![empty("Root", None), bound],
            ..Default::default()
        };
        let root = export_hierarchy(&mut session, &scene).unwrap();
        export_bounding_boxes(&mut session, &scene, root).unwrap();

        let BlockData::Node(node) = &session.registry[root].data else {
            panic!("root is not a node");
        };
        let bbox = &session.registry[node.children[0]];
        assert_eq!(bbox.name(), "Bounding Box");
        let Some(BoundingVolume::Box(bx)) = bbox.av_object().unwrap().bounding_volume else {
            panic!("no bounding box");
        };
        assert_eq!(bx.center, Vector3([0.0, 0.0, 2.0]));
        assert_eq!(bx.extent, Vector3([3.0; 3]));
    }

    #[test]
    fn bethesda_bounding_boxes_become_extra_data() {
        let mut session = ExportSession::for_game(Game::Oblivion);
        let scene = HostScene {
            objects: vec![empty("Root", None), empty("Bounds", Some("Root"))],
            ..Default::default()
        };
        let root = export_hierarchy(&mut session, &scene).unwrap();
        export_bounding_boxes(&mut session, &scene, root).unwrap();
        let extra: Vec<BlockRef> = session.registry[root].net().unwrap().extra_data.iter().collect();
        assert_eq!(extra.len(), 1);
        assert_eq!(session.registry[extra[0]].kind, BlockKind::BSBound);
        assert_eq!(session.registry[extra[0]].name(), BETHESDA_BOUND);
    }

    #[test]
    fn other_games_skip_bounding_boxes() {
        let mut session = ExportSession::for_game(Game::Civilization4);
        let scene = HostScene {
            objects: vec![empty("Root", None), empty("Bounds", Some("Root"))],
            ..Default::default()
        };
        let root = export_hierarchy(&mut session, &scene).unwrap();
        export_bounding_boxes(&mut session, &scene, root).unwrap();
        assert_eq!(session.registry.len(), 1);
    }
}
