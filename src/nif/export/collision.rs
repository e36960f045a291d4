//! Havok collision for Bethesda targets: a collision object on the helper's
//! parent node, its rigid body and a primitive shape.

use glam::{Mat4, Vec3};

use super::create_with;
use crate::nif::error::{skip_unsupported, ExportError, Result};
use crate::nif::host::{CollisionShape, HostObject, HostRigidBody, HostScene};
use crate::nif::registry::SourceKey;
use crate::nif::session::ExportSession;
use crate::nif::types::collision::LAYER_ANIM_STATIC;
use crate::nif::types::{
    BhkRigidBody, BhkShape, BlockData, BlockKind, BlockRef, HavokFilter, Vector3, Vector4,
};

/// Collision filter value that keeps an animated static body passive.
const PASSIVE_FILTER: u8 = 128;

/// Exports every rigid-body helper. Helpers the target cannot hold are
/// skipped with a warning.
pub fn export_collisions(session: &mut ExportSession, scene: &HostScene) -> Result<()> {
    for obj in &scene.objects {
        if let Some(body) = &obj.rigid_body {
            skip_unsupported(export_collision(session, obj, body))?;
        }
    }
    Ok(())
}

fn export_collision(
    session: &mut ExportSession,
    obj: &HostObject,
    body: &HostRigidBody,
) -> Result<BlockRef> {
    let game = session.game();
    if !game.supports_havok() {
        return Err(ExportError::unsupported(
            &obj.name,
            format!("Havok collision for {game}"),
        ));
    }
    let parent = obj.parent.as_deref().ok_or_else(|| {
        ExportError::unsupported(&obj.name, "collision without a parent node")
    })?;
    let owner = session
        .registry
        .lookup_block_for(&SourceKey::object(parent))?;
    let occupied = session.registry[owner]
        .av_object()
        .map(|av| av.collision_object.is_some())
        .ok_or_else(|| ExportError::unsupported(&obj.name, "collision on a non-node parent"))?;
    if occupied {
        return Err(ExportError::unsupported(
            &obj.name,
            "a second collision object on one node",
        ));
    }

    let havok_scale = game.havok_scale();
    let (min, max) = match &obj.mesh {
        Some(mesh) if !mesh.vertices.is_empty() => mesh.bounds(),
        _ => (Vec3::splat(-1.0), Vec3::ONE),
    };
    let scale = obj.transform.scale[0];
    let mesh_center = (min + max) * 0.5;
    let half_extents = (max - min) * 0.5 * scale / havok_scale;
    let local_center = mesh_center * scale;
    let shape = export_shape(session, obj, body, half_extents, local_center, havok_scale)?;

    // Primitive shapes are centred on the body, so the mesh centre moves
    // into the body transform.
    let placement = obj.transform.matrix() * Mat4::from_translation(mesh_center);
    let (_, rotation, translation) = placement.to_scale_rotation_translation();
    let transformed = translation.length() > f32::EPSILON || !rotation.is_near_identity();
    let body_kind = if transformed {
        BlockKind::BhkRigidBodyT
    } else {
        BlockKind::BhkRigidBody
    };

    let key = SourceKey::collision(&obj.name);
    let flags = if body.layer == LAYER_ANIM_STATIC && body.col_filter != PASSIVE_FILTER {
        41
    } else {
        1
    };
    let collision = create_with(
        session,
        BlockKind::BhkCollisionObject,
        Some(key.clone()),
        |block| {
            if let BlockData::CollisionObject(c) = &mut block.data {
                c.flags = flags;
                c.target = Some(owner);
            }
        },
    )?;
    let rigid_body = create_with(session, body_kind, Some(key), |block| {
        if let BlockData::RigidBody(rb) = &mut block.data {
            *rb = BhkRigidBody {
                shape: Some(shape),
                havok_filter: HavokFilter {
                    layer: body.layer,
                    flags: body.col_filter,
                    group: 0,
                },
                translation: Vector4::from_vec3(translation / havok_scale),
                rotation,
                inertia: box_inertia(body.mass, half_extents),
                mass: body.mass,
                linear_damping: body.linear_damping,
                angular_damping: body.angular_damping,
                friction: body.friction,
                restitution: body.restitution,
                max_linear_velocity: body.max_linear_velocity,
                max_angular_velocity: body.max_angular_velocity,
                penetration_depth: body.penetration_depth,
                motion_system: body.motion_system,
                deactivator_type: body.deactivator_type,
                solver_deactivation: body.solver_deactivation,
                quality_type: body.quality_type,
                body_flags: body.body_flags,
                ..BhkRigidBody::default()
            };
        }
    })?;

    if let BlockData::CollisionObject(c) = &mut session.registry[collision].data {
        c.body = Some(rigid_body);
    }
    if let Some(av) = session.registry[owner].av_object_mut() {
        av.collision_object = Some(collision);
    }
    Ok(rigid_body)
}

fn export_shape(
    session: &mut ExportSession,
    obj: &HostObject,
    body: &HostRigidBody,
    half_extents: Vec3,
    local_center: Vec3,
    havok_scale: f32,
) -> Result<BlockRef> {
    let material = body.material;
    let radius = body.margin;
    let (kind, shape) = match body.shape {
        CollisionShape::Box => (
            BlockKind::BhkBoxShape,
            BhkShape::Box {
                material,
                radius,
                dimensions: Vector3::from(half_extents),
            },
        ),
        CollisionShape::Sphere => (
            BlockKind::BhkSphereShape,
            BhkShape::Sphere {
                material,
                radius: half_extents.max_element(),
            },
        ),
        CollisionShape::Capsule => (BlockKind::BhkCapsuleShape, capsule(material, half_extents)),
        CollisionShape::ConvexHull => (
            BlockKind::BhkConvexVerticesShape,
            convex_hull(obj, material, radius, local_center, havok_scale)?,
        ),
        CollisionShape::Mesh => {
            return Err(ExportError::unsupported(
                &obj.name,
                "triangle mesh collision (MOPP)",
            ));
        }
    };
    create_with(session, kind, None, |block| block.data = BlockData::Shape(shape))
}

/// Capsule along the longest axis, as wide as the larger of the other two.
fn capsule(material: u32, half_extents: Vec3) -> BhkShape {
    let axis = (0..3)
        .max_by(|a, b| half_extents[*a].total_cmp(&half_extents[*b]))
        .unwrap_or(2);
    let radius = (0..3)
        .filter(|i| *i != axis)
        .map(|i| half_extents[i])
        .fold(0.0, f32::max);
    let mut end = Vec3::ZERO;
    end[axis] = (half_extents[axis] - radius).max(0.0);
    BhkShape::Capsule {
        material,
        radius,
        first_point: Vector3::from(-end),
        radius1: radius,
        second_point: Vector3::from(end),
        radius2: radius,
    }
}

/// Hull of the helper's vertices around the mesh centre. Normals are the
/// face planes, `w` holding the plane distance.
fn convex_hull(
    obj: &HostObject,
    material: u32,
    radius: f32,
    local_center: Vec3,
    havok_scale: f32,
) -> Result<BhkShape> {
    let mesh = obj
        .mesh
        .as_ref()
        .filter(|mesh| !mesh.vertices.is_empty())
        .ok_or_else(|| ExportError::malformed(&obj.name, "convex hull collision needs a mesh"))?;
    let scale = obj.transform.scale[0];
    let to_havok = |v: &[f32; 3]| (Vec3::from_array(*v) * scale - local_center) / havok_scale;

    let vertices: Vec<Vector4> = mesh
        .vertices
        .iter()
        .map(|v| Vector4::from_vec3(to_havok(v)))
        .collect();
    let mut normals: Vec<Vector4> = Vec::new();
    for triangle in &mesh.triangles {
        let corners = triangle
            .indices
            .map(|i| mesh.vertices.get(i as usize).map(to_havok));
        let [Some(a), Some(b), Some(c)] = corners else {
            return Err(ExportError::malformed(
                &obj.name,
                "triangle uses a vertex the mesh does not have",
            ));
        };
        let Some(normal) = (b - a).cross(c - a).try_normalize() else {
            continue;
        };
        let plane = Vector4([normal.x, normal.y, normal.z, -normal.dot(a)]);
        let known = normals.iter().any(|n| {
            n.0.iter()
                .zip(plane.0.iter())
                .all(|(p, q)| (p - q).abs() < 1e-4)
        });
        if !known {
            normals.push(plane);
        }
    }
    Ok(BhkShape::ConvexVertices {
        material,
        radius,
        vertices,
        normals,
    })
}

/// Solid box inertia tensor, rows padded to four.
fn box_inertia(mass: f32, half_extents: Vec3) -> [[f32; 4]; 3] {
    let sq = half_extents * half_extents;
    let k = mass / 3.0;
    [
        [k * (sq.y + sq.z), 0.0, 0.0, 0.0],
        [0.0, k * (sq.x + sq.z), 0.0, 0.0],
        [0.0, 0.0, k * (sq.x + sq.y), 0.0],
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nif::host::{HostMesh, HostTransform, HostTriangle};
    use crate::nif::version::Game;

    fn cube() -> HostMesh {
        let vertices = vec![
            [-1.0, -1.0, -1.0],
            [1.0, -1.0, -1.0],
            [1.0, 1.0, -1.0],
            [-1.0, 1.0, -1.0],
            [-1.0, -1.0, 1.0],
            [1.0, -1.0, 1.0],
            [1.0, 1.0, 1.0],
            [-1.0, 1.0, 1.0],
        ];
        let faces = [
            [0, 2, 1],
            [0, 3, 2],
            [4, 5, 6],
            [4, 6, 7],
            [0, 1, 5],
            [0, 5, 4],
            [2, 3, 7],
            [2, 7, 6],
            [1, 2, 6],
            [1, 6, 5],
            [0, 4, 7],
            [0, 7, 3],
        ];
        HostMesh {
            vertices,
            triangles: faces
                .iter()
                .map(|indices| HostTriangle {
                    indices: *indices,
                    material: 0,
                })
                .collect(),
            ..Default::default()
        }
    }

    fn setup(game: Game, shape: CollisionShape) -> (ExportSession, HostScene, BlockRef) {
        let mut session = ExportSession::for_game(game);
        let owner = session
            .create(BlockKind::NiNode, Some(SourceKey::object("Crate")))
            .unwrap();
        let scene = HostScene {
            objects: vec![HostObject {
                name: "CrateCollision".into(),
                parent: Some("Crate".into()),
                mesh: Some(cube()),
                rigid_body: Some(HostRigidBody {
                    shape,
                    ..Default::default()
                }),
                ..Default::default()
            }],
            ..Default::default()
        };
        (session, scene, owner)
    }

    #[test]
    fn box_collision_wires_object_body_and_shape() {
        let (mut session, scene, owner) = setup(Game::Oblivion, CollisionShape::Box);
        export_collisions(&mut session, &scene).unwrap();

        let collision = session.registry[owner]
            .av_object()
            .unwrap()
            .collision_object
            .unwrap();
        let BlockData::CollisionObject(c) = &session.registry[collision].data else {
            panic!("not a collision object");
        };
        assert_eq!(c.target, Some(owner));
        assert_eq!(c.flags, 1);
        let body = c.body.unwrap();
        assert_eq!(session.registry[body].kind, BlockKind::BhkRigidBody);
        assert_eq!(
            session.registry.lookup_block_for(&SourceKey::collision("CrateCollision")).unwrap(),
            body
        );
        let BlockData::RigidBody(rb) = &session.registry[body].data else {
            panic!("not a rigid body");
        };
        let BlockData::Shape(BhkShape::Box { dimensions, .. }) =
            &session.registry[rb.shape.unwrap()].data
        else {
            panic!("not a box");
        };
        assert!((dimensions.0[0] - 1.0 / 7.0).abs() < 1e-6);
    }

    #[test]
    fn moved_helpers_use_transformed_bodies() {
        let (mut session, mut scene, _) = setup(Game::Skyrim, CollisionShape::Sphere);
        scene.objects[0].transform = HostTransform {
            translation: [0.0, 0.0, 70.0],
            ..Default::default()
        };
        export_collisions(&mut session, &scene).unwrap();
        let (_, body) = session.registry.iter_kind(BlockKind::BhkRigidBodyT).next().unwrap();
        let BlockData::RigidBody(rb) = &body.data else {
            panic!("not a rigid body");
        };
        assert!((rb.translation.0[2] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn convex_hulls_carry_face_planes() {
        let (mut session, scene, _) = setup(Game::Oblivion, CollisionShape::ConvexHull);
        export_collisions(&mut session, &scene).unwrap();
        let (_, shape) = session
            .registry
            .iter_kind(BlockKind::BhkConvexVerticesShape)
            .next()
            .unwrap();
        let BlockData::Shape(BhkShape::ConvexVertices { vertices, normals, .. }) = &shape.data
        else {
            panic!("not a convex shape");
        };
        assert_eq!(vertices.len(), 8);
        assert_eq!(normals.len(), 6);
        assert!(normals.iter().all(|n| (n.0[3] + 1.0 / 7.0).abs() < 1e-5));
    }

    #[test]
    fn unsupported_targets_and_shapes_are_skipped() {
        let (mut session, scene, _) = setup(Game::Morrowind, CollisionShape::Box);
        export_collisions(&mut session, &scene).unwrap();
        assert_eq!(session.registry.len(), 1);

        let (mut session, scene, _) = setup(Game::Oblivion, CollisionShape::Mesh);
        export_collisions(&mut session, &scene).unwrap();
        assert_eq!(session.registry.len(), 1);
    }
}
