//! Havok constraints between two exported rigid bodies.

use std::f32::consts::FRAC_PI_4;

use glam::{Mat4, Vec3};

use super::create_with;
use crate::nif::error::{skip_unsupported, ExportError, Result};
use crate::nif::host::{ConstraintKind, HostConstraint, HostObject, HostScene};
use crate::nif::registry::SourceKey;
use crate::nif::session::ExportSession;
use crate::nif::types::{
    BallAndSocketDescriptor, BhkConstraint, BlockData, BlockKind, BlockRef, ConstraintData,
    HingeDescriptor, LimitedHingeDescriptor, PrismaticDescriptor, RagdollDescriptor,
    StiffSpringDescriptor, Vector4,
};

/// Pivot and axes of the constraint, in one entity's Havok space.
#[derive(Debug, Clone, Copy)]
struct LocalFrame {
    pivot: Vector4,
    axle: Vector4,
    perp1: Vector4,
    perp2: Vector4,
}

impl LocalFrame {
    fn new(entity_world: Mat4, constraint_world: Mat4, havok_scale: f32) -> Self {
        let local = entity_world.inverse() * constraint_world;
        let (_, rotation, translation) = local.to_scale_rotation_translation();
        LocalFrame {
            pivot: Vector4::from_vec3(translation / havok_scale),
            axle: Vector4::from_vec3(rotation * Vec3::Z),
            perp1: Vector4::from_vec3(rotation * Vec3::X),
            perp2: Vector4::from_vec3(rotation * Vec3::Y),
        }
    }
}

pub fn export_constraints(session: &mut ExportSession, scene: &HostScene) -> Result<()> {
    if !session.game().supports_havok() {
        return Ok(());
    }
    for obj in &scene.objects {
        if let Some(constraint) = &obj.constraint {
            skip_unsupported(export_constraint(session, scene, obj, constraint))?;
        }
    }
    Ok(())
}

fn export_constraint(
    session: &mut ExportSession,
    scene: &HostScene,
    obj: &HostObject,
    constraint: &HostConstraint,
) -> Result<BlockRef> {
    let entity = |name: &Option<String>, which: &str| -> Result<(String, BlockRef)> {
        let name = name
            .as_deref()
            .ok_or_else(|| ExportError::missing(&obj.name, format!("no {which} body")))?;
        let body = session
            .registry
            .try_lookup_block_for(&SourceKey::collision(name))
            .ok_or_else(|| {
                ExportError::missing(&obj.name, format!("'{name}' has no exported rigid body"))
            })?;
        Ok((name.to_string(), body))
    };
    let (name_a, body_a) = entity(&constraint.object1, "first")?;
    let (name_b, body_b) = entity(&constraint.object2, "second")?;

    let havok_scale = session.game().havok_scale();
    let world = scene.world_matrix(&obj.name);
    let a = LocalFrame::new(scene.world_matrix(&name_a), world, havok_scale);
    let b = LocalFrame::new(scene.world_matrix(&name_b), world, havok_scale);

    let (kind, data) = constraint_data(obj, constraint, a, b, havok_scale)?;
    let (kind, data) = if constraint.use_breaking {
        (
            BlockKind::BhkBreakableConstraint,
            ConstraintData::Breakable {
                wrapped: Box::new(data),
                threshold: constraint.breaking_threshold,
                remove_when_broken: true,
            },
        )
    } else {
        (kind, data)
    };

    let block = create_with(
        session,
        kind,
        Some(SourceKey::constraint(&obj.name)),
        |block| {
            block.data = BlockData::Constraint(BhkConstraint {
                entities: vec![body_a, body_b],
                priority: 1,
                data,
            });
        },
    )?;
    if let BlockData::RigidBody(rb) = &mut session.registry[body_a].data {
        rb.constraints.push(block);
    }
    Ok(block)
}

fn constraint_data(
    obj: &HostObject,
    constraint: &HostConstraint,
    a: LocalFrame,
    b: LocalFrame,
    havok_scale: f32,
) -> Result<(BlockKind, ConstraintData)> {
    let hinge = HingeDescriptor {
        pivot_a: a.pivot,
        axle_a: a.axle,
        perp_axle_in_a1: a.perp1,
        perp_axle_in_a2: a.perp2,
        pivot_b: b.pivot,
        axle_b: b.axle,
        perp_axle_in_b1: b.perp1,
        perp_axle_in_b2: b.perp2,
    };
    let (twist_min, twist_max) = if constraint.use_limit_ang_z {
        (constraint.limit_ang_z_lower, constraint.limit_ang_z_upper)
    } else {
        (-FRAC_PI_4, FRAC_PI_4)
    };

    Ok(match constraint.kind {
        ConstraintKind::Point => (
            BlockKind::BhkBallAndSocketConstraint,
            ConstraintData::BallAndSocket(BallAndSocketDescriptor {
                pivot_a: a.pivot,
                pivot_b: b.pivot,
            }),
        ),
        ConstraintKind::Hinge if constraint.use_limit_ang_z => (
            BlockKind::BhkLimitedHingeConstraint,
            ConstraintData::LimitedHinge(LimitedHingeDescriptor {
                hinge,
                min_angle: twist_min,
                max_angle: twist_max,
                max_friction: constraint.max_friction,
            }),
        ),
        ConstraintKind::Hinge => (BlockKind::BhkHingeConstraint, ConstraintData::Hinge(hinge)),
        ConstraintKind::Slider => (
            BlockKind::BhkPrismaticConstraint,
            ConstraintData::Prismatic(PrismaticDescriptor {
                pivot_a: a.pivot,
                rotation_a: a.axle,
                plane_a: a.perp2,
                sliding_a: a.perp1,
                pivot_b: b.pivot,
                rotation_b: b.axle,
                plane_b: b.perp2,
                sliding_b: b.perp1,
                min_distance: constraint.limit_lin_x_lower / havok_scale,
                max_distance: constraint.limit_lin_x_upper / havok_scale,
                friction: constraint.max_friction,
            }),
        ),
        ConstraintKind::GenericSpring => {
            let [xa, ya, za, _] = a.pivot.0;
            let [xb, yb, zb, _] = b.pivot.0;
            (
                BlockKind::BhkStiffSpringConstraint,
                ConstraintData::StiffSpring(StiffSpringDescriptor {
                    pivot_a: a.pivot,
                    pivot_b: b.pivot,
                    length: Vec3::new(xa, ya, za).distance(Vec3::new(xb, yb, zb)),
                }),
            )
        }
        ConstraintKind::Generic => (
            BlockKind::BhkRagdollConstraint,
            ConstraintData::Ragdoll(RagdollDescriptor {
                twist_a: a.axle,
                plane_a: a.perp1,
                motor_a: a.perp2,
                pivot_a: a.pivot,
                twist_b: b.axle,
                plane_b: b.perp1,
                motor_b: b.perp2,
                pivot_b: b.pivot,
                cone_max_angle: FRAC_PI_4,
                plane_min_angle: -FRAC_PI_4,
                plane_max_angle: FRAC_PI_4,
                twist_min_angle: twist_min,
                twist_max_angle: twist_max,
                max_friction: constraint.max_friction,
            }),
        ),
        ConstraintKind::Other => {
            return Err(ExportError::unsupported(&obj.name, "this constraint type"));
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nif::host::HostTransform;
    use crate::nif::version::Game;

    fn placed(name: &str, translation: [f32; 3]) -> HostObject {
        HostObject {
            name: name.into(),
            transform: HostTransform {
                translation,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn setup(kind: ConstraintKind, second: &str) -> (ExportSession, HostScene, BlockRef) {
        let mut session = ExportSession::for_game(Game::Oblivion);
        let body_a = session
            .create(BlockKind::BhkRigidBody, Some(SourceKey::collision("Door")))
            .unwrap();
        session
            .create(BlockKind::BhkRigidBody, Some(SourceKey::collision("Frame")))
            .unwrap();
        let mut joint = placed("Joint", [14.0, 0.0, 0.0]);
        joint.constraint = Some(HostConstraint {
            kind,
            object1: Some("Door".into()),
            object2: Some(second.into()),
            limit_lin_x_lower: -7.0,
            limit_lin_x_upper: 7.0,
            ..Default::default()
        });
        let scene = HostScene {
            objects: vec![
                placed("Door", [0.0, 0.0, 0.0]),
                placed("Frame", [7.0, 0.0, 0.0]),
                joint,
            ],
            ..Default::default()
        };
        (session, scene, body_a)
    }

    fn only_constraint(session: &ExportSession) -> (BlockKind, BhkConstraint) {
        let block = session
            .registry
            .lookup_block_for(&SourceKey::constraint("Joint"))
            .unwrap();
        let BlockData::Constraint(c) = &session.registry[block].data else {
            panic!("not a constraint");
        };
        (session.registry[block].kind, c.clone())
    }

    #[test]
    fn pivots_are_local_to_each_body() {
        let (mut session, scene, body_a) = setup(ConstraintKind::Hinge, "Frame");
        export_constraints(&mut session, &scene).unwrap();

        let (kind, c) = only_constraint(&session);
        assert_eq!(kind, BlockKind::BhkHingeConstraint);
        assert_eq!(c.entities.len(), 2);
        assert_eq!(c.entities[0], body_a);
        let ConstraintData::Hinge(h) = c.data else {
            panic!("not a hinge");
        };
        assert!((h.pivot_a.0[0] - 2.0).abs() < 1e-5);
        assert!((h.pivot_b.0[0] - 1.0).abs() < 1e-5);
        assert!((h.axle_a.0[2] - 1.0).abs() < 1e-5);

        let BlockData::RigidBody(rb) = &session.registry[body_a].data else {
            panic!("not a rigid body");
        };
        assert_eq!(rb.constraints.len(), 1);
    }

    #[test]
    fn sliders_and_springs_use_havok_units() {
        let (mut session, scene, _) = setup(ConstraintKind::Slider, "Frame");
        export_constraints(&mut session, &scene).unwrap();
        let (kind, c) = only_constraint(&session);
        assert_eq!(kind, BlockKind::BhkPrismaticConstraint);
        let ConstraintData::Prismatic(p) = c.data else {
            panic!("not prismatic");
        };
        assert_eq!((p.min_distance, p.max_distance), (-1.0, 1.0));

        let (mut session, scene, _) = setup(ConstraintKind::GenericSpring, "Frame");
        export_constraints(&mut session, &scene).unwrap();
        let (_, c) = only_constraint(&session);
        let ConstraintData::StiffSpring(s) = c.data else {
            panic!("not a spring");
        };
        assert!((s.length - 1.0).abs() < 1e-5);
    }

    #[test]
    fn breaking_wraps_the_constraint() {
        let (mut session, mut scene, _) = setup(ConstraintKind::Generic, "Frame");
        if let Some(c) = scene.objects[2].constraint.as_mut() {
            c.use_breaking = true;
            c.breaking_threshold = 50.0;
        }
        export_constraints(&mut session, &scene).unwrap();
        let (kind, c) = only_constraint(&session);
        assert_eq!(kind, BlockKind::BhkBreakableConstraint);
        assert_eq!(c.data.havok_type(), 7);
    }

    #[test]
    fn missing_bodies_fail_the_export() {
        let (mut session, scene, _) = setup(ConstraintKind::Point, "Nowhere");
        let err = export_constraints(&mut session, &scene).unwrap_err();
        assert!(matches!(err, ExportError::MissingDependency { .. }));
    }

    #[test]
    fn other_types_and_games_are_skipped() {
        let (mut session, scene, _) = setup(ConstraintKind::Other, "Frame");
        export_constraints(&mut session, &scene).unwrap();
        assert_eq!(session.registry.len(), 2);

        let mut session = ExportSession::for_game(Game::Morrowind);
        export_constraints(&mut session, &scene).unwrap();
        assert!(session.registry.is_empty());
    }
}
