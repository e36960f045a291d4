//! Havok collision and constraint blocks (Bethesda titles).

use super::base::{BlockLink, BlockRef, Quaternion, Vector3, Vector4};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// Oblivion-style collision layers the exporter cares about.
pub const LAYER_STATIC: u8 = 1;
pub const LAYER_ANIM_STATIC: u8 = 2;
pub const LAYER_CLUTTER: u8 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HavokFilter {
    pub layer: u8,
    pub flags: u8,
    pub group: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MotionSystem {
    Invalid,
    Dynamic,
    SphereInertia,
    SphereStabilized,
    BoxInertia,
    BoxStabilized,
    #[default]
    Keyframed,
    Fixed,
    ThinBox,
    Character,
}
impl From<MotionSystem> for u8 {
    fn from(value: MotionSystem) -> Self {
        match value {
            MotionSystem::Invalid => 0,
            MotionSystem::Dynamic => 1,
            MotionSystem::SphereInertia => 2,
            MotionSystem::SphereStabilized => 3,
            MotionSystem::BoxInertia => 4,
            MotionSystem::BoxStabilized => 5,
            MotionSystem::Keyframed => 6,
            MotionSystem::Fixed => 7,
            MotionSystem::ThinBox => 8,
            MotionSystem::Character => 9,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeactivatorType {
    Invalid,
    #[default]
    Never,
    Spatial,
}
impl From<DeactivatorType> for u8 {
    fn from(value: DeactivatorType) -> Self {
        match value {
            DeactivatorType::Invalid => 0,
            DeactivatorType::Never => 1,
            DeactivatorType::Spatial => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolverDeactivation {
    Invalid,
    Off,
    #[default]
    Low,
    Medium,
    High,
    Max,
}
impl From<SolverDeactivation> for u8 {
    fn from(value: SolverDeactivation) -> Self {
        match value {
            SolverDeactivation::Invalid => 0,
            SolverDeactivation::Off => 1,
            SolverDeactivation::Low => 2,
            SolverDeactivation::Medium => 3,
            SolverDeactivation::High => 4,
            SolverDeactivation::Max => 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityType {
    Invalid,
    #[default]
    Fixed,
    Keyframed,
    Debris,
    Moving,
    Critical,
    Bullet,
    User,
    Character,
    KeyframedReport,
}
impl From<QualityType> for u8 {
    fn from(value: QualityType) -> Self {
        match value {
            QualityType::Invalid => 0,
            QualityType::Fixed => 1,
            QualityType::Keyframed => 2,
            QualityType::Debris => 3,
            QualityType::Moving => 4,
            QualityType::Critical => 5,
            QualityType::Bullet => 6,
            QualityType::User => 7,
            QualityType::Character => 8,
            QualityType::KeyframedReport => 9,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct BhkCollisionObject {
    pub flags: u16,
    pub target: BlockLink, // Back reference to the owning node
    pub body: BlockLink,
}

#[derive(Debug, Clone)]
pub struct BhkRigidBody {
    pub shape: BlockLink,
    pub havok_filter: HavokFilter,
    pub translation: Vector4,
    pub rotation: Quaternion,
    pub linear_velocity: Vector4,
    pub angular_velocity: Vector4,
    pub inertia: [[f32; 4]; 3],
    pub center: Vector4,
    pub mass: f32,
    pub linear_damping: f32,
    pub angular_damping: f32,
    pub friction: f32,
    pub restitution: f32,
    pub max_linear_velocity: f32,
    pub max_angular_velocity: f32,
    pub penetration_depth: f32,
    pub motion_system: MotionSystem,
    pub deactivator_type: DeactivatorType,
    pub solver_deactivation: SolverDeactivation,
    pub quality_type: QualityType,
    pub constraints: Vec<BlockRef>,
    pub body_flags: u32,
}

impl Default for BhkRigidBody {
    fn default() -> Self {
        BhkRigidBody {
            shape: None,
            havok_filter: HavokFilter::default(),
            translation: Vector4::default(),
            rotation: Quaternion::IDENTITY,
            linear_velocity: Vector4::default(),
            angular_velocity: Vector4::default(),
            inertia: [[0.0; 4]; 3],
            center: Vector4::default(),
            mass: 0.0,
            linear_damping: 0.1,
            angular_damping: 0.05,
            friction: 0.3,
            restitution: 0.3,
            max_linear_velocity: 250.0,
            max_angular_velocity: 31.415_926,
            penetration_depth: 0.15,
            motion_system: MotionSystem::default(),
            deactivator_type: DeactivatorType::default(),
            solver_deactivation: SolverDeactivation::default(),
            quality_type: QualityType::default(),
            constraints: Vec::new(),
            body_flags: 0,
        }
    }
}

/// Havok shapes. The variant picks the block type.
#[derive(Debug, Clone, PartialEq)]
pub enum BhkShape {
    Sphere {
        material: u32,
        radius: f32,
    },
    Box {
        material: u32,
        radius: f32,
        dimensions: Vector3,
    },
    Capsule {
        material: u32,
        radius: f32,
        first_point: Vector3,
        radius1: f32,
        second_point: Vector3,
        radius2: f32,
    },
    ConvexVertices {
        material: u32,
        radius: f32,
        vertices: Vec<Vector4>,
        normals: Vec<Vector4>,
    },
}

impl BhkShape {
    pub fn scale(&mut self, factor: f32) {
        match self {
            BhkShape::Sphere { radius, .. } => *radius *= factor,
            BhkShape::Box {
                radius, dimensions, ..
            } => {
                *radius *= factor;
                *dimensions = dimensions.scaled(factor);
            }
            BhkShape::Capsule {
                radius,
                first_point,
                radius1,
                second_point,
                radius2,
                ..
            } => {
                *radius *= factor;
                *radius1 *= factor;
                *radius2 *= factor;
                *first_point = first_point.scaled(factor);
                *second_point = second_point.scaled(factor);
            }
            BhkShape::ConvexVertices {
                radius,
                vertices,
                normals,
                ..
            } => {
                *radius *= factor;
                for v in vertices.iter_mut() {
                    *v = v.scaled_xyz(factor);
                }
                // Plane distances live in w.
                for n in normals.iter_mut() {
                    n.0[3] *= factor;
                }
            }
        }
    }
}

// --- Constraints ---

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BallAndSocketDescriptor {
    pub pivot_a: Vector4,
    pub pivot_b: Vector4,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct HingeDescriptor {
    pub pivot_a: Vector4,
    pub axle_a: Vector4,
    pub perp_axle_in_a1: Vector4,
    pub perp_axle_in_a2: Vector4,
    pub pivot_b: Vector4,
    pub axle_b: Vector4,
    pub perp_axle_in_b1: Vector4,
    pub perp_axle_in_b2: Vector4,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LimitedHingeDescriptor {
    pub hinge: HingeDescriptor,
    pub min_angle: f32,
    pub max_angle: f32,
    pub max_friction: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PrismaticDescriptor {
    pub pivot_a: Vector4,
    pub rotation_a: Vector4,
    pub plane_a: Vector4,
    pub sliding_a: Vector4,
    pub pivot_b: Vector4,
    pub rotation_b: Vector4,
    pub plane_b: Vector4,
    pub sliding_b: Vector4,
    pub min_distance: f32,
    pub max_distance: f32,
    pub friction: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RagdollDescriptor {
    pub twist_a: Vector4,
    pub plane_a: Vector4,
    pub motor_a: Vector4,
    pub pivot_a: Vector4,
    pub twist_b: Vector4,
    pub plane_b: Vector4,
    pub motor_b: Vector4,
    pub pivot_b: Vector4,
    pub cone_max_angle: f32,
    pub plane_min_angle: f32,
    pub plane_max_angle: f32,
    pub twist_min_angle: f32,
    pub twist_max_angle: f32,
    pub max_friction: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct StiffSpringDescriptor {
    pub pivot_a: Vector4,
    pub pivot_b: Vector4,
    pub length: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConstraintData {
    BallAndSocket(BallAndSocketDescriptor),
    Hinge(HingeDescriptor),
    LimitedHinge(LimitedHingeDescriptor),
    Prismatic(PrismaticDescriptor),
    Ragdoll(RagdollDescriptor),
    StiffSpring(StiffSpringDescriptor),
    Breakable {
        wrapped: Box<ConstraintData>,
        threshold: f32,
        remove_when_broken: bool,
    },
}

impl ConstraintData {
    /// `hkConstraintType` as stored by a breakable wrapper.
    pub fn havok_type(&self) -> u32 {
        match self {
            ConstraintData::BallAndSocket(_) => 0,
            ConstraintData::Hinge(_) => 1,
            ConstraintData::LimitedHinge(_) => 2,
            ConstraintData::Prismatic(_) => 6,
            ConstraintData::Ragdoll(_) => 7,
            ConstraintData::StiffSpring(_) => 8,
            ConstraintData::Breakable { wrapped, .. } => wrapped.havok_type(),
        }
    }

    pub fn scale(&mut self, factor: f32) {
        match self {
            ConstraintData::BallAndSocket(d) => {
                d.pivot_a = d.pivot_a.scaled_xyz(factor);
                d.pivot_b = d.pivot_b.scaled_xyz(factor);
            }
            ConstraintData::Hinge(d) => scale_hinge(d, factor),
            ConstraintData::LimitedHinge(d) => scale_hinge(&mut d.hinge, factor),
            ConstraintData::Prismatic(d) => {
                d.pivot_a = d.pivot_a.scaled_xyz(factor);
                d.pivot_b = d.pivot_b.scaled_xyz(factor);
                d.min_distance *= factor;
                d.max_distance *= factor;
            }
            ConstraintData::Ragdoll(d) => {
                d.pivot_a = d.pivot_a.scaled_xyz(factor);
                d.pivot_b = d.pivot_b.scaled_xyz(factor);
            }
            ConstraintData::StiffSpring(d) => {
                d.pivot_a = d.pivot_a.scaled_xyz(factor);
                d.pivot_b = d.pivot_b.scaled_xyz(factor);
                d.length *= factor;
            }
            ConstraintData::Breakable { wrapped, .. } => wrapped.scale(factor),
        }
    }
}

fn scale_hinge(d: &mut HingeDescriptor, factor: f32) {
    d.pivot_a = d.pivot_a.scaled_xyz(factor);
    d.pivot_b = d.pivot_b.scaled_xyz(factor);
}

#[derive(Debug, Clone, PartialEq)]
pub struct BhkConstraint {
    pub entities: Vec<BlockRef>, // Back references to the two rigid bodies
    pub priority: u32,
    pub data: ConstraintData,
}
