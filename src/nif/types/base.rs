use glam::{Mat3, Quat, Vec3};
use slotmap::new_key_type;
use std::fmt::Debug;

new_key_type! {
    /// Stable handle of a block inside the registry arena.
    pub struct BlockRef;
}

/// Represents links to other blocks. `None` is written as -1.
pub type BlockLink = Option<BlockRef>;

pub type Quaternion = Quat;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Vector2(pub [f32; 2]);

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Vector3(pub [f32; 3]);

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Vector4(pub [f32; 4]);

impl Vector3 {
    pub const ZERO: Vector3 = Vector3([0.0; 3]);
    pub const Z: Vector3 = Vector3([0.0, 0.0, 1.0]);

    pub fn scaled(self, factor: f32) -> Self {
        Vector3(self.0.map(|c| c * factor))
    }
}

impl Vector4 {
    /// Havok vectors carry a fourth component the engine ignores.
    pub fn from_vec3(v: Vec3) -> Self {
        Vector4([v.x, v.y, v.z, 0.0])
    }

    pub fn scaled_xyz(self, factor: f32) -> Self {
        let [x, y, z, w] = self.0;
        Vector4([x * factor, y * factor, z * factor, w])
    }
}

impl From<Vec3> for Vector3 {
    fn from(v: Vec3) -> Self {
        Vector3(v.to_array())
    }
}

impl From<Vector3> for Vec3 {
    fn from(v: Vector3) -> Self {
        Vec3::from_array(v.0)
    }
}

impl From<[f32; 3]> for Vector3 {
    fn from(v: [f32; 3]) -> Self {
        Vector3(v)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Matrix3x3(pub [[f32; 3]; 3]); // [row][col]

impl Default for Matrix3x3 {
    fn default() -> Self {
        Matrix3x3([[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]])
    }
}

impl Matrix3x3 {
    pub fn is_identity(&self) -> bool {
        let identity = Matrix3x3::default();
        self.0
            .iter()
            .flatten()
            .zip(identity.0.iter().flatten())
            .all(|(a, b)| (a - b).abs() < 1e-6)
    }
}

// NIF stores rotations row-major with the transpose of the usual
// column-vector convention, so rows of the file matrix are columns of glam's.
impl From<Mat3> for Matrix3x3 {
    fn from(m: Mat3) -> Self {
        Matrix3x3(m.to_cols_array_2d())
    }
}

impl From<Matrix3x3> for Mat3 {
    fn from(m: Matrix3x3) -> Self {
        Mat3::from_cols_array_2d(&m.0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Color3(pub [f32; 3]);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color4(pub [f32; 4]);

impl Default for Color4 {
    fn default() -> Self {
        Color4([1.0; 4])
    }
}

/// Represents the C++ NiTransform struct
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NiTransform {
    pub rotation: Matrix3x3,
    pub translation: Vector3,
    pub scale: f32,
}

impl Default for NiTransform {
    fn default() -> Self {
        NiTransform {
            rotation: Matrix3x3::default(),
            translation: Vector3::ZERO,
            scale: 1.0,
        }
    }
}

impl NiTransform {
    pub fn from_trs(translation: Vec3, rotation: Quat, scale: f32) -> Self {
        NiTransform {
            rotation: Mat3::from_quat(rotation).into(),
            translation: translation.into(),
            scale,
        }
    }

    pub fn is_identity(&self) -> bool {
        self.rotation.is_identity()
            && self.translation.0.iter().all(|c| c.abs() < 1e-6)
            && (self.scale - 1.0).abs() < 1e-6
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BoundingSphere {
    pub center: Vector3,
    pub radius: f32,
}

impl BoundingSphere {
    pub fn scaled(self, factor: f32) -> Self {
        BoundingSphere {
            center: self.center.scaled(factor),
            radius: self.radius * factor,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    // Center, axes (rotation matrix) and extent (half-sizes)
    pub center: Vector3,
    pub axes: Matrix3x3,
    pub extent: Vector3,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BoundingVolume {
    Sphere(BoundingSphere),
    Box(BoundingBox),
}

impl BoundingVolume {
    pub fn collision_type(&self) -> u32 {
        match self {
            BoundingVolume::Sphere(_) => 0,
            BoundingVolume::Box(_) => 1,
        }
    }

    pub fn scaled(self, factor: f32) -> Self {
        match self {
            BoundingVolume::Sphere(sphere) => BoundingVolume::Sphere(sphere.scaled(factor)),
            BoundingVolume::Box(bx) => BoundingVolume::Box(BoundingBox {
                center: bx.center.scaled(factor),
                axes: bx.axes,
                extent: bx.extent.scaled(factor),
            }),
        }
    }
}
