use super::base::{BlockLink, BlockRef, BoundingSphere, NiTransform, Vector2, Vector3};
use std::fmt::Debug;

#[derive(Debug, Clone, Default)]
pub struct NiTriShapeData {
    pub vertices: Vec<Vector3>,
    pub normals: Vec<Vector3>,
    pub uv_sets: Vec<Vec<Vector2>>,
    pub bound: BoundingSphere,
    pub triangles: Vec<[u16; 3]>,
    pub consistency_flags: u16,
}

impl NiTriShapeData {
    /// Recomputes the bounding sphere from the vertex cloud.
    pub fn update_bound(&mut self) {
        if self.vertices.is_empty() {
            self.bound = BoundingSphere::default();
            return;
        }
        let mut min = [f32::MAX; 3];
        let mut max = [f32::MIN; 3];
        for v in &self.vertices {
            for i in 0..3 {
                min[i] = min[i].min(v.0[i]);
                max[i] = max[i].max(v.0[i]);
            }
        }
        let center = [
            (min[0] + max[0]) * 0.5,
            (min[1] + max[1]) * 0.5,
            (min[2] + max[2]) * 0.5,
        ];
        let radius = self
            .vertices
            .iter()
            .map(|v| {
                let d: f32 = (0..3).map(|i| (v.0[i] - center[i]).powi(2)).sum();
                d.sqrt()
            })
            .fold(0.0f32, f32::max);
        self.bound = BoundingSphere {
            center: Vector3(center),
            radius,
        };
    }
}

#[derive(Debug, Clone, Default)]
pub struct NiSkinInstance {
    pub data: BlockLink,
    pub skin_partition: BlockLink,
    pub skeleton_root: BlockLink,
    pub bones: Vec<BlockRef>,
}

#[derive(Debug, Clone, Default)]
pub struct SkinBoneData {
    pub transform: NiTransform,
    pub bound: BoundingSphere,
    pub weights: Vec<(u16, f32)>,
}

#[derive(Debug, Clone, Default)]
pub struct NiSkinData {
    pub skin_transform: NiTransform,
    pub bones: Vec<SkinBoneData>,
}
