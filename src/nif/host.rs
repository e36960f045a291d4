//! The host scene the exporter reads: objects, meshes, armatures, actions
//! and materials as a modelling tool hands them over. Deserialized from JSON.

use glam::{Mat4, Quat, Vec3};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::config::ExportConfig;
use super::types::collision::{LAYER_STATIC, MotionSystem};
use super::types::{
    DeactivatorType, LightingShaderType, NiTransform, QualityType, ShaderFlags1, ShaderFlags2,
    SolverDeactivation,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HostScene {
    pub name: String,
    pub fps: f32,
    pub frame_start: i32,
    pub frame_end: i32,
    pub gravity: [f32; 3],
    pub use_gravity: bool,
    /// Export settings stored with the scene. Command line flags override them.
    pub config: Option<ExportConfig>,
    pub objects: Vec<HostObject>,
    pub materials: Vec<HostMaterial>,
    pub actions: Vec<HostAction>,
    pub images: Vec<HostImage>,
}

impl Default for HostScene {
    fn default() -> Self {
        HostScene {
            name: String::new(),
            fps: 30.0,
            frame_start: 1,
            frame_end: 250,
            gravity: [0.0, 0.0, -9.81],
            use_gravity: true,
            config: None,
            objects: Vec::new(),
            materials: Vec::new(),
            actions: Vec::new(),
            images: Vec::new(),
        }
    }
}

impl HostScene {
    pub fn object(&self, name: &str) -> Option<&HostObject> {
        self.objects.iter().find(|o| o.name == name)
    }

    pub fn material(&self, name: &str) -> Option<&HostMaterial> {
        self.materials.iter().find(|m| m.name == name)
    }

    pub fn action(&self, name: &str) -> Option<&HostAction> {
        self.actions.iter().find(|a| a.name == name)
    }

    pub fn image(&self, name: &str) -> Option<&HostImage> {
        self.images.iter().find(|i| i.name == name)
    }

    pub fn children_of<'a>(&'a self, parent: &'a str) -> impl Iterator<Item = &'a HostObject> + 'a {
        self.objects
            .iter()
            .filter(move |o| o.parent.as_deref() == Some(parent))
    }

    pub fn top_level(&self) -> impl Iterator<Item = &HostObject> + '_ {
        self.objects.iter().filter(|o| match &o.parent {
            None => true,
            Some(parent) => self.object(parent).is_none(),
        })
    }

    /// Object-to-world matrix, following the parent chain. Parent bones are
    /// resolved against their armature's rest pose.
    pub fn world_matrix(&self, name: &str) -> Mat4 {
        let mut matrix = Mat4::IDENTITY;
        let mut current = self.object(name);
        // Guard against parent cycles in malformed input.
        for _ in 0..=self.objects.len() {
            let Some(obj) = current else { break };
            let mut local = obj.transform.matrix();
            if let (Some(parent), Some(bone)) = (&obj.parent, &obj.parent_bone) {
                if let Some(armature) = self.object(parent) {
                    local = armature.bone_matrix(bone) * local;
                }
            }
            matrix = local * matrix;
            current = obj.parent.as_deref().and_then(|p| self.object(p));
        }
        matrix
    }

    /// Frame number to seconds.
    pub fn frame_time(&self, frame: f32) -> f32 {
        frame / self.fps
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectKind {
    #[default]
    Empty,
    Mesh,
    Armature,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HostObject {
    pub name: String,
    /// Name the object was imported under, restored on export.
    pub longname: Option<String>,
    pub kind: ObjectKind,
    pub parent: Option<String>,
    pub parent_bone: Option<String>,
    pub transform: HostTransform,
    /// Block type for the object's node, e.g. `NiBillboardNode`.
    pub node_type: Option<String>,
    pub flags: u16,
    pub mesh: Option<HostMesh>,
    pub bones: Vec<HostBone>,
    pub material_slots: Vec<String>,
    pub rigid_body: Option<HostRigidBody>,
    pub constraint: Option<HostConstraint>,
    pub particle_systems: Vec<HostParticleSystem>,
    pub field: Option<HostField>,
    pub animation: Option<HostAnimation>,
}

impl HostObject {
    pub fn is_bounding_box(&self) -> bool {
        self.name.to_lowercase().contains("bound")
    }

    /// Helpers that other walkers export; they never become scene nodes.
    pub fn is_hierarchy_node(&self) -> bool {
        self.rigid_body.is_none()
            && self.constraint.is_none()
            && self.particle_systems.is_empty()
            && !self.is_bounding_box()
    }

    pub fn bone(&self, name: &str) -> Option<&HostBone> {
        self.bones.iter().find(|b| b.name == name)
    }

    /// Armature-space rest matrix of `bone`.
    pub fn bone_matrix(&self, name: &str) -> Mat4 {
        let mut matrix = Mat4::IDENTITY;
        let mut current = self.bone(name);
        for _ in 0..=self.bones.len() {
            let Some(bone) = current else { break };
            matrix = bone.transform.matrix() * matrix;
            current = bone.parent.as_deref().and_then(|p| self.bone(p));
        }
        matrix
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostTransform {
    pub translation: [f32; 3],
    /// Quaternion, `x y z w`.
    pub rotation: [f32; 4],
    pub scale: [f32; 3],
}

impl Default for HostTransform {
    fn default() -> Self {
        HostTransform {
            translation: [0.0; 3],
            rotation: [0.0, 0.0, 0.0, 1.0],
            scale: [1.0; 3],
        }
    }
}

impl HostTransform {
    pub fn rotation(&self) -> Quat {
        Quat::from_array(self.rotation).normalize()
    }

    pub fn matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(
            Vec3::from_array(self.scale),
            self.rotation(),
            Vec3::from_array(self.translation),
        )
    }

    pub fn is_uniform(&self) -> bool {
        let [x, y, z] = self.scale;
        (x - y).abs() < 1e-4 && (x - z).abs() < 1e-4
    }

    /// The format only stores a uniform scale; anything else keeps X.
    pub fn to_ni(&self, owner: &str) -> NiTransform {
        if !self.is_uniform() {
            warn!(
                "{}: non-uniform scale {:?} is not supported, using {}",
                owner, self.scale, self.scale[0]
            );
        }
        NiTransform::from_trs(
            Vec3::from_array(self.translation),
            self.rotation(),
            self.scale[0],
        )
    }
}

/// Decomposes a matrix into the format's transform, keeping the X scale.
pub fn ni_transform_from_matrix(matrix: Mat4) -> NiTransform {
    let (scale, rotation, translation) = matrix.to_scale_rotation_translation();
    NiTransform::from_trs(translation, rotation, scale.x)
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HostMesh {
    pub vertices: Vec<[f32; 3]>,
    pub normals: Vec<[f32; 3]>,
    pub uvs: Vec<[f32; 2]>,
    pub triangles: Vec<HostTriangle>,
    pub vertex_groups: Vec<HostVertexGroup>,
}

impl HostMesh {
    /// Axis-aligned `(min, max)` of the vertices.
    pub fn bounds(&self) -> (Vec3, Vec3) {
        if self.vertices.is_empty() {
            return (Vec3::ZERO, Vec3::ZERO);
        }
        self.vertices.iter().fold(
            (Vec3::splat(f32::MAX), Vec3::splat(f32::MIN)),
            |(min, max), v| {
                let v = Vec3::from_array(*v);
                (min.min(v), max.max(v))
            },
        )
    }

    /// Material indices used by the triangles, in ascending order.
    pub fn material_groups(&self) -> Vec<usize> {
        let mut groups: Vec<usize> = self.triangles.iter().map(|t| t.material).collect();
        groups.sort_unstable();
        groups.dedup();
        groups
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HostTriangle {
    pub indices: [u32; 3],
    pub material: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HostVertexGroup {
    /// Bone name the group binds to.
    pub name: String,
    /// `(vertex index, weight)` pairs.
    pub weights: Vec<(u32, f32)>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HostBone {
    pub name: String,
    pub longname: Option<String>,
    pub parent: Option<String>,
    /// Rest pose relative to the parent bone, or to the armature for roots.
    pub transform: HostTransform,
}

// --- Physics ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollisionShape {
    #[default]
    Box,
    Sphere,
    Capsule,
    ConvexHull,
    Mesh,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HostRigidBody {
    pub shape: CollisionShape,
    /// Havok material id.
    pub material: u32,
    pub layer: u8,
    pub col_filter: u8,
    pub margin: f32,
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
    pub body_flags: u32,
}

impl Default for HostRigidBody {
    fn default() -> Self {
        HostRigidBody {
            shape: CollisionShape::Box,
            material: 0,
            layer: LAYER_STATIC,
            col_filter: 0,
            margin: 0.1,
            mass: 0.0,
            linear_damping: 0.1,
            angular_damping: 0.05,
            friction: 0.3,
            restitution: 0.3,
            max_linear_velocity: 250.0,
            max_angular_velocity: 31.415_926,
            penetration_depth: 0.15,
            motion_system: MotionSystem::Keyframed,
            deactivator_type: DeactivatorType::Never,
            solver_deactivation: SolverDeactivation::Low,
            quality_type: QualityType::Fixed,
            body_flags: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintKind {
    #[default]
    Point,
    Hinge,
    Slider,
    GenericSpring,
    Generic,
    #[serde(other)]
    Other,
}

/// Rigid-body constraint. The pivot and axes come from the owning
/// object's world transform.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConstraint {
    pub kind: ConstraintKind,
    pub object1: Option<String>,
    pub object2: Option<String>,
    pub use_breaking: bool,
    pub breaking_threshold: f32,
    pub use_limit_ang_z: bool,
    pub limit_ang_z_lower: f32,
    pub limit_ang_z_upper: f32,
    pub limit_lin_x_lower: f32,
    pub limit_lin_x_upper: f32,
    pub max_friction: f32,
}

// --- Particles ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmitterKind {
    Sphere,
    Box,
    Cylinder,
    Mesh,
    #[default]
    Array,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HostParticleSystem {
    pub name: String,
    pub count: u16,
    /// `BSStripParticleSystem` instead of `NiParticleSystem`.
    pub strip: bool,
    pub strip_max_point_count: u16,
    pub emitter: EmitterKind,
    pub emitter_size: [f32; 3],
    pub normal_factor: f32,
    pub factor_random: f32,
    pub display_size: f32,
    pub size_random: f32,
    /// Frames.
    pub lifetime: f32,
    pub lifetime_random: f32,
    pub use_rotations: bool,
    pub angular_velocity_factor: f32,
    pub phase_factor: f32,
    pub phase_factor_random: f32,
    pub random_rot_speed_sign: bool,
    pub random_axis: bool,
    pub rotation_axis: [f32; 3],
    pub rotation_factor_random: f32,
    pub object_factor: f32,
    pub wind_weight: f32,
    pub num_spawn_generations: u16,
    pub percentage_spawned: f32,
    pub min_num_to_spawn: u16,
    pub max_num_to_spawn: u16,
    pub spawn_on_death: bool,
    pub num_subtexture_offsets: u32,
    pub material: Option<String>,
}

impl Default for HostParticleSystem {
    fn default() -> Self {
        HostParticleSystem {
            name: String::new(),
            count: 100,
            strip: false,
            strip_max_point_count: 0,
            emitter: EmitterKind::Array,
            emitter_size: [1.0; 3],
            normal_factor: 1.0,
            factor_random: 0.0,
            display_size: 1.0,
            size_random: 0.0,
            lifetime: 50.0,
            lifetime_random: 0.0,
            use_rotations: false,
            angular_velocity_factor: 0.0,
            phase_factor: 0.0,
            phase_factor_random: 0.0,
            random_rot_speed_sign: false,
            random_axis: false,
            rotation_axis: [1.0, 0.0, 0.0],
            rotation_factor_random: 0.0,
            object_factor: 0.0,
            wind_weight: 0.0,
            num_spawn_generations: 0,
            percentage_spawned: 1.0,
            min_num_to_spawn: 1,
            max_num_to_spawn: 1,
            spawn_on_death: false,
            num_subtexture_offsets: 0,
            material: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    #[default]
    Force,
    Vortex,
    Drag,
    Turbulence,
    Wind,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HostField {
    pub kind: FieldType,
    pub strength: f32,
    pub falloff_power: f32,
    pub use_max_distance: bool,
    pub distance_max: f32,
    pub flow: f32,
    pub apply_to_rotation: bool,
    pub use_radial_max: bool,
    pub radial_max: f32,
    pub use_gravity_falloff: bool,
}

// --- Animation ---

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HostAnimation {
    /// Action played when no NLA track drives the object.
    pub action: Option<String>,
    pub nla_tracks: Vec<NlaTrack>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NlaTrack {
    pub name: String,
    pub strip: Option<NlaStrip>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NlaStrip {
    pub action: String,
    pub frame_start: f32,
    pub frame_end: f32,
    pub influence: f32,
    pub scale: f32,
    pub use_reverse: bool,
    pub cyclic: bool,
    pub priority: u8,
}

impl Default for NlaStrip {
    fn default() -> Self {
        NlaStrip {
            action: String::new(),
            frame_start: 1.0,
            frame_end: 1.0,
            influence: 1.0,
            scale: 1.0,
            use_reverse: false,
            cyclic: false,
            priority: 0,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HostAction {
    pub name: String,
    pub frame_start: f32,
    pub frame_end: f32,
    pub cyclic: bool,
    pub curves: Vec<FCurve>,
    pub pose_markers: Vec<PoseMarker>,
}

impl HostAction {
    /// Curves animating `data_path`, on the object itself or on `bone`.
    pub fn channel(&self, data_path: &str, bone: Option<&str>) -> Vec<&FCurve> {
        let mut curves: Vec<&FCurve> = self
            .curves
            .iter()
            .filter(|c| c.data_path == data_path && c.bone.as_deref() == bone)
            .collect();
        curves.sort_by_key(|c| c.index);
        curves
    }

    /// Bones with at least one curve, in first-seen order.
    pub fn animated_bones(&self) -> Vec<&str> {
        let mut bones = Vec::new();
        for curve in &self.curves {
            if let Some(bone) = curve.bone.as_deref() {
                if !bones.contains(&bone) {
                    bones.push(bone);
                }
            }
        }
        bones
    }

    /// Sorted, deduplicated key frames over `curves`.
    pub fn key_frames(curves: &[&FCurve]) -> Vec<f32> {
        let mut frames: Vec<f32> = curves
            .iter()
            .flat_map(|c| c.keys.iter().map(|k| k[0]))
            .collect();
        frames.sort_by(f32::total_cmp);
        frames.dedup_by(|a, b| (*a - *b).abs() < 1e-5);
        frames
    }
}

/// One animated channel component.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FCurve {
    /// `location`, `rotation_quaternion`, `rotation_euler`, `scale`, `hide`,
    /// `alpha`, `diffuse_color`, ...
    pub data_path: String,
    pub index: usize,
    pub bone: Option<String>,
    /// `[frame, value]` pairs, ascending by frame.
    pub keys: Vec<[f32; 2]>,
}

impl FCurve {
    /// Linear interpolation, clamped to the first and last key.
    pub fn evaluate(&self, frame: f32) -> f32 {
        let Some(first) = self.keys.first() else {
            return 0.0;
        };
        if frame <= first[0] {
            return first[1];
        }
        for pair in self.keys.windows(2) {
            let [a, b] = [pair[0], pair[1]];
            if frame <= b[0] {
                let span = b[0] - a[0];
                if span.abs() < f32::EPSILON {
                    return b[1];
                }
                let t = (frame - a[0]) / span;
                return a[1] + (b[1] - a[1]) * t;
            }
        }
        self.keys.last().map_or(0.0, |k| k[1])
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PoseMarker {
    pub frame: f32,
    pub name: String,
}

// --- Materials ---

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HostMaterial {
    pub name: String,
    pub longname: Option<String>,
    pub flags: u16,
    pub ambient_color: [f32; 3],
    pub diffuse_color: [f32; 3],
    pub specular_color: [f32; 3],
    pub emission_color: [f32; 3],
    pub ambient_intensity: f32,
    pub diffuse_intensity: f32,
    pub specular_intensity: f32,
    pub emission_strength: f32,
    pub glossiness: f32,
    pub alpha: f32,
    pub use_alpha_blend: bool,
    pub emissive_mult: f32,
    pub textures: Vec<HostTextureSlot>,
    /// Action animating the material's colours, alpha or UV transform.
    pub animation: Option<String>,
    /// Lighting shader settings, used from Skyrim on.
    pub shader: HostShader,
}

impl Default for HostMaterial {
    fn default() -> Self {
        HostMaterial {
            name: String::new(),
            longname: None,
            flags: 0,
            ambient_color: [1.0; 3],
            diffuse_color: [1.0; 3],
            specular_color: [0.0; 3],
            emission_color: [0.0; 3],
            ambient_intensity: 1.0,
            diffuse_intensity: 1.0,
            specular_intensity: 1.0,
            emission_strength: 1.0,
            glossiness: 10.0,
            alpha: 1.0,
            use_alpha_blend: false,
            emissive_mult: 1.0,
            textures: Vec::new(),
            animation: None,
            shader: HostShader::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HostShader {
    pub shader_type: LightingShaderType,
    pub flags_1: u32,
    pub flags_2: u32,
    pub uv_offset: [f32; 2],
    pub uv_scale: [f32; 2],
    pub lighting_effect_1: f32,
    pub lighting_effect_2: f32,
    pub environment_map_scale: f32,
    /// Skin or hair tint, depending on the shader type.
    pub tint_color: [f32; 3],
}

impl Default for HostShader {
    fn default() -> Self {
        HostShader {
            shader_type: LightingShaderType::Default,
            flags_1: ShaderFlags1::default().bits(),
            flags_2: ShaderFlags2::default().bits(),
            uv_offset: [0.0, 0.0],
            uv_scale: [1.0, 1.0],
            lighting_effect_1: 0.3,
            lighting_effect_2: 2.0,
            environment_map_scale: 1.0,
            tint_color: [1.0; 3],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostTextureRole {
    Base,
    Dark,
    Detail,
    Gloss,
    Glow,
    Bump,
    Normal,
    Environment,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostTextureSlot {
    pub role: HostTextureRole,
    pub image: String,
    #[serde(default)]
    pub uv_set: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HostImage {
    pub name: String,
    pub path: String,
    pub width: u32,
    pub height: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn curves_evaluate_linearly_and_clamp() {
        let curve = FCurve {
            data_path: "location".into(),
            keys: vec![[1.0, 0.0], [11.0, 10.0]],
            ..Default::default()
        };
        assert_eq!(curve.evaluate(0.0), 0.0);
        assert_eq!(curve.evaluate(6.0), 5.0);
        assert_eq!(curve.evaluate(20.0), 10.0);
    }

    #[test]
    fn scenes_deserialize_with_defaults() {
        let scene: HostScene = serde_json::from_str(
            r#"{ "objects": [ { "name": "Cube", "kind": "mesh" } ] }"#,
        )
        .unwrap();
        assert_eq!(scene.fps, 30.0);
        assert_eq!(scene.objects[0].kind, ObjectKind::Mesh);
        assert_eq!(scene.objects[0].transform.scale, [1.0; 3]);
    }

    #[test]
    fn helper_objects_stay_out_of_the_hierarchy() {
        let bound = HostObject {
            name: "BoundingBox".into(),
            ..Default::default()
        };
        let body = HostObject {
            name: "Cube".into(),
            rigid_body: Some(HostRigidBody::default()),
            ..Default::default()
        };
        let plain = HostObject {
            name: "Cube".into(),
            ..Default::default()
        };
        assert!(!bound.is_hierarchy_node());
        assert!(!body.is_hierarchy_node());
        assert!(plain.is_hierarchy_node());
    }

    #[test]
    fn world_matrix_follows_parents() {
        let scene = HostScene {
            objects: vec![
                HostObject {
                    name: "Root".into(),
                    transform: HostTransform {
                        translation: [1.0, 0.0, 0.0],
                        ..Default::default()
                    },
                    ..Default::default()
                },
                HostObject {
                    name: "Child".into(),
                    parent: Some("Root".into()),
                    transform: HostTransform {
                        translation: [0.0, 2.0, 0.0],
                        ..Default::default()
                    },
                    ..Default::default()
                },
            ],
            ..Default::default()
        };
        let world = scene.world_matrix("Child");
        assert_eq!(world.w_axis.truncate(), Vec3::new(1.0, 2.0, 0.0));
    }
}
