use super::base::{BlockLink, BlockRef, Color4, Vector3, Vector4};
use super::scene::NiGeometry;
use std::fmt::Debug;
use std::ops::{Deref, DerefMut};

/// Modifier execution order (`NiPSysModifierOrder`).
pub mod order {
    pub const KILL_OLD_PARTICLES: u32 = 0;
    pub const EMITTER: u32 = 1000;
    pub const FO3_STRIP_UPDATE: u32 = 2500;
    pub const GENERAL: u32 = 3000;
    pub const FORCE: u32 = 4000;
    pub const POS_UPDATE: u32 = 6000;
    pub const BOUND_UPDATE: u32 = 7000;
    pub const SK_STRIP_UPDATE: u32 = 8000;
}

#[derive(Debug, Clone)]
pub struct NiParticleSystem {
    pub geom_base: NiGeometry,
    pub world_space: bool,
    pub modifiers: Vec<BlockRef>,
}

impl NiParticleSystem {
    pub fn new(version: u32) -> Self {
        NiParticleSystem {
            geom_base: NiGeometry::new(version),
            world_space: true,
            modifiers: Vec::new(),
        }
    }
}

/// `NiPSysData` and `BSStripPSysData`.
#[derive(Debug, Clone, Default)]
pub struct NiPSysData {
    pub num_particles: u16,
    pub has_vertices: bool,
    pub has_texture_indices: bool,
    pub subtexture_offsets: Vec<Vector4>,
    pub max_point_count: Option<u16>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EmitterSettings {
    pub speed: f32,
    pub speed_variation: f32,
    pub declination: f32,
    pub declination_variation: f32,
    pub planar_angle: f32,
    pub planar_angle_variation: f32,
    pub initial_color: Color4,
    pub initial_radius: f32,
    pub radius_variation: f32,
    pub life_span: f32,
    pub life_span_variation: f32,
    pub emitter_object: BlockLink, // Back reference
}

impl Default for EmitterSettings {
    fn default() -> Self {
        EmitterSettings {
            speed: 0.0,
            speed_variation: 0.0,
            declination: 0.0,
            declination_variation: 0.0,
            planar_angle: 0.0,
            planar_angle_variation: 0.0,
            initial_color: Color4::default(),
            initial_radius: 1.0,
            radius_variation: 0.0,
            life_span: 0.0,
            life_span_variation: 0.0,
            emitter_object: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EmitterShape {
    Sphere {
        radius: f32,
    },
    Box {
        width: f32,
        height: f32,
        depth: f32,
    },
    Cylinder {
        radius: f32,
        height: f32,
    },
    Mesh {
        meshes: Vec<BlockRef>,
        initial_velocity_type: u32,
        emission_type: u32,
        emission_axis: Vector3,
    },
    Array,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SpawnSettings {
    pub num_spawn_generations: u16,
    pub percentage_spawned: f32,
    pub min_num_to_spawn: u16,
    pub max_num_to_spawn: u16,
    pub spawn_speed_variation: f32,
    pub spawn_dir_variation: f32,
    pub life_span: f32,
    pub life_span_variation: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RotationSettings {
    pub rotation_speed: f32,
    pub rotation_speed_variation: f32,
    pub rotation_angle: f32,
    pub rotation_angle_variation: f32,
    pub random_rot_speed_sign: bool,
    pub random_axis: bool,
    pub axis: Vector3,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldKind {
    Vortex {
        direction: Vector3,
    },
    Drag {
        use_direction: bool,
        direction: Vector3,
    },
    Turbulence {
        frequency: f32,
    },
    Air {
        direction: Vector3,
        air_friction: f32,
        inherit_velocity: f32,
        inherit_rotation: bool,
        enable_spread: bool,
        spread: f32,
    },
    Gravity {
        direction: Vector3,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldSettings {
    pub field_object: BlockLink, // Back reference to the field's node
    pub magnitude: f32,
    pub attenuation: f32,
    pub use_max_distance: bool,
    pub max_distance: f32,
    pub kind: FieldKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ModifierData {
    Emitter {
        settings: EmitterSettings,
        shape: EmitterShape,
    },
    Position,
    BoundUpdate {
        update_skip: u16,
    },
    Spawn(SpawnSettings),
    AgeDeath {
        spawn_on_death: bool,
        spawn_modifier: BlockLink,
    },
    Rotation(RotationSettings),
    Field(FieldSettings),
    ParentVelocity {
        damping: f32,
    },
    Wind {
        strength: f32,
    },
    StripUpdate {
        update_delta_time: f32,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct NiPSysModifier {
    pub name: String,
    pub order: u32,
    pub target: BlockLink, // Back reference to the particle system
    pub active: bool,
    pub data: ModifierData,
}

impl NiPSysModifier {
    pub fn scale(&mut self, factor: f32) {
        match &mut self.data {
            ModifierData::Emitter { settings, shape } => {
                settings.initial_radius *= factor;
                settings.radius_variation *= factor;
                settings.speed *= factor;
                match shape {
                    EmitterShape::Sphere { radius } => *radius *= factor,
                    EmitterShape::Box {
                        width,
                        height,
                        depth,
                    } => {
                        *width *= factor;
                        *height *= factor;
                        *depth *= factor;
                    }
                    EmitterShape::Cylinder { radius, height } => {
                        *radius *= factor;
                        *height *= factor;
                    }
                    EmitterShape::Mesh { .. } | EmitterShape::Array => {}
                }
            }
            ModifierData::Field(field) => field.max_distance *= factor,
            _ => {}
        }
    }
}

// --- Deref Implementations ---

impl Deref for NiParticleSystem {
    type Target = NiGeometry;
    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.geom_base
    }
}

impl DerefMut for NiParticleSystem {
    #[inline]
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.geom_base
    }
}
