use super::base::{BlockLink, Color3, Vector2};
use super::properties::NiProperty;
use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::ops::{Deref, DerefMut};

/// Lighting model of a `BSLightingShaderProperty`. Decides which trailing
/// fields the block carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LightingShaderType {
    #[default]
    Default,
    EnvironmentMap,
    GlowShader,
    Parallax,
    FaceTint,
    SkinTint,
    HairTint,
}

impl From<LightingShaderType> for u32 {
    fn from(value: LightingShaderType) -> Self {
        match value {
            LightingShaderType::Default => 0,
            LightingShaderType::EnvironmentMap => 1,
            LightingShaderType::GlowShader => 2,
            LightingShaderType::Parallax => 3,
            LightingShaderType::FaceTint => 4,
            LightingShaderType::SkinTint => 5,
            LightingShaderType::HairTint => 6,
        }
    }
}

bitflags! {
    /// First word of the Skyrim shader flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ShaderFlags1: u32 {
        const SPECULAR = 1 << 0;
        const SKINNED = 1 << 1;
        const VERTEX_ALPHA = 1 << 3;
        const ENVIRONMENT_MAPPING = 1 << 7;
        const RECEIVE_SHADOWS = 1 << 8;
        const CAST_SHADOWS = 1 << 9;
        const PARALLAX = 1 << 11;
        const MODEL_SPACE_NORMALS = 1 << 12;
        const FACEGEN_RGB_TINT = 1 << 21;
        const OWN_EMIT = 1 << 22;
        const REMAPPABLE_TEXTURES = 1 << 25;
        const DECAL = 1 << 26;
        const ZBUFFER_TEST = 1 << 31;
    }
}

impl Default for ShaderFlags1 {
    fn default() -> Self {
        ShaderFlags1::SPECULAR
            | ShaderFlags1::RECEIVE_SHADOWS
            | ShaderFlags1::CAST_SHADOWS
            | ShaderFlags1::OWN_EMIT
            | ShaderFlags1::REMAPPABLE_TEXTURES
            | ShaderFlags1::ZBUFFER_TEST
    }
}

bitflags! {
    /// Second word of the Skyrim shader flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ShaderFlags2: u32 {
        const ZBUFFER_WRITE = 1 << 0;
        const DOUBLE_SIDED = 1 << 4;
        const VERTEX_COLORS = 1 << 5;
        const GLOW_MAP = 1 << 6;
        const ENVMAP_LIGHT_FADE = 1 << 15;
        const SOFT_LIGHTING = 1 << 25;
        const RIM_LIGHTING = 1 << 26;
        const BACK_LIGHTING = 1 << 27;
    }
}

impl Default for ShaderFlags2 {
    fn default() -> Self {
        ShaderFlags2::ZBUFFER_WRITE | ShaderFlags2::VERTEX_COLORS | ShaderFlags2::ENVMAP_LIGHT_FADE
    }
}

#[derive(Debug, Clone)]
pub struct BSLightingShaderProperty {
    pub property_base: NiProperty,
    pub shader_type: LightingShaderType,
    pub shader_flags_1: ShaderFlags1,
    pub shader_flags_2: ShaderFlags2,
    pub uv_offset: Vector2,
    pub uv_scale: Vector2,
    pub texture_set: BlockLink,
    pub emissive_color: Color3,
    pub emissive_multiple: f32,
    pub texture_clamp_mode: u32,
    pub alpha: f32,
    pub refraction_strength: f32,
    pub glossiness: f32,
    pub specular_color: Color3,
    pub specular_strength: f32,
    pub lighting_effect_1: f32,
    pub lighting_effect_2: f32,
    pub environment_map_scale: f32, // EnvironmentMap only
    pub tint_color: Color3,         // SkinTint and HairTint only
}

impl BSLightingShaderProperty {
    pub fn new(version: u32) -> Self {
        BSLightingShaderProperty {
            property_base: NiProperty::new(version),
            shader_type: LightingShaderType::Default,
            shader_flags_1: ShaderFlags1::default(),
            shader_flags_2: ShaderFlags2::default(),
            uv_offset: Vector2([0.0, 0.0]),
            uv_scale: Vector2([1.0, 1.0]),
            texture_set: None,
            emissive_color: Color3([0.0; 3]),
            emissive_multiple: 1.0,
            texture_clamp_mode: 3, // wrap S, wrap T
            alpha: 1.0,
            refraction_strength: 0.0,
            glossiness: 80.0,
            specular_color: Color3([1.0; 3]),
            specular_strength: 1.0,
            lighting_effect_1: 0.3,
            lighting_effect_2: 2.0,
            environment_map_scale: 1.0,
            tint_color: Color3([1.0; 3]),
        }
    }
}

/// Slots of a `BSShaderTextureSet`, in file order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureSetSlot {
    Diffuse,
    Normal,
    Glow,
    Height,
    Environment,
    EnvironmentMask,
}

impl TextureSetSlot {
    pub fn index(self) -> usize {
        match self {
            TextureSetSlot::Diffuse => 0,
            TextureSetSlot::Normal => 1,
            TextureSetSlot::Glow => 2,
            TextureSetSlot::Height => 3,
            TextureSetSlot::Environment => 4,
            TextureSetSlot::EnvironmentMask => 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BSShaderTextureSet {
    pub textures: Vec<String>,
}

impl BSShaderTextureSet {
    pub const SKYRIM_SLOTS: usize = 9;

    pub fn set(&mut self, slot: TextureSetSlot, path: String) {
        let index = slot.index();
        if self.textures.len() <= index {
            self.textures.resize(index + 1, String::new());
        }
        self.textures[index] = path;
    }
}

impl Default for BSShaderTextureSet {
    fn default() -> Self {
        BSShaderTextureSet {
            textures: vec![String::new(); Self::SKYRIM_SLOTS],
        }
    }
}

impl Deref for BSLightingShaderProperty {
    type Target = NiProperty;
    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.property_base
    }
}

impl DerefMut for BSLightingShaderProperty {
    #[inline]
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.property_base
    }
}
