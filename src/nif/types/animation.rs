use super::base::{BlockLink, BlockRef, Quaternion, Vector3};
use super::scene::NiObjectNET;
use super::textures::{TextureSlot, TransformMember};
use crate::nif::version::{V10_1_0_103, V10_2_0_0, V20_1_0_0};
use bitflags::bitflags;
use std::fmt::Debug;
use std::ops::{Deref, DerefMut};

bitflags! {
    /// `NiTimeController::flags`. Bits 1-2 hold the cycle type.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct TimeControllerFlags: u16 {
        const APP_INIT = 1 << 0;
        const CYCLE_REVERSE = 1 << 1;
        const CYCLE_CLAMP = 1 << 2;
        const ACTIVE = 1 << 3;
        const PLAY_BACKWARDS = 1 << 4;
        const MANAGER_CONTROLLED = 1 << 5;
        const COMPUTE_SCALED_TIME = 1 << 6;
        const FORCED_UPDATE = 1 << 7;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CycleType {
    #[default]
    Loop,
    Reverse,
    Clamp,
}

impl CycleType {
    pub fn controller_flags(self) -> TimeControllerFlags {
        match self {
            CycleType::Loop => TimeControllerFlags::empty(),
            CycleType::Reverse => TimeControllerFlags::CYCLE_REVERSE,
            CycleType::Clamp => TimeControllerFlags::CYCLE_CLAMP,
        }
    }
}

impl From<CycleType> for u32 {
    fn from(value: CycleType) -> Self {
        match value {
            CycleType::Loop => 0,
            CycleType::Reverse => 1,
            CycleType::Clamp => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyType {
    // Interpolation type for keys
    #[default]
    Linear,
    Quadratic,   // Bezier interpolation
    Tbc,         // Tension Bias Continuity interpolation
    XyzRotation, // Euler angles
    Const,       // Step function
}

impl From<KeyType> for u32 {
    fn from(value: KeyType) -> Self {
        match value {
            KeyType::Linear => 1,
            KeyType::Quadratic => 2,
            KeyType::Tbc => 3,
            KeyType::XyzRotation => 4,
            KeyType::Const => 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Key<T> {
    pub time: f32,
    pub value: T,
    pub tangents: Option<(T, T)>, // forward, backward; Quadratic only
    pub tbc: Option<[f32; 3]>,    // tension, bias, continuity; Tbc only
}

impl<T> Key<T> {
    pub fn new(time: f32, value: T) -> Self {
        Key {
            time,
            value,
            tangents: None,
            tbc: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct KeyGroup<T> {
    pub interpolation: KeyType,
    pub keys: Vec<Key<T>>,
}

impl<T> Default for KeyGroup<T> {
    fn default() -> Self {
        KeyGroup {
            interpolation: KeyType::Linear,
            keys: Vec::new(),
        }
    }
}

impl<T> KeyGroup<T> {
    pub fn linear(keys: Vec<Key<T>>) -> Self {
        KeyGroup {
            interpolation: KeyType::Linear,
            keys,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

// --- Controllers ---

#[derive(Debug, Clone, Default)]
pub struct NiTimeController {
    pub next_controller: BlockLink,
    pub flags: TimeControllerFlags,
    pub frequency: f32,
    pub phase: f32,
    pub start_time: f32,
    pub stop_time: f32,
    pub target: BlockLink, // Back reference, never ownership
}

impl NiTimeController {
    pub fn new() -> Self {
        NiTimeController {
            flags: TimeControllerFlags::ACTIVE,
            frequency: 1.0,
            ..Default::default()
        }
    }
}

/// Controllers with one interpolator (10.1.0.104+) or one data block (older).
#[derive(Debug, Clone, Default)]
pub struct NiSingleInterpController {
    pub time_base: NiTimeController,
    pub interpolator: BlockLink,
    pub data: BlockLink,
}

impl NiSingleInterpController {
    pub fn new() -> Self {
        NiSingleInterpController {
            time_base: NiTimeController::new(),
            interpolator: None,
            data: None,
        }
    }

    pub fn uses_interpolator(version: u32) -> bool {
        version > V10_1_0_103
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MaterialColor {
    #[default]
    Ambient,
    Diffuse,
    Specular,
    SelfIllum,
}

impl From<MaterialColor> for u16 {
    fn from(value: MaterialColor) -> Self {
        match value {
            MaterialColor::Ambient => 0,
            MaterialColor::Diffuse => 1,
            MaterialColor::Specular => 2,
            MaterialColor::SelfIllum => 3,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct NiMaterialColorController {
    pub interp_base: NiSingleInterpController,
    pub target_color: MaterialColor,
}

/// Drives one member of a texture slot's UV transform.
#[derive(Debug, Clone)]
pub struct NiTextureTransformController {
    pub interp_base: NiSingleInterpController,
    pub shader_map: bool,
    pub texture_slot: TextureSlot,
    pub operation: TransformMember,
}

#[derive(Debug, Clone, Default)]
pub struct NiPSysEmitterCtlr {
    pub interp_base: NiSingleInterpController,
    pub modifier_name: String,
    pub visibility_interpolator: BlockLink,
}

#[derive(Debug, Clone, Default)]
pub struct NiControllerManager {
    pub time_base: NiTimeController,
    pub cumulative: bool,
    pub sequences: Vec<BlockRef>,
    pub object_palette: BlockLink,
}

// --- Interpolators ---

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NiTransformInterpolator {
    pub translation: Vector3,
    pub rotation: Quaternion,
    pub scale: f32,
    pub data: BlockLink,
}

impl Default for NiTransformInterpolator {
    fn default() -> Self {
        NiTransformInterpolator {
            translation: Vector3::ZERO,
            rotation: Quaternion::IDENTITY,
            scale: 1.0,
            data: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NiFloatInterpolator {
    pub value: f32,
    pub data: BlockLink,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NiBoolInterpolator {
    pub value: bool,
    pub data: BlockLink,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NiPoint3Interpolator {
    pub value: Vector3,
    pub data: BlockLink,
}

#[derive(Debug, Clone, Copy)]
pub struct NiBlendBoolInterpolator {
    pub manager_controlled: bool,
    pub array_size: u8,
    pub weight_threshold: f32,
    pub value: bool,
}

impl Default for NiBlendBoolInterpolator {
    fn default() -> Self {
        NiBlendBoolInterpolator {
            manager_controlled: true,
            array_size: 2,
            weight_threshold: 0.0,
            value: false,
        }
    }
}

// --- Key data ---

/// Layout shared by `NiKeyframeData` and `NiTransformData`.
#[derive(Debug, Clone, Default)]
pub struct NiKeyframeData {
    pub rotation_type: KeyType,
    pub quaternion_keys: Vec<Key<Quaternion>>,
    pub xyz_rotations: [KeyGroup<f32>; 3],
    pub translations: KeyGroup<Vector3>,
    pub scales: KeyGroup<f32>,
}

impl NiKeyframeData {
    /// The count written before the rotation keys. Euler data always
    /// claims a single key; the engine crashes on anything else.
    pub fn num_rotation_keys(&self) -> u32 {
        match self.rotation_type {
            KeyType::XyzRotation => 1,
            _ => self.quaternion_keys.len() as u32,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.quaternion_keys.is_empty()
            && self.xyz_rotations.iter().all(KeyGroup::is_empty)
            && self.translations.is_empty()
            && self.scales.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct NiFloatData {
    pub data: KeyGroup<f32>,
}

#[derive(Debug, Clone, Default)]
pub struct NiPosData {
    pub data: KeyGroup<Vector3>,
}

#[derive(Debug, Clone, Default)]
pub struct NiBoolData {
    pub data: KeyGroup<bool>,
}

#[derive(Debug, Clone, Default)]
pub struct NiVisData {
    pub keys: Vec<Key<bool>>,
}

// --- Sequences ---

/// How a controlled block names its target. Which form is used depends
/// on the file version and is fixed when the block is created.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlledBlockNames {
    /// Up to 10.1.0.103: the node name is stored inline.
    Legacy { target_name: String },
    /// 10.2.0.0 to 20.1.0.0: offsets into the sequence's string palette.
    Palette {
        palette: BlockRef,
        node_name_offset: u32,
        property_type_offset: u32,
        controller_type_offset: u32,
        controller_id_offset: u32,
        interpolator_id_offset: u32,
    },
    /// Everything else: the strings themselves.
    Direct {
        node_name: String,
        property_type: String,
        controller_type: String,
        controller_id: String,
        interpolator_id: String,
    },
}

impl ControlledBlockNames {
    pub fn uses_palette(version: u32) -> bool {
        (V10_2_0_0..=V20_1_0_0).contains(&version)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ControlledBlock {
    pub interpolator: BlockLink,
    pub controller: BlockLink,
    pub priority: u8,
    pub names: ControlledBlockNames,
}

#[derive(Debug, Clone)]
pub struct NiControllerSequence {
    pub name: String,
    pub controlled_blocks: Vec<ControlledBlock>,
    pub array_grow_by: u32,
    pub weight: f32,
    pub text_keys: BlockLink,
    pub cycle_type: CycleType,
    pub frequency: f32,
    pub start_time: f32,
    pub stop_time: f32,
    pub manager: BlockLink, // Back reference
    pub accum_root_name: String,
    pub string_palette: BlockLink,
}

impl Default for NiControllerSequence {
    fn default() -> Self {
        NiControllerSequence {
            name: String::new(),
            controlled_blocks: Vec::new(),
            array_grow_by: 1,
            weight: 1.0,
            text_keys: None,
            cycle_type: CycleType::Clamp,
            frequency: 1.0,
            start_time: 0.0,
            stop_time: 0.0,
            manager: None,
            accum_root_name: String::new(),
            string_palette: None,
        }
    }
}

/// Null-separated string table addressed by byte offset. Holds the
/// already encoded bytes so offsets match the file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NiStringPalette {
    pub palette: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AVObjectEntry {
    pub name: String,
    pub av_object: BlockRef, // Back reference
}

#[derive(Debug, Clone, Default)]
pub struct NiDefaultAVObjectPalette {
    pub scene: BlockLink, // Back reference
    pub objs: Vec<AVObjectEntry>,
}

/// Morrowind keyframe file root. Controllers and target names hang off
/// its controller and extra data chains.
#[derive(Debug, Clone)]
pub struct NiSequenceStreamHelper {
    pub net_base: NiObjectNET,
}

// --- Deref Implementations ---

impl Deref for NiSingleInterpController {
    type Target = NiTimeController;
    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.time_base
    }
}

impl DerefMut for NiSingleInterpController {
    #[inline]
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.time_base
    }
}

impl Deref for NiMaterialColorController {
    type Target = NiSingleInterpController;
    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.interp_base
    }
}

impl DerefMut for NiMaterialColorController {
    #[inline]
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.interp_base
    }
}

impl Deref for NiTextureTransformController {
    type Target = NiSingleInterpController;
    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.interp_base
    }
}

impl DerefMut for NiTextureTransformController {
    #[inline]
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.interp_base
    }
}

impl Deref for NiPSysEmitterCtlr {
    type Target = NiSingleInterpController;
    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.interp_base
    }
}

impl DerefMut for NiPSysEmitterCtlr {
    #[inline]
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.interp_base
    }
}

impl Deref for NiControllerManager {
    type Target = NiTimeController;
    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.time_base
    }
}

impl DerefMut for NiControllerManager {
    #[inline]
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.time_base
    }
}
