use super::base::{BlockLink, Vector2};
use super::properties::NiProperty;
use super::scene::NiObjectNET;
use std::fmt::Debug;
use std::ops::{Deref, DerefMut};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PixelLayout {
    Palettized8,
    HighColor16,
    TrueColor32,
    Compressed,
    Bumpmap,
    #[default]
    Palettized4,
    Default,
}
impl From<PixelLayout> for u32 {
    fn from(value: PixelLayout) -> Self {
        match value {
            PixelLayout::Palettized8 => 0,
            PixelLayout::HighColor16 => 1,
            PixelLayout::TrueColor32 => 2,
            PixelLayout::Compressed => 3,
            PixelLayout::Bumpmap => 4,
            PixelLayout::Palettized4 => 5,
            PixelLayout::Default => 6,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MipMapFormat {
    No,
    #[default]
    Yes,
    Default,
}
impl From<MipMapFormat> for u32 {
    fn from(value: MipMapFormat) -> Self {
        match value {
            MipMapFormat::No => 0,
            MipMapFormat::Yes => 1,
            MipMapFormat::Default => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AlphaFormat {
    None,
    Binary,
    Smooth,
    #[default]
    Default,
}
impl From<AlphaFormat> for u32 {
    fn from(value: AlphaFormat) -> Self {
        match value {
            AlphaFormat::None => 0,
            AlphaFormat::Binary => 1,
            AlphaFormat::Smooth => 2,
            AlphaFormat::Default => 3,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NiSourceTexture {
    pub net_base: NiObjectNET,
    pub use_external: bool,
    pub file_name: String,
    pub pixel_layout: PixelLayout,
    pub use_mipmaps: MipMapFormat,
    pub alpha_format: AlphaFormat,
    pub is_static: bool,
    pub direct_render: bool,
}

impl NiSourceTexture {
    pub fn new(version: u32) -> Self {
        NiSourceTexture {
            net_base: NiObjectNET::new(version),
            use_external: true,
            file_name: String::new(),
            pixel_layout: PixelLayout::default(),
            use_mipmaps: MipMapFormat::Yes,
            alpha_format: AlphaFormat::Default,
            is_static: true,
            direct_render: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ApplyMode {
    Replace,
    Decal,
    #[default]
    Modulate,
    Hilight,
    Hilight2,
}
impl From<ApplyMode> for u32 {
    fn from(value: ApplyMode) -> Self {
        match value {
            ApplyMode::Replace => 0,
            ApplyMode::Decal => 1,
            ApplyMode::Modulate => 2,
            ApplyMode::Hilight => 3,
            ApplyMode::Hilight2 => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ClampMode {
    ClampSClampT,
    ClampSWrapT,
    WrapSClampT,
    #[default]
    WrapSWrapT,
}
impl From<ClampMode> for u32 {
    fn from(value: ClampMode) -> Self {
        match value {
            ClampMode::ClampSClampT => 0,
            ClampMode::ClampSWrapT => 1,
            ClampMode::WrapSClampT => 2,
            ClampMode::WrapSWrapT => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FilterMode {
    Nearest,
    Bilerp,
    #[default]
    Trilerp,
    NearestMipNearest,
    NearestMipLerp,
    BilerpMipNearest,
}
impl From<FilterMode> for u32 {
    fn from(value: FilterMode) -> Self {
        match value {
            FilterMode::Nearest => 0,
            FilterMode::Bilerp => 1,
            FilterMode::Trilerp => 2,
            FilterMode::NearestMipNearest => 3,
            FilterMode::NearestMipLerp => 4,
            FilterMode::BilerpMipNearest => 5,
        }
    }
}

/// Which part of a texture transform a controller drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransformMember {
    TranslateU,
    TranslateV,
    Rotate,
    ScaleU,
    ScaleV,
}
impl From<TransformMember> for u32 {
    fn from(value: TransformMember) -> Self {
        match value {
            TransformMember::TranslateU => 0,
            TransformMember::TranslateV => 1,
            TransformMember::Rotate => 2,
            TransformMember::ScaleU => 3,
            TransformMember::ScaleV => 4,
        }
    }
}

/// UV transform of a texture slot, applied 3ds Max style about `center`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TexTransform {
    pub translation: Vector2,
    pub scale: Vector2,
    pub rotation: f32,
    pub center: Vector2,
}

impl TexTransform {
    /// `TransformMethod::Max`.
    pub const METHOD_MAX: u32 = 1;
}

impl Default for TexTransform {
    fn default() -> Self {
        TexTransform {
            translation: Vector2([0.0, 0.0]),
            scale: Vector2([1.0, 1.0]),
            rotation: 0.0,
            center: Vector2([0.5, 0.5]),
        }
    }
}

/// One texture slot of an `NiTexturingProperty`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TexDesc {
    pub source: BlockLink,
    pub clamp_mode: ClampMode,
    pub filter_mode: FilterMode,
    pub uv_set: u32,
    pub transform: Option<TexTransform>, // 10.1.0.0+
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BumpMap {
    pub desc: TexDesc,
    pub luma_scale: f32,
    pub luma_offset: f32,
    pub matrix: [f32; 4], // M11, M12, M21, M22
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureSlot {
    Base,
    Dark,
    Detail,
    Gloss,
    Glow,
    Bump,
    Normal,
}

impl From<TextureSlot> for u32 {
    fn from(value: TextureSlot) -> Self {
        match value {
            TextureSlot::Base => 0,
            TextureSlot::Dark => 1,
            TextureSlot::Detail => 2,
            TextureSlot::Gloss => 3,
            TextureSlot::Glow => 4,
            TextureSlot::Bump => 5,
            TextureSlot::Normal => 6,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NiTexturingProperty {
    pub property_base: NiProperty,
    pub flags: u16,
    pub apply_mode: ApplyMode,
    pub texture_count: u32,
    pub base_texture: Option<TexDesc>,
    pub dark_texture: Option<TexDesc>,
    pub detail_texture: Option<TexDesc>,
    pub gloss_texture: Option<TexDesc>,
    pub glow_texture: Option<TexDesc>,
    pub bump_map_texture: Option<BumpMap>,
    pub normal_texture: Option<TexDesc>, // 20.2.0.5+
}

impl NiTexturingProperty {
    pub fn new(version: u32) -> Self {
        NiTexturingProperty {
            property_base: NiProperty::new(version),
            flags: 0,
            apply_mode: ApplyMode::Modulate,
            texture_count: 7,
            base_texture: None,
            dark_texture: None,
            detail_texture: None,
            gloss_texture: None,
            glow_texture: None,
            bump_map_texture: None,
            normal_texture: None,
        }
    }

    pub fn slot(&self, slot: TextureSlot) -> Option<TexDesc> {
        match slot {
            TextureSlot::Base => self.base_texture,
            TextureSlot::Dark => self.dark_texture,
            TextureSlot::Detail => self.detail_texture,
            TextureSlot::Gloss => self.gloss_texture,
            TextureSlot::Glow => self.glow_texture,
            TextureSlot::Bump => self.bump_map_texture.map(|bump| bump.desc),
            TextureSlot::Normal => self.normal_texture,
        }
    }

    pub fn slot_mut(&mut self, slot: TextureSlot) -> Option<&mut TexDesc> {
        match slot {
            TextureSlot::Base => self.base_texture.as_mut(),
            TextureSlot::Dark => self.dark_texture.as_mut(),
            TextureSlot::Detail => self.detail_texture.as_mut(),
            TextureSlot::Gloss => self.gloss_texture.as_mut(),
            TextureSlot::Glow => self.glow_texture.as_mut(),
            TextureSlot::Bump => self.bump_map_texture.as_mut().map(|bump| &mut bump.desc),
            TextureSlot::Normal => self.normal_texture.as_mut(),
        }
    }

    pub fn set_slot(&mut self, slot: TextureSlot, desc: TexDesc) {
        match slot {
            TextureSlot::Base => self.base_texture = Some(desc),
            TextureSlot::Dark => self.dark_texture = Some(desc),
            TextureSlot::Detail => self.detail_texture = Some(desc),
            TextureSlot::Gloss => self.gloss_texture = Some(desc),
            TextureSlot::Glow => self.glow_texture = Some(desc),
            TextureSlot::Bump => {
                self.bump_map_texture = Some(BumpMap {
                    desc,
                    luma_scale: 1.0,
                    luma_offset: 0.0,
                    matrix: [1.0, 0.0, 0.0, 1.0],
                })
            }
            TextureSlot::Normal => self.normal_texture = Some(desc),
        }
    }

    /// Slots in file order, used by link traversal.
    pub fn descs(&self) -> impl Iterator<Item = TexDesc> + '_ {
        [
            self.base_texture,
            self.dark_texture,
            self.detail_texture,
            self.gloss_texture,
            self.glow_texture,
            self.bump_map_texture.map(|bump| bump.desc),
            self.normal_texture,
        ]
        .into_iter()
        .flatten()
    }
}

// --- Deref Implementations ---
impl Deref for NiSourceTexture {
    type Target = NiObjectNET;
    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.net_base
    }
}

impl DerefMut for NiSourceTexture {
    #[inline]
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.net_base
    }
}

impl Deref for NiTexturingProperty {
    type Target = NiProperty;
    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.property_base
    }
}

impl DerefMut for NiTexturingProperty {
    #[inline]
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.property_base
    }
}
