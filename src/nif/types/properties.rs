use super::base::Color3;
use super::scene::NiObjectNET;
use std::fmt::Debug;
use std::ops::{Deref, DerefMut};

#[derive(Debug, Clone)]
pub struct NiProperty {
    pub net_base: NiObjectNET,
}

impl NiProperty {
    pub fn new(version: u32) -> Self {
        NiProperty {
            net_base: NiObjectNET::new(version),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NiMaterialProperty {
    pub property_base: NiProperty,
    pub flags: u16, // Written up to 10.0.1.2
    pub ambient_color: Color3,
    pub diffuse_color: Color3,
    pub specular_color: Color3,
    pub emissive_color: Color3,
    pub glossiness: f32,
    pub alpha: f32,
    pub emissive_mult: f32, // Fallout 3 and later
}

impl NiMaterialProperty {
    pub fn new(version: u32) -> Self {
        NiMaterialProperty {
            property_base: NiProperty::new(version),
            flags: 0,
            ambient_color: Color3([1.0; 3]),
            diffuse_color: Color3([1.0; 3]),
            specular_color: Color3([0.0; 3]),
            emissive_color: Color3([0.0; 3]),
            glossiness: 10.0,
            alpha: 1.0,
            emissive_mult: 1.0,
        }
    }
}

// Specific property type: NiAlphaProperty
#[derive(Debug, Clone)]
pub struct NiAlphaProperty {
    pub property_base: NiProperty,
    pub flags: u16,
    pub threshold: u8,
}

impl NiAlphaProperty {
    /// Blend enabled, src alpha / inv src alpha.
    pub const DEFAULT_FLAGS: u16 = 0x12ED;

    pub fn new(version: u32) -> Self {
        NiAlphaProperty {
            property_base: NiProperty::new(version),
            flags: Self::DEFAULT_FLAGS,
            threshold: 0,
        }
    }
}

// --- Deref Implementations ---

impl Deref for NiProperty {
    type Target = NiObjectNET;
    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.net_base
    }
}

impl DerefMut for NiProperty {
    #[inline]
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.net_base
    }
}

impl Deref for NiMaterialProperty {
    type Target = NiProperty;
    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.property_base
    }
}

impl DerefMut for NiMaterialProperty {
    #[inline]
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.property_base
    }
}

impl Deref for NiAlphaProperty {
    type Target = NiProperty;
    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.property_base
    }
}

impl DerefMut for NiAlphaProperty {
    #[inline]
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.property_base
    }
}
