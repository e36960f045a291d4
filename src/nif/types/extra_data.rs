use super::base::{BlockLink, Vector3};
use std::fmt::Debug;
use std::ops::{Deref, DerefMut};

#[derive(Debug, Clone, Default)]
pub struct ExtraFields {
    /// Written from 10.0.1.0.
    pub name: String,
    /// Link to the next extra data in the chain attached to the owner (up to 4.2.2.0).
    pub next_extra_data: BlockLink,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextKey {
    pub time: f32,
    pub value: String,
}

#[derive(Debug, Clone, Default)]
pub struct NiTextKeyExtraData {
    pub extra_base: ExtraFields,
    pub text_keys: Vec<TextKey>,
}

#[derive(Debug, Clone, Default)]
pub struct NiStringExtraData {
    pub extra_base: ExtraFields,
    pub string_data: String,
}

impl NiStringExtraData {
    /// Size of the payload as old versions record it ahead of the string.
    pub fn bytes_remaining(&self) -> u32 {
        self.string_data.len() as u32 + 4
    }
}

/// Bethesda bounding box stored as extra data on the root.
#[derive(Debug, Clone, Default)]
pub struct BSBound {
    pub extra_base: ExtraFields,
    pub center: Vector3,
    pub dimensions: Vector3,
}

// --- Deref Implementations ---

impl Deref for NiTextKeyExtraData {
    type Target = ExtraFields;
    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.extra_base
    }
}

impl DerefMut for NiTextKeyExtraData {
    #[inline]
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.extra_base
    }
}

impl Deref for NiStringExtraData {
    type Target = ExtraFields;
    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.extra_base
    }
}

impl DerefMut for NiStringExtraData {
    #[inline]
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.extra_base
    }
}

impl Deref for BSBound {
    type Target = ExtraFields;
    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.extra_base
    }
}

impl DerefMut for BSBound {
    #[inline]
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.extra_base
    }
}
