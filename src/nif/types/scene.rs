use super::base::{BlockLink, BlockRef, BoundingVolume, NiTransform, Vector3};
use crate::nif::version::{V10_0_1_0, V4_2_2_0};
use std::fmt::Debug;
use std::ops::{Deref, DerefMut};

// --- Capabilities ---
// Implemented by the base structs; a `BlockData` hands them out when the
// variant it wraps derives from that base.

pub trait HasController {
    fn controller(&self) -> BlockLink;
    fn set_controller(&mut self, link: BlockLink);
}

pub trait HasExtraData {
    fn extra_data(&self) -> &ExtraDataLinks;
    fn extra_data_mut(&mut self) -> &mut ExtraDataLinks;
}

pub trait HasTransform {
    fn transform(&self) -> &NiTransform;
    fn transform_mut(&mut self) -> &mut NiTransform;
}

pub trait HasProperties {
    fn properties(&self) -> &[BlockRef];
    fn push_property(&mut self, property: BlockRef);
}

pub trait HasChildren {
    fn children(&self) -> &[BlockRef];
    fn push_child(&mut self, child: BlockRef);
    fn push_effect(&mut self, effect: BlockRef);
}

/// Old files chain extra data through `next_extra_data`; newer ones keep a list.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtraDataLinks {
    Chain(BlockLink),
    List(Vec<BlockRef>),
}

impl ExtraDataLinks {
    pub fn for_version(version: u32) -> Self {
        if version >= V10_0_1_0 {
            ExtraDataLinks::List(Vec::new())
        } else {
            ExtraDataLinks::Chain(None)
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = BlockRef> + '_ {
        let (head, list) = match self {
            ExtraDataLinks::Chain(head) => (*head, &[][..]),
            ExtraDataLinks::List(list) => (None, list.as_slice()),
        };
        head.into_iter().chain(list.iter().copied())
    }
}

// --- Structs using Pure Composition ---

#[derive(Debug, Clone)]
pub struct NiObjectNET {
    pub name: String,
    pub extra_data: ExtraDataLinks,
    pub controller: BlockLink,
}

impl NiObjectNET {
    pub fn new(version: u32) -> Self {
        NiObjectNET {
            name: String::new(),
            extra_data: ExtraDataLinks::for_version(version),
            controller: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl HasController for NiObjectNET {
    fn controller(&self) -> BlockLink {
        self.controller
    }
    fn set_controller(&mut self, link: BlockLink) {
        self.controller = link;
    }
}

impl HasExtraData for NiObjectNET {
    fn extra_data(&self) -> &ExtraDataLinks {
        &self.extra_data
    }
    fn extra_data_mut(&mut self) -> &mut ExtraDataLinks {
        &mut self.extra_data
    }
}

#[derive(Debug, Clone)]
pub struct NiAVObject {
    pub net_base: NiObjectNET,
    pub flags: u16,
    pub transform: NiTransform,
    pub velocity: Vector3,
    pub properties: Vec<BlockRef>,
    // Only written up to 4.2.2.0
    pub bounding_volume: Option<BoundingVolume>,
    // Only written from 10.0.1.0
    pub collision_object: BlockLink,
}

impl NiAVObject {
    pub fn new(version: u32) -> Self {
        NiAVObject {
            net_base: NiObjectNET::new(version),
            flags: 0,
            transform: NiTransform::default(),
            velocity: Vector3::ZERO,
            properties: Vec::new(),
            bounding_volume: None,
            collision_object: None,
        }
    }

    pub fn supports_bounding_volume(version: u32) -> bool {
        version <= V4_2_2_0
    }
}

impl HasTransform for NiAVObject {
    fn transform(&self) -> &NiTransform {
        &self.transform
    }
    fn transform_mut(&mut self) -> &mut NiTransform {
        &mut self.transform
    }
}

impl HasProperties for NiAVObject {
    fn properties(&self) -> &[BlockRef] {
        &self.properties
    }
    fn push_property(&mut self, property: BlockRef) {
        if !self.properties.contains(&property) {
            self.properties.push(property);
        }
    }
}

#[derive(Debug, Clone)]
pub struct NiNode {
    pub av_base: NiAVObject,
    pub children: Vec<BlockRef>,
    pub effects: Vec<BlockRef>,
}

impl NiNode {
    pub fn new(version: u32) -> Self {
        NiNode {
            av_base: NiAVObject::new(version),
            children: Vec::new(),
            effects: Vec::new(),
        }
    }
}

impl HasChildren for NiNode {
    fn children(&self) -> &[BlockRef] {
        &self.children
    }
    fn push_child(&mut self, child: BlockRef) {
        self.children.push(child);
    }
    fn push_effect(&mut self, effect: BlockRef) {
        self.effects.push(effect);
    }
}

/// Shared layout of `NiTriShape` and the particle systems.
#[derive(Debug, Clone)]
pub struct NiGeometry {
    pub av_base: NiAVObject,
    pub data: BlockLink,
    pub skin_instance: BlockLink,
    // Shader-era shapes hold these instead of a property list.
    pub shader_property: BlockLink,
    pub alpha_property: BlockLink,
}

impl NiGeometry {
    pub fn new(version: u32) -> Self {
        NiGeometry {
            av_base: NiAVObject::new(version),
            data: None,
            skin_instance: None,
            shader_property: None,
            alpha_property: None,
        }
    }
}

// --- Deref Implementations for Automatic Method/Field Forwarding ---

impl Deref for NiAVObject {
    type Target = NiObjectNET;
    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.net_base
    }
}

impl DerefMut for NiAVObject {
    #[inline]
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.net_base
    }
}

impl Deref for NiNode {
    type Target = NiAVObject;
    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.av_base
    }
}

impl DerefMut for NiNode {
    #[inline]
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.av_base
    }
}

impl Deref for NiGeometry {
    type Target = NiAVObject;
    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.av_base
    }
}

impl DerefMut for NiGeometry {
    #[inline]
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.av_base
    }
}
