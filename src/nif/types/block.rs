//! The closed set of block kinds the exporter can create, and the tagged
//! union holding their fields.

use std::fmt;
use std::str::FromStr;

use super::animation::*;
use super::base::{BlockLink, BlockRef, Vector3};
use super::collision::*;
use super::extra_data::{BSBound, ExtraFields, NiStringExtraData, NiTextKeyExtraData};
use super::geometry::{NiSkinData, NiSkinInstance, NiTriShapeData};
use super::particles::*;
use super::properties::{NiAlphaProperty, NiMaterialProperty};
use super::scene::{HasChildren, HasController, NiAVObject, NiGeometry, NiNode, NiObjectNET};
use super::shaders::{BSLightingShaderProperty, BSShaderTextureSet};
use super::textures::{NiSourceTexture, NiTexturingProperty, TextureSlot, TransformMember};
use crate::nif::error::ExportError;
use crate::nif::version::*;

macro_rules! block_kinds {
    ($($variant:ident => $name:literal),* $(,)?) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum BlockKind {
            $($variant),*
        }

        impl BlockKind {
            pub const ALL: &'static [BlockKind] = &[$(BlockKind::$variant),*];

            /// The class name as the file format spells it.
            pub fn name(self) -> &'static str {
                match self {
                    $(BlockKind::$variant => $name),*
                }
            }
        }
    };
}

block_kinds! {
    NiNode => "NiNode",
    NiBillboardNode => "NiBillboardNode",
    BSFadeNode => "BSFadeNode",
    NiBSAnimationNode => "NiBSAnimationNode",
    RootCollisionNode => "RootCollisionNode",
    NiTriShape => "NiTriShape",
    NiTriShapeData => "NiTriShapeData",
    NiSkinInstance => "NiSkinInstance",
    NiSkinData => "NiSkinData",
    NiMaterialProperty => "NiMaterialProperty",
    NiAlphaProperty => "NiAlphaProperty",
    NiTexturingProperty => "NiTexturingProperty",
    NiSourceTexture => "NiSourceTexture",
    BSLightingShaderProperty => "BSLightingShaderProperty",
    BSShaderTextureSet => "BSShaderTextureSet",
    NiTextKeyExtraData => "NiTextKeyExtraData",
    NiStringExtraData => "NiStringExtraData",
    BSBound => "BSBound",
    NiKeyframeController => "NiKeyframeController",
    NiTransformController => "NiTransformController",
    NiVisController => "NiVisController",
    NiAlphaController => "NiAlphaController",
    NiMaterialColorController => "NiMaterialColorController",
    NiTextureTransformController => "NiTextureTransformController",
    NiPSysEmitterCtlr => "NiPSysEmitterCtlr",
    NiPSysUpdateCtlr => "NiPSysUpdateCtlr",
    NiControllerManager => "NiControllerManager",
    NiTransformInterpolator => "NiTransformInterpolator",
    NiFloatInterpolator => "NiFloatInterpolator",
    NiBoolInterpolator => "NiBoolInterpolator",
    NiPoint3Interpolator => "NiPoint3Interpolator",
    NiBlendBoolInterpolator => "NiBlendBoolInterpolator",
    NiKeyframeData => "NiKeyframeData",
    NiTransformData => "NiTransformData",
    NiFloatData => "NiFloatData",
    NiPosData => "NiPosData",
    NiBoolData => "NiBoolData",
    NiVisData => "NiVisData",
    NiControllerSequence => "NiControllerSequence",
    NiStringPalette => "NiStringPalette",
    NiDefaultAVObjectPalette => "NiDefaultAVObjectPalette",
    NiSequenceStreamHelper => "NiSequenceStreamHelper",
    BhkCollisionObject => "bhkCollisionObject",
    BhkRigidBody => "bhkRigidBody",
    BhkRigidBodyT => "bhkRigidBodyT",
    BhkSphereShape => "bhkSphereShape",
    BhkBoxShape => "bhkBoxShape",
    BhkCapsuleShape => "bhkCapsuleShape",
    BhkConvexVerticesShape => "bhkConvexVerticesShape",
    BhkBallAndSocketConstraint => "bhkBallAndSocketConstraint",
    BhkHingeConstraint => "bhkHingeConstraint",
    BhkLimitedHingeConstraint => "bhkLimitedHingeConstraint",
    BhkPrismaticConstraint => "bhkPrismaticConstraint",
    BhkRagdollConstraint => "bhkRagdollConstraint",
    BhkStiffSpringConstraint => "bhkStiffSpringConstraint",
    BhkBreakableConstraint => "bhkBreakableConstraint",
    NiParticleSystem => "NiParticleSystem",
    BSStripParticleSystem => "BSStripParticleSystem",
    NiPSysData => "NiPSysData",
    BSStripPSysData => "BSStripPSysData",
    NiPSysSphereEmitter => "NiPSysSphereEmitter",
    NiPSysBoxEmitter => "NiPSysBoxEmitter",
    NiPSysCylinderEmitter => "NiPSysCylinderEmitter",
    NiPSysMeshEmitter => "NiPSysMeshEmitter",
    BSPSysArrayEmitter => "BSPSysArrayEmitter",
    NiPSysPositionModifier => "NiPSysPositionModifier",
    NiPSysBoundUpdateModifier => "NiPSysBoundUpdateModifier",
    NiPSysSpawnModifier => "NiPSysSpawnModifier",
    NiPSysAgeDeathModifier => "NiPSysAgeDeathModifier",
    NiPSysRotationModifier => "NiPSysRotationModifier",
    NiPSysVortexFieldModifier => "NiPSysVortexFieldModifier",
    NiPSysDragFieldModifier => "NiPSysDragFieldModifier",
    NiPSysTurbulenceFieldModifier => "NiPSysTurbulenceFieldModifier",
    NiPSysAirFieldModifier => "NiPSysAirFieldModifier",
    NiPSysGravityFieldModifier => "NiPSysGravityFieldModifier",
    BSParentVelocityModifier => "BSParentVelocityModifier",
    BSWindModifier => "BSWindModifier",
    BSPSysStripUpdateModifier => "BSPSysStripUpdateModifier",
}

impl BlockKind {
    /// Oldest file version in which the class exists.
    pub fn min_version(self) -> u32 {
        use BlockKind::*;
        match self {
            NiControllerManager | NiControllerSequence | NiDefaultAVObjectPalette => V10_0_1_0,
            BhkCollisionObject | BhkRigidBody | BhkRigidBodyT | BhkSphereShape | BhkBoxShape
            | BhkCapsuleShape | BhkConvexVerticesShape | BhkBallAndSocketConstraint
            | BhkHingeConstraint | BhkLimitedHingeConstraint | BhkPrismaticConstraint
            | BhkRagdollConstraint | BhkStiffSpringConstraint | BhkBreakableConstraint => {
                V10_0_1_0
            }
            NiTransformController | NiTransformData | NiTransformInterpolator
            | NiFloatInterpolator | NiBoolInterpolator | NiPoint3Interpolator
            | NiBlendBoolInterpolator | NiBoolData | NiTextureTransformController => V10_1_0_0,
            NiParticleSystem | NiPSysData | NiPSysEmitterCtlr | NiPSysUpdateCtlr
            | NiPSysSphereEmitter | NiPSysBoxEmitter | NiPSysCylinderEmitter
            | NiPSysMeshEmitter | NiPSysPositionModifier | NiPSysBoundUpdateModifier
            | NiPSysSpawnModifier | NiPSysAgeDeathModifier | NiPSysRotationModifier
            | NiPSysVortexFieldModifier | NiPSysDragFieldModifier
            | NiPSysTurbulenceFieldModifier | NiPSysAirFieldModifier
            | NiPSysGravityFieldModifier => V10_1_0_0,
            NiStringPalette => V10_2_0_0,
            BSBound | BSFadeNode => V20_0_0_4,
            BSStripParticleSystem | BSStripPSysData | BSPSysArrayEmitter
            | BSParentVelocityModifier | BSWindModifier | BSPSysStripUpdateModifier
            | BSLightingShaderProperty | BSShaderTextureSet => V20_2_0_7,
            _ => 0,
        }
    }

    pub fn is_available(self, version: u32) -> bool {
        version >= self.min_version()
    }

    pub fn is_node(self) -> bool {
        matches!(
            self,
            BlockKind::NiNode
                | BlockKind::NiBillboardNode
                | BlockKind::BSFadeNode
                | BlockKind::NiBSAnimationNode
                | BlockKind::RootCollisionNode
        )
    }
}

impl fmt::Display for BlockKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for BlockKind {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BlockKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| ExportError::UnknownBlockType(s.to_string()))
    }
}

/// Field storage, one variant per shared layout.
#[derive(Debug, Clone)]
pub enum BlockData {
    Node(NiNode),
    TriShape(NiGeometry),
    TriShapeData(NiTriShapeData),
    SkinInstance(NiSkinInstance),
    SkinData(NiSkinData),
    MaterialProperty(NiMaterialProperty),
    AlphaProperty(NiAlphaProperty),
    TexturingProperty(NiTexturingProperty),
    SourceTexture(NiSourceTexture),
    ShaderProperty(BSLightingShaderProperty),
    ShaderTextureSet(BSShaderTextureSet),
    TextKeyExtraData(NiTextKeyExtraData),
    StringExtraData(NiStringExtraData),
    BSBound(BSBound),
    TimeController(NiTimeController),
    SingleInterpController(NiSingleInterpController),
    MaterialColorController(NiMaterialColorController),
    TextureTransformController(NiTextureTransformController),
    PSysEmitterCtlr(NiPSysEmitterCtlr),
    ControllerManager(NiControllerManager),
    TransformInterpolator(NiTransformInterpolator),
    FloatInterpolator(NiFloatInterpolator),
    BoolInterpolator(NiBoolInterpolator),
    Point3Interpolator(NiPoint3Interpolator),
    BlendBoolInterpolator(NiBlendBoolInterpolator),
    KeyframeData(NiKeyframeData),
    FloatData(NiFloatData),
    PosData(NiPosData),
    BoolData(NiBoolData),
    VisData(NiVisData),
    ControllerSequence(NiControllerSequence),
    StringPalette(NiStringPalette),
    DefaultAVObjectPalette(NiDefaultAVObjectPalette),
    SequenceStreamHelper(NiSequenceStreamHelper),
    CollisionObject(BhkCollisionObject),
    RigidBody(BhkRigidBody),
    Shape(BhkShape),
    Constraint(BhkConstraint),
    ParticleSystem(NiParticleSystem),
    PSysData(NiPSysData),
    Modifier(NiPSysModifier),
}

#[derive(Debug, Clone)]
pub struct Block {
    pub kind: BlockKind,
    pub data: BlockData,
}

impl Block {
    /// Builds a default instance laid out for `version`.
    pub fn new(kind: BlockKind, version: u32) -> Block {
        use BlockKind as K;
        let data = match kind {
            K::NiNode | K::NiBillboardNode | K::BSFadeNode | K::NiBSAnimationNode
            | K::RootCollisionNode => BlockData::Node(NiNode::new(version)),
            K::NiTriShape => BlockData::TriShape(NiGeometry::new(version)),
            K::NiTriShapeData => BlockData::TriShapeData(NiTriShapeData::default()),
            K::NiSkinInstance => BlockData::SkinInstance(NiSkinInstance::default()),
            K::NiSkinData => BlockData::SkinData(NiSkinData::default()),
            K::NiMaterialProperty => {
                BlockData::MaterialProperty(NiMaterialProperty::new(version))
            }
            K::NiAlphaProperty => BlockData::AlphaProperty(NiAlphaProperty::new(version)),
            K::NiTexturingProperty => {
                BlockData::TexturingProperty(NiTexturingProperty::new(version))
            }
            K::NiSourceTexture => BlockData::SourceTexture(NiSourceTexture::new(version)),
            K::BSLightingShaderProperty => {
                BlockData::ShaderProperty(BSLightingShaderProperty::new(version))
            }
            K::BSShaderTextureSet => BlockData::ShaderTextureSet(BSShaderTextureSet::default()),
            K::NiTextKeyExtraData => BlockData::TextKeyExtraData(NiTextKeyExtraData::default()),
            K::NiStringExtraData => BlockData::StringExtraData(NiStringExtraData::default()),
            K::BSBound => BlockData::BSBound(BSBound::default()),
            K::NiPSysUpdateCtlr => BlockData::TimeController(NiTimeController::new()),
            K::NiKeyframeController
            | K::NiTransformController
            | K::NiVisController
            | K::NiAlphaController => {
                BlockData::SingleInterpController(NiSingleInterpController::new())
            }
            K::NiMaterialColorController => {
                BlockData::MaterialColorController(NiMaterialColorController {
                    interp_base: NiSingleInterpController::new(),
                    target_color: MaterialColor::default(),
                })
            }
            K::NiTextureTransformController => {
                BlockData::TextureTransformController(NiTextureTransformController {
                    interp_base: NiSingleInterpController::new(),
                    shader_map: false,
                    texture_slot: TextureSlot::Base,
                    operation: TransformMember::TranslateU,
                })
            }
            K::NiPSysEmitterCtlr => BlockData::PSysEmitterCtlr(NiPSysEmitterCtlr {
                interp_base: NiSingleInterpController::new(),
                ..Default::default()
            }),
            K::NiControllerManager => BlockData::ControllerManager(NiControllerManager {
                time_base: NiTimeController::new(),
                ..Default::default()
            }),
            K::NiTransformInterpolator => {
                BlockData::TransformInterpolator(NiTransformInterpolator::default())
            }
            K::NiFloatInterpolator => BlockData::FloatInterpolator(NiFloatInterpolator::default()),
            K::NiBoolInterpolator => BlockData::BoolInterpolator(NiBoolInterpolator::default()),
            K::NiPoint3Interpolator => {
                BlockData::Point3Interpolator(NiPoint3Interpolator::default())
            }
            K::NiBlendBoolInterpolator => {
                BlockData::BlendBoolInterpolator(NiBlendBoolInterpolator::default())
            }
            K::NiKeyframeData | K::NiTransformData => {
                BlockData::KeyframeData(NiKeyframeData::default())
            }
            K::NiFloatData => BlockData::FloatData(NiFloatData::default()),
            K::NiPosData => BlockData::PosData(NiPosData::default()),
            K::NiBoolData => BlockData::BoolData(NiBoolData::default()),
            K::NiVisData => BlockData::VisData(NiVisData::default()),
            K::NiControllerSequence => {
                BlockData::ControllerSequence(NiControllerSequence::default())
            }
            K::NiStringPalette => BlockData::StringPalette(NiStringPalette::default()),
            K::NiDefaultAVObjectPalette => {
                BlockData::DefaultAVObjectPalette(NiDefaultAVObjectPalette::default())
            }
            K::NiSequenceStreamHelper => {
                BlockData::SequenceStreamHelper(NiSequenceStreamHelper {
                    net_base: NiObjectNET::new(version),
                })
            }
            K::BhkCollisionObject => BlockData::CollisionObject(BhkCollisionObject::default()),
            K::BhkRigidBody | K::BhkRigidBodyT => BlockData::RigidBody(BhkRigidBody::default()),
            K::BhkSphereShape => BlockData::Shape(BhkShape::Sphere {
                material: 0,
                radius: 0.0,
            }),
            K::BhkBoxShape => BlockData::Shape(BhkShape::Box {
                material: 0,
                radius: 0.1,
                dimensions: Vector3::ZERO,
            }),
            K::BhkCapsuleShape => BlockData::Shape(BhkShape::Capsule {
                material: 0,
                radius: 0.0,
                first_point: Vector3::ZERO,
                radius1: 0.0,
                second_point: Vector3::ZERO,
                radius2: 0.0,
            }),
            K::BhkConvexVerticesShape => BlockData::Shape(BhkShape::ConvexVertices {
                material: 0,
                radius: 0.1,
                vertices: Vec::new(),
                normals: Vec::new(),
            }),
            K::BhkBallAndSocketConstraint => constraint(ConstraintData::BallAndSocket(
                BallAndSocketDescriptor::default(),
            )),
            K::BhkHingeConstraint => constraint(ConstraintData::Hinge(HingeDescriptor::default())),
            K::BhkLimitedHingeConstraint => constraint(ConstraintData::LimitedHinge(
                LimitedHingeDescriptor::default(),
            )),
            K::BhkPrismaticConstraint => {
                constraint(ConstraintData::Prismatic(PrismaticDescriptor::default()))
            }
            K::BhkRagdollConstraint => {
                constraint(ConstraintData::Ragdoll(RagdollDescriptor::default()))
            }
            K::BhkStiffSpringConstraint => {
                constraint(ConstraintData::StiffSpring(StiffSpringDescriptor::default()))
            }
            K::BhkBreakableConstraint => constraint(ConstraintData::Breakable {
                wrapped: Box::new(ConstraintData::BallAndSocket(
                    BallAndSocketDescriptor::default(),
                )),
                threshold: 0.0,
                remove_when_broken: true,
            }),
            K::NiParticleSystem | K::BSStripParticleSystem => {
                BlockData::ParticleSystem(NiParticleSystem::new(version))
            }
            K::NiPSysData => BlockData::PSysData(NiPSysData::default()),
            K::BSStripPSysData => BlockData::PSysData(NiPSysData {
                max_point_count: Some(0),
                ..Default::default()
            }),
            K::NiPSysSphereEmitter => emitter(EmitterShape::Sphere { radius: 0.0 }),
            K::NiPSysBoxEmitter => emitter(EmitterShape::Box {
                width: 0.0,
                height: 0.0,
                depth: 0.0,
            }),
            K::NiPSysCylinderEmitter => emitter(EmitterShape::Cylinder {
                radius: 0.0,
                height: 0.0,
            }),
            K::NiPSysMeshEmitter => emitter(EmitterShape::Mesh {
                meshes: Vec::new(),
                initial_velocity_type: 0,
                emission_type: 0,
                emission_axis: Vector3::Z,
            }),
            K::BSPSysArrayEmitter => emitter(EmitterShape::Array),
            K::NiPSysPositionModifier => modifier(ModifierData::Position),
            K::NiPSysBoundUpdateModifier => modifier(ModifierData::BoundUpdate { update_skip: 0 }),
            K::NiPSysSpawnModifier => modifier(ModifierData::Spawn(SpawnSettings::default())),
            K::NiPSysAgeDeathModifier => modifier(ModifierData::AgeDeath {
                spawn_on_death: false,
                spawn_modifier: None,
            }),
            K::NiPSysRotationModifier => {
                modifier(ModifierData::Rotation(RotationSettings::default()))
            }
            K::NiPSysVortexFieldModifier => field(FieldKind::Vortex {
                direction: Vector3::Z,
            }),
            K::NiPSysDragFieldModifier => field(FieldKind::Drag {
                use_direction: false,
                direction: Vector3::Z,
            }),
            K::NiPSysTurbulenceFieldModifier => field(FieldKind::Turbulence { frequency: 0.0 }),
            K::NiPSysAirFieldModifier => field(FieldKind::Air {
                direction: Vector3::Z,
                air_friction: 0.0,
                inherit_velocity: 0.0,
                inherit_rotation: false,
                enable_spread: false,
                spread: 0.0,
            }),
            K::NiPSysGravityFieldModifier => field(FieldKind::Gravity {
                direction: Vector3::Z,
            }),
            K::BSParentVelocityModifier => modifier(ModifierData::ParentVelocity { damping: 0.0 }),
            K::BSWindModifier => modifier(ModifierData::Wind { strength: 0.0 }),
            K::BSPSysStripUpdateModifier => modifier(ModifierData::StripUpdate {
                update_delta_time: 0.0,
            }),
        };
        Block { kind, data }
    }

    /// The display name used in logs and by name lookups.
    pub fn name(&self) -> &str {
        if let Some(net) = self.net() {
            return &net.name;
        }
        match &self.data {
            BlockData::TextKeyExtraData(d) => &d.name,
            BlockData::StringExtraData(d) => &d.name,
            BlockData::BSBound(d) => &d.name,
            BlockData::ControllerSequence(d) => &d.name,
            BlockData::Modifier(d) => &d.name,
            _ => "",
        }
    }

    // --- Capability accessors ---

    pub fn net(&self) -> Option<&NiObjectNET> {
        match &self.data {
            BlockData::Node(n) => Some(&n.av_base.net_base),
            BlockData::TriShape(g) => Some(&g.av_base.net_base),
            BlockData::ParticleSystem(p) => Some(&p.geom_base.av_base.net_base),
            BlockData::MaterialProperty(p) => Some(&p.property_base.net_base),
            BlockData::AlphaProperty(p) => Some(&p.property_base.net_base),
            BlockData::TexturingProperty(p) => Some(&p.property_base.net_base),
            BlockData::ShaderProperty(p) => Some(&p.property_base.net_base),
            BlockData::SourceTexture(t) => Some(&t.net_base),
            BlockData::SequenceStreamHelper(h) => Some(&h.net_base),
            _ => None,
        }
    }

    pub fn net_mut(&mut self) -> Option<&mut NiObjectNET> {
        match &mut self.data {
            BlockData::Node(n) => Some(&mut n.av_base.net_base),
            BlockData::TriShape(g) => Some(&mut g.av_base.net_base),
            BlockData::ParticleSystem(p) => Some(&mut p.geom_base.av_base.net_base),
            BlockData::MaterialProperty(p) => Some(&mut p.property_base.net_base),
            BlockData::AlphaProperty(p) => Some(&mut p.property_base.net_base),
            BlockData::TexturingProperty(p) => Some(&mut p.property_base.net_base),
            BlockData::ShaderProperty(p) => Some(&mut p.property_base.net_base),
            BlockData::SourceTexture(t) => Some(&mut t.net_base),
            BlockData::SequenceStreamHelper(h) => Some(&mut h.net_base),
            _ => None,
        }
    }

    pub fn as_controllable_mut(&mut self) -> Option<&mut dyn HasController> {
        self.net_mut().map(|net| net as &mut dyn HasController)
    }

    pub fn av_object(&self) -> Option<&NiAVObject> {
        match &self.data {
            BlockData::Node(n) => Some(&n.av_base),
            BlockData::TriShape(g) => Some(&g.av_base),
            BlockData::ParticleSystem(p) => Some(&p.geom_base.av_base),
            _ => None,
        }
    }

    pub fn av_object_mut(&mut self) -> Option<&mut NiAVObject> {
        match &mut self.data {
            BlockData::Node(n) => Some(&mut n.av_base),
            BlockData::TriShape(g) => Some(&mut g.av_base),
            BlockData::ParticleSystem(p) => Some(&mut p.geom_base.av_base),
            _ => None,
        }
    }

    pub fn as_parent_mut(&mut self) -> Option<&mut dyn HasChildren> {
        match &mut self.data {
            BlockData::Node(n) => Some(n as &mut dyn HasChildren),
            _ => None,
        }
    }

    pub fn time_controller(&self) -> Option<&NiTimeController> {
        match &self.data {
            BlockData::TimeController(c) => Some(c),
            BlockData::SingleInterpController(c) => Some(&c.time_base),
            BlockData::MaterialColorController(c) => Some(&c.interp_base.time_base),
            BlockData::TextureTransformController(c) => Some(&c.interp_base.time_base),
            BlockData::PSysEmitterCtlr(c) => Some(&c.interp_base.time_base),
            BlockData::ControllerManager(c) => Some(&c.time_base),
            _ => None,
        }
    }

    pub fn time_controller_mut(&mut self) -> Option<&mut NiTimeController> {
        match &mut self.data {
            BlockData::TimeController(c) => Some(c),
            BlockData::SingleInterpController(c) => Some(&mut c.time_base),
            BlockData::MaterialColorController(c) => Some(&mut c.interp_base.time_base),
            BlockData::TextureTransformController(c) => Some(&mut c.interp_base.time_base),
            BlockData::PSysEmitterCtlr(c) => Some(&mut c.interp_base.time_base),
            BlockData::ControllerManager(c) => Some(&mut c.time_base),
            _ => None,
        }
    }

    pub fn single_interp_mut(&mut self) -> Option<&mut NiSingleInterpController> {
        match &mut self.data {
            BlockData::SingleInterpController(c) => Some(c),
            BlockData::MaterialColorController(c) => Some(&mut c.interp_base),
            BlockData::TextureTransformController(c) => Some(&mut c.interp_base),
            BlockData::PSysEmitterCtlr(c) => Some(&mut c.interp_base),
            _ => None,
        }
    }

    pub fn extra_fields(&self) -> Option<&ExtraFields> {
        match &self.data {
            BlockData::TextKeyExtraData(d) => Some(&d.extra_base),
            BlockData::StringExtraData(d) => Some(&d.extra_base),
            BlockData::BSBound(d) => Some(&d.extra_base),
            _ => None,
        }
    }

    pub fn extra_fields_mut(&mut self) -> Option<&mut ExtraFields> {
        match &mut self.data {
            BlockData::TextKeyExtraData(d) => Some(&mut d.extra_base),
            BlockData::StringExtraData(d) => Some(&mut d.extra_base),
            BlockData::BSBound(d) => Some(&mut d.extra_base),
            _ => None,
        }
    }

    // --- Link traversal ---

    /// Visits the links that own their target (serialized as refs).
    pub fn visit_refs(&self, visit: &mut dyn FnMut(BlockRef)) {
        if let Some(net) = self.net() {
            net.extra_data.iter().for_each(&mut *visit);
            visit_opt(net.controller, visit);
        }
        if let Some(av) = self.av_object() {
            av.properties.iter().copied().for_each(&mut *visit);
            visit_opt(av.collision_object, visit);
        }
        if let Some(extra) = self.extra_fields() {
            visit_opt(extra.next_extra_data, visit);
        }
        if let Some(ctrl) = self.time_controller() {
            visit_opt(ctrl.next_controller, visit);
        }
        match &self.data {
            BlockData::Node(n) => {
                n.children.iter().copied().for_each(&mut *visit);
                n.effects.iter().copied().for_each(&mut *visit);
            }
            BlockData::TriShape(g) => {
                visit_opt(g.data, visit);
                visit_opt(g.skin_instance, visit);
                visit_opt(g.shader_property, visit);
                visit_opt(g.alpha_property, visit);
            }
            BlockData::ParticleSystem(p) => {
                visit_opt(p.data, visit);
                visit_opt(p.skin_instance, visit);
                visit_opt(p.shader_property, visit);
                visit_opt(p.alpha_property, visit);
                p.modifiers.iter().copied().for_each(&mut *visit);
            }
            BlockData::SkinInstance(s) => {
                visit_opt(s.data, visit);
                visit_opt(s.skin_partition, visit);
            }
            BlockData::TexturingProperty(t) => {
                t.descs().for_each(|desc| visit_opt(desc.source, visit));
            }
            BlockData::SingleInterpController(c) => {
                visit_opt(c.interpolator, visit);
                visit_opt(c.data, visit);
            }
            BlockData::MaterialColorController(c) => {
                visit_opt(c.interpolator, visit);
                visit_opt(c.data, visit);
            }
            BlockData::TextureTransformController(c) => {
                visit_opt(c.interpolator, visit);
                visit_opt(c.data, visit);
            }
            BlockData::ShaderProperty(p) => visit_opt(p.texture_set, visit),
            BlockData::PSysEmitterCtlr(c) => {
                visit_opt(c.interpolator, visit);
                visit_opt(c.data, visit);
                visit_opt(c.visibility_interpolator, visit);
            }
            BlockData::ControllerManager(m) => {
                m.sequences.iter().copied().for_each(&mut *visit);
                visit_opt(m.object_palette, visit);
            }
            BlockData::TransformInterpolator(i) => visit_opt(i.data, visit),
            BlockData::FloatInterpolator(i) => visit_opt(i.data, visit),
            BlockData::BoolInterpolator(i) => visit_opt(i.data, visit),
            BlockData::Point3Interpolator(i) => visit_opt(i.data, visit),
            BlockData::ControllerSequence(s) => {
                for cb in &s.controlled_blocks {
                    visit_opt(cb.interpolator, visit);
                    visit_opt(cb.controller, visit);
                    if let ControlledBlockNames::Palette { palette, .. } = &cb.names {
                        visit(*palette);
                    }
                }
                visit_opt(s.text_keys, visit);
                visit_opt(s.string_palette, visit);
            }
            BlockData::CollisionObject(c) => visit_opt(c.body, visit),
            BlockData::RigidBody(b) => {
                visit_opt(b.shape, visit);
                b.constraints.iter().copied().for_each(&mut *visit);
            }
            BlockData::Modifier(m) => {
                if let ModifierData::AgeDeath { spawn_modifier, .. } = &m.data {
                    visit_opt(*spawn_modifier, visit);
                }
            }
            _ => {}
        }
    }

    /// Visits back references. They never imply ownership.
    pub fn visit_ptrs(&self, visit: &mut dyn FnMut(BlockRef)) {
        if let Some(ctrl) = self.time_controller() {
            visit_opt(ctrl.target, visit);
        }
        match &self.data {
            BlockData::SkinInstance(s) => {
                visit_opt(s.skeleton_root, visit);
                s.bones.iter().copied().for_each(&mut *visit);
            }
            BlockData::ControllerSequence(s) => visit_opt(s.manager, visit),
            BlockData::DefaultAVObjectPalette(p) => {
                visit_opt(p.scene, visit);
                p.objs.iter().for_each(|entry| visit(entry.av_object));
            }
            BlockData::CollisionObject(c) => visit_opt(c.target, visit),
            BlockData::Constraint(c) => c.entities.iter().copied().for_each(&mut *visit),
            BlockData::Modifier(m) => {
                visit_opt(m.target, visit);
                match &m.data {
                    ModifierData::Emitter { settings, shape } => {
                        visit_opt(settings.emitter_object, visit);
                        if let EmitterShape::Mesh { meshes, .. } = shape {
                            meshes.iter().copied().for_each(&mut *visit);
                        }
                    }
                    ModifierData::Field(field) => visit_opt(field.field_object, visit),
                    _ => {}
                }
            }
            _ => {}
        }
    }

    /// Names of mandatory links still unset for `version`.
    pub fn missing_links(&self, version: u32) -> Vec<&'static str> {
        let mut missing = Vec::new();
        let interp_era = NiSingleInterpController::uses_interpolator(version);
        let mut require = |present: bool, field: &'static str| {
            if !present {
                missing.push(field);
            }
        };
        match &self.data {
            BlockData::TriShape(g) => require(g.data.is_some(), "data"),
            BlockData::ParticleSystem(p) => require(p.data.is_some(), "data"),
            BlockData::SkinInstance(s) => {
                require(s.data.is_some(), "data");
                require(s.skeleton_root.is_some(), "skeleton_root");
            }
            BlockData::SingleInterpController(c) => {
                if interp_era {
                    require(c.interpolator.is_some(), "interpolator");
                } else {
                    require(c.data.is_some(), "data");
                }
            }
            BlockData::MaterialColorController(c) => {
                if interp_era {
                    require(c.interpolator.is_some(), "interpolator");
                } else {
                    require(c.data.is_some(), "data");
                }
            }
            BlockData::TextureTransformController(c) => {
                if interp_era {
                    require(c.interpolator.is_some(), "interpolator");
                } else {
                    require(c.data.is_some(), "data");
                }
            }
            BlockData::ShaderProperty(p) => require(p.texture_set.is_some(), "texture_set"),
            BlockData::PSysEmitterCtlr(c) => {
                require(c.interpolator.is_some(), "interpolator");
                require(c.visibility_interpolator.is_some(), "visibility_interpolator");
            }
            BlockData::ControllerManager(m) => {
                require(m.object_palette.is_some(), "object_palette")
            }
            BlockData::ControllerSequence(s) => {
                for cb in &s.controlled_blocks {
                    match cb.names {
                        ControlledBlockNames::Legacy { .. } => {
                            require(cb.controller.is_some(), "controlled_blocks.controller")
                        }
                        _ => require(
                            cb.interpolator.is_some() || cb.controller.is_some(),
                            "controlled_blocks.interpolator",
                        ),
                    }
                }
            }
            BlockData::CollisionObject(c) => {
                require(c.body.is_some(), "body");
                require(c.target.is_some(), "target");
            }
            BlockData::RigidBody(b) => require(b.shape.is_some(), "shape"),
            BlockData::Constraint(c) => require(c.entities.len() == 2, "entities"),
            BlockData::Modifier(m) => require(m.target.is_some(), "target"),
            _ => {}
        }
        missing
    }

    /// Multiplies every spatial field the block carries by `factor`.
    pub fn scale_spatial(&mut self, factor: f32) {
        if let Some(av) = self.av_object_mut() {
            av.transform.translation = av.transform.translation.scaled(factor);
            av.bounding_volume = av.bounding_volume.map(|bv| bv.scaled(factor));
        }
        match &mut self.data {
            BlockData::TriShapeData(d) => {
                for v in d.vertices.iter_mut() {
                    *v = v.scaled(factor);
                }
                d.bound = d.bound.scaled(factor);
            }
            BlockData::SkinData(d) => {
                d.skin_transform.translation = d.skin_transform.translation.scaled(factor);
                for bone in d.bones.iter_mut() {
                    bone.transform.translation = bone.transform.translation.scaled(factor);
                    bone.bound = bone.bound.scaled(factor);
                }
            }
            BlockData::KeyframeData(d) => {
                for key in d.translations.keys.iter_mut() {
                    key.value = key.value.scaled(factor);
                    key.tangents = key
                        .tangents
                        .map(|(fwd, bwd)| (fwd.scaled(factor), bwd.scaled(factor)));
                }
            }
            BlockData::TransformInterpolator(i) => {
                i.translation = i.translation.scaled(factor);
            }
            BlockData::BSBound(b) => {
                b.center = b.center.scaled(factor);
                b.dimensions = b.dimensions.scaled(factor);
            }
            BlockData::RigidBody(b) => {
                b.translation = b.translation.scaled_xyz(factor);
                b.center = b.center.scaled_xyz(factor);
            }
            BlockData::Shape(s) => s.scale(factor),
            BlockData::Constraint(c) => c.data.scale(factor),
            BlockData::Modifier(m) => m.scale(factor),
            _ => {}
        }
    }
}

fn visit_opt(link: BlockLink, visit: &mut dyn FnMut(BlockRef)) {
    if let Some(block) = link {
        visit(block);
    }
}

fn constraint(data: ConstraintData) -> BlockData {
    BlockData::Constraint(BhkConstraint {
        entities: Vec::new(),
        priority: 1,
        data,
    })
}

fn modifier(data: ModifierData) -> BlockData {
    BlockData::Modifier(NiPSysModifier {
        name: String::new(),
        order: 0,
        target: None,
        active: true,
        data,
    })
}

fn emitter(shape: EmitterShape) -> BlockData {
    modifier(ModifierData::Emitter {
        settings: EmitterSettings::default(),
        shape,
    })
}

fn field(kind: FieldKind) -> BlockData {
    modifier(ModifierData::Field(FieldSettings {
        field_object: None,
        magnitude: 0.0,
        attenuation: 0.0,
        use_max_distance: false,
        max_distance: 0.0,
        kind,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_names_round_trip_through_from_str() {
        for kind in BlockKind::ALL {
            assert_eq!(kind.name().parse::<BlockKind>().unwrap(), *kind);
        }
        assert!(matches!(
            "NiFooBar".parse::<BlockKind>(),
            Err(ExportError::UnknownBlockType(name)) if name == "NiFooBar"
        ));
    }

    #[test]
    fn extra_data_layout_depends_on_version() {
        use super::super::scene::ExtraDataLinks;
        let old = Block::new(BlockKind::NiNode, V4_0_0_2);
        let new = Block::new(BlockKind::NiNode, V20_0_0_5);
        assert!(matches!(old.net().unwrap().extra_data, ExtraDataLinks::Chain(None)));
        assert!(matches!(new.net().unwrap().extra_data, ExtraDataLinks::List(_)));
    }

    #[test]
    fn controllers_require_interpolators_only_in_newer_files() {
        let ctrl = Block::new(BlockKind::NiAlphaController, V20_0_0_5);
        assert_eq!(ctrl.missing_links(V20_0_0_5), vec!["interpolator"]);
        assert_eq!(ctrl.missing_links(V4_0_0_2), vec!["data"]);
    }
}
