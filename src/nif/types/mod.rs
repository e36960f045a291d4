//! This module defines the in-memory block model the exporter builds and serializes.

// Declare the sub-modules
pub mod animation;
pub mod base;
pub mod block;
pub mod collision;
pub mod extra_data;
pub mod geometry;
pub mod particles;
pub mod properties;
pub mod scene;
pub mod shaders;
pub mod textures;

pub use animation::{
    AVObjectEntry, ControlledBlock, ControlledBlockNames, CycleType, Key, KeyGroup, KeyType,
    MaterialColor, NiBlendBoolInterpolator, NiBoolData, NiBoolInterpolator, NiControllerManager,
    NiControllerSequence, NiDefaultAVObjectPalette, NiFloatData, NiFloatInterpolator,
    NiKeyframeData, NiMaterialColorController, NiPSysEmitterCtlr, NiPoint3Interpolator, NiPosData,
    NiSequenceStreamHelper, NiSingleInterpController, NiStringPalette, NiTextureTransformController,
    NiTimeController, NiTransformInterpolator, NiVisData, TimeControllerFlags,
};
pub use base::{
    BlockLink, BlockRef, BoundingBox, BoundingSphere, BoundingVolume, Color3, Color4, Matrix3x3,
    NiTransform, Quaternion, Vector2, Vector3, Vector4,
};
pub use block::{Block, BlockData, BlockKind};
pub use collision::{
    BallAndSocketDescriptor, BhkCollisionObject, BhkConstraint, BhkRigidBody, BhkShape,
    ConstraintData, DeactivatorType, HavokFilter, HingeDescriptor, LimitedHingeDescriptor,
    MotionSystem, PrismaticDescriptor, QualityType, RagdollDescriptor, SolverDeactivation,
    StiffSpringDescriptor,
};
pub use extra_data::{BSBound, ExtraFields, NiStringExtraData, NiTextKeyExtraData, TextKey};
pub use geometry::{NiSkinData, NiSkinInstance, NiTriShapeData, SkinBoneData};
pub use particles::{
    EmitterSettings, EmitterShape, FieldKind, FieldSettings, ModifierData, NiPSysData,
    NiPSysModifier, NiParticleSystem, RotationSettings, SpawnSettings,
};
pub use properties::{NiAlphaProperty, NiMaterialProperty, NiProperty};
pub use scene::{
    ExtraDataLinks, HasChildren, HasController, HasExtraData, HasProperties, HasTransform,
    NiAVObject, NiGeometry, NiNode, NiObjectNET,
};
pub use shaders::{
    BSLightingShaderProperty, BSShaderTextureSet, LightingShaderType, ShaderFlags1, ShaderFlags2,
    TextureSetSlot,
};
pub use textures::{
    AlphaFormat, ApplyMode, BumpMap, ClampMode, FilterMode, MipMapFormat, NiSourceTexture,
    NiTexturingProperty, PixelLayout, TexDesc, TexTransform, TextureSlot, TransformMember,
};
