// src/nif/writer/block_writers.rs

//! Field layouts of every block the exporter creates. Each `write_*`
//! function mirrors one class of the file format and calls its parent's
//! writer first, the same way the classes derive from each other.

use byteorder::{LittleEndian, WriteBytesExt};

use super::helpers::*;
use super::{BlockWriter, Save};
use crate::nif::error::Result;
use crate::nif::types::*;
use crate::nif::version::*;

impl Save for Block {
    fn save(&self, w: &mut BlockWriter<'_>) -> Result<()> {
        match &self.data {
            BlockData::Node(n) => write_node(w, n),
            BlockData::TriShape(g) => write_geometry(w, g),
            BlockData::TriShapeData(d) => write_tri_shape_data(w, d),
            BlockData::SkinInstance(s) => write_skin_instance(w, s),
            BlockData::SkinData(s) => write_skin_data(w, s),
            BlockData::MaterialProperty(m) => write_material_property(w, m),
            BlockData::AlphaProperty(a) => write_alpha_property(w, a),
            BlockData::TexturingProperty(t) => write_texturing_property(w, t),
            BlockData::SourceTexture(t) => write_source_texture(w, t),
            BlockData::ShaderProperty(p) => write_lighting_shader_property(w, p),
            BlockData::ShaderTextureSet(t) => write_shader_texture_set(w, t),
            BlockData::TextKeyExtraData(d) => write_text_key_extra_data(w, d),
            BlockData::StringExtraData(d) => write_string_extra_data(w, d),
            BlockData::BSBound(b) => write_bs_bound(w, b),
            BlockData::TimeController(c) => write_time_controller(w, c),
            BlockData::SingleInterpController(c) => write_single_interp_controller(w, c, None),
            BlockData::MaterialColorController(c) => {
                write_single_interp_controller(w, &c.interp_base, Some(c.target_color))
            }
            BlockData::TextureTransformController(c) => write_texture_transform_controller(w, c),
            BlockData::PSysEmitterCtlr(c) => write_psys_emitter_ctlr(w, c),
            BlockData::ControllerManager(m) => write_controller_manager(w, m),
            BlockData::TransformInterpolator(i) => write_transform_interpolator(w, i),
            BlockData::FloatInterpolator(i) => {
                w.f32(i.value)?;
                w.link(i.data)
            }
            BlockData::BoolInterpolator(i) => {
                w.u8(u8::from(i.value))?;
                w.link(i.data)
            }
            BlockData::Point3Interpolator(i) => {
                write_vector3(w, &i.value)?;
                w.link(i.data)
            }
            BlockData::BlendBoolInterpolator(i) => write_blend_bool_interpolator(w, i),
            BlockData::KeyframeData(d) => write_keyframe_data(w, d),
            BlockData::FloatData(NiFloatData { data }) => write_key_group(w, data),
            BlockData::PosData(NiPosData { data }) => write_key_group(w, data),
            BlockData::BoolData(NiBoolData { data }) => write_key_group(w, data),
            BlockData::VisData(d) => write_vis_data(w, d),
            BlockData::ControllerSequence(s) => write_controller_sequence(w, s),
            BlockData::StringPalette(p) => write_string_palette(w, p),
            BlockData::DefaultAVObjectPalette(p) => write_object_palette(w, p),
            BlockData::SequenceStreamHelper(h) => write_object_net(w, &h.net_base),
            BlockData::CollisionObject(c) => write_collision_object(w, c),
            BlockData::RigidBody(b) => write_rigid_body(w, b),
            BlockData::Shape(s) => write_shape(w, s),
            BlockData::Constraint(c) => write_constraint(w, c),
            BlockData::ParticleSystem(p) => write_particle_system(w, p),
            BlockData::PSysData(d) => write_psys_data(w, d),
            BlockData::Modifier(m) => write_modifier(w, m),
        }
    }
}

// --- Scene graph ---

fn write_object_net(w: &mut BlockWriter<'_>, net: &NiObjectNET) -> Result<()> {
    w.string(&net.name)?;
    match &net.extra_data {
        ExtraDataLinks::Chain(head) => w.link(*head)?,
        ExtraDataLinks::List(list) => w.links(list)?,
    }
    w.link(net.controller)
}

fn write_av_object(w: &mut BlockWriter<'_>, av: &NiAVObject) -> Result<()> {
    write_object_net(w, &av.net_base)?;
    if w.bs_version > 26 {
        w.u32(u32::from(av.flags))?;
    } else {
        w.u16(av.flags)?;
    }
    let t = &av.transform;
    write_vector3(w, &t.translation)?;
    write_matrix3x3(w, &t.rotation)?;
    w.f32(t.scale)?;
    if w.version <= V4_2_2_0 {
        write_vector3(w, &av.velocity)?;
    }
    if w.bs_version <= 34 {
        w.links(&av.properties)?;
    }
    if w.version <= V4_2_2_0 {
        w.bool(av.bounding_volume.is_some())?;
        if let Some(bv) = &av.bounding_volume {
            write_bounding_volume(w, bv)?;
        }
    }
    if w.version >= V10_0_1_0 {
        w.link(av.collision_object)?;
    }
    Ok(())
}

fn write_node(w: &mut BlockWriter<'_>, node: &NiNode) -> Result<()> {
    write_av_object(w, &node.av_base)?;
    w.links(&node.children)?;
    w.links(&node.effects)
}

fn write_geometry(w: &mut BlockWriter<'_>, geom: &NiGeometry) -> Result<()> {
    write_av_object(w, &geom.av_base)?;
    w.link(geom.data)?;
    w.link(geom.skin_instance)?;
    if (V10_0_1_0..=V20_1_0_3).contains(&w.version) {
        w.bool(false)?; // has_shader
    }
    if w.version >= V20_2_0_5 {
        w.u32(0)?; // num_materials
        w.i32(-1)?; // active_material
    }
    if w.version >= V20_2_0_7 {
        w.u8(0)?; // material_needs_update
    }
    if w.bs_version > 34 {
        w.link(geom.shader_property)?;
        w.link(geom.alpha_property)?;
    }
    Ok(())
}

/// `NiGeometryData` prefix shared by triangle and particle data.
struct GeometryData<'d> {
    num_vertices: u16,
    vertices: Option<&'d [Vector3]>,
    normals: &'d [Vector3],
    bound: BoundingSphere,
    uv_sets: &'d [Vec<Vector2>],
    consistency_flags: u16,
}

fn write_geometry_data(w: &mut BlockWriter<'_>, data: &GeometryData<'_>) -> Result<()> {
    if w.version >= V10_1_0_114 {
        w.i32(0)?; // group_id
    }
    w.u16(data.num_vertices)?;
    if w.version >= V10_1_0_0 {
        w.u8(0)?; // keep_flags
        w.u8(0)?; // compress_flags
    }
    w.bool(data.vertices.is_some())?;
    if let Some(vertices) = data.vertices {
        for v in vertices {
            write_vector3(w, v)?;
        }
    }
    if w.version >= V10_0_1_0 {
        let flags = if w.bs_version > 0 && w.version == V20_2_0_7 {
            u16::from(!data.uv_sets.is_empty())
        } else {
            (data.uv_sets.len() as u16) & 63
        };
        w.u16(flags)?;
    }
    w.bool(!data.normals.is_empty())?;
    for n in data.normals {
        write_vector3(w, n)?;
    }
    write_vector3(w, &data.bound.center)?;
    w.f32(data.bound.radius)?;
    w.bool(false)?; // has_vertex_colors
    if w.version <= V4_2_2_0 {
        w.u16(data.uv_sets.len() as u16)?;
    }
    if w.version <= V4_0_0_2 {
        w.bool(!data.uv_sets.is_empty())?;
    }
    for set in data.uv_sets {
        for uv in set {
            write_vector2(w, uv)?;
        }
    }
    if w.version >= V10_0_1_0 {
        w.u16(data.consistency_flags)?;
    }
    if w.version >= V20_0_0_4 {
        w.link(None)?; // additional_data
    }
    Ok(())
}

fn write_tri_shape_data(w: &mut BlockWriter<'_>, data: &NiTriShapeData) -> Result<()> {
    write_geometry_data(
        w,
        &GeometryData {
            num_vertices: data.vertices.len() as u16,
            vertices: Some(&data.vertices),
            normals: &data.normals,
            bound: data.bound,
            uv_sets: &data.uv_sets,
            consistency_flags: data.consistency_flags,
        },
    )?;
    w.u16(data.triangles.len() as u16)?;
    w.u32(data.triangles.len() as u32 * 3)?;
    if w.version >= V10_0_1_0 {
        w.bool(!data.triangles.is_empty())?;
    }
    for tri in &data.triangles {
        for index in tri {
            w.u16(*index)?;
        }
    }
    w.u16(0) // num_match_groups
}

fn write_skin_instance(w: &mut BlockWriter<'_>, skin: &NiSkinInstance) -> Result<()> {
    w.link(skin.data)?;
    if w.version >= V10_1_0_101 {
        w.link(skin.skin_partition)?;
    }
    w.link(skin.skeleton_root)?;
    w.links(&skin.bones)
}

fn write_skin_data(w: &mut BlockWriter<'_>, skin: &NiSkinData) -> Result<()> {
    write_transform(w, &skin.skin_transform)?;
    w.u32(skin.bones.len() as u32)?;
    if (V4_0_0_2..=V10_1_0_0).contains(&w.version) {
        w.link(None)?; // skin_partition
    }
    if w.version >= V4_2_1_0 {
        w.u8(1)?; // has_vertex_weights
    }
    for bone in &skin.bones {
        write_transform(w, &bone.transform)?;
        write_vector3(w, &bone.bound.center)?;
        w.f32(bone.bound.radius)?;
        w.u16(bone.weights.len() as u16)?;
        for (index, weight) in &bone.weights {
            w.u16(*index)?;
            w.f32(*weight)?;
        }
    }
    Ok(())
}

// --- Properties ---

fn write_material_property(w: &mut BlockWriter<'_>, mat: &NiMaterialProperty) -> Result<()> {
    write_object_net(w, &mat.property_base.net_base)?;
    if w.version <= V10_0_1_2 {
        w.u16(mat.flags)?;
    }
    if w.bs_version <= 21 {
        write_color3(w, &mat.ambient_color)?;
        write_color3(w, &mat.diffuse_color)?;
    }
    write_color3(w, &mat.specular_color)?;
    write_color3(w, &mat.emissive_color)?;
    w.f32(mat.glossiness)?;
    w.f32(mat.alpha)?;
    if w.bs_version > 21 {
        w.f32(mat.emissive_mult)?;
    }
    Ok(())
}

fn write_alpha_property(w: &mut BlockWriter<'_>, alpha: &NiAlphaProperty) -> Result<()> {
    write_object_net(w, &alpha.property_base.net_base)?;
    w.u16(alpha.flags)?;
    w.u8(alpha.threshold)
}

fn write_tex_desc(w: &mut BlockWriter<'_>, desc: &TexDesc) -> Result<()> {
    w.link(desc.source)?;
    if w.version <= V20_0_0_5 {
        w.u32(u32::from(desc.clamp_mode))?;
        w.u32(u32::from(desc.filter_mode))?;
        w.u32(desc.uv_set)?;
    } else if w.version >= V20_1_0_3 {
        let packed = (u32::from(desc.clamp_mode) << 12)
            | (u32::from(desc.filter_mode) << 8)
            | (desc.uv_set & 0xFF);
        w.u16(packed as u16)?;
    }
    if w.version <= V10_4_0_1 {
        w.write_i16::<LittleEndian>(0)?; // ps2_l
        w.write_i16::<LittleEndian>(-75)?; // ps2_k
    }
    if w.version <= V4_1_0_12 {
        w.u16(0)?;
    }
    if w.version >= V10_1_0_0 {
        w.bool(desc.transform.is_some())?;
        if let Some(t) = &desc.transform {
            write_vector2(w, &t.translation)?;
            write_vector2(w, &t.scale)?;
            w.f32(t.rotation)?;
            w.u32(TexTransform::METHOD_MAX)?;
            write_vector2(w, &t.center)?;
        }
    }
    Ok(())
}

fn write_slot(w: &mut BlockWriter<'_>, desc: Option<&TexDesc>) -> Result<()> {
    w.bool(desc.is_some())?;
    if let Some(desc) = desc {
        write_tex_desc(w, desc)?;
    }
    Ok(())
}

fn write_texturing_property(w: &mut BlockWriter<'_>, tex: &NiTexturingProperty) -> Result<()> {
    write_object_net(w, &tex.property_base.net_base)?;
    if w.version <= V10_0_1_2 || w.version >= V20_1_0_2 {
        w.u16(tex.flags)?;
    }
    if (V3_3_0_13..=V20_1_0_1).contains(&w.version) {
        w.u32(u32::from(tex.apply_mode))?;
    }
    w.u32(tex.texture_count)?;
    write_slot(w, tex.base_texture.as_ref())?;
    write_slot(w, tex.dark_texture.as_ref())?;
    write_slot(w, tex.detail_texture.as_ref())?;
    write_slot(w, tex.gloss_texture.as_ref())?;
    write_slot(w, tex.glow_texture.as_ref())?;
    write_slot(w, tex.bump_map_texture.as_ref().map(|bump| &bump.desc))?;
    if let Some(bump) = &tex.bump_map_texture {
        w.f32(bump.luma_scale)?;
        w.f32(bump.luma_offset)?;
        for m in bump.matrix {
            w.f32(m)?;
        }
    }

    let count = tex.texture_count;
    if w.version >= V20_2_0_5 {
        if count > 6 {
            write_slot(w, tex.normal_texture.as_ref())?;
        }
        if count > 7 {
            w.bool(false)?; // has_parallax_texture
        }
        if count > 8 {
            w.bool(false)?; // has_decal_0
        }
    } else if count > 6 {
        w.bool(false)?; // has_decal_0
    }
    if w.version >= V10_0_1_0 {
        w.u32(0)?; // num_shader_textures
    }
    Ok(())
}

/// Skyrim layout. The shader type precedes the inherited object fields.
fn write_lighting_shader_property(
    w: &mut BlockWriter<'_>,
    shader: &BSLightingShaderProperty,
) -> Result<()> {
    w.u32(u32::from(shader.shader_type))?;
    write_object_net(w, &shader.property_base.net_base)?;
    w.u32(shader.shader_flags_1.bits())?;
    w.u32(shader.shader_flags_2.bits())?;
    write_vector2(w, &shader.uv_offset)?;
    write_vector2(w, &shader.uv_scale)?;
    w.link(shader.texture_set)?;
    write_color3(w, &shader.emissive_color)?;
    w.f32(shader.emissive_multiple)?;
    w.u32(shader.texture_clamp_mode)?;
    w.f32(shader.alpha)?;
    w.f32(shader.refraction_strength)?;
    w.f32(shader.glossiness)?;
    write_color3(w, &shader.specular_color)?;
    w.f32(shader.specular_strength)?;
    w.f32(shader.lighting_effect_1)?;
    w.f32(shader.lighting_effect_2)?;
    match shader.shader_type {
        LightingShaderType::EnvironmentMap => w.f32(shader.environment_map_scale),
        LightingShaderType::SkinTint | LightingShaderType::HairTint => {
            write_color3(w, &shader.tint_color)
        }
        _ => Ok(()),
    }
}

/// Texture paths are sized strings even where other strings are indexed.
fn write_shader_texture_set(w: &mut BlockWriter<'_>, set: &BSShaderTextureSet) -> Result<()> {
    w.u32(set.textures.len() as u32)?;
    for texture in &set.textures {
        write_sized_string(w, texture)?;
    }
    Ok(())
}

fn write_source_texture(w: &mut BlockWriter<'_>, tex: &NiSourceTexture) -> Result<()> {
    write_object_net(w, &tex.net_base)?;
    w.u8(u8::from(tex.use_external))?;
    w.string(&tex.file_name)?;
    if w.version >= V10_1_0_0 {
        w.link(None)?; // unknown_link
    }
    w.u32(u32::from(tex.pixel_layout))?;
    w.u32(u32::from(tex.use_mipmaps))?;
    w.u32(u32::from(tex.alpha_format))?;
    w.u8(u8::from(tex.is_static))?;
    if w.version >= V10_1_0_103 {
        w.bool(tex.direct_render)?;
    }
    if w.version >= V20_2_0_4 {
        w.bool(false)?; // persist_render_data
    }
    Ok(())
}

// --- Extra data ---

fn write_extra_fields(w: &mut BlockWriter<'_>, extra: &ExtraFields) -> Result<()> {
    if w.version >= V10_0_1_0 {
        w.string(&extra.name)?;
    }
    if w.version <= V4_2_2_0 {
        w.link(extra.next_extra_data)?;
    }
    Ok(())
}

fn write_text_key_extra_data(w: &mut BlockWriter<'_>, data: &NiTextKeyExtraData) -> Result<()> {
    write_extra_fields(w, &data.extra_base)?;
    if w.version <= V4_2_2_0 {
        w.u32(0)?;
    }
    w.u32(data.text_keys.len() as u32)?;
    for key in &data.text_keys {
        w.f32(key.time)?;
        w.string(&key.value)?;
    }
    Ok(())
}

fn write_string_extra_data(w: &mut BlockWriter<'_>, data: &NiStringExtraData) -> Result<()> {
    write_extra_fields(w, &data.extra_base)?;
    if w.version <= V4_2_2_0 {
        w.u32(data.bytes_remaining())?;
    }
    w.string(&data.string_data)
}

fn write_bs_bound(w: &mut BlockWriter<'_>, bound: &BSBound) -> Result<()> {
    write_extra_fields(w, &bound.extra_base)?;
    write_vector3(w, &bound.center)?;
    write_vector3(w, &bound.dimensions)
}

// --- Controllers ---

fn write_time_controller(w: &mut BlockWriter<'_>, ctrl: &NiTimeController) -> Result<()> {
    write_time_controller_with_flags(w, ctrl, ctrl.flags.bits())
}

fn write_time_controller_with_flags(
    w: &mut BlockWriter<'_>,
    ctrl: &NiTimeController,
    flags: u16,
) -> Result<()> {
    w.link(ctrl.next_controller)?;
    w.u16(flags)?;
    w.f32(ctrl.frequency)?;
    w.f32(ctrl.phase)?;
    w.f32(ctrl.start_time)?;
    w.f32(ctrl.stop_time)?;
    w.link(ctrl.target)
}

/// Keyframe, transform, visibility, alpha and material color controllers.
/// Before 10.1.0.0 the material color target lives in the flags.
fn write_single_interp_controller(
    w: &mut BlockWriter<'_>,
    ctrl: &NiSingleInterpController,
    target_color: Option<MaterialColor>,
) -> Result<()> {
    let mut flags = ctrl.time_base.flags.bits();
    if let Some(color) = target_color {
        if w.version < V10_1_0_0 {
            flags |= u16::from(color) << 4;
        }
    }
    write_time_controller_with_flags(w, &ctrl.time_base, flags)?;
    if w.version >= V10_1_0_104 {
        w.link(ctrl.interpolator)?;
    }
    if let Some(color) = target_color {
        if w.version >= V10_1_0_0 {
            w.u16(u16::from(color))?;
        }
    }
    if w.version <= V10_1_0_103 {
        w.link(ctrl.data)?;
    }
    Ok(())
}

/// Float data moved to an interpolator in 10.1.0.104; before that the data
/// link follows the transform fields.
fn write_texture_transform_controller(
    w: &mut BlockWriter<'_>,
    ctrl: &NiTextureTransformController,
) -> Result<()> {
    let base = &ctrl.interp_base;
    write_time_controller(w, &base.time_base)?;
    if w.version >= V10_1_0_104 {
        w.link(base.interpolator)?;
    }
    w.bool(ctrl.shader_map)?;
    w.u32(u32::from(ctrl.texture_slot))?;
    w.u32(u32::from(ctrl.operation))?;
    if w.version <= V10_1_0_103 {
        w.link(base.data)?;
    }
    Ok(())
}

fn write_psys_emitter_ctlr(w: &mut BlockWriter<'_>, ctrl: &NiPSysEmitterCtlr) -> Result<()> {
    let base = &ctrl.interp_base;
    write_time_controller(w, &base.time_base)?;
    if w.version >= V10_1_0_104 {
        w.link(base.interpolator)?;
    }
    w.string(&ctrl.modifier_name)?;
    if w.version >= V10_1_0_104 {
        w.link(ctrl.visibility_interpolator)
    } else {
        w.link(base.data)
    }
}

fn write_controller_manager(w: &mut BlockWriter<'_>, mgr: &NiControllerManager) -> Result<()> {
    write_time_controller(w, &mgr.time_base)?;
    w.bool(mgr.cumulative)?;
    w.links(&mgr.sequences)?;
    w.link(mgr.object_palette)
}

// --- Interpolators ---

fn write_transform_interpolator(
    w: &mut BlockWriter<'_>,
    interp: &NiTransformInterpolator,
) -> Result<()> {
    write_vector3(w, &interp.translation)?;
    write_quat_wxyz(w, &interp.rotation)?;
    w.f32(interp.scale)?;
    w.link(interp.data)
}

fn write_blend_bool_interpolator(
    w: &mut BlockWriter<'_>,
    interp: &NiBlendBoolInterpolator,
) -> Result<()> {
    if w.version >= V10_1_0_112 {
        w.u8(u8::from(interp.manager_controlled))?;
    }
    if w.version <= V10_1_0_110 {
        w.u16(u16::from(interp.array_size))?;
        w.u16(1)?; // array_grow_by
    } else {
        w.u8(interp.array_size)?;
    }
    if w.version >= V10_1_0_112 {
        w.f32(interp.weight_threshold)?;
    }
    w.u8(u8::from(interp.value))
}

// --- Key data ---

fn write_keyframe_data(w: &mut BlockWriter<'_>, data: &NiKeyframeData) -> Result<()> {
    let num_rotation_keys = data.num_rotation_keys();
    w.u32(num_rotation_keys)?;
    if num_rotation_keys > 0 {
        w.u32(u32::from(data.rotation_type))?;
        if data.rotation_type == KeyType::XyzRotation {
            if w.version <= V10_1_0_0 {
                w.f32(0.0)?;
            }
            for group in &data.xyz_rotations {
                write_key_group(w, group)?;
            }
        } else {
            // Quaternion keys never carry tangents.
            for key in &data.quaternion_keys {
                w.f32(key.time)?;
                write_quat_wxyz(w, &key.value)?;
                if data.rotation_type == KeyType::Tbc {
                    for param in key.tbc.unwrap_or_default() {
                        w.f32(param)?;
                    }
                }
            }
        }
    }
    write_key_group(w, &data.translations)?;
    write_key_group(w, &data.scales)
}

fn write_vis_data(w: &mut BlockWriter<'_>, data: &NiVisData) -> Result<()> {
    w.u32(data.keys.len() as u32)?;
    for key in &data.keys {
        w.f32(key.time)?;
        w.u8(u8::from(key.value))?;
    }
    Ok(())
}

// --- Sequences ---

fn write_controlled_block(w: &mut BlockWriter<'_>, block: &ControlledBlock) -> Result<()> {
    match &block.names {
        ControlledBlockNames::Legacy { target_name } => {
            w.string(target_name)?;
            w.link(block.controller)
        }
        ControlledBlockNames::Palette {
            palette,
            node_name_offset,
            property_type_offset,
            controller_type_offset,
            controller_id_offset,
            interpolator_id_offset,
        } => {
            w.link(block.interpolator)?;
            w.link(block.controller)?;
            w.u8(block.priority)?;
            w.link(Some(*palette))?;
            for offset in [
                node_name_offset,
                property_type_offset,
                controller_type_offset,
                controller_id_offset,
                interpolator_id_offset,
            ] {
                w.u32(*offset)?;
            }
            Ok(())
        }
        ControlledBlockNames::Direct {
            node_name,
            property_type,
            controller_type,
            controller_id,
            interpolator_id,
        } => {
            w.link(block.interpolator)?;
            w.link(block.controller)?;
            w.u8(block.priority)?;
            for name in [
                node_name,
                property_type,
                controller_type,
                controller_id,
                interpolator_id,
            ] {
                w.string(name)?;
            }
            Ok(())
        }
    }
}

fn write_controller_sequence(w: &mut BlockWriter<'_>, seq: &NiControllerSequence) -> Result<()> {
    w.string(&seq.name)?;
    if w.version <= V10_1_0_103 {
        w.string(&seq.accum_root_name)?;
        w.link(seq.text_keys)?;
    }
    w.u32(seq.controlled_blocks.len() as u32)?;
    if w.version >= V10_1_0_106 {
        w.u32(seq.array_grow_by)?;
    }
    for block in &seq.controlled_blocks {
        write_controlled_block(w, block)?;
    }
    if w.version < V10_1_0_106 {
        return Ok(());
    }

    w.f32(seq.weight)?;
    w.link(seq.text_keys)?;
    w.u32(u32::from(seq.cycle_type))?;
    w.f32(seq.frequency)?;
    if w.version <= V10_4_0_1 {
        w.f32(0.0)?; // phase
    }
    w.f32(seq.start_time)?;
    w.f32(seq.stop_time)?;
    if w.version == V10_1_0_106 {
        w.bool(false)?; // play_backwards
    }
    w.link(seq.manager)?;
    w.string(&seq.accum_root_name)?;
    if (V10_1_0_113..=V20_1_0_0).contains(&w.version) {
        w.link(seq.string_palette)?;
    }
    if (24..=28).contains(&w.bs_version) {
        w.link(None)?; // anim_notes
    } else if w.bs_version > 28 {
        w.u16(0)?; // num_anim_note_arrays
    }
    Ok(())
}

fn write_string_palette(w: &mut BlockWriter<'_>, palette: &NiStringPalette) -> Result<()> {
    let len = palette.palette.len() as u32;
    w.u32(len)?;
    std::io::Write::write_all(w, &palette.palette)?;
    w.u32(len)
}

fn write_object_palette(w: &mut BlockWriter<'_>, palette: &NiDefaultAVObjectPalette) -> Result<()> {
    w.link(palette.scene)?;
    w.u32(palette.objs.len() as u32)?;
    for entry in &palette.objs {
        write_sized_string(w, &entry.name)?;
        w.link(Some(entry.av_object))?;
    }
    Ok(())
}

// --- Havok ---

fn write_collision_object(w: &mut BlockWriter<'_>, obj: &BhkCollisionObject) -> Result<()> {
    w.link(obj.target)?;
    w.u16(obj.flags)?;
    w.link(obj.body)
}

fn write_havok_filter(w: &mut BlockWriter<'_>, filter: &HavokFilter) -> Result<()> {
    w.u8(filter.layer)?;
    w.u8(filter.flags)?;
    w.u16(filter.group)
}

fn write_rigid_body(w: &mut BlockWriter<'_>, body: &BhkRigidBody) -> Result<()> {
    // bhkWorldObject
    w.link(body.shape)?;
    write_havok_filter(w, &body.havok_filter)?;
    w.zeros(4)?;
    w.u8(1)?; // broad_phase_type
    w.zeros(3)?;
    w.u32(0)?; // property data
    w.u32(0)?; // property size
    w.u32(0x8000_0000)?; // capacity_and_flags
    // bhkEntity
    w.u8(1)?; // collision_response: simple contact
    w.u8(0)?;
    w.u16(0xFFFF)?; // process_contact_callback_delay

    // Rigid body info
    w.zeros(4)?;
    write_havok_filter(w, &body.havok_filter)?;
    w.zeros(4)?;
    let skyrim_layout = w.bs_version > 34;
    if skyrim_layout {
        w.u32(0)?;
    }
    w.u8(1)?;
    w.u8(0)?;
    w.u16(0xFFFF)?;
    if !skyrim_layout {
        w.zeros(4)?;
    }
    write_vector4(w, &body.translation)?;
    write_quat_xyzw(w, &body.rotation)?;
    write_vector4(w, &body.linear_velocity)?;
    write_vector4(w, &body.angular_velocity)?;
    for row in &body.inertia {
        for value in row {
            w.f32(*value)?;
        }
    }
    write_vector4(w, &body.center)?;
    w.f32(body.mass)?;
    w.f32(body.linear_damping)?;
    w.f32(body.angular_damping)?;
    if skyrim_layout {
        w.f32(1.0)?; // time_factor
        w.f32(1.0)?; // gravity_factor
    }
    w.f32(body.friction)?;
    if skyrim_layout {
        w.f32(0.0)?; // rolling_friction_multiplier
    }
    w.f32(body.restitution)?;
    w.f32(body.max_linear_velocity)?;
    w.f32(body.max_angular_velocity)?;
    w.f32(body.penetration_depth)?;
    w.u8(u8::from(body.motion_system))?;
    w.u8(u8::from(body.deactivator_type))?;
    if skyrim_layout {
        w.u8(1)?; // enable_deactivation
    }
    w.u8(u8::from(body.solver_deactivation))?;
    w.u8(u8::from(body.quality_type))?;
    w.zeros(12)?;

    w.links(&body.constraints)?;
    if w.bs_version < 76 {
        w.u32(body.body_flags)
    } else {
        w.u16(body.body_flags as u16)
    }
}

fn write_shape(w: &mut BlockWriter<'_>, shape: &BhkShape) -> Result<()> {
    match shape {
        BhkShape::Sphere { material, radius } => {
            w.u32(*material)?;
            w.f32(*radius)
        }
        BhkShape::Box {
            material,
            radius,
            dimensions,
        } => {
            w.u32(*material)?;
            w.f32(*radius)?;
            w.zeros(8)?;
            write_vector3(w, dimensions)?;
            w.f32(0.0)
        }
        BhkShape::Capsule {
            material,
            radius,
            first_point,
            radius1,
            second_point,
            radius2,
        } => {
            w.u32(*material)?;
            w.f32(*radius)?;
            w.zeros(8)?;
            write_vector3(w, first_point)?;
            w.f32(*radius1)?;
            write_vector3(w, second_point)?;
            w.f32(*radius2)
        }
        BhkShape::ConvexVertices {
            material,
            radius,
            vertices,
            normals,
        } => {
            w.u32(*material)?;
            w.f32(*radius)?;
            w.zeros(24)?; // vertex and normal properties
            w.u32(vertices.len() as u32)?;
            for v in vertices {
                write_vector4(w, v)?;
            }
            w.u32(normals.len() as u32)?;
            for n in normals {
                write_vector4(w, n)?;
            }
            Ok(())
        }
    }
}

fn write_vectors(w: &mut BlockWriter<'_>, vectors: &[&Vector4]) -> Result<()> {
    for v in vectors {
        write_vector4(w, v)?;
    }
    Ok(())
}

fn write_hinge(w: &mut BlockWriter<'_>, d: &HingeDescriptor) -> Result<()> {
    write_vectors(
        w,
        &[
            &d.pivot_a,
            &d.axle_a,
            &d.perp_axle_in_a1,
            &d.perp_axle_in_a2,
            &d.pivot_b,
            &d.axle_b,
            &d.perp_axle_in_b1,
            &d.perp_axle_in_b2,
        ],
    )
}

fn write_constraint_descriptor(w: &mut BlockWriter<'_>, data: &ConstraintData) -> Result<()> {
    match data {
        ConstraintData::BallAndSocket(d) => write_vectors(w, &[&d.pivot_a, &d.pivot_b]),
        ConstraintData::Hinge(d) => write_hinge(w, d),
        ConstraintData::LimitedHinge(d) => {
            write_hinge(w, &d.hinge)?;
            w.f32(d.min_angle)?;
            w.f32(d.max_angle)?;
            w.f32(d.max_friction)
        }
        ConstraintData::Prismatic(d) => {
            write_vectors(
                w,
                &[
                    &d.pivot_a,
                    &d.rotation_a,
                    &d.plane_a,
                    &d.sliding_a,
                    &d.pivot_b,
                    &d.rotation_b,
                    &d.plane_b,
                    &d.sliding_b,
                ],
            )?;
            w.f32(d.min_distance)?;
            w.f32(d.max_distance)?;
            w.f32(d.friction)
        }
        ConstraintData::Ragdoll(d) => {
            write_vectors(
                w,
                &[
                    &d.twist_a, &d.plane_a, &d.motor_a, &d.pivot_a, &d.twist_b, &d.plane_b,
                    &d.motor_b, &d.pivot_b,
                ],
            )?;
            for value in [
                d.cone_max_angle,
                d.plane_min_angle,
                d.plane_max_angle,
                d.twist_min_angle,
                d.twist_max_angle,
                d.max_friction,
            ] {
                w.f32(value)?;
            }
            Ok(())
        }
        ConstraintData::StiffSpring(d) => {
            write_vectors(w, &[&d.pivot_a, &d.pivot_b])?;
            w.f32(d.length)
        }
        ConstraintData::Breakable { .. } => Ok(()),
    }
}

fn write_constraint(w: &mut BlockWriter<'_>, c: &BhkConstraint) -> Result<()> {
    w.links(&c.entities)?;
    w.u32(c.priority)?;
    match &c.data {
        ConstraintData::Breakable {
            wrapped,
            threshold,
            remove_when_broken,
        } => {
            // The wrapped constraint repeats the entity header.
            w.u32(wrapped.havok_type())?;
            w.links(&c.entities)?;
            w.u32(c.priority)?;
            write_constraint_descriptor(w, wrapped)?;
            w.f32(*threshold)?;
            w.u8(u8::from(*remove_when_broken))
        }
        data => write_constraint_descriptor(w, data),
    }
}

// --- Particles ---

fn write_particle_system(w: &mut BlockWriter<'_>, psys: &NiParticleSystem) -> Result<()> {
    write_geometry(w, &psys.geom_base)?;
    if w.version >= V10_1_0_0 {
        w.bool(psys.world_space)?;
        w.links(&psys.modifiers)?;
    }
    Ok(())
}

fn write_psys_data(w: &mut BlockWriter<'_>, data: &NiPSysData) -> Result<()> {
    let placeholders = vec![Vector3::ZERO; usize::from(data.num_particles)];
    write_geometry_data(
        w,
        &GeometryData {
            num_vertices: data.num_particles,
            vertices: data.has_vertices.then_some(placeholders.as_slice()),
            normals: &[],
            bound: BoundingSphere::default(),
            uv_sets: &[],
            consistency_flags: 0,
        },
    )?;
    if w.version >= V10_1_0_0 {
        w.bool(false)?; // has_radii
    }
    w.u16(data.num_particles)?; // num_active
    w.bool(false)?; // has_sizes
    if w.version >= V10_0_1_0 {
        w.bool(false)?; // has_rotations
    }
    if w.version >= V20_0_0_4 {
        w.bool(false)?; // has_rotation_angles
        w.bool(false)?; // has_rotation_axes
    }
    if w.version >= V20_2_0_4 && w.bs_version > 0 {
        w.bool(data.has_texture_indices)?;
        w.u32(data.subtexture_offsets.len() as u32)?;
        for offset in &data.subtexture_offsets {
            write_vector4(w, offset)?;
        }
    }
    if w.version >= V20_0_0_2 {
        w.bool(false)?; // has_rotation_speeds
    }
    if let Some(max_point_count) = data.max_point_count {
        w.u16(max_point_count)?;
        w.f32(0.0)?; // start_cap_size
        w.f32(0.0)?; // end_cap_size
        w.u8(0)?; // do_z_prepass
    }
    Ok(())
}

fn write_emitter(
    w: &mut BlockWriter<'_>,
    settings: &EmitterSettings,
    shape: &EmitterShape,
) -> Result<()> {
    w.f32(settings.speed)?;
    w.f32(settings.speed_variation)?;
    w.f32(settings.declination)?;
    w.f32(settings.declination_variation)?;
    w.f32(settings.planar_angle)?;
    w.f32(settings.planar_angle_variation)?;
    write_color4(w, &settings.initial_color)?;
    w.f32(settings.initial_radius)?;
    if w.version >= V10_4_0_1 {
        w.f32(settings.radius_variation)?;
    }
    w.f32(settings.life_span)?;
    w.f32(settings.life_span_variation)?;

    // Mesh emitters are the only ones without an emitter object.
    if let EmitterShape::Mesh {
        meshes,
        initial_velocity_type,
        emission_type,
        emission_axis,
    } = shape
    {
        w.links(meshes)?;
        w.u32(*initial_velocity_type)?;
        w.u32(*emission_type)?;
        return write_vector3(w, emission_axis);
    }
    w.link(settings.emitter_object)?;
    match shape {
        EmitterShape::Sphere { radius } => w.f32(*radius),
        EmitterShape::Box {
            width,
            height,
            depth,
        } => {
            w.f32(*width)?;
            w.f32(*height)?;
            w.f32(*depth)
        }
        EmitterShape::Cylinder { radius, height } => {
            w.f32(*radius)?;
            w.f32(*height)
        }
        EmitterShape::Mesh { .. } | EmitterShape::Array => Ok(()),
    }
}

fn write_field(w: &mut BlockWriter<'_>, field: &FieldSettings) -> Result<()> {
    w.link(field.field_object)?;
    w.f32(field.magnitude)?;
    w.f32(field.attenuation)?;
    w.bool(field.use_max_distance)?;
    w.f32(field.max_distance)?;
    match &field.kind {
        FieldKind::Vortex { direction } | FieldKind::Gravity { direction } => {
            write_vector3(w, direction)
        }
        FieldKind::Drag {
            use_direction,
            direction,
        } => {
            w.bool(*use_direction)?;
            write_vector3(w, direction)
        }
        FieldKind::Turbulence { frequency } => w.f32(*frequency),
        FieldKind::Air {
            direction,
            air_friction,
            inherit_velocity,
            inherit_rotation,
            enable_spread,
            spread,
        } => {
            write_vector3(w, direction)?;
            w.f32(*air_friction)?;
            w.f32(*inherit_velocity)?;
            w.bool(*inherit_rotation)?;
            w.bool(*enable_spread)?;
            w.f32(*spread)
        }
    }
}

fn write_modifier(w: &mut BlockWriter<'_>, modifier: &NiPSysModifier) -> Result<()> {
    w.string(&modifier.name)?;
    w.u32(modifier.order)?;
    w.link(modifier.target)?;
    w.bool(modifier.active)?;
    match &modifier.data {
        ModifierData::Emitter { settings, shape } => write_emitter(w, settings, shape),
        ModifierData::Position => Ok(()),
        ModifierData::BoundUpdate { update_skip } => w.u16(*update_skip),
        ModifierData::Spawn(s) => {
            w.u16(s.num_spawn_generations)?;
            w.f32(s.percentage_spawned)?;
            w.u16(s.min_num_to_spawn)?;
            w.u16(s.max_num_to_spawn)?;
            w.f32(s.spawn_speed_variation)?;
            w.f32(s.spawn_dir_variation)?;
            w.f32(s.life_span)?;
            w.f32(s.life_span_variation)
        }
        ModifierData::AgeDeath {
            spawn_on_death,
            spawn_modifier,
        } => {
            w.bool(*spawn_on_death)?;
            w.link(*spawn_modifier)
        }
        ModifierData::Rotation(r) => {
            w.f32(r.rotation_speed)?;
            if w.version >= V20_0_0_2 {
                w.f32(r.rotation_speed_variation)?;
                w.f32(r.rotation_angle)?;
                w.f32(r.rotation_angle_variation)?;
                w.bool(r.random_rot_speed_sign)?;
            }
            w.bool(r.random_axis)?;
            write_vector3(w, &r.axis)
        }
        ModifierData::Field(field) => write_field(w, field),
        ModifierData::ParentVelocity { damping } => w.f32(*damping),
        ModifierData::Wind { strength } => w.f32(*strength),
        ModifierData::StripUpdate { update_delta_time } => w.f32(*update_delta_time),
    }
}

#[cfg(test)]
mod tests {
    use super::super::StringTable;
    use super::*;
    use slotmap::SecondaryMap;

    fn encode_block(block: &Block, version: u32, user_version: u32, bs_version: u32) -> Vec<u8> {
        let indices = SecondaryMap::new();
        let mut strings = StringTable::default();
        let mut w = BlockWriter::new(version, user_version, bs_version, &indices, &mut strings);
        block.save(&mut w).unwrap();
        w.into_bytes()
    }

    #[test]
    fn empty_node_layout_for_oblivion() {
        let block = Block::new(BlockKind::NiNode, V20_0_0_5);
        let bytes = encode_block(&block, V20_0_0_5, 11, 11);
        // name, extra list, controller, flags, transform (13 floats),
        // properties, collision, children, effects
        assert_eq!(bytes.len(), 4 + 4 + 4 + 2 + 52 + 4 + 4 + 4 + 4);
        // Sized strings until 20.1.0.3: an empty name is a zero length.
        assert_eq!(&bytes[..4], &[0; 4]);
    }

    #[test]
    fn empty_names_use_the_null_string_index_once_strings_are_tabled() {
        let block = Block::new(BlockKind::NiNode, V20_2_0_7);
        let bytes = encode_block(&block, V20_2_0_7, 0, 0);
        assert_eq!(&bytes[..4], &(-1i32).to_le_bytes());
    }

    #[test]
    fn skin_tint_shaders_lead_with_their_type_and_end_with_the_tint() {
        let mut block = Block::new(BlockKind::BSLightingShaderProperty, V20_2_0_7);
        if let BlockData::ShaderProperty(shader) = &mut block.data {
            shader.shader_type = LightingShaderType::SkinTint;
            shader.tint_color = Color3([0.25, 0.5, 0.75]);
        }
        let bytes = encode_block(&block, V20_2_0_7, 12, 83);
        // type, name, extra list, controller, two flag words, uv offset and
        // scale, texture set, emissive, clamp, alpha, refraction,
        // glossiness, specular, two lighting effects, tint
        assert_eq!(bytes.len(), 4 + 12 + 8 + 16 + 4 + 16 + 12 + 12 + 16 + 8 + 12);
        assert_eq!(&bytes[..4], &5u32.to_le_bytes());
        assert_eq!(&bytes[16..20], &0x8240_0301u32.to_le_bytes());
        assert_eq!(&bytes[bytes.len() - 4..], &0.75f32.to_le_bytes());
    }

    #[test]
    fn texture_sets_write_every_slot_as_a_sized_string() {
        let mut block = Block::new(BlockKind::BSShaderTextureSet, V20_2_0_7);
        if let BlockData::ShaderTextureSet(set) = &mut block.data {
            set.set(TextureSetSlot::Normal, "textures\\pot_n.dds".into());
        }
        let bytes = encode_block(&block, V20_2_0_7, 12, 83);
        assert_eq!(&bytes[..4], &9u32.to_le_bytes());
        assert_eq!(bytes.len(), 4 + 9 * 4 + "textures\\pot_n.dds".len());
        assert_eq!(&bytes[8..12], &18u32.to_le_bytes());
    }

    #[test]
    fn morrowind_nodes_store_velocity_and_bounds_flag() {
        let block = Block::new(BlockKind::NiNode, V4_0_0_2);
        let bytes = encode_block(&block, V4_0_0_2, 0, 0);
        // sized empty name, extra chain, controller, flags, transform,
        // velocity, properties, has_bounding_volume (32-bit), children, effects
        assert_eq!(bytes.len(), 4 + 4 + 4 + 2 + 52 + 12 + 4 + 4 + 4 + 4);
    }

    #[test]
    fn alpha_property_writes_flags_and_threshold() {
        let mut block = Block::new(BlockKind::NiAlphaProperty, V20_0_0_5);
        if let BlockData::AlphaProperty(alpha) = &mut block.data {
            alpha.threshold = 128;
        }
        let bytes = encode_block(&block, V20_0_0_5, 11, 11);
        assert_eq!(&bytes[12..14], &NiAlphaProperty::DEFAULT_FLAGS.to_le_bytes());
        assert_eq!(bytes[14], 128);
    }

    #[test]
    fn material_color_target_moves_into_flags_for_old_files() {
        let mut block = Block::new(BlockKind::NiMaterialColorController, V4_0_0_2);
        if let BlockData::MaterialColorController(ctrl) = &mut block.data {
            ctrl.target_color = MaterialColor::Specular;
        }
        let old = encode_block(&block, V4_0_0_2, 0, 0);
        let flags = u16::from_le_bytes([old[4], old[5]]);
        assert_eq!(flags >> 4, 2);

        let new = encode_block(&block, V20_0_0_5, 11, 11);
        // next, flags, 4 floats, target, interpolator, then the color
        assert_eq!(&new[30..32], &2u16.to_le_bytes());
    }

    #[test]
    fn string_palette_repeats_its_length() {
        let mut block = Block::new(BlockKind::NiStringPalette, V20_0_0_5);
        if let BlockData::StringPalette(p) = &mut block.data {
            p.palette = b"Bip01\0".to_vec();
        }
        let bytes = encode_block(&block, V20_0_0_5, 11, 11);
        assert_eq!(bytes.len(), 4 + 6 + 4);
        assert_eq!(&bytes[10..], &6u32.to_le_bytes());
    }

    #[test]
    fn breakable_constraints_wrap_the_descriptor() {
        let block = Block::new(BlockKind::BhkBreakableConstraint, V20_0_0_5);
        let bytes = encode_block(&block, V20_0_0_5, 11, 11);
        // entities, priority, wrapped type + entities + priority,
        // ball and socket pivots, threshold, remove flag
        assert_eq!(bytes.len(), 4 + 4 + 4 + 4 + 4 + 32 + 4 + 1);
    }
}
