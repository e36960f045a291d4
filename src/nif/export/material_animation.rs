//! Material animation: alpha and colour controllers on exported
//! `NiMaterialProperty` blocks, and UV transform controllers on the base
//! texture of the texturing property.

use tracing::debug;

use super::animation::{complete_channel, create_controller, ChannelBlocks, Timing};
use super::create_with;
use super::material::SHADER_BS_VERSION;
use crate::nif::error::{skip_unsupported, ExportError, Result};
use crate::nif::host::{FCurve, HostAction, HostMaterial, HostScene};
use crate::nif::registry::SourceKey;
use crate::nif::session::ExportSession;
use crate::nif::types::{
    BlockData, BlockKind, BlockRef, Key, KeyGroup, MaterialColor, NiSingleInterpController,
    TexTransform, TextureSlot, TransformMember, Vector3,
};
use crate::nif::version::version_string;

const ALPHA: &str = "alpha";

const COLOR_CHANNELS: [(&str, MaterialColor); 4] = [
    ("ambient_color", MaterialColor::Ambient),
    ("diffuse_color", MaterialColor::Diffuse),
    ("specular_color", MaterialColor::Specular),
    ("emission_color", MaterialColor::SelfIllum),
];

/// UV curves by data path and index.
const UV_CHANNELS: [(&str, usize, TransformMember); 5] = [
    ("uv_offset", 0, TransformMember::TranslateU),
    ("uv_offset", 1, TransformMember::TranslateV),
    ("uv_scale", 0, TransformMember::ScaleU),
    ("uv_scale", 1, TransformMember::ScaleV),
    ("uv_rotation", 0, TransformMember::Rotate),
];

/// Attaches controllers for every animated material that was exported.
pub fn export_material_animations(session: &mut ExportSession, scene: &HostScene) -> Result<()> {
    if session.ctx.bs_version >= SHADER_BS_VERSION {
        debug!("shader-era target, material animation is not exported");
        return Ok(());
    }
    for material in &scene.materials {
        let Some(action_name) = &material.animation else {
            continue;
        };
        let Some(property) = session
            .registry
            .try_lookup_block_for(&SourceKey::material(&material.name))
        else {
            debug!("{}: material is not used by any exported shape", material.name);
            continue;
        };
        let action = scene.action(action_name).ok_or_else(|| {
            ExportError::missing(&material.name, format!("action '{action_name}' not found"))
        })?;
        export_material_action(session, scene, material, action, property)?;
    }
    Ok(())
}

fn export_material_action(
    session: &mut ExportSession,
    scene: &HostScene,
    material: &HostMaterial,
    action: &HostAction,
    property: BlockRef,
) -> Result<()> {
    // Validate every colour channel before creating anything.
    let mut colors = Vec::new();
    for (data_path, color) in COLOR_CHANNELS {
        let curves = complete_channel(action, data_path, None, 3)?;
        if !curves.is_empty() {
            colors.push((color, curves));
        }
    }
    let timing = Timing::of_action(scene, action);

    if let Some(alpha) = action.channel(ALPHA, None).first() {
        export_alpha(session, scene, material, alpha, property, timing)?;
    }
    for (color, curves) in colors {
        export_color(session, scene, material, color, &curves, property, timing)?;
    }
    skip_unsupported(export_uv_transforms(session, scene, material, action, timing))?;
    Ok(())
}

/// One texture transform controller per animated UV member, all on the
/// base texture.
fn export_uv_transforms(
    session: &mut ExportSession,
    scene: &HostScene,
    material: &HostMaterial,
    action: &HostAction,
    timing: Timing,
) -> Result<()> {
    let channels: Vec<(&FCurve, TransformMember)> = UV_CHANNELS
        .iter()
        .filter_map(|&(data_path, index, member)| {
            action
                .channel(data_path, None)
                .into_iter()
                .find(|c| c.index == index && !c.keys.is_empty())
                .map(|c| (c, member))
        })
        .collect();
    if channels.is_empty() {
        return Ok(());
    }
    if !BlockKind::NiTextureTransformController.is_available(session.version()) {
        return Err(ExportError::unsupported(
            &material.name,
            format!("UV animation for version {}", version_string(session.version())),
        ));
    }
    let Some(texturing) = session
        .registry
        .try_lookup_block_for(&SourceKey::texturing(&material.name))
    else {
        debug!("{}: UV animation without textures", material.name);
        return Ok(());
    };
    let has_base = match &mut session.registry[texturing].data {
        BlockData::TexturingProperty(property) => match property.slot_mut(TextureSlot::Base) {
            Some(desc) => {
                desc.transform.get_or_insert_with(TexTransform::default);
                true
            }
            None => false,
        },
        _ => false,
    };
    if !has_base {
        debug!("{}: UV animation without a base texture", material.name);
        return Ok(());
    }

    for (curve, member) in channels {
        let keys: Vec<Key<f32>> = curve
            .keys
            .iter()
            .map(|&[frame, value]| Key::new(scene.frame_time(frame), value))
            .collect();
        let data = create_with(session, BlockKind::NiFloatData, None, |block| {
            if let BlockData::FloatData(d) = &mut block.data {
                d.data = KeyGroup::linear(keys);
            }
        })?;
        let interpolator = if NiSingleInterpController::uses_interpolator(session.version()) {
            Some(create_with(session, BlockKind::NiFloatInterpolator, None, |block| {
                if let BlockData::FloatInterpolator(interp) = &mut block.data {
                    interp.value = curve.evaluate(curve.keys[0][0]);
                    interp.data = Some(data);
                }
            })?)
        } else {
            None
        };
        let blocks = ChannelBlocks {
            controller: BlockKind::NiTextureTransformController,
            data,
            interpolator,
        };
        let controller = create_controller(session, &blocks, timing)?;
        let block = &mut session.registry[controller];
        if let BlockData::TextureTransformController(ctrl) = &mut block.data {
            ctrl.texture_slot = TextureSlot::Base;
            ctrl.operation = member;
        }
        session.registry.add_controller(texturing, controller)?;
    }
    Ok(())
}

fn export_alpha(
    session: &mut ExportSession,
    scene: &HostScene,
    material: &HostMaterial,
    curve: &FCurve,
    property: BlockRef,
    timing: Timing,
) -> Result<()> {
    let keys: Vec<Key<f32>> = curve
        .keys
        .iter()
        .map(|&[frame, alpha]| Key::new(scene.frame_time(frame), alpha))
        .collect();
    if keys.is_empty() {
        return Ok(());
    }

    let data = create_with(session, BlockKind::NiFloatData, None, |block| {
        if let BlockData::FloatData(d) = &mut block.data {
            d.data = KeyGroup::linear(keys);
        }
    })?;
    let interpolator = if NiSingleInterpController::uses_interpolator(session.version()) {
        Some(create_with(session, BlockKind::NiFloatInterpolator, None, |block| {
            if let BlockData::FloatInterpolator(interp) = &mut block.data {
                interp.value = material.alpha;
                interp.data = Some(data);
            }
        })?)
    } else {
        None
    };
    let blocks = ChannelBlocks {
        controller: BlockKind::NiAlphaController,
        data,
        interpolator,
    };
    let controller = create_controller(session, &blocks, timing)?;
    session.registry.add_controller(property, controller)
}

#[allow(clippy::too_many_arguments)]
fn export_color(
    session: &mut ExportSession,
    scene: &HostScene,
    material: &HostMaterial,
    color: MaterialColor,
    curves: &[&FCurve],
    property: BlockRef,
    timing: Timing,
) -> Result<()> {
    let keys: Vec<Key<Vector3>> = HostAction::key_frames(curves)
        .into_iter()
        .map(|frame| {
            Key::new(
                scene.frame_time(frame),
                Vector3([0, 1, 2].map(|i| curves[i].evaluate(frame))),
            )
        })
        .collect();
    if keys.is_empty() {
        return Ok(());
    }

    let current = match color {
        MaterialColor::Ambient => material.ambient_color,
        MaterialColor::Diffuse => material.diffuse_color,
        MaterialColor::Specular => material.specular_color,
        MaterialColor::SelfIllum => material.emission_color,
    };
    let data = create_with(session, BlockKind::NiPosData, None, |block| {
        if let BlockData::PosData(d) = &mut block.data {
            d.data = KeyGroup::linear(keys);
        }
    })?;
    let interpolator = if NiSingleInterpController::uses_interpolator(session.version()) {
        Some(create_with(session, BlockKind::NiPoint3Interpolator, None, |block| {
            if let BlockData::Point3Interpolator(interp) = &mut block.data {
                interp.value = Vector3(current);
                interp.data = Some(data);
            }
        })?)
    } else {
        None
    };
    let blocks = ChannelBlocks {
        controller: BlockKind::NiMaterialColorController,
        data,
        interpolator,
    };
    let controller = create_controller(session, &blocks, timing)?;
    if let BlockData::MaterialColorController(ctrl) = &mut session.registry[controller].data {
        ctrl.target_color = color;
    }
    session.registry.add_controller(property, controller)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nif::export::material::export_material;
    use crate::nif::host::{HostImage, HostTextureRole, HostTextureSlot};
    use crate::nif::version::Game;

    fn curve(data_path: &str, index: usize) -> FCurve {
        FCurve {
            data_path: data_path.into(),
            index,
            bone: None,
            keys: vec![[1.0, 0.0], [31.0, 1.0]],
        }
    }

    fn scene(curves: Vec<FCurve>) -> HostScene {
        HostScene {
            materials: vec![HostMaterial {
                name: "Glow".into(),
                animation: Some("Pulse".into()),
                ..Default::default()
            }],
            actions: vec![HostAction {
                name: "Pulse".into(),
                curves,
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    fn exported(game: Game, scene: &HostScene) -> (ExportSession, BlockRef) {
        let mut session = ExportSession::for_game(game);
        let property = export_material(&mut session, scene, &scene.materials[0]).unwrap()[0];
        (session, property)
    }

    #[test]
    fn diffuse_only_makes_no_alpha_controller() {
        let scene = scene((0..3).map(|i| curve("diffuse_color", i)).collect());
        let (mut session, property) = exported(Game::Oblivion, &scene);
        export_material_animations(&mut session, &scene).unwrap();

        assert_eq!(session.registry.iter_kind(BlockKind::NiAlphaController).count(), 0);
        let ctrl = session.registry[property].net().unwrap().controller.unwrap();
        let BlockData::MaterialColorController(c) = &session.registry[ctrl].data else {
            panic!("not a colour controller");
        };
        assert_eq!(c.target_color, MaterialColor::Diffuse);
        assert_eq!(c.target, Some(property));
        assert_eq!(
            session.registry[c.interpolator.unwrap()].kind,
            BlockKind::NiPoint3Interpolator
        );
    }

    #[test]
    fn alpha_and_color_chain_on_the_property() {
        let mut curves: Vec<FCurve> = (0..3).map(|i| curve("emission_color", i)).collect();
        curves.push(curve(ALPHA, 0));
        let scene = scene(curves);
        let (mut session, property) = exported(Game::Oblivion, &scene);
        export_material_animations(&mut session, &scene).unwrap();

        let first = session.registry[property].net().unwrap().controller.unwrap();
        assert_eq!(session.registry[first].kind, BlockKind::NiAlphaController);
        let second = session.registry[first]
            .time_controller()
            .unwrap()
            .next_controller
            .unwrap();
        assert_eq!(session.registry[second].kind, BlockKind::NiMaterialColorController);
    }

    fn textured(mut scene: HostScene) -> HostScene {
        scene.images = vec![HostImage {
            name: "water.png".into(),
            ..Default::default()
        }];
        scene.materials[0].textures = vec![HostTextureSlot {
            role: HostTextureRole::Base,
            image: "water.png".into(),
            uv_set: 0,
        }];
        scene
    }

    #[test]
    fn uv_curves_scroll_the_base_texture() {
        let scene = textured(scene(vec![curve("uv_offset", 1), curve("uv_rotation", 0)]));
        let (mut session, _) = exported(Game::Oblivion, &scene);
        export_material_animations(&mut session, &scene).unwrap();

        let texturing = session
            .registry
            .lookup_block_for(&SourceKey::texturing("Glow"))
            .unwrap();
        let BlockData::TexturingProperty(property) = &session.registry[texturing].data else {
            panic!("not a texturing property");
        };
        let transform = property.base_texture.as_ref().unwrap().transform.unwrap();
        assert_eq!(transform.center.0, [0.5, 0.5]);

        let first = session.registry[texturing].net().unwrap().controller.unwrap();
        let BlockData::TextureTransformController(c) = &session.registry[first].data else {
            panic!("not a texture transform controller");
        };
        assert_eq!(c.operation, TransformMember::TranslateV);
        assert_eq!(c.texture_slot, TextureSlot::Base);
        assert_eq!(c.target, Some(texturing));
        let next = c.next_controller.unwrap();
        let BlockData::TextureTransformController(c) = &session.registry[next].data else {
            panic!("not a texture transform controller");
        };
        assert_eq!(c.operation, TransformMember::Rotate);
        assert_eq!(
            session.registry[c.interpolator.unwrap()].kind,
            BlockKind::NiFloatInterpolator
        );
    }

    #[test]
    fn uv_animation_is_skipped_before_texture_transforms_exist() {
        let scene = textured(scene(vec![curve("uv_offset", 0)]));
        let (mut session, _) = exported(Game::Morrowind, &scene);
        let before = session.registry.len();
        export_material_animations(&mut session, &scene).unwrap();
        assert_eq!(session.registry.len(), before);
    }

    #[test]
    fn partial_colors_are_malformed() {
        let scene = scene(vec![curve("specular_color", 0), curve(ALPHA, 0)]);
        let (mut session, _) = exported(Game::Oblivion, &scene);
        let before = session.registry.len();
        let err = export_material_animations(&mut session, &scene).unwrap_err();
        assert!(matches!(err, ExportError::MalformedSourceData { .. }));
        assert_eq!(session.registry.len(), before);
    }
}
