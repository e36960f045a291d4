//! Keyframe-only streams (`.kf`): the animation of the scene without its
//! geometry, rooted at a sequence stream helper or a controller sequence
//! depending on the game.

use std::path::{Path, PathBuf};

use tracing::info;

use super::animation::{
    channel_blocks, create_controller, find_action, read_action, text_key_block, TargetChannels,
    Timing,
};
use super::create_with;
use crate::nif::config::ExportConfig;
use crate::nif::error::{ExportError, Result};
use crate::nif::host::{HostAction, HostScene};
use crate::nif::names::full_name;
use crate::nif::palette::controlled_block_names;
use crate::nif::scale::apply_scale_correction;
use crate::nif::session::ExportSession;
use crate::nif::types::{BlockData, BlockKind, BlockRef, ControlledBlock};
use crate::nif::version::{Game, KfRoot, V10_2_0_0};

/// Priority of every controlled block in a keyframe file.
const KF_PRIORITY: u8 = 26;

/// Skeleton roots the engines accumulate motion on, in preference order.
const ACCUM_ROOTS: [&str; 3] = ["Bip01", "Bip02", "NPC Root [Root]"];

/// Channels of one animated node, validated and named.
struct KfTarget {
    name: String,
    timing: Timing,
    channels: TargetChannels,
}

/// Builds the keyframe stream for `scene` in a session of its own.
pub fn export_kf(config: &ExportConfig, scene: &HostScene) -> Result<ExportSession> {
    let mut session = ExportSession::new(config.clone())?;
    let game = session.game();
    let Some(root_kind) = game.kf_root() else {
        return Err(ExportError::Configuration(format!(
            "Keyframe export for '{game}' is not supported."
        )));
    };

    let (targets, first_action) = collect_targets(scene)?;
    info!(
        "Exporting keyframes for {} nodes ({})",
        targets.len(),
        first_action.name
    );
    let root = match root_kind {
        KfRoot::SequenceStreamHelper => stream_helper(&mut session, scene, first_action, targets)?,
        KfRoot::ControllerSequence => {
            let accum_root_name = accum_root_name(scene);
            controller_sequence(&mut session, scene, first_action, targets, accum_root_name)?
        }
    };
    session.ctx.set_roots(vec![root])?;
    apply_scale_correction(&mut session);
    Ok(session)
}

/// Reads every active action before anything is created.
fn collect_targets(scene: &HostScene) -> Result<(Vec<KfTarget>, &HostAction)> {
    let mut targets = Vec::new();
    let mut first_action = None;
    for obj in scene.objects.iter().filter(|obj| obj.is_hierarchy_node()) {
        let Some(name) = obj.animation.as_ref().and_then(|a| a.action.as_deref()) else {
            continue;
        };
        let action = find_action(scene, obj, name)?;
        let timing = Timing::of_action(scene, action);
        for channels in read_action(scene, action)? {
            let name = match &channels.bone {
                Some(bone) => {
                    let longname = obj.bone(bone).and_then(|b| b.longname.as_deref());
                    full_name(bone, longname)
                }
                None => full_name(&obj.name, obj.longname.as_deref()),
            };
            targets.push(KfTarget {
                name,
                timing,
                channels,
            });
        }
        first_action.get_or_insert(action);
    }
    match first_action {
        Some(action) if !targets.is_empty() => Ok((targets, action)),
        _ => Err(ExportError::missing(
            &scene.name,
            "no animated objects to write a keyframe file for",
        )),
    }
}

/// Old-style root: text keys first, then for every controller the name of
/// the node it drives, in controller order.
fn stream_helper(
    session: &mut ExportSession,
    scene: &HostScene,
    action: &HostAction,
    targets: Vec<KfTarget>,
) -> Result<BlockRef> {
    let helper = session.create(BlockKind::NiSequenceStreamHelper, None)?;
    let text_keys = text_key_block(session, scene, action)?;
    session.registry.add_extra_data(helper, text_keys)?;

    for target in targets {
        for blocks in channel_blocks(session, target.channels, None)? {
            let controller = create_controller(session, &blocks, target.timing)?;
            session.registry.add_controller(helper, controller)?;
            let node_name = target.name.clone();
            let extra = create_with(session, BlockKind::NiStringExtraData, None, |block| {
                if let BlockData::StringExtraData(d) = &mut block.data {
                    d.string_data = node_name;
                }
            })?;
            session.registry.add_extra_data(helper, extra)?;
        }
    }
    Ok(helper)
}

fn controller_sequence(
    session: &mut ExportSession,
    scene: &HostScene,
    action: &HostAction,
    targets: Vec<KfTarget>,
    accum_root_name: String,
) -> Result<BlockRef> {
    let timing = Timing::of_action(scene, action);
    let text_keys = text_key_block(session, scene, action)?;
    let sequence = create_with(session, BlockKind::NiControllerSequence, None, |block| {
        if let BlockData::ControllerSequence(s) = &mut block.data {
            s.name = action.name.clone();
            s.text_keys = Some(text_keys);
            s.cycle_type = timing.cycle;
            s.start_time = timing.start;
            s.stop_time = timing.stop;
            s.accum_root_name = accum_root_name;
        }
    })?;

    // Files before 10.2 reference controllers, later ones interpolators.
    let legacy = session.version() < V10_2_0_0;
    for target in targets {
        for blocks in channel_blocks(session, target.channels, None)? {
            let controller = if legacy {
                Some(create_controller(session, &blocks, target.timing)?)
            } else {
                None
            };
            let names =
                controlled_block_names(session, sequence, &target.name, blocks.controller.name())?;
            if let BlockData::ControllerSequence(s) = &mut session.registry[sequence].data {
                s.controlled_blocks.push(ControlledBlock {
                    interpolator: blocks.interpolator,
                    controller,
                    priority: KF_PRIORITY,
                    names,
                });
            }
        }
    }
    Ok(sequence)
}

/// The skeleton root among the scene's objects and bones, or the first
/// top-level object.
fn accum_root_name(scene: &HostScene) -> String {
    let names: Vec<String> = scene
        .objects
        .iter()
        .flat_map(|obj| {
            std::iter::once(full_name(&obj.name, obj.longname.as_deref())).chain(
                obj.bones
                    .iter()
                    .map(|bone| full_name(&bone.name, bone.longname.as_deref())),
            )
        })
        .collect();
    ACCUM_ROOTS
        .iter()
        .find(|root| names.iter().any(|name| name == *root))
        .map(|root| root.to_string())
        .or_else(|| {
            scene
                .top_level()
                .next()
                .map(|obj| full_name(&obj.name, obj.longname.as_deref()))
        })
        .unwrap_or_default()
}

/// Path of the keyframe file written next to `nif_path`. Morrowind files
/// carry an `x` prefix.
pub fn kf_path(nif_path: &Path, game: Game) -> PathBuf {
    let prefix = game.kf_prefix();
    let stem = nif_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let file_name = if stem.to_ascii_lowercase().starts_with(prefix) {
        format!("{stem}.kf")
    } else {
        format!("{prefix}{stem}.kf")
    };
    nif_path.with_file_name(file_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nif::export::animation::LOCATION;
    use crate::nif::host::{FCurve, HostAnimation, HostObject};
    use crate::nif::types::ControlledBlockNames;

    fn scene(object: &str) -> HostScene {
        HostScene {
            name: "walk".into(),
            objects: vec![HostObject {
                name: object.into(),
                animation: Some(HostAnimation {
                    action: Some("Walk".into()),
                    ..Default::default()
                }),
                ..Default::default()
            }],
            actions: vec![HostAction {
                name: "Walk".into(),
                frame_start: 0.0,
                frame_end: 30.0,
                curves: (0..3)
                    .map(|index| FCurve {
                        data_path: LOCATION.into(),
                        index,
                        bone: None,
                        keys: vec![[0.0, 0.0], [30.0, 1.0]],
                    })
                    .collect(),
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    #[test]
    fn morrowind_uses_a_stream_helper() {
        let session = export_kf(&ExportConfig::for_game(Game::Morrowind), &scene("Door")).unwrap();
        let root = session.ctx.roots().unwrap()[0];
        let helper = &session.registry[root];
        assert_eq!(helper.kind, BlockKind::NiSequenceStreamHelper);

        let net = helper.net().unwrap();
        let extras: Vec<BlockRef> = net.extra_data.iter().collect();
        let first = extras[0];
        assert_eq!(session.registry[first].kind, BlockKind::NiTextKeyExtraData);
        let second = session.registry[first]
            .extra_fields()
            .unwrap()
            .next_extra_data
            .unwrap();
        let BlockData::StringExtraData(name) = &session.registry[second].data else {
            panic!("not a string extra data");
        };
        assert_eq!(name.string_data, "Door");

        let ctrl = net.controller.unwrap();
        assert_eq!(session.registry[ctrl].kind, BlockKind::NiKeyframeController);
    }

    #[test]
    fn bethesda_uses_a_controller_sequence() {
        let session = export_kf(&ExportConfig::for_game(Game::Oblivion), &scene("Bip01")).unwrap();
        let root = session.ctx.roots().unwrap()[0];
        let BlockData::ControllerSequence(s) = &session.registry[root].data else {
            panic!("not a sequence");
        };
        assert_eq!(s.name, "Walk");
        assert_eq!(s.accum_root_name, "Bip01");
        assert!(s.text_keys.is_some());
        assert_eq!(s.controlled_blocks.len(), 1);
        let block = &s.controlled_blocks[0];
        assert_eq!(block.priority, KF_PRIORITY);
        assert!(block.controller.is_none());
        assert!(block.interpolator.is_some());
        assert!(matches!(block.names, ControlledBlockNames::Palette { .. }));
    }

    #[test]
    fn accumulation_root_falls_back_to_the_top_object() {
        assert_eq!(accum_root_name(&scene("Door")), "Door");
    }

    #[test]
    fn unsupported_games_and_still_scenes_fail() {
        let err = export_kf(&ExportConfig::for_game(Game::Generic), &scene("Door")).unwrap_err();
        assert!(matches!(err, ExportError::Configuration(_)));

        let mut still = scene("Door");
        still.objects[0].animation = None;
        let err = export_kf(&ExportConfig::for_game(Game::Oblivion), &still).unwrap_err();
        assert!(matches!(err, ExportError::MissingDependency { .. }));
    }

    #[test]
    fn keyframe_paths_follow_the_game() {
        assert_eq!(
            kf_path(Path::new("meshes/door.nif"), Game::Morrowind),
            PathBuf::from("meshes/xdoor.kf")
        );
        assert_eq!(
            kf_path(Path::new("meshes/xdoor.nif"), Game::Morrowind),
            PathBuf::from("meshes/xdoor.kf")
        );
        assert_eq!(
            kf_path(Path::new("meshes/door.nif"), Game::Oblivion),
            PathBuf::from("meshes/door.kf")
        );
    }
}
