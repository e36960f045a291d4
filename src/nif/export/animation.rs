//! Object and bone animation: transform and visibility controllers, text
//! keys, and controller sequences for NLA tracks.
//!
//! Every action is read and validated before any of its blocks is created,
//! so an incomplete channel leaves nothing behind.

use std::collections::HashMap;

use glam::{Mat3, Quat};
use tracing::{debug, warn};

use super::create_with;
use crate::nif::error::{ExportError, Result};
use crate::nif::host::{FCurve, HostAction, HostObject, HostScene, NlaStrip};
use crate::nif::palette::controlled_block_names;
use crate::nif::registry::SourceKey;
use crate::nif::session::ExportSession;
use crate::nif::types::{
    AVObjectEntry, BlockData, BlockKind, BlockLink, BlockRef, ControlledBlock, CycleType, Key,
    KeyGroup, KeyType, NiKeyframeData, NiSingleInterpController, NiTransform, TextKey,
    TimeControllerFlags, Vector3,
};
use crate::nif::version::{Game, V10_1_0_0, V10_2_0_0};

pub(crate) const QUATERNION: &str = "rotation_quaternion";
pub(crate) const EULER: &str = "rotation_euler";
pub(crate) const LOCATION: &str = "location";
pub(crate) const SCALE: &str = "scale";
pub(crate) const HIDE: &str = "hide";

/// Validated channels of one action for one target (the object itself or
/// one of its bones).
#[derive(Debug, Default)]
pub(crate) struct TargetChannels {
    pub bone: Option<String>,
    pub transform: Option<NiKeyframeData>,
    pub visibility: Vec<Key<bool>>,
}

impl TargetChannels {
    fn is_empty(&self) -> bool {
        self.transform.is_none() && self.visibility.is_empty()
    }
}

/// Reads every target `action` animates. Fails on the first incomplete
/// channel without touching the session.
pub(crate) fn read_action(scene: &HostScene, action: &HostAction) -> Result<Vec<TargetChannels>> {
    let mut targets = vec![read_target(scene, action, None)?];
    for bone in action.animated_bones() {
        targets.push(read_target(scene, action, Some(bone))?);
    }
    targets.retain(|target| !target.is_empty());
    Ok(targets)
}

fn read_target(scene: &HostScene, action: &HostAction, bone: Option<&str>) -> Result<TargetChannels> {
    let quaternion = complete_channel(action, QUATERNION, bone, 4)?;
    let euler = complete_channel(action, EULER, bone, 3)?;
    let location = complete_channel(action, LOCATION, bone, 3)?;
    let scale = complete_channel(action, SCALE, bone, 3)?;
    let time = |frame: f32| scene.frame_time(frame);

    let mut data = NiKeyframeData::default();
    if !quaternion.is_empty() {
        // Channel 0 is W.
        data.rotation_type = KeyType::Quadratic;
        data.quaternion_keys = HostAction::key_frames(&quaternion)
            .into_iter()
            .map(|frame| {
                let [w, x, y, z] = [0, 1, 2, 3].map(|i| quaternion[i].evaluate(frame));
                Key::new(time(frame), Quat::from_xyzw(x, y, z, w).normalize())
            })
            .collect();
    } else if !euler.is_empty() {
        data.rotation_type = KeyType::XyzRotation;
        data.xyz_rotations = [0, 1, 2].map(|i| {
            KeyGroup::linear(
                euler[i]
                    .keys
                    .iter()
                    .map(|&[frame, angle]| Key::new(time(frame), angle))
                    .collect(),
            )
        });
    }
    if !location.is_empty() {
        data.translations = KeyGroup::linear(
            HostAction::key_frames(&location)
                .into_iter()
                .map(|frame| {
                    Key::new(time(frame), Vector3([0, 1, 2].map(|i| location[i].evaluate(frame))))
                })
                .collect(),
        );
    }
    if !scale.is_empty() {
        // Only uniform scale is stored; X stands for all three.
        data.scales = KeyGroup::linear(
            HostAction::key_frames(&scale)
                .into_iter()
                .map(|frame| Key::new(time(frame), scale[0].evaluate(frame)))
                .collect(),
        );
    }

    let visibility = action
        .channel(HIDE, bone)
        .first()
        .map(|curve| {
            curve
                .keys
                .iter()
                .map(|&[frame, hidden]| Key::new(time(frame), hidden < 0.5))
                .collect()
        })
        .unwrap_or_default();

    Ok(TargetChannels {
        bone: bone.map(str::to_string),
        transform: (!data.is_empty()).then_some(data),
        visibility,
    })
}

/// Curves of `data_path`, one per component. A channel with some but not
/// all of its `expected` components is malformed.
pub(crate) fn complete_channel<'a>(
    action: &'a HostAction,
    data_path: &str,
    bone: Option<&str>,
    expected: usize,
) -> Result<Vec<&'a FCurve>> {
    let mut curves = action.channel(data_path, bone);
    if curves.is_empty() {
        return Ok(curves);
    }
    curves.dedup_by_key(|curve| curve.index);
    let complete = curves.len() == expected && curves.last().map(|c| c.index) == Some(expected - 1);
    if !complete {
        return Err(ExportError::malformed(
            &action.name,
            format!("Incomplete key set {} for action {}", data_path, action.name),
        ));
    }
    Ok(curves)
}

pub(crate) fn find_action<'a>(
    scene: &'a HostScene,
    obj: &HostObject,
    name: &str,
) -> Result<&'a HostAction> {
    scene
        .action(name)
        .ok_or_else(|| ExportError::missing(&obj.name, format!("action '{name}' not found")))
}

// --- Timing ---

/// Playback settings shared by the controllers of one action or strip.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Timing {
    pub start: f32,
    pub stop: f32,
    pub cycle: CycleType,
    /// Driven by a controller manager rather than by itself.
    pub managed: bool,
}

impl Timing {
    pub fn of_action(scene: &HostScene, action: &HostAction) -> Self {
        let (start, end) = action_range(scene, action);
        Timing {
            start: scene.frame_time(start),
            stop: scene.frame_time(end),
            cycle: if action.cyclic {
                CycleType::Loop
            } else {
                CycleType::Clamp
            },
            managed: false,
        }
    }

    fn of_strips(scene: &HostScene, strips: &[&NlaStrip]) -> Self {
        let start = strips
            .iter()
            .map(|s| s.frame_start)
            .fold(f32::MAX, f32::min);
        let end = strips.iter().map(|s| s.frame_end).fold(f32::MIN, f32::max);
        let cycle = match strips.first() {
            Some(strip) if strip.use_reverse => CycleType::Reverse,
            Some(strip) if strip.cyclic => CycleType::Loop,
            _ => CycleType::Clamp,
        };
        Timing {
            start: scene.frame_time(start),
            stop: scene.frame_time(end.max(start)),
            cycle,
            managed: true,
        }
    }

    pub fn controller_flags(&self, game: Game) -> TimeControllerFlags {
        let mut flags = TimeControllerFlags::ACTIVE | self.cycle.controller_flags();
        if self.managed || game == Game::SidMeiersPirates {
            flags |= TimeControllerFlags::MANAGER_CONTROLLED;
        }
        flags
    }
}

/// The action's own frame range, or the scene's when it has none.
fn action_range(scene: &HostScene, action: &HostAction) -> (f32, f32) {
    if action.frame_end > action.frame_start {
        (action.frame_start, action.frame_end)
    } else {
        (scene.frame_start as f32, scene.frame_end as f32)
    }
}

// --- Block creation ---

/// Data and, on files that have them, interpolator of one channel, plus
/// the controller kind that drives it.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ChannelBlocks {
    pub controller: BlockKind,
    pub data: BlockRef,
    pub interpolator: BlockLink,
}

/// Creates the blocks for every channel of `channels`. `pose` seeds the
/// transform interpolator's static values.
pub(crate) fn channel_blocks(
    session: &mut ExportSession,
    channels: TargetChannels,
    pose: Option<NiTransform>,
) -> Result<Vec<ChannelBlocks>> {
    let mut blocks = Vec::new();
    if let Some(data) = channels.transform {
        blocks.push(transform_channel(session, data, pose)?);
    }
    if !channels.visibility.is_empty() {
        blocks.push(visibility_channel(session, channels.visibility)?);
    }
    Ok(blocks)
}

fn transform_channel(
    session: &mut ExportSession,
    data: NiKeyframeData,
    pose: Option<NiTransform>,
) -> Result<ChannelBlocks> {
    let version = session.version();
    let (controller, data_kind) = if version < V10_2_0_0 {
        (BlockKind::NiKeyframeController, BlockKind::NiKeyframeData)
    } else {
        (BlockKind::NiTransformController, BlockKind::NiTransformData)
    };
    let data_ref = create_with(session, data_kind, None, |block| {
        if let BlockData::KeyframeData(d) = &mut block.data {
            *d = data;
        }
    })?;
    let interpolator = if NiSingleInterpController::uses_interpolator(version) {
        Some(create_with(session, BlockKind::NiTransformInterpolator, None, |block| {
            if let BlockData::TransformInterpolator(interp) = &mut block.data {
                if let Some(pose) = pose {
                    interp.translation = pose.translation;
                    interp.rotation = Quat::from_mat3(&Mat3::from(pose.rotation));
                    interp.scale = pose.scale;
                }
                interp.data = Some(data_ref);
            }
        })?)
    } else {
        None
    };
    Ok(ChannelBlocks {
        controller,
        data: data_ref,
        interpolator,
    })
}

fn visibility_channel(session: &mut ExportSession, keys: Vec<Key<bool>>) -> Result<ChannelBlocks> {
    if !NiSingleInterpController::uses_interpolator(session.version()) {
        let data = create_with(session, BlockKind::NiVisData, None, |block| {
            if let BlockData::VisData(d) = &mut block.data {
                d.keys = keys;
            }
        })?;
        return Ok(ChannelBlocks {
            controller: BlockKind::NiVisController,
            data,
            interpolator: None,
        });
    }

    let visible = keys.first().is_none_or(|key| key.value);
    let data = create_with(session, BlockKind::NiBoolData, None, |block| {
        if let BlockData::BoolData(d) = &mut block.data {
            d.data = KeyGroup {
                interpolation: KeyType::Const,
                keys,
            };
        }
    })?;
    let interpolator = create_with(session, BlockKind::NiBoolInterpolator, None, |block| {
        if let BlockData::BoolInterpolator(interp) = &mut block.data {
            interp.value = visible;
            interp.data = Some(data);
        }
    })?;
    Ok(ChannelBlocks {
        controller: BlockKind::NiVisController,
        data,
        interpolator: Some(interpolator),
    })
}

/// A controller of `blocks.controller` kind, wired to the channel's
/// interpolator, or to its data on files without interpolators.
pub(crate) fn create_controller(
    session: &mut ExportSession,
    blocks: &ChannelBlocks,
    timing: Timing,
) -> Result<BlockRef> {
    let flags = timing.controller_flags(session.game());
    create_with(session, blocks.controller, None, |block| {
        if let Some(ctrl) = block.single_interp_mut() {
            ctrl.flags = flags;
            ctrl.frequency = 1.0;
            ctrl.start_time = timing.start;
            ctrl.stop_time = timing.stop;
            match blocks.interpolator {
                Some(interpolator) => ctrl.interpolator = Some(interpolator),
                None => ctrl.data = Some(blocks.data),
            }
        }
    })
}

/// `NiTextKeyExtraData` with the action's markers.
pub(crate) fn text_key_block(
    session: &mut ExportSession,
    scene: &HostScene,
    action: &HostAction,
) -> Result<BlockRef> {
    let keys = text_keys(scene, action);
    create_with(session, BlockKind::NiTextKeyExtraData, None, |block| {
        if let BlockData::TextKeyExtraData(d) = &mut block.data {
            d.text_keys = keys;
        }
    })
}

/// Pose markers sorted by time, or `start`/`end` at the action's range
/// when it has none.
pub fn text_keys(scene: &HostScene, action: &HostAction) -> Vec<TextKey> {
    if action.pose_markers.is_empty() {
        let (start, end) = action_range(scene, action);
        return vec![
            TextKey {
                time: scene.frame_time(start),
                value: "start".to_string(),
            },
            TextKey {
                time: scene.frame_time(end),
                value: "end".to_string(),
            },
        ];
    }
    let mut keys: Vec<TextKey> = action
        .pose_markers
        .iter()
        .map(|marker| TextKey {
            time: scene.frame_time(marker.frame),
            value: marker.name.clone(),
        })
        .collect();
    keys.sort_by(|a, b| a.time.total_cmp(&b.time));
    keys
}

// --- Scene animation ---

/// A controller attached to a scene block for one channel.
#[derive(Debug, Clone, Copy)]
struct ControllerLink {
    target: BlockRef,
    controller: BlockRef,
    interpolator: BlockLink,
    controller_type: BlockKind,
}

struct AnimationExporter<'a> {
    session: &'a mut ExportSession,
    scene: &'a HostScene,
    /// One controller per target and controller type, shared by every sequence.
    controllers: HashMap<(BlockRef, BlockKind), BlockRef>,
}

/// Exports the animation of every hierarchy object. NLA tracks become
/// controller sequences under a manager on `root`; otherwise each object's
/// active action drives its controllers directly.
pub fn export_animation(session: &mut ExportSession, scene: &HostScene, root: BlockRef) -> Result<()> {
    let tracks = sequence_tracks(scene);
    let use_sequences = !tracks.is_empty() && session.version() >= V10_1_0_0;
    if !tracks.is_empty() && !use_sequences {
        warn!("NLA tracks need version 10.1.0.0 or newer, exporting active actions only");
    }

    let mut exporter = AnimationExporter {
        session,
        scene,
        controllers: HashMap::new(),
    };
    if use_sequences {
        exporter.export_sequences(root, &tracks)
    } else {
        exporter.export_active_actions(root)
    }
}

/// Track names that carry a strip, in first-seen order.
fn sequence_tracks(scene: &HostScene) -> Vec<&str> {
    let mut names: Vec<&str> = Vec::new();
    let tracks = scene
        .objects
        .iter()
        .filter(|obj| obj.is_hierarchy_node())
        .filter_map(|obj| obj.animation.as_ref())
        .flat_map(|animation| animation.nla_tracks.iter())
        .filter(|track| track.strip.is_some());
    for track in tracks {
        if !names.contains(&track.name.as_str()) {
            names.push(&track.name);
        }
    }
    names
}

impl AnimationExporter<'_> {
    fn export_active_actions(&mut self, root: BlockRef) -> Result<()> {
        let scene = self.scene;
        let mut animated = Vec::new();
        for obj in scene.objects.iter().filter(|obj| obj.is_hierarchy_node()) {
            let Some(name) = obj.animation.as_ref().and_then(|a| a.action.as_deref()) else {
                continue;
            };
            let action = find_action(scene, obj, name)?;
            animated.push((obj, action, read_action(scene, action)?));
        }

        let mut text_keys_written = false;
        for (obj, action, channels) in animated {
            let timing = Timing::of_action(scene, action);
            for target in channels {
                self.attach_channels(obj, target, timing)?;
            }
            if !text_keys_written {
                let keys = text_key_block(self.session, scene, action)?;
                self.session.registry.add_extra_data(root, keys)?;
                text_keys_written = true;
            }
        }
        Ok(())
    }

    /// Creates the blocks for `target` and attaches its controllers,
    /// reusing a controller the target already has for the same type.
    fn attach_channels(
        &mut self,
        obj: &HostObject,
        target: TargetChannels,
        timing: Timing,
    ) -> Result<Vec<ControllerLink>> {
        let key = match &target.bone {
            Some(bone) => SourceKey::bone(&obj.name, bone),
            None => SourceKey::object(&obj.name),
        };
        let target_block = self.session.registry.lookup_block_for(&key)?;
        let pose = self.session.registry[target_block]
            .av_object()
            .map(|av| av.transform);

        let mut links = Vec::new();
        for blocks in channel_blocks(self.session, target, pose)? {
            let controller = match self.controllers.get(&(target_block, blocks.controller)) {
                Some(&existing) => existing,
                None => {
                    let controller = create_controller(self.session, &blocks, timing)?;
                    self.session.registry.add_controller(target_block, controller)?;
                    self.controllers
                        .insert((target_block, blocks.controller), controller);
                    controller
                }
            };
            links.push(ControllerLink {
                target: target_block,
                controller,
                interpolator: blocks.interpolator,
                controller_type: blocks.controller,
            });
        }
        Ok(links)
    }

    fn export_sequences(&mut self, root: BlockRef, tracks: &[&str]) -> Result<()> {
        let manager = create_with(self.session, BlockKind::NiControllerManager, None, |block| {
            if let BlockData::ControllerManager(m) = &mut block.data {
                m.cumulative = false;
            }
        })?;
        // Heads the root's controller chain; sequences may add more below it.
        self.session.registry.add_controller(root, manager)?;

        let mut stop = 0.0f32;
        for track in tracks {
            let (sequence, sequence_stop) = self.export_sequence(track, manager, root)?;
            stop = stop.max(sequence_stop);
            if let BlockData::ControllerManager(m) = &mut self.session.registry[manager].data {
                m.sequences.push(sequence);
            }
        }

        let objs: Vec<AVObjectEntry> = self
            .session
            .registry
            .iter()
            .filter(|(_, block)| block.kind.is_node() || block.kind == BlockKind::NiTriShape)
            .map(|(block_ref, block)| AVObjectEntry {
                name: block.name().to_string(),
                av_object: block_ref,
            })
            .collect();
        let palette = create_with(
            self.session,
            BlockKind::NiDefaultAVObjectPalette,
            None,
            |block| {
                if let BlockData::DefaultAVObjectPalette(p) = &mut block.data {
                    p.scene = Some(root);
                    p.objs = objs;
                }
            },
        )?;
        if let BlockData::ControllerManager(m) = &mut self.session.registry[manager].data {
            m.object_palette = Some(palette);
            m.flags = TimeControllerFlags::ACTIVE | CycleType::Clamp.controller_flags();
            m.stop_time = stop;
        }
        Ok(())
    }

    /// One sequence for every strip on tracks named `track`. Returns the
    /// sequence and its stop time.
    fn export_sequence(
        &mut self,
        track: &str,
        manager: BlockRef,
        root: BlockRef,
    ) -> Result<(BlockRef, f32)> {
        let scene = self.scene;
        let mut strips = Vec::new();
        for obj in scene.objects.iter().filter(|obj| obj.is_hierarchy_node()) {
            let Some(animation) = &obj.animation else {
                continue;
            };
            for nla in animation.nla_tracks.iter().filter(|t| t.name == track) {
                if let Some(strip) = &nla.strip {
                    let action = find_action(scene, obj, &strip.action)?;
                    strips.push((obj, strip, action, read_action(scene, action)?));
                }
            }
        }
        let Some((_, template, first_action, _)) = strips.first() else {
            return Err(ExportError::missing(track, "track has no strips"));
        };

        let all: Vec<&NlaStrip> = strips.iter().map(|(_, strip, _, _)| *strip).collect();
        let timing = Timing::of_strips(scene, &all);
        let text_keys = text_key_block(self.session, scene, first_action)?;
        let (weight, frequency) = (template.influence, template.scale);
        let accum_root_name = self.session.registry[root].name().to_string();
        debug!("Exporting sequence '{}' ({} strips)", track, strips.len());
        let sequence = create_with(self.session, BlockKind::NiControllerSequence, None, |block| {
            if let BlockData::ControllerSequence(s) = &mut block.data {
                s.name = track.to_string();
                s.cycle_type = timing.cycle;
                s.weight = weight;
                s.frequency = frequency;
                s.start_time = timing.start;
                s.stop_time = timing.stop;
                s.text_keys = Some(text_keys);
                s.manager = Some(manager);
                s.accum_root_name = accum_root_name;
            }
        })?;

        for (obj, strip, _, channels) in strips {
            for target in channels {
                for link in self.attach_channels(obj, target, timing)? {
                    let node_name = self.session.registry[link.target].name().to_string();
                    let names = controlled_block_names(
                        self.session,
                        sequence,
                        &node_name,
                        link.controller_type.name(),
                    )?;
                    if let BlockData::ControllerSequence(s) = &mut self.session.registry[sequence].data {
                        s.controlled_blocks.push(ControlledBlock {
                            interpolator: link.interpolator,
                            controller: Some(link.controller),
                            priority: strip.priority,
                            names,
                        });
                    }
                }
            }
        }
        Ok((sequence, timing.stop))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nif::host::{HostAnimation, NlaTrack, PoseMarker};
    use crate::nif::types::ControlledBlockNames;

    fn curve(data_path: &str, index: usize, keys: &[[f32; 2]]) -> FCurve {
        FCurve {
            data_path: data_path.into(),
            index,
            bone: None,
            keys: keys.to_vec(),
        }
    }

    fn location_action(name: &str) -> HostAction {
        HostAction {
            name: name.into(),
            frame_start: 0.0,
            frame_end: 30.0,
            curves: (0..3)
                .map(|i| curve(LOCATION, i, &[[0.0, 0.0], [30.0, i as f32]]))
                .collect(),
            ..Default::default()
        }
    }

    fn animated_scene(animation: HostAnimation, actions: Vec<HostAction>) -> HostScene {
        HostScene {
            objects: vec![HostObject {
                name: "Door".into(),
                animation: Some(animation),
                ..Default::default()
            }],
            actions,
            ..Default::default()
        }
    }

    fn export(game: Game, scene: &HostScene) -> Result<(ExportSession, BlockRef)> {
        let mut session = ExportSession::for_game(game);
        let root = session
            .create(BlockKind::NiNode, Some(SourceKey::object("Door")))?;
        session.registry.set_name(root, "Door");
        export_animation(&mut session, scene, root)?;
        Ok((session, root))
    }

    #[test]
    fn incomplete_quaternions_create_nothing() {
        let action = HostAction {
            name: "Spin".into(),
            curves: (0..3).map(|i| curve(QUATERNION, i, &[[0.0, 1.0]])).collect(),
            ..Default::default()
        };
        let scene = animated_scene(
            HostAnimation {
                action: Some("Spin".into()),
                ..Default::default()
            },
            vec![action],
        );
        let mut session = ExportSession::for_game(Game::Oblivion);
        let root = session.create(BlockKind::NiNode, Some(SourceKey::object("Door"))).unwrap();
        let err = export_animation(&mut session, &scene, root).unwrap_err();
        assert!(
            matches!(&err, ExportError::MalformedSourceData { message, .. }
                if message == "Incomplete key set rotation_quaternion for action Spin")
        );
        assert_eq!(session.registry.len(), 1);
    }

    #[test]
    fn quaternion_channel_zero_is_w() {
        let action = HostAction {
            name: "Turn".into(),
            curves: vec![
                curve(QUATERNION, 0, &[[0.0, 0.0]]),
                curve(QUATERNION, 1, &[[0.0, 0.0]]),
                curve(QUATERNION, 2, &[[0.0, 0.0]]),
                curve(QUATERNION, 3, &[[0.0, 1.0]]),
            ],
            ..Default::default()
        };
        let targets = read_action(&HostScene::default(), &action).unwrap();
        let data = targets[0].transform.as_ref().unwrap();
        assert_eq!(data.quaternion_keys[0].value, Quat::from_xyzw(0.0, 0.0, 1.0, 0.0));
        assert_eq!(data.rotation_type, KeyType::Quadratic);
    }

    #[test]
    fn active_action_drives_a_transform_controller() {
        let scene = animated_scene(
            HostAnimation {
                action: Some("Open".into()),
                ..Default::default()
            },
            vec![location_action("Open")],
        );
        let (session, root) = export(Game::Oblivion, &scene).unwrap();

        let ctrl = session.registry[root].net().unwrap().controller.unwrap();
        assert_eq!(session.registry[ctrl].kind, BlockKind::NiTransformController);
        let time = session.registry[ctrl].time_controller().unwrap();
        assert_eq!(time.target, Some(root));
        assert_eq!(time.stop_time, 1.0);
        assert!(time.flags.contains(TimeControllerFlags::CYCLE_CLAMP));

        let extra: Vec<BlockRef> = session.registry[root].net().unwrap().extra_data.iter().collect();
        let BlockData::TextKeyExtraData(keys) = &session.registry[extra[0]].data else {
            panic!("no text keys");
        };
        assert_eq!(keys.text_keys[0].value, "start");
        assert_eq!(keys.text_keys[1].value, "end");
    }

    #[test]
    fn old_files_use_keyframe_controllers_without_interpolators() {
        let scene = animated_scene(
            HostAnimation {
                action: Some("Open".into()),
                ..Default::default()
            },
            vec![location_action("Open")],
        );
        let (session, root) = export(Game::Morrowind, &scene).unwrap();
        let ctrl = session.registry[root].net().unwrap().controller.unwrap();
        assert_eq!(session.registry[ctrl].kind, BlockKind::NiKeyframeController);
        let BlockData::SingleInterpController(c) = &session.registry[ctrl].data else {
            panic!("not a keyframe controller");
        };
        assert!(c.interpolator.is_none());
        assert_eq!(
            session.registry[c.data.unwrap()].kind,
            BlockKind::NiKeyframeData
        );
        assert_eq!(session.registry.iter_kind(BlockKind::NiTransformInterpolator).count(), 0);
    }

    #[test]
    fn text_keys_come_from_sorted_markers() {
        let action = HostAction {
            name: "Attack".into(),
            pose_markers: vec![
                PoseMarker {
                    frame: 30.0,
                    name: "hit".into(),
                },
                PoseMarker {
                    frame: 0.0,
                    name: "start".into(),
                },
            ],
            ..Default::default()
        };
        let keys = text_keys(&HostScene::default(), &action);
        assert_eq!(keys[0].value, "start");
        assert_eq!(keys[1].time, 1.0);
    }

    #[test]
    fn nla_tracks_become_managed_sequences() {
        let strip = |action: &str, priority| NlaStrip {
            action: action.into(),
            frame_start: 0.0,
            frame_end: 30.0,
            priority,
            ..Default::default()
        };
        let scene = animated_scene(
            HostAnimation {
                action: None,
                nla_tracks: vec![
                    NlaTrack {
                        name: "Open".into(),
                        strip: Some(strip("OpenAction", 5)),
                    },
                    NlaTrack {
                        name: "Close".into(),
                        strip: Some(strip("CloseAction", 0)),
                    },
                ],
            },
            vec![location_action("OpenAction"), location_action("CloseAction")],
        );
        let (session, root) = export(Game::Oblivion, &scene).unwrap();

        let manager = session.registry[root].net().unwrap().controller.unwrap();
        let BlockData::ControllerManager(m) = &session.registry[manager].data else {
            panic!("root is not managed");
        };
        assert_eq!(m.sequences.len(), 2);
        assert!(!m.cumulative);
        assert!(m.object_palette.is_some());

        let BlockData::ControllerSequence(open) = &session.registry[m.sequences[0]].data else {
            panic!("not a sequence");
        };
        assert_eq!(open.name, "Open");
        assert_eq!(open.controlled_blocks.len(), 1);
        assert_eq!(open.controlled_blocks[0].priority, 5);
        assert!(matches!(
            open.controlled_blocks[0].names,
            ControlledBlockNames::Palette { .. }
        ));
        // Both sequences drive the same transform controller.
        assert_eq!(session.registry.iter_kind(BlockKind::NiTransformController).count(), 1);
        assert_eq!(session.registry.iter_kind(BlockKind::NiTransformInterpolator).count(), 2);

        let ctrl = session.registry[manager].time_controller().unwrap();
        assert_eq!(ctrl.target, Some(root));
        let next = ctrl.next_controller.unwrap();
        assert_eq!(session.registry[next].kind, BlockKind::NiTransformController);
    }

    #[test]
    fn sequences_take_weight_and_frequency_from_their_first_strip() {
        let scene = animated_scene(
            HostAnimation {
                action: None,
                nla_tracks: vec![NlaTrack {
                    name: "Walk".into(),
                    strip: Some(NlaStrip {
                        action: "WalkAction".into(),
                        frame_start: 0.0,
                        frame_end: 30.0,
                        influence: 0.5,
                        scale: 2.0,
                        ..Default::default()
                    }),
                }],
            },
            vec![location_action("WalkAction")],
        );
        let (session, root) = export(Game::Oblivion, &scene).unwrap();

        let manager = session.registry[root].net().unwrap().controller.unwrap();
        let BlockData::ControllerManager(m) = &session.registry[manager].data else {
            panic!("root is not managed");
        };
        let BlockData::ControllerSequence(walk) = &session.registry[m.sequences[0]].data else {
            panic!("not a sequence");
        };
        assert_eq!(walk.weight, 0.5);
        assert_eq!(walk.frequency, 2.0);
    }
}
