//! Particle systems: the system and its data, the emitter and the modifier
//! stack, the two system controllers, and one field modifier per force
//! field in the scene.

use tracing::{debug, warn};

use super::object::node_flags;
use super::{create_with, material};
use crate::nif::error::{skip_unsupported, ExportError, Result};
use crate::nif::host::{
    EmitterKind, FieldType, HostField, HostMaterial, HostObject, HostParticleSystem, HostScene,
    HostTextureRole,
};
use crate::nif::registry::SourceKey;
use crate::nif::session::ExportSession;
use crate::nif::types::particles::order;
use crate::nif::types::{
    BlockData, BlockKind, BlockRef, Color4, EmitterSettings, EmitterShape, FieldKind,
    FieldSettings, ModifierData, RotationSettings, SpawnSettings, Vector3, Vector4,
};
use crate::nif::version::V10_1_0_0;

pub fn export_particles(session: &mut ExportSession, scene: &HostScene) -> Result<()> {
    for obj in &scene.objects {
        for psys in &obj.particle_systems {
            skip_unsupported(export_particle_system(session, scene, obj, psys))?;
        }
    }
    Ok(())
}

/// Block types one system needs, checked before anything is created.
struct SystemKinds {
    system: BlockKind,
    data: BlockKind,
    emitter: BlockKind,
}

impl SystemKinds {
    fn of(psys: &HostParticleSystem) -> Self {
        let (system, data) = if psys.strip {
            (BlockKind::BSStripParticleSystem, BlockKind::BSStripPSysData)
        } else {
            (BlockKind::NiParticleSystem, BlockKind::NiPSysData)
        };
        let emitter = match psys.emitter {
            EmitterKind::Sphere => BlockKind::NiPSysSphereEmitter,
            EmitterKind::Box => BlockKind::NiPSysBoxEmitter,
            EmitterKind::Cylinder => BlockKind::NiPSysCylinderEmitter,
            EmitterKind::Mesh => BlockKind::NiPSysMeshEmitter,
            EmitterKind::Array => BlockKind::BSPSysArrayEmitter,
        };
        SystemKinds {
            system,
            data,
            emitter,
        }
    }

    fn check(&self, session: &ExportSession, obj: &HostObject) -> Result<()> {
        let mut kinds = vec![self.system, self.data, self.emitter];
        if self.system == BlockKind::BSStripParticleSystem {
            kinds.push(BlockKind::BSPSysStripUpdateModifier);
        }
        match kinds.into_iter().find(|k| !k.is_available(session.version())) {
            Some(kind) => Err(ExportError::unsupported(&obj.name, kind.name())),
            None => Ok(()),
        }
    }
}

fn export_particle_system(
    session: &mut ExportSession,
    scene: &HostScene,
    obj: &HostObject,
    psys: &HostParticleSystem,
) -> Result<BlockRef> {
    if session.version() < V10_1_0_0 {
        return Err(ExportError::unsupported(&obj.name, "particle systems"));
    }
    let Some(parent_name) = obj.parent.as_deref() else {
        return Err(ExportError::unsupported(&obj.name, "a particle system without a parent"));
    };
    let parent = session
        .registry
        .lookup_block_for(&SourceKey::object(parent_name))?;
    let kinds = SystemKinds::of(psys);
    kinds.check(session, obj)?;

    let host_material = match &psys.material {
        Some(name) => Some(scene.material(name).ok_or_else(|| {
            ExportError::missing(&obj.name, format!("material '{name}' not found"))
        })?),
        None => None,
    };
    let offsets = subtexture_offsets(scene, psys, host_material)?;
    let shape = emitter_shape(session, obj, psys, parent)?;

    // --- System and data ---
    let data = create_with(session, kinds.data, None, |block| {
        if let BlockData::PSysData(d) = &mut block.data {
            d.num_particles = psys.count;
            d.has_vertices = true;
            d.has_texture_indices = !offsets.is_empty();
            d.subtexture_offsets = offsets;
            if psys.strip {
                d.max_point_count = Some(psys.strip_max_point_count);
            }
        }
    })?;
    let flags = node_flags(session, obj);
    let system = create_with(
        session,
        kinds.system,
        Some(SourceKey::object(&obj.name)),
        |block| {
            if let BlockData::ParticleSystem(p) = &mut block.data {
                p.name = obj.name.clone();
                p.flags = flags;
                p.data = Some(data);
                p.world_space = true;
            }
        },
    )?;
    session.registry.add_child(parent, system)?;
    if let Some(host_material) = host_material {
        for property in material::export_material(session, scene, host_material)? {
            material::attach(session, system, property)?;
        }
    }

    // --- Modifiers ---
    let fps = scene.fps;
    let stack = ModifierStack {
        system,
        owner: &obj.name,
    };
    if psys.strip {
        let order = if session.game().is_fallout3() {
            order::FO3_STRIP_UPDATE
        } else {
            order::SK_STRIP_UPDATE
        };
        stack.add(
            session,
            BlockKind::BSPSysStripUpdateModifier,
            order,
            ModifierData::StripUpdate {
                update_delta_time: 1.0 / fps,
            },
        )?;
    }

    let initial_radius = (psys.display_size / 2.0).ceil();
    let settings = EmitterSettings {
        speed: psys.normal_factor,
        speed_variation: psys.factor_random,
        initial_color: Color4([1.0; 4]),
        initial_radius,
        radius_variation: (psys.size_random * initial_radius).ceil(),
        life_span: psys.lifetime / fps,
        life_span_variation: psys.lifetime_random / fps,
        emitter_object: Some(parent),
        ..EmitterSettings::default()
    };
    let emitter = stack.add(
        session,
        kinds.emitter,
        order::EMITTER,
        ModifierData::Emitter { settings, shape },
    )?;
    stack.add(session, BlockKind::NiPSysPositionModifier, order::POS_UPDATE, ModifierData::Position)?;
    stack.add(
        session,
        BlockKind::NiPSysBoundUpdateModifier,
        order::BOUND_UPDATE,
        ModifierData::BoundUpdate { update_skip: 0 },
    )?;
    let spawn = stack.add(
        session,
        BlockKind::NiPSysSpawnModifier,
        order::EMITTER,
        ModifierData::Spawn(SpawnSettings {
            num_spawn_generations: psys.num_spawn_generations,
            percentage_spawned: psys.percentage_spawned,
            min_num_to_spawn: psys.min_num_to_spawn,
            max_num_to_spawn: psys.max_num_to_spawn,
            spawn_speed_variation: psys.factor_random.ceil(),
            spawn_dir_variation: psys.rotation_factor_random.ceil(),
            life_span: psys.lifetime / fps,
            life_span_variation: psys.lifetime_random / fps,
        }),
    )?;
    // Age-death always points at the spawn modifier, spawning or not.
    stack.add(
        session,
        BlockKind::NiPSysAgeDeathModifier,
        order::KILL_OLD_PARTICLES,
        ModifierData::AgeDeath {
            spawn_on_death: psys.spawn_on_death,
            spawn_modifier: Some(spawn),
        },
    )?;

    for field_obj in &scene.objects {
        if let Some(field) = &field_obj.field {
            skip_unsupported(export_field(session, scene, system, field_obj, field))?;
        }
    }

    if psys.use_rotations {
        let phase = psys.phase_factor_random;
        let angle_variation = if phase < 1.0 { phase } else { phase - 1.0 };
        stack.add(
            session,
            BlockKind::NiPSysRotationModifier,
            order::GENERAL,
            ModifierData::Rotation(RotationSettings {
                rotation_speed: psys.angular_velocity_factor,
                rotation_speed_variation: 0.0,
                rotation_angle: (psys.phase_factor * 180.0).to_radians(),
                rotation_angle_variation: (angle_variation * 180.0).to_radians(),
                random_rot_speed_sign: psys.random_rot_speed_sign,
                random_axis: psys.random_axis,
                axis: Vector3(psys.rotation_axis),
            }),
        )?;
    }
    if psys.object_factor != 0.0 {
        skip_unsupported(stack.add(
            session,
            BlockKind::BSParentVelocityModifier,
            order::GENERAL,
            ModifierData::ParentVelocity {
                damping: psys.object_factor,
            },
        ))?;
    }
    if psys.wind_weight != 0.0 {
        skip_unsupported(stack.add(
            session,
            BlockKind::BSWindModifier,
            order::GENERAL,
            ModifierData::Wind {
                strength: psys.wind_weight,
            },
        ))?;
    }

    // --- Controllers ---
    let emitter_name = session.registry[emitter].name().to_string();
    let lifetime = (psys.lifetime / fps).max(f32::EPSILON);
    let birth_rate = create_with(session, BlockKind::NiFloatInterpolator, None, |block| {
        if let BlockData::FloatInterpolator(interp) = &mut block.data {
            interp.value = f32::from(psys.count) / lifetime;
        }
    })?;
    let visibility = create_with(session, BlockKind::NiBoolInterpolator, None, |block| {
        if let BlockData::BoolInterpolator(interp) = &mut block.data {
            interp.value = true;
        }
    })?;
    let emitter_ctlr = create_with(session, BlockKind::NiPSysEmitterCtlr, None, |block| {
        if let BlockData::PSysEmitterCtlr(ctlr) = &mut block.data {
            ctlr.modifier_name = emitter_name;
            ctlr.interpolator = Some(birth_rate);
            ctlr.visibility_interpolator = Some(visibility);
        }
    })?;
    let update_ctlr = session.create(BlockKind::NiPSysUpdateCtlr, None)?;
    session.registry.add_controller(system, emitter_ctlr)?;
    session.registry.add_controller(system, update_ctlr)?;

    debug!("{}: exported particle system '{}'", obj.name, psys.name);
    Ok(system)
}

/// Appends modifiers to one system in call order.
struct ModifierStack<'a> {
    system: BlockRef,
    owner: &'a str,
}

impl ModifierStack<'_> {
    fn add(
        &self,
        session: &mut ExportSession,
        kind: BlockKind,
        order: u32,
        data: ModifierData,
    ) -> Result<BlockRef> {
        add_modifier(session, self.system, kind, format!("{}-{}", self.owner, kind), order, data)
    }
}

fn add_modifier(
    session: &mut ExportSession,
    system: BlockRef,
    kind: BlockKind,
    name: String,
    order: u32,
    data: ModifierData,
) -> Result<BlockRef> {
    let modifier = create_with(session, kind, None, |block| {
        if let BlockData::Modifier(m) = &mut block.data {
            m.name = name;
            m.order = order;
            m.target = Some(system);
            m.active = true;
            m.data = data;
        }
    })?;
    if let BlockData::ParticleSystem(p) = &mut session.registry[system].data {
        p.modifiers.push(modifier);
    }
    Ok(modifier)
}

fn export_field(
    session: &mut ExportSession,
    scene: &HostScene,
    system: BlockRef,
    field_obj: &HostObject,
    field: &HostField,
) -> Result<Option<BlockRef>> {
    let (kind, suffix, field_kind) = match field.kind {
        FieldType::Vortex => (
            BlockKind::NiPSysVortexFieldModifier,
            "VortexField",
            FieldKind::Vortex {
                direction: Vector3::Z,
            },
        ),
        FieldType::Drag => (
            BlockKind::NiPSysDragFieldModifier,
            "DragField",
            FieldKind::Drag {
                use_direction: false,
                direction: Vector3::Z,
            },
        ),
        FieldType::Turbulence => (
            BlockKind::NiPSysTurbulenceFieldModifier,
            "TurbulenceField",
            FieldKind::Turbulence {
                frequency: scene.fps,
            },
        ),
        FieldType::Wind => (
            BlockKind::NiPSysAirFieldModifier,
            "AirField",
            FieldKind::Air {
                direction: Vector3::Z,
                air_friction: 0.0,
                inherit_velocity: field.flow.clamp(0.0, 1.0),
                inherit_rotation: field.apply_to_rotation,
                enable_spread: field.use_radial_max,
                spread: if field.use_radial_max {
                    field.radial_max
                } else {
                    0.0
                },
            },
        ),
        FieldType::Force if field.use_gravity_falloff && scene.use_gravity => (
            BlockKind::NiPSysGravityFieldModifier,
            "GravityField",
            FieldKind::Gravity {
                direction: Vector3::Z,
            },
        ),
        FieldType::Force => {
            debug!("{}: force field without gravity falloff, skipped", field_obj.name);
            return Ok(None);
        }
    };
    let field_object = session
        .registry
        .try_lookup_block_for(&SourceKey::object(&field_obj.name))
        .ok_or_else(|| {
            ExportError::missing(&field_obj.name, "force field object was not exported")
        })?;
    let magnitude = match field_kind {
        FieldKind::Gravity { .. } => scene.gravity.iter().sum::<f32>().abs().sqrt(),
        _ => field.strength,
    };
    let settings = FieldSettings {
        field_object: Some(field_object),
        magnitude,
        attenuation: field.falloff_power,
        use_max_distance: field.use_max_distance,
        max_distance: field.distance_max,
        kind: field_kind,
    };
    add_modifier(
        session,
        system,
        kind,
        format!("{}-{}", field_obj.name, suffix),
        order::FORCE,
        ModifierData::Field(settings),
    )
    .map(Some)
}

fn emitter_shape(
    session: &ExportSession,
    obj: &HostObject,
    psys: &HostParticleSystem,
    parent: BlockRef,
) -> Result<EmitterShape> {
    let [x, y, z] = psys.emitter_size;
    Ok(match psys.emitter {
        EmitterKind::Sphere => EmitterShape::Sphere { radius: x },
        EmitterKind::Box => EmitterShape::Box {
            width: x,
            height: y,
            depth: z,
        },
        EmitterKind::Cylinder => EmitterShape::Cylinder {
            radius: x,
            height: z,
        },
        EmitterKind::Mesh => {
            let parent_block = &session.registry[parent];
            let meshes: Vec<BlockRef> = if parent_block.kind == BlockKind::NiTriShape {
                vec![parent]
            } else {
                match &parent_block.data {
                    BlockData::Node(node) => node
                        .children
                        .iter()
                        .copied()
                        .filter(|c| session.registry[*c].kind == BlockKind::NiTriShape)
                        .collect(),
                    _ => Vec::new(),
                }
            };
            if meshes.is_empty() {
                return Err(ExportError::missing(
                    &obj.name,
                    "mesh emitter parent has no exported shapes",
                ));
            }
            EmitterShape::Mesh {
                meshes,
                initial_velocity_type: 0,
                emission_type: 0,
                emission_axis: Vector3::Z,
            }
        }
        EmitterKind::Array => EmitterShape::Array,
    })
}

/// Texture atlas cells, `(x, height, z, width)` each, from the top left.
fn subtexture_offsets(
    scene: &HostScene,
    psys: &HostParticleSystem,
    host_material: Option<&HostMaterial>,
) -> Result<Vec<Vector4>> {
    let count = psys.num_subtexture_offsets;
    if count == 0 {
        return Ok(Vec::new());
    }
    if count % 2 != 0 {
        return Err(ExportError::malformed(
            &psys.name,
            "subtexture offset count must be zero or a multiple of two",
        ));
    }
    let image = host_material
        .and_then(|m| {
            m.textures
                .iter()
                .find(|slot| slot.role == HostTextureRole::Base)
        })
        .and_then(|slot| scene.image(&slot.image))
        .ok_or_else(|| {
            ExportError::malformed(&psys.name, "subtexture offsets need a base texture image")
        })?;

    let side = (count as f32).sqrt() as u32;
    let (mut cols, mut rows) = (side, side);
    if count == 2 {
        match image.width.cmp(&image.height) {
            std::cmp::Ordering::Greater => rows += 1,
            std::cmp::Ordering::Less => cols += 1,
            std::cmp::Ordering::Equal => warn!(
                "{}: square image with two subtexture offsets may not display as expected",
                psys.name
            ),
        }
    }
    let width = 1.0 / cols as f32;
    let height = 1.0 / rows as f32;
    Ok((0..rows)
        .flat_map(|row| {
            (0..cols).map(move |col| Vector4([col as f32 * width, height, row as f32 * height, width]))
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nif::host::{HostImage, HostTextureSlot};
    use crate::nif::types::NiPSysModifier;
    use crate::nif::version::Game;

    fn scene(psys: HostParticleSystem) -> HostScene {
        HostScene {
            objects: vec![
                HostObject {
                    name: "Torch".into(),
                    ..Default::default()
                },
                HostObject {
                    name: "Flame".into(),
                    parent: Some("Torch".into()),
                    particle_systems: vec![psys],
                    ..Default::default()
                },
            ],
            ..Default::default()
        }
    }

    fn sphere() -> HostParticleSystem {
        HostParticleSystem {
            name: "Sparks".into(),
            emitter: EmitterKind::Sphere,
            ..Default::default()
        }
    }

    fn session_with_torch(game: Game) -> (ExportSession, BlockRef) {
        let mut session = ExportSession::for_game(game);
        let torch = session
            .create(BlockKind::NiNode, Some(SourceKey::object("Torch")))
            .unwrap();
        (session, torch)
    }

    fn modifier(session: &ExportSession, block: BlockRef) -> &NiPSysModifier {
        match &session.registry[block].data {
            BlockData::Modifier(m) => m,
            _ => panic!("not a modifier"),
        }
    }

    #[test]
    fn builds_the_full_modifier_stack() {
        let (mut session, torch) = session_with_torch(Game::Oblivion);
        export_particles(&mut session, &scene(sphere())).unwrap();

        let system = session
            .registry
            .lookup_block_for(&SourceKey::object("Flame"))
            .unwrap();
        let BlockData::Node(node) = &session.registry[torch].data else {
            panic!("not a node");
        };
        assert_eq!(node.children, vec![system]);

        let BlockData::ParticleSystem(p) = &session.registry[system].data else {
            panic!("not a particle system");
        };
        let kinds: Vec<BlockKind> = p.modifiers.iter().map(|m| session.registry[*m].kind).collect();
        assert_eq!(
            kinds,
            vec![
                BlockKind::NiPSysSphereEmitter,
                BlockKind::NiPSysPositionModifier,
                BlockKind::NiPSysBoundUpdateModifier,
                BlockKind::NiPSysSpawnModifier,
                BlockKind::NiPSysAgeDeathModifier,
            ]
        );
        assert!(p.modifiers.iter().all(|m| modifier(&session, *m).target == Some(system)));

        let ModifierData::AgeDeath { spawn_modifier, .. } = modifier(&session, p.modifiers[4]).data
        else {
            panic!("not age-death");
        };
        assert_eq!(spawn_modifier, Some(p.modifiers[3]));
        assert_eq!(modifier(&session, p.modifiers[4]).order, order::KILL_OLD_PARTICLES);

        let ctlr = p.controller.unwrap();
        let BlockData::PSysEmitterCtlr(emitter_ctlr) = &session.registry[ctlr].data else {
            panic!("not an emitter controller");
        };
        assert_eq!(emitter_ctlr.modifier_name, "Flame-NiPSysSphereEmitter");
        assert_eq!(emitter_ctlr.target, Some(system));
        let next = emitter_ctlr.next_controller.unwrap();
        assert_eq!(session.registry[next].kind, BlockKind::NiPSysUpdateCtlr);
    }

    #[test]
    fn force_fields_become_field_modifiers() {
        let (mut session, _) = session_with_torch(Game::Oblivion);
        let gust = session
            .create(BlockKind::NiNode, Some(SourceKey::object("Gust")))
            .unwrap();
        let mut scene = scene(sphere());
        scene.objects.push(HostObject {
            name: "Gust".into(),
            field: Some(HostField {
                kind: FieldType::Wind,
                strength: 5.0,
                flow: 3.0,
                ..Default::default()
            }),
            ..Default::default()
        });
        export_particles(&mut session, &scene).unwrap();

        let (block, _) = session
            .registry
            .iter_kind(BlockKind::NiPSysAirFieldModifier)
            .next()
            .unwrap();
        let m = modifier(&session, block);
        assert_eq!(m.name, "Gust-AirField");
        assert_eq!(m.order, order::FORCE);
        let ModifierData::Field(settings) = m.data else {
            panic!("not a field");
        };
        assert_eq!(settings.field_object, Some(gust));
        assert_eq!(settings.magnitude, 5.0);
        assert!(matches!(settings.kind, FieldKind::Air { inherit_velocity, .. } if inherit_velocity == 1.0));
    }

    #[test]
    fn strip_systems_on_fallout3() {
        let (mut session, _) = session_with_torch(Game::Fallout3);
        let psys = HostParticleSystem {
            strip: true,
            strip_max_point_count: 12,
            ..Default::default()
        };
        export_particles(&mut session, &scene(psys)).unwrap();

        let (_, system) = session
            .registry
            .iter_kind(BlockKind::BSStripParticleSystem)
            .next()
            .unwrap();
        let BlockData::ParticleSystem(p) = &system.data else {
            panic!("not a particle system");
        };
        let strip = modifier(&session, p.modifiers[0]);
        assert_eq!(session.registry[p.modifiers[0]].kind, BlockKind::BSPSysStripUpdateModifier);
        assert_eq!(strip.order, order::FO3_STRIP_UPDATE);
        assert_eq!(session.registry[p.modifiers[1]].kind, BlockKind::BSPSysArrayEmitter);
        let BlockData::PSysData(data) = &session.registry[p.data.unwrap()].data else {
            panic!("not particle data");
        };
        assert_eq!(data.max_point_count, Some(12));
    }

    #[test]
    fn unavailable_systems_leave_no_blocks() {
        // The array emitter needs a newer file than Oblivion writes.
        let (mut session, _) = session_with_torch(Game::Oblivion);
        export_particles(&mut session, &scene(HostParticleSystem::default())).unwrap();
        assert_eq!(session.registry.len(), 1);

        let (mut session, _) = session_with_torch(Game::Morrowind);
        export_particles(&mut session, &scene(sphere())).unwrap();
        assert_eq!(session.registry.len(), 1);
    }

    #[test]
    fn odd_subtexture_counts_are_malformed() {
        let (mut session, _) = session_with_torch(Game::Oblivion);
        let psys = HostParticleSystem {
            num_subtexture_offsets: 3,
            ..sphere()
        };
        let err = export_particles(&mut session, &scene(psys)).unwrap_err();
        assert!(matches!(err, ExportError::MalformedSourceData { .. }));
        assert_eq!(session.registry.len(), 1);
    }

    #[test]
    fn subtexture_grid_follows_the_image_aspect() {
        let mut scene = scene(HostParticleSystem {
            num_subtexture_offsets: 2,
            material: Some("Fire".into()),
            ..sphere()
        });
        scene.materials.push(HostMaterial {
            name: "Fire".into(),
            textures: vec![HostTextureSlot {
                role: HostTextureRole::Base,
                image: "fire".into(),
                uv_set: 0,
            }],
            ..Default::default()
        });
        scene.images.push(HostImage {
            name: "fire".into(),
            path: "textures/fire.dds".into(),
            width: 256,
            height: 128,
        });
        let offsets = subtexture_offsets(
            &scene,
            &scene.objects[1].particle_systems[0],
            scene.material("Fire"),
        )
        .unwrap();
        assert_eq!(
            offsets,
            vec![Vector4([0.0, 0.5, 0.0, 1.0]), Vector4([0.0, 0.5, 0.5, 1.0])]
        );

        let (mut session, _) = session_with_torch(Game::Oblivion);
        export_particles(&mut session, &scene).unwrap();
        let (_, system) = session.registry.iter_kind(BlockKind::NiParticleSystem).next().unwrap();
        let BlockData::ParticleSystem(p) = &system.data else {
            panic!("not a particle system");
        };
        assert!(!p.properties.is_empty());
    }
}
