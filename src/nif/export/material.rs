//! Materials: `NiMaterialProperty`, the texturing property and the alpha
//! property of a host material, or a `BSLightingShaderProperty` with its
//! texture set on Skyrim-era targets.

use tracing::debug;

use super::texture;
use crate::nif::dedup::{DedupPolicy, SPECIAL_NAMES};
use crate::nif::error::Result;
use crate::nif::host::{HostMaterial, HostScene};
use crate::nif::registry::SourceKey;
use crate::nif::session::ExportSession;
use crate::nif::types::{
    BlockData, BlockKind, BlockRef, Color3, ShaderFlags1, ShaderFlags2, Vector2,
};
use crate::nif::version::Game;

/// From this stream version on, materials are lighting shader properties
/// hung on the shape's own links.
pub const SHADER_BS_VERSION: u32 = 83;

/// Highest glossiness the property accepts.
const MAX_GLOSSINESS: f32 = 128.0;
const MAX_SHADER_GLOSSINESS: f32 = 999.0;

/// Properties for `material`, in attach order: material, texturing, alpha.
/// Shader-era targets get the shader property instead of the first two.
/// Identical blocks are shared across shapes.
pub fn export_material(
    session: &mut ExportSession,
    scene: &HostScene,
    material: &HostMaterial,
) -> Result<Vec<BlockRef>> {
    if session.ctx.bs_version >= SHADER_BS_VERSION {
        let mut properties = vec![export_shader_property(session, scene, material)?];
        if material.use_alpha_blend {
            properties.push(export_alpha_property(session)?);
        }
        return Ok(properties);
    }

    let mut properties = vec![export_material_property(session, material)?];
    if let Some(texturing) = texture::export_texturing(session, scene, material)? {
        properties.push(texturing);
    }
    if material.use_alpha_blend {
        properties.push(export_alpha_property(session)?);
    }
    Ok(properties)
}

/// Hangs a material property on `shape`: the shape's own shader and alpha
/// links on shader-era targets, its property list before that.
pub fn attach(session: &mut ExportSession, shape: BlockRef, property: BlockRef) -> Result<()> {
    if session.ctx.bs_version >= SHADER_BS_VERSION {
        session.registry.set_geometry_property(shape, property)
    } else {
        session.registry.add_property(shape, property)
    }
}

/// Name written for `material`. Bethesda targets keep the engine's special
/// names (`skin.001` is `skin`); generated names are dropped.
pub fn material_name(material: &HostMaterial, game: Game) -> String {
    let name = material
        .longname
        .as_deref()
        .filter(|n| !n.is_empty())
        .unwrap_or(&material.name);
    if game.is_bethesda() {
        let stem = name.split_once('.').map_or(name, |(stem, _)| stem);
        if let Some(special) = SPECIAL_NAMES
            .iter()
            .find(|special| special.eq_ignore_ascii_case(stem))
        {
            return special.to_string();
        }
    }
    let lower = name.to_ascii_lowercase();
    if lower.starts_with("noname") || lower.starts_with("material") {
        return String::new();
    }
    name.to_string()
}

fn scaled(color: [f32; 3], factor: f32) -> Color3 {
    Color3(color.map(|c| c * factor))
}

fn export_material_property(
    session: &mut ExportSession,
    material: &HostMaterial,
) -> Result<BlockRef> {
    let game = session.game();
    let mut block = session.instantiate(BlockKind::NiMaterialProperty)?;
    if let BlockData::MaterialProperty(property) = &mut block.data {
        property.name = material_name(material, game);
        property.flags = material.flags;
        property.ambient_color = scaled(material.ambient_color, material.ambient_intensity);
        property.diffuse_color = scaled(material.diffuse_color, material.diffuse_intensity);
        property.specular_color = scaled(material.specular_color, material.specular_intensity);
        property.emissive_color = scaled(material.emission_color, material.emission_strength);
        property.glossiness = material.glossiness.clamp(0.0, MAX_GLOSSINESS);
        property.alpha = material.alpha;
        property.emissive_mult = if game.is_fallout3() {
            material.emissive_mult
        } else {
            1.0
        };
    }

    let key = SourceKey::material(&material.name);
    // Controllers attach to the block itself, so an animated material gets
    // one block of its own that every shape using it shares.
    if material.animation.is_some() {
        if let Some(existing) = session.registry.try_lookup_block_for(&key) {
            return Ok(existing);
        }
        return Ok(session.registry.insert(block, Some(key)));
    }
    let key = Some(key);
    let policy = if session.config.optimize_materials {
        DedupPolicy::ignoring_names()
    } else {
        DedupPolicy::default()
    };
    Ok(session.intern(block, key, &policy))
}

fn export_shader_property(
    session: &mut ExportSession,
    scene: &HostScene,
    material: &HostMaterial,
) -> Result<BlockRef> {
    let texture_set = texture::export_texture_set(session, scene, material)?;
    let name = material_name(material, session.game());
    let shader = &material.shader;
    debug!("{}: {:?} lighting shader", material.name, shader.shader_type);

    let mut block = session.instantiate(BlockKind::BSLightingShaderProperty)?;
    if let BlockData::ShaderProperty(property) = &mut block.data {
        property.name = name;
        property.shader_type = shader.shader_type;
        property.shader_flags_1 = ShaderFlags1::from_bits_retain(shader.flags_1);
        property.shader_flags_2 = ShaderFlags2::from_bits_retain(shader.flags_2);
        property.uv_offset = Vector2(shader.uv_offset);
        property.uv_scale = Vector2(shader.uv_scale);
        property.texture_set = Some(texture_set);
        property.emissive_color = Color3(material.emission_color);
        property.emissive_multiple = material.emission_strength;
        property.alpha = material.alpha;
        property.glossiness = material.glossiness.clamp(0.0, MAX_SHADER_GLOSSINESS);
        property.specular_color = Color3(material.specular_color);
        property.specular_strength = material.specular_intensity;
        property.lighting_effect_1 = shader.lighting_effect_1;
        property.lighting_effect_2 = shader.lighting_effect_2;
        property.environment_map_scale = shader.environment_map_scale;
        property.tint_color = Color3(shader.tint_color);
    }

    let policy = if session.config.optimize_materials {
        DedupPolicy::ignoring_names()
    } else {
        DedupPolicy::default()
    };
    Ok(session.intern(block, Some(SourceKey::material(&material.name)), &policy))
}

fn export_alpha_property(session: &mut ExportSession) -> Result<BlockRef> {
    let block = session.instantiate(BlockKind::NiAlphaProperty)?;
    Ok(session.intern(block, None, &DedupPolicy::default()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nif::config::ExportConfig;
    use crate::nif::host::{HostImage, HostTextureRole, HostTextureSlot};

    fn red(name: &str) -> HostMaterial {
        HostMaterial {
            name: name.into(),
            diffuse_color: [1.0, 0.0, 0.0],
            diffuse_intensity: 0.5,
            glossiness: 400.0,
            ..Default::default()
        }
    }

    #[test]
    fn names_follow_the_game() {
        assert_eq!(material_name(&red("skin.001"), Game::Oblivion), "skin");
        assert_eq!(material_name(&red("skin.001"), Game::Morrowind), "skin.001");
        assert_eq!(material_name(&red("Skin.001"), Game::Oblivion), "skin");
        assert_eq!(material_name(&red("ENVMAP2"), Game::Fallout3), "EnvMap2");
        assert_eq!(material_name(&red("Material.003"), Game::Oblivion), "");
        assert_eq!(material_name(&red("NoName"), Game::Morrowind), "");
        assert_eq!(material_name(&red("Rock"), Game::Oblivion), "Rock");
    }

    #[test]
    fn colors_scale_by_intensity_and_glossiness_clamps() {
        let mut session = ExportSession::for_game(Game::Oblivion);
        let props = export_material(&mut session, &HostScene::default(), &red("Rock")).unwrap();
        assert_eq!(props.len(), 1);
        let BlockData::MaterialProperty(property) = &session.registry[props[0]].data else {
            panic!("not a material");
        };
        assert_eq!(property.diffuse_color, Color3([0.5, 0.0, 0.0]));
        assert_eq!(property.glossiness, 128.0);
        assert_eq!(property.emissive_mult, 1.0);
    }

    #[test]
    fn identical_materials_share_one_block() {
        let mut session = ExportSession::for_game(Game::Oblivion);
        let scene = HostScene::default();
        let a = export_material(&mut session, &scene, &red("Rock")).unwrap();
        let b = export_material(&mut session, &scene, &red("Stone")).unwrap();
        assert_eq!(a, b);
        assert_eq!(session.registry.len(), 1);
        // Both source materials resolve to the shared block.
        assert_eq!(
            session.registry.try_lookup_block_for(&SourceKey::material("Stone")),
            Some(a[0])
        );
    }

    #[test]
    fn names_matter_without_optimization() {
        let config = ExportConfig {
            optimize_materials: false,
            ..ExportConfig::for_game(Game::Oblivion)
        };
        let mut session = ExportSession::new(config).unwrap();
        let scene = HostScene::default();
        let a = export_material(&mut session, &scene, &red("Rock")).unwrap();
        let b = export_material(&mut session, &scene, &red("Stone")).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn alpha_blend_adds_a_shared_alpha_property() {
        let mut session = ExportSession::for_game(Game::Oblivion);
        let scene = HostScene::default();
        let mut glass = red("Glass");
        glass.use_alpha_blend = true;
        let a = export_material(&mut session, &scene, &glass).unwrap();
        glass.diffuse_color = [0.0, 1.0, 0.0];
        let b = export_material(&mut session, &scene, &glass).unwrap();
        assert_eq!(a.len(), 2);
        assert_eq!(session.registry[a[1]].kind, BlockKind::NiAlphaProperty);
        assert_ne!(a[0], b[0]);
        assert_eq!(a[1], b[1]);
    }

    #[test]
    fn animated_materials_keep_one_block_for_every_user() {
        let mut session = ExportSession::for_game(Game::Oblivion);
        let scene = HostScene::default();
        let mut glow = red("Glow");
        glow.animation = Some("Pulse".into());
        let a = export_material(&mut session, &scene, &glow).unwrap();
        let b = export_material(&mut session, &scene, &glow).unwrap();
        assert_eq!(a, b);
        assert_eq!(session.registry.len(), 1);
    }

    #[test]
    fn shader_era_targets_get_a_lighting_shader() {
        let mut session = ExportSession::for_game(Game::Skyrim);
        let scene = HostScene {
            images: vec![HostImage {
                name: "rock.png".into(),
                path: "data/textures/rock.png".into(),
                ..Default::default()
            }],
            ..Default::default()
        };
        let mut rock = red("Rock");
        rock.specular_intensity = 0.25;
        rock.textures = vec![
            HostTextureSlot {
                role: HostTextureRole::Base,
                image: "rock.png".into(),
                uv_set: 0,
            },
            HostTextureSlot {
                role: HostTextureRole::Detail,
                image: "rock.png".into(),
                uv_set: 0,
            },
        ];

        let props = export_material(&mut session, &scene, &rock).unwrap();
        assert_eq!(props.len(), 1);
        let BlockData::ShaderProperty(shader) = &session.registry[props[0]].data else {
            panic!("not a lighting shader");
        };
        assert_eq!(shader.name, "Rock");
        assert_eq!(shader.glossiness, 400.0);
        assert_eq!(shader.specular_strength, 0.25);
        assert_eq!(shader.shader_flags_1, ShaderFlags1::default());

        let set = shader.texture_set.unwrap();
        let BlockData::ShaderTextureSet(set) = &session.registry[set].data else {
            panic!("not a texture set");
        };
        assert_eq!(set.textures.len(), 9);
        assert_eq!(set.textures[0], "textures\\rock.png");
        // Detail maps have no slot in the set.
        assert!(set.textures[1..].iter().all(String::is_empty));
        assert!(session.registry.iter_kind(BlockKind::NiMaterialProperty).next().is_none());
    }

    #[test]
    fn shader_era_alpha_blend_keeps_the_alpha_property() {
        let mut session = ExportSession::for_game(Game::SkyrimSe);
        let mut glass = red("Glass");
        glass.use_alpha_blend = true;
        let props = export_material(&mut session, &HostScene::default(), &glass).unwrap();
        let kinds: Vec<_> = props.iter().map(|p| session.registry[*p].kind).collect();
        assert_eq!(
            kinds,
            [BlockKind::BSLightingShaderProperty, BlockKind::NiAlphaProperty]
        );
    }
}
