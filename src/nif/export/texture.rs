//! Texture slots of a material: `NiSourceTexture` per image and the
//! `NiTexturingProperty` that binds them, or the `BSShaderTextureSet` of a
//! lighting shader.

use tracing::warn;

use crate::nif::dedup::DedupPolicy;
use crate::nif::error::{skip_unsupported, ExportError, Result};
use crate::nif::host::{HostMaterial, HostScene, HostTextureRole, HostTextureSlot};
use crate::nif::registry::SourceKey;
use crate::nif::session::ExportSession;
use crate::nif::types::{
    AlphaFormat, ApplyMode, BlockData, BlockKind, BlockRef, MipMapFormat, PixelLayout, TexDesc,
    TextureSetSlot, TextureSlot,
};
use crate::nif::version::{Game, V10_0_1_0, V20_2_0_5};

const TEXTURES_DIR: &str = "textures\\";

/// The texturing property of `material`, or `None` when it has no texture
/// this target can hold.
pub fn export_texturing(
    session: &mut ExportSession,
    scene: &HostScene,
    material: &HostMaterial,
) -> Result<Option<BlockRef>> {
    if material.textures.is_empty() {
        return Ok(None);
    }

    let mut descs: Vec<(TextureSlot, TexDesc)> = Vec::new();
    for slot in &material.textures {
        let Some(target) = skip_unsupported(texture_slot(session, material, slot.role))? else {
            continue;
        };
        if descs.iter().any(|(used, _)| *used == target) {
            return Err(ExportError::malformed(
                &material.name,
                format!("more than one {:?} texture", target),
            ));
        }
        let source = export_source_texture(session, scene, material, slot)?;
        descs.push((
            target,
            TexDesc {
                source: Some(source),
                uv_set: slot.uv_set,
                ..Default::default()
            },
        ));
    }
    if descs.is_empty() {
        return Ok(None);
    }

    let texture_count = if session.game().is_fallout3() { 9 } else { 7 };
    let mut block = session.instantiate(BlockKind::NiTexturingProperty)?;
    if let BlockData::TexturingProperty(property) = &mut block.data {
        property.apply_mode = ApplyMode::Modulate;
        property.texture_count = texture_count;
        for (target, desc) in descs {
            property.set_slot(target, desc);
        }
    }

    // UV controllers attach to the property, so an animated material keeps
    // its own.
    if material.animation.is_some() {
        let key = SourceKey::texturing(&material.name);
        if let Some(existing) = session.registry.try_lookup_block_for(&key) {
            return Ok(Some(existing));
        }
        return Ok(Some(session.registry.insert(block, Some(key))));
    }
    Ok(Some(session.intern(block, None, &DedupPolicy::default())))
}

/// The texture set of a lighting shader. Every shader carries one, empty
/// slots included.
pub fn export_texture_set(
    session: &mut ExportSession,
    scene: &HostScene,
    material: &HostMaterial,
) -> Result<BlockRef> {
    let mut paths: Vec<(TextureSetSlot, String)> = Vec::new();
    for slot in &material.textures {
        let Some(target) = skip_unsupported(texture_set_slot(material, slot.role))? else {
            continue;
        };
        if paths.iter().any(|(used, _)| *used == target) {
            return Err(ExportError::malformed(
                &material.name,
                format!("more than one {:?} texture", target),
            ));
        }
        paths.push((target, image_path(session, scene, material, slot)?));
    }

    let mut block = session.instantiate(BlockKind::BSShaderTextureSet)?;
    if let BlockData::ShaderTextureSet(set) = &mut block.data {
        for (target, path) in paths {
            set.set(target, path);
        }
    }
    Ok(session.intern(block, None, &DedupPolicy::default()))
}

fn texture_set_slot(material: &HostMaterial, role: HostTextureRole) -> Result<TextureSetSlot> {
    match role {
        HostTextureRole::Base => Ok(TextureSetSlot::Diffuse),
        HostTextureRole::Normal => Ok(TextureSetSlot::Normal),
        HostTextureRole::Glow => Ok(TextureSetSlot::Glow),
        HostTextureRole::Bump => Ok(TextureSetSlot::Height),
        HostTextureRole::Environment => Ok(TextureSetSlot::Environment),
        HostTextureRole::Gloss => Ok(TextureSetSlot::EnvironmentMask),
        HostTextureRole::Dark | HostTextureRole::Detail => Err(ExportError::unsupported(
            &material.name,
            format!("{role:?} texture on a lighting shader"),
        )),
    }
}

fn texture_slot(
    session: &ExportSession,
    material: &HostMaterial,
    role: HostTextureRole,
) -> Result<TextureSlot> {
    match role {
        HostTextureRole::Base => Ok(TextureSlot::Base),
        HostTextureRole::Dark => Ok(TextureSlot::Dark),
        HostTextureRole::Detail => Ok(TextureSlot::Detail),
        HostTextureRole::Gloss => Ok(TextureSlot::Gloss),
        HostTextureRole::Glow => Ok(TextureSlot::Glow),
        HostTextureRole::Bump => Ok(TextureSlot::Bump),
        HostTextureRole::Normal if session.version() >= V20_2_0_5 => Ok(TextureSlot::Normal),
        HostTextureRole::Normal => Err(ExportError::unsupported(
            &material.name,
            "normal map texture slot",
        )),
        HostTextureRole::Environment => Err(ExportError::unsupported(
            &material.name,
            "environment map texture",
        )),
    }
}

/// Stored file name of the image `slot` refers to.
fn image_path(
    session: &ExportSession,
    scene: &HostScene,
    material: &HostMaterial,
    slot: &HostTextureSlot,
) -> Result<String> {
    let image = scene.image(&slot.image).ok_or_else(|| {
        ExportError::missing(&material.name, format!("image '{}' not found", slot.image))
    })?;
    let path = if image.path.is_empty() {
        &image.name
    } else {
        &image.path
    };
    Ok(texture_path(path, session.game(), session.config.force_dds))
}

fn export_source_texture(
    session: &mut ExportSession,
    scene: &HostScene,
    material: &HostMaterial,
    slot: &HostTextureSlot,
) -> Result<BlockRef> {
    let file_name = image_path(session, scene, material, slot)?;
    let pixel_layout = if session.version() >= V10_0_1_0 {
        PixelLayout::Default
    } else {
        PixelLayout::Palettized4
    };

    let mut block = session.instantiate(BlockKind::NiSourceTexture)?;
    if let BlockData::SourceTexture(texture) = &mut block.data {
        texture.use_external = true;
        texture.file_name = file_name;
        texture.pixel_layout = pixel_layout;
        texture.use_mipmaps = MipMapFormat::Yes;
        texture.alpha_format = AlphaFormat::Default;
        texture.is_static = true;
    }
    Ok(session.intern(block, None, &DedupPolicy::default()))
}

/// File name stored for an image path. Morrowind and Bethesda targets keep
/// the part from the `textures` folder on, everything else the base name.
pub fn texture_path(path: &str, game: Game, force_dds: bool) -> String {
    let mut path = path.replace('/', "\\");
    if force_dds {
        let stem_end = match (path.rfind('.'), path.rfind('\\')) {
            (Some(dot), Some(sep)) if dot > sep => dot,
            (Some(dot), None) => dot,
            _ => path.len(),
        };
        path.truncate(stem_end);
        path.push_str(".dds");
    }

    let base = path.rsplit('\\').next().unwrap_or_default().to_string();
    if game != Game::Morrowind && !game.is_bethesda() {
        return base;
    }
    match path.to_ascii_lowercase().find(TEXTURES_DIR) {
        Some(start) => path[start..].to_string(),
        None => {
            warn!("{}: not inside a textures folder, writing the file name only", path);
            base
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nif::host::HostImage;

    fn scene_with(images: &[(&str, &str)]) -> HostScene {
        HostScene {
            images: images
                .iter()
                .map(|(name, path)| HostImage {
                    name: name.to_string(),
                    path: path.to_string(),
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        }
    }

    fn slot(role: HostTextureRole, image: &str) -> HostTextureSlot {
        HostTextureSlot {
            role,
            image: image.into(),
            uv_set: 0,
        }
    }

    #[test]
    fn paths_strip_to_the_textures_folder() {
        assert_eq!(
            texture_path("C:/Games/Data/Textures/rock/Wall.tga", Game::Oblivion, false),
            "Textures\\rock\\Wall.tga"
        );
        assert_eq!(
            texture_path("C:/Games/Data/Textures/rock/Wall.tga", Game::Oblivion, true),
            "Textures\\rock\\Wall.dds"
        );
        assert_eq!(texture_path("/tmp/art/wall.png", Game::Civilization4, false), "wall.png");
        assert_eq!(texture_path("/tmp/art/wall.png", Game::Morrowind, false), "wall.png");
        assert_eq!(texture_path("some.dir/wall", Game::Generic, true), "wall.dds");
    }

    #[test]
    fn slots_share_source_textures() {
        let mut session = ExportSession::for_game(Game::Oblivion);
        let scene = scene_with(&[("wall", "Data/textures/wall.dds")]);
        let material = HostMaterial {
            name: "Wall".into(),
            textures: vec![
                slot(HostTextureRole::Base, "wall"),
                slot(HostTextureRole::Glow, "wall"),
            ],
            ..Default::default()
        };
        let property = export_texturing(&mut session, &scene, &material)
            .unwrap()
            .unwrap();
        let BlockData::TexturingProperty(texturing) = &session.registry[property].data else {
            panic!("not a texturing property");
        };
        let base = texturing.slot(TextureSlot::Base).unwrap().source;
        assert_eq!(base, texturing.slot(TextureSlot::Glow).unwrap().source);
        assert_eq!(session.registry.iter_kind(BlockKind::NiSourceTexture).count(), 1);
        let BlockData::SourceTexture(texture) = &session.registry[base.unwrap()].data else {
            panic!("not a source texture");
        };
        assert_eq!(texture.file_name, "textures\\wall.dds");
        assert_eq!(texture.pixel_layout, PixelLayout::Default);
    }

    #[test]
    fn duplicate_roles_are_malformed() {
        let mut session = ExportSession::for_game(Game::Oblivion);
        let scene = scene_with(&[("a", "a.dds"), ("b", "b.dds")]);
        let material = HostMaterial {
            name: "Twice".into(),
            textures: vec![
                slot(HostTextureRole::Base, "a"),
                slot(HostTextureRole::Base, "b"),
            ],
            ..Default::default()
        };
        let err = export_texturing(&mut session, &scene, &material).unwrap_err();
        assert!(matches!(err, ExportError::MalformedSourceData { .. }));
    }

    #[test]
    fn unsupported_slots_are_skipped() {
        let mut session = ExportSession::for_game(Game::Oblivion);
        let scene = scene_with(&[("n", "textures/n.dds")]);
        let material = HostMaterial {
            name: "Bumpy".into(),
            textures: vec![
                slot(HostTextureRole::Normal, "n"),
                slot(HostTextureRole::Environment, "n"),
            ],
            ..Default::default()
        };
        assert_eq!(export_texturing(&mut session, &scene, &material).unwrap(), None);
        assert!(session.registry.is_empty());
    }

    #[test]
    fn missing_images_are_missing_dependencies() {
        let mut session = ExportSession::for_game(Game::Oblivion);
        let material = HostMaterial {
            name: "Lost".into(),
            textures: vec![slot(HostTextureRole::Base, "nowhere")],
            ..Default::default()
        };
        let err = export_texturing(&mut session, &HostScene::default(), &material).unwrap_err();
        assert!(matches!(err, ExportError::MissingDependency { .. }));
    }
}
