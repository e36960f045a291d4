//! Structural comparison of shareable blocks (materials, textures, alpha).

use super::types::{
    AlphaFormat, ApplyMode, Block, BlockData, BlockKind, BlockRef, ClampMode, Color3, FilterMode,
    LightingShaderType, MipMapFormat, PixelLayout, TexDesc, Vector2,
};

/// Material names the engine special-cases. They are never merged under
/// another name.
pub const SPECIAL_NAMES: [&str; 7] = [
    "EnvMap2",
    "EnvMap",
    "skin",
    "Hair",
    "dynalpha",
    "HideSecret",
    "Lava",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DedupPolicy {
    /// Compare content only, ignoring block names.
    pub ignore_names: bool,
    /// Names that keep their block even when everything else matches.
    pub preserved_names: Vec<String>,
}

impl Default for DedupPolicy {
    fn default() -> Self {
        DedupPolicy {
            ignore_names: false,
            preserved_names: SPECIAL_NAMES.iter().map(|n| n.to_string()).collect(),
        }
    }
}

impl DedupPolicy {
    pub fn ignoring_names() -> Self {
        DedupPolicy {
            ignore_names: true,
            ..Default::default()
        }
    }

    fn ignores_name_of(&self, a: &str, b: &str) -> bool {
        self.ignore_names && !self.is_preserved(a) && !self.is_preserved(b)
    }

    fn is_preserved(&self, name: &str) -> bool {
        self.preserved_names.iter().any(|n| n == name)
    }
}

/// Float compared by bit pattern, `-0.0` folded into `0.0`.
fn bits(value: f32) -> u32 {
    if value == 0.0 { 0 } else { value.to_bits() }
}

fn color_bits(color: Color3) -> [u32; 3] {
    color.0.map(bits)
}

fn uv_bits(uv: Vector2) -> [u32; 2] {
    uv.0.map(bits)
}

type DescKey = (Option<BlockRef>, ClampMode, FilterMode, u32, bool);

fn desc_key(desc: Option<TexDesc>) -> Option<DescKey> {
    desc.map(|d| {
        (
            d.source,
            d.clamp_mode,
            d.filter_mode,
            d.uv_set,
            d.transform.is_some(),
        )
    })
}

/// Normalized record of the fields that decide whether two blocks are the same.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DedupKey {
    Material {
        name: Option<String>,
        flags: u16,
        colors: [[u32; 3]; 4],
        glossiness: u32,
        alpha: u32,
        emissive_mult: u32,
    },
    Alpha {
        name: Option<String>,
        flags: u16,
        threshold: u8,
    },
    SourceTexture {
        name: Option<String>,
        use_external: bool,
        file_name: String,
        pixel_layout: PixelLayout,
        use_mipmaps: MipMapFormat,
        alpha_format: AlphaFormat,
        is_static: bool,
        direct_render: bool,
    },
    Texturing {
        name: Option<String>,
        flags: u16,
        apply_mode: ApplyMode,
        texture_count: u32,
        slots: [Option<DescKey>; 7],
        bump: Option<[u32; 6]>,
    },
    Shader {
        name: Option<String>,
        shader_type: LightingShaderType,
        flags: [u32; 2],
        uv: [[u32; 2]; 2],
        texture_set: Option<BlockRef>,
        colors: [[u32; 3]; 3],
        scalars: [u32; 8],
        clamp_mode: u32,
    },
    TextureSet {
        textures: Vec<String>,
    },
}

impl DedupKey {
    /// `None` for block kinds whose identity matters more than their content.
    pub fn of(block: &Block, ignore_name: bool) -> Option<DedupKey> {
        let name = (!ignore_name).then(|| block.name().to_string());
        let key = match &block.data {
            BlockData::MaterialProperty(m) => DedupKey::Material {
                name,
                flags: m.flags,
                colors: [
                    color_bits(m.ambient_color),
                    color_bits(m.diffuse_color),
                    color_bits(m.specular_color),
                    color_bits(m.emissive_color),
                ],
                glossiness: bits(m.glossiness),
                alpha: bits(m.alpha),
                emissive_mult: bits(m.emissive_mult),
            },
            BlockData::AlphaProperty(a) => DedupKey::Alpha {
                name,
                flags: a.flags,
                threshold: a.threshold,
            },
            BlockData::SourceTexture(t) => DedupKey::SourceTexture {
                name,
                use_external: t.use_external,
                file_name: t.file_name.clone(),
                pixel_layout: t.pixel_layout,
                use_mipmaps: t.use_mipmaps,
                alpha_format: t.alpha_format,
                is_static: t.is_static,
                direct_render: t.direct_render,
            },
            BlockData::TexturingProperty(t) => DedupKey::Texturing {
                name,
                flags: t.flags,
                apply_mode: t.apply_mode,
                texture_count: t.texture_count,
                slots: [
                    desc_key(t.base_texture),
                    desc_key(t.dark_texture),
                    desc_key(t.detail_texture),
                    desc_key(t.gloss_texture),
                    desc_key(t.glow_texture),
                    desc_key(t.bump_map_texture.map(|b| b.desc)),
                    desc_key(t.normal_texture),
                ],
                bump: t.bump_map_texture.map(|b| {
                    [
                        bits(b.luma_scale),
                        bits(b.luma_offset),
                        bits(b.matrix[0]),
                        bits(b.matrix[1]),
                        bits(b.matrix[2]),
                        bits(b.matrix[3]),
                    ]
                }),
            },
            BlockData::ShaderProperty(p) => DedupKey::Shader {
                name,
                shader_type: p.shader_type,
                flags: [p.shader_flags_1.bits(), p.shader_flags_2.bits()],
                uv: [uv_bits(p.uv_offset), uv_bits(p.uv_scale)],
                texture_set: p.texture_set,
                colors: [
                    color_bits(p.emissive_color),
                    color_bits(p.specular_color),
                    color_bits(p.tint_color),
                ],
                scalars: [
                    bits(p.emissive_multiple),
                    bits(p.alpha),
                    bits(p.refraction_strength),
                    bits(p.glossiness),
                    bits(p.specular_strength),
                    bits(p.lighting_effect_1),
                    bits(p.lighting_effect_2),
                    bits(p.environment_map_scale),
                ],
                clamp_mode: p.texture_clamp_mode,
            },
            BlockData::ShaderTextureSet(t) => DedupKey::TextureSet {
                textures: t.textures.clone(),
            },
            _ => return None,
        };
        // Animated or annotated blocks are owned by one object.
        if let Some(net) = block.net() {
            if net.controller.is_some() || net.extra_data.iter().next().is_some() {
                return None;
            }
        }
        Some(key)
    }
}

pub fn is_mergeable(kind: BlockKind) -> bool {
    matches!(
        kind,
        BlockKind::NiMaterialProperty
            | BlockKind::NiAlphaProperty
            | BlockKind::NiSourceTexture
            | BlockKind::NiTexturingProperty
            | BlockKind::BSLightingShaderProperty
            | BlockKind::BSShaderTextureSet
    )
}

/// First block in `pool` (creation order) with the same kind and content
/// as `candidate`.
pub fn find_duplicate<'a>(
    candidate: &Block,
    pool: impl IntoIterator<Item = (BlockRef, &'a Block)>,
    policy: &DedupPolicy,
) -> Option<BlockRef> {
    if !is_mergeable(candidate.kind) {
        return None;
    }
    pool.into_iter()
        .filter(|(_, existing)| existing.kind == candidate.kind)
        .find(|(_, existing)| {
            let ignore = policy.ignores_name_of(candidate.name(), existing.name());
            match (DedupKey::of(candidate, ignore), DedupKey::of(existing, ignore)) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            }
        })
        .map(|(block_ref, _)| block_ref)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nif::version::V20_0_0_5;
    use slotmap::DenseSlotMap;

    fn material(name: &str, diffuse: [f32; 3]) -> Block {
        let mut block = Block::new(BlockKind::NiMaterialProperty, V20_0_0_5);
        if let BlockData::MaterialProperty(m) = &mut block.data {
            m.name = name.to_string();
            m.diffuse_color = Color3(diffuse);
        }
        block
    }

    fn pool_of(blocks: Vec<Block>) -> (DenseSlotMap<BlockRef, Block>, Vec<BlockRef>) {
        let mut arena = DenseSlotMap::with_key();
        let order = blocks.into_iter().map(|b| arena.insert(b)).collect();
        (arena, order)
    }

    #[test]
    fn identical_content_with_different_names_merges_when_names_are_ignored() {
        let (arena, order) = pool_of(vec![material("Stone", [0.5, 0.5, 0.5])]);
        let candidate = material("Stone.001", [0.5, 0.5, 0.5]);

        let pool = order.iter().map(|r| (*r, &arena[*r]));
        assert_eq!(
            find_duplicate(&candidate, pool, &DedupPolicy::ignoring_names()),
            Some(order[0])
        );
        let pool = order.iter().map(|r| (*r, &arena[*r]));
        assert_eq!(find_duplicate(&candidate, pool, &DedupPolicy::default()), None);
    }

    #[test]
    fn one_component_difference_prevents_a_match() {
        let (arena, order) = pool_of(vec![material("Stone", [0.5, 0.5, 0.5])]);
        let pool = order.iter().map(|r| (*r, &arena[*r]));
        let candidate = material("Stone", [0.5, 0.5, 0.51]);
        assert_eq!(
            find_duplicate(&candidate, pool, &DedupPolicy::ignoring_names()),
            None
        );
    }

    #[test]
    fn special_names_are_never_merged_away() {
        let (arena, order) = pool_of(vec![material("Plain", [1.0; 3])]);
        let pool = order.iter().map(|r| (*r, &arena[*r]));
        let candidate = material("EnvMap2", [1.0; 3]);
        assert_eq!(
            find_duplicate(&candidate, pool, &DedupPolicy::ignoring_names()),
            None
        );
    }

    #[test]
    fn first_created_wins() {
        let (arena, order) = pool_of(vec![
            material("A", [0.2; 3]),
            material("B", [0.2; 3]),
        ]);
        let pool = order.iter().map(|r| (*r, &arena[*r]));
        let candidate = material("C", [0.2; 3]);
        assert_eq!(
            find_duplicate(&candidate, pool, &DedupPolicy::ignoring_names()),
            Some(order[0])
        );
    }

    #[test]
    fn negative_zero_equals_zero() {
        let (arena, order) = pool_of(vec![material("M", [0.0, 0.0, 0.0])]);
        let pool = order.iter().map(|r| (*r, &arena[*r]));
        let candidate = material("M", [-0.0, 0.0, 0.0]);
        assert_eq!(
            find_duplicate(&candidate, pool, &DedupPolicy::default()),
            Some(order[0])
        );
    }

    #[test]
    fn nodes_are_never_merged() {
        let (arena, order) = pool_of(vec![Block::new(BlockKind::NiNode, V20_0_0_5)]);
        let pool = order.iter().map(|r| (*r, &arena[*r]));
        let candidate = Block::new(BlockKind::NiNode, V20_0_0_5);
        assert_eq!(find_duplicate(&candidate, pool, &DedupPolicy::default()), None);
    }
}
