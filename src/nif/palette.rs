//! String palettes and the version-dependent naming of controlled blocks.

use encoding_rs::WINDOWS_1252;
use tracing::warn;

use super::error::{ExportError, Result};
use super::session::ExportSession;
use super::types::{BlockData, BlockKind, BlockRef, ControlledBlockNames, NiStringPalette};
use super::version::V10_2_0_0;

/// Offset stored for strings a controlled block does not use.
pub const NO_OFFSET: u32 = u32::MAX;

impl NiStringPalette {
    /// Byte offset of `text`, appending it when the palette does not hold it yet.
    pub fn add_string(&mut self, text: &str) -> u32 {
        if text.is_empty() {
            return NO_OFFSET;
        }
        let (encoded, _, unmappable) = WINDOWS_1252.encode(text);
        if unmappable {
            warn!("'{}' has characters Windows-1252 cannot hold", text);
        }
        if let Some(offset) = self.offset_of(&encoded) {
            return offset;
        }
        let offset = self.palette.len() as u32;
        self.palette.extend_from_slice(&encoded);
        self.palette.push(0);
        offset
    }

    fn offset_of(&self, encoded: &[u8]) -> Option<u32> {
        let mut start = 0;
        for entry in self.palette.split(|b| *b == 0) {
            if entry == encoded && start < self.palette.len() {
                return Some(start as u32);
            }
            start += entry.len() + 1;
        }
        None
    }

    /// String starting at `offset`, up to the next null.
    pub fn get_string(&self, offset: u32) -> Option<String> {
        let tail = self.palette.get(offset as usize..)?;
        let end = tail.iter().position(|b| *b == 0)?;
        let (text, _) = WINDOWS_1252.decode_without_bom_handling(&tail[..end]);
        Some(text.into_owned())
    }
}

/// Names a controlled block of `sequence` for the session's version. On
/// palette-era files the strings land in the sequence's palette, created
/// on first use.
pub fn controlled_block_names(
    session: &mut ExportSession,
    sequence: BlockRef,
    node_name: &str,
    controller_type: &str,
) -> Result<ControlledBlockNames> {
    let version = session.version();
    if version < V10_2_0_0 {
        return Ok(ControlledBlockNames::Legacy {
            target_name: node_name.to_string(),
        });
    }
    if !ControlledBlockNames::uses_palette(version) {
        return Ok(ControlledBlockNames::Direct {
            node_name: node_name.to_string(),
            property_type: String::new(),
            controller_type: controller_type.to_string(),
            controller_id: String::new(),
            interpolator_id: String::new(),
        });
    }

    let palette = sequence_palette(session, sequence)?;
    let BlockData::StringPalette(strings) = &mut session.registry[palette].data else {
        return Err(not_a_sequence(session, palette));
    };
    Ok(ControlledBlockNames::Palette {
        palette,
        node_name_offset: strings.add_string(node_name),
        property_type_offset: NO_OFFSET,
        controller_type_offset: strings.add_string(controller_type),
        controller_id_offset: NO_OFFSET,
        interpolator_id_offset: NO_OFFSET,
    })
}

/// The single palette shared by every controlled block of `sequence`.
fn sequence_palette(session: &mut ExportSession, sequence: BlockRef) -> Result<BlockRef> {
    let existing = match &session.registry[sequence].data {
        BlockData::ControllerSequence(seq) => seq.string_palette,
        _ => return Err(not_a_sequence(session, sequence)),
    };
    if let Some(palette) = existing {
        return Ok(palette);
    }
    let palette = session.create(BlockKind::NiStringPalette, None)?;
    if let BlockData::ControllerSequence(seq) = &mut session.registry[sequence].data {
        seq.string_palette = Some(palette);
    }
    Ok(palette)
}

fn not_a_sequence(session: &ExportSession, block: BlockRef) -> ExportError {
    let block = &session.registry[block];
    ExportError::UnwiredLink {
        block: block.name().to_string(),
        kind: block.kind.name(),
        field: "string_palette",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nif::version::Game;

    #[test]
    fn repeated_strings_share_an_offset() {
        let mut palette = NiStringPalette::default();
        let bip = palette.add_string("Bip01");
        let ctrl = palette.add_string("NiTransformController");
        assert_eq!(bip, 0);
        assert_eq!(ctrl, 6);
        assert_eq!(palette.add_string("Bip01"), bip);
        assert_eq!(palette.add_string("NiTransformController"), ctrl);
        assert_eq!(palette.get_string(ctrl).as_deref(), Some("NiTransformController"));
    }

    #[test]
    fn suffixes_of_entries_are_separate_strings() {
        let mut palette = NiStringPalette::default();
        palette.add_string("Bip01 Head");
        let head = palette.add_string("Head");
        assert_eq!(head, 11);
    }

    #[test]
    fn empty_strings_get_no_offset() {
        let mut palette = NiStringPalette::default();
        assert_eq!(palette.add_string(""), NO_OFFSET);
        assert!(palette.palette.is_empty());
    }

    #[test]
    fn one_palette_per_sequence() {
        // Oblivion files are 20.0.0.5, inside the palette range.
        let mut session = ExportSession::for_game(Game::Oblivion);
        let seq = session.create(BlockKind::NiControllerSequence, None).unwrap();
        let a = controlled_block_names(&mut session, seq, "Bip01", "NiTransformController").unwrap();
        let b = controlled_block_names(&mut session, seq, "Bip01 Head", "NiTransformController")
            .unwrap();
        let (
            ControlledBlockNames::Palette { palette: pa, controller_type_offset: ca, .. },
            ControlledBlockNames::Palette { palette: pb, controller_type_offset: cb, .. },
        ) = (a, b)
        else {
            panic!("expected palette names");
        };
        assert_eq!(pa, pb);
        assert_eq!(ca, cb);
        assert_eq!(session.registry.iter_kind(BlockKind::NiStringPalette).count(), 1);
    }

    #[test]
    fn newer_files_store_names_inline() {
        let mut session = ExportSession::for_game(Game::Skyrim);
        let seq = session.create(BlockKind::NiControllerSequence, None).unwrap();
        let names = controlled_block_names(&mut session, seq, "Bip01", "NiTransformController")
            .unwrap();
        assert!(matches!(names, ControlledBlockNames::Direct { ref node_name, .. } if node_name == "Bip01"));
    }
}
