//! Serializes the block graph of a session into a NIF stream.
//!
//! Blocks are linearized depth-first from the roots, each one is encoded
//! into its own buffer, then the header (with block sizes and the string
//! table when the version has them), the blocks and the footer are written.

pub mod block_writers;
pub mod helpers;

use std::collections::{HashMap, HashSet};
use std::io::{Cursor, Write};
use std::path::Path;

use binrw::BinWrite;
use byteorder::{LittleEndian, WriteBytesExt};
use slotmap::SecondaryMap;
use tracing::{debug, info, warn};

use self::helpers::{encode_text, write_sized_string};
use super::error::{ExportError, Result};
use super::session::ExportSession;
use super::types::{Block, BlockLink, BlockRef};
use super::version::*;

/// Encodes one block's fields. The header and link indices are handled
/// by the caller.
pub trait Save {
    fn save(&self, w: &mut BlockWriter<'_>) -> Result<()>;
}

/// Header string table (20.1.0.3+). Strings are stored once and blocks
/// refer to them by index.
#[derive(Debug, Default)]
pub struct StringTable {
    strings: Vec<String>,
    index: HashMap<String, u32>,
}

impl StringTable {
    /// Index of `text`, or -1 for the empty string.
    pub fn add(&mut self, text: &str) -> i32 {
        if text.is_empty() {
            return -1;
        }
        if let Some(idx) = self.index.get(text) {
            return *idx as i32;
        }
        let idx = self.strings.len() as u32;
        self.strings.push(text.to_string());
        self.index.insert(text.to_string(), idx);
        idx as i32
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }
}

/// Per-block output buffer with everything field encoding depends on.
pub struct BlockWriter<'a> {
    buf: Vec<u8>,
    pub version: u32,
    pub user_version: u32,
    pub bs_version: u32,
    indices: &'a SecondaryMap<BlockRef, i32>,
    strings: &'a mut StringTable,
}

impl<'a> BlockWriter<'a> {
    pub fn new(
        version: u32,
        user_version: u32,
        bs_version: u32,
        indices: &'a SecondaryMap<BlockRef, i32>,
        strings: &'a mut StringTable,
    ) -> Self {
        BlockWriter {
            buf: Vec::new(),
            version,
            user_version,
            bs_version,
            indices,
            strings,
        }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    /// Block index of the target, -1 when unset.
    pub fn link(&mut self, link: BlockLink) -> Result<()> {
        let index = match link {
            Some(block) => match self.indices.get(block) {
                Some(index) => *index,
                None => {
                    warn!("Link to a block that is not written, storing -1");
                    -1
                }
            },
            None => -1,
        };
        self.buf.write_i32::<LittleEndian>(index)?;
        Ok(())
    }

    /// Count followed by the links.
    pub fn links(&mut self, links: &[BlockRef]) -> Result<()> {
        self.u32(links.len() as u32)?;
        for link in links {
            self.link(Some(*link))?;
        }
        Ok(())
    }

    /// A string field: an index into the header table from 20.1.0.3,
    /// inline before that.
    pub fn string(&mut self, text: &str) -> Result<()> {
        if self.version >= V20_1_0_3 {
            let idx = self.strings.add(text);
            self.buf.write_i32::<LittleEndian>(idx)?;
            Ok(())
        } else {
            write_sized_string(&mut self.buf, text)
        }
    }

    /// 32-bit before 4.1.0.1, a single byte from then on.
    pub fn bool(&mut self, value: bool) -> Result<()> {
        if self.version < V4_1_0_1 {
            self.buf.write_u32::<LittleEndian>(u32::from(value))?;
        } else {
            self.buf.write_u8(u8::from(value))?;
        }
        Ok(())
    }

    pub fn u8(&mut self, value: u8) -> Result<()> {
        self.buf.write_u8(value)?;
        Ok(())
    }

    pub fn u16(&mut self, value: u16) -> Result<()> {
        self.buf.write_u16::<LittleEndian>(value)?;
        Ok(())
    }

    pub fn u32(&mut self, value: u32) -> Result<()> {
        self.buf.write_u32::<LittleEndian>(value)?;
        Ok(())
    }

    pub fn i32(&mut self, value: i32) -> Result<()> {
        self.buf.write_i32::<LittleEndian>(value)?;
        Ok(())
    }

    pub fn f32(&mut self, value: f32) -> Result<()> {
        self.buf.write_f32::<LittleEndian>(value)?;
        Ok(())
    }

    pub fn zeros(&mut self, count: usize) -> Result<()> {
        self.buf.write_all(&vec![0u8; count])?;
        Ok(())
    }
}

impl Write for BlockWriter<'_> {
    fn write(&mut self, data: &[u8]) -> std::io::Result<usize> {
        Write::write(&mut self.buf, data)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

// --- Header and footer ---

/// `u32` length plus bytes.
#[derive(BinWrite, Debug)]
#[bw(little)]
struct SizedString {
    len: u32,
    bytes: Vec<u8>,
}

impl SizedString {
    fn new(text: &str) -> Self {
        let bytes = encode_text(text);
        SizedString {
            len: bytes.len() as u32,
            bytes,
        }
    }
}

/// `u8` length plus null-terminated bytes, used by the export info.
#[derive(BinWrite, Debug)]
#[bw(little)]
struct ShortString {
    len: u8,
    bytes: Vec<u8>,
}

impl ShortString {
    fn new(text: &str) -> Self {
        let mut bytes = encode_text(text);
        bytes.truncate(254);
        bytes.push(0);
        ShortString {
            len: bytes.len() as u8,
            bytes,
        }
    }
}

#[derive(BinWrite, Debug)]
#[bw(little)]
struct BsHeader {
    bs_version: u32,
    author: ShortString,
    process_script: ShortString,
    export_script: ShortString,
}

#[derive(BinWrite, Debug)]
#[bw(little)]
struct BlockTypeTable {
    num_block_types: u16,
    block_types: Vec<SizedString>,
    block_type_index: Vec<u16>,
}

#[derive(BinWrite, Debug)]
#[bw(little)]
struct HeaderStrings {
    num_strings: u32,
    max_string_length: u32,
    strings: Vec<SizedString>,
}

/// Optional members are present only for the versions that have them.
#[derive(BinWrite, Debug)]
#[bw(little)]
struct NifHeader {
    header_line: Vec<u8>,
    version: u32,
    endian_type: Option<u8>,
    user_version: Option<u32>,
    num_blocks: u32,
    bs_header: Option<BsHeader>,
    block_types: Option<BlockTypeTable>,
    block_sizes: Option<Vec<u32>>,
    strings: Option<HeaderStrings>,
    num_groups: Option<u32>,
}

#[derive(BinWrite, Debug)]
#[bw(little)]
struct NifFooter {
    num_roots: u32,
    roots: Vec<i32>,
}

pub fn header_line(version: u32) -> String {
    let family = if version < V10_0_1_0 {
        "NetImmerse"
    } else {
        "Gamebryo"
    };
    format!("{family} File Format, Version {}\n", version_string(version))
}

// --- Graph checks ---

/// Roots must be set and every reachable block must have its mandatory
/// links wired.
pub fn validate(session: &ExportSession) -> Result<Vec<BlockRef>> {
    if session.ctx.roots().is_none() {
        return Err(ExportError::RootsNotSet);
    }
    let order = linearize(session);
    for block_ref in &order {
        let block = &session.registry[*block_ref];
        if let Some(field) = block.missing_links(session.version()).first() {
            return Err(ExportError::UnwiredLink {
                block: block.name().to_string(),
                kind: block.kind.name(),
                field,
            });
        }
    }
    Ok(order)
}

/// Write order: pre-order depth-first over strong references from the
/// roots, then blocks only reachable through back references.
pub fn linearize(session: &ExportSession) -> Vec<BlockRef> {
    let registry = &session.registry;
    let mut seen = HashSet::new();
    let mut order = Vec::new();

    let mut visit_tree = |start: BlockRef, seen: &mut HashSet<BlockRef>, order: &mut Vec<BlockRef>| {
        let mut stack = vec![start];
        while let Some(block_ref) = stack.pop() {
            let Some(block) = registry.get(block_ref) else {
                continue;
            };
            if !seen.insert(block_ref) {
                continue;
            }
            order.push(block_ref);
            let mut refs = Vec::new();
            block.visit_refs(&mut |r| refs.push(r));
            stack.extend(refs.into_iter().rev());
        }
    };

    for root in session.ctx.roots().unwrap_or_default() {
        visit_tree(*root, &mut seen, &mut order);
    }
    let mut next = 0;
    while next < order.len() {
        let mut ptrs = Vec::new();
        registry[order[next]].visit_ptrs(&mut |r| ptrs.push(r));
        for ptr in ptrs {
            if !seen.contains(&ptr) {
                visit_tree(ptr, &mut seen, &mut order);
            }
        }
        next += 1;
    }

    for (block_ref, block) in registry.iter() {
        if !seen.contains(&block_ref) {
            debug!("Dropping unreachable {} block '{}'", block.kind, block.name());
        }
    }
    order
}

// --- Output ---

/// The complete file as bytes.
pub fn encode(session: &ExportSession) -> Result<Vec<u8>> {
    let order = validate(session)?;
    let ctx = &session.ctx;
    let version = ctx.version;

    let mut indices = SecondaryMap::new();
    for (i, block_ref) in order.iter().enumerate() {
        indices.insert(*block_ref, i as i32);
    }

    let mut strings = StringTable::default();
    let mut bodies = Vec::with_capacity(order.len());
    for block_ref in &order {
        let block: &Block = &session.registry[*block_ref];
        let mut w = BlockWriter::new(
            version,
            ctx.user_version,
            ctx.bs_version,
            &indices,
            &mut strings,
        );
        block.save(&mut w)?;
        bodies.push(w.into_bytes());
    }

    let mut type_names: Vec<&'static str> = Vec::new();
    let mut type_index = Vec::with_capacity(order.len());
    for block_ref in &order {
        let name = session.registry[*block_ref].kind.name();
        let idx = match type_names.iter().position(|n| *n == name) {
            Some(idx) => idx,
            None => {
                type_names.push(name);
                type_names.len() - 1
            }
        };
        type_index.push(idx as u16);
    }

    let header = NifHeader {
        header_line: header_line(version).into_bytes(),
        version,
        endian_type: (version >= V20_0_0_4).then_some(1),
        user_version: (version >= V10_0_1_8).then_some(ctx.user_version),
        num_blocks: order.len() as u32,
        bs_header: (ctx.user_version >= 3 && ctx.bs_version > 0).then(|| BsHeader {
            bs_version: ctx.bs_version,
            author: ShortString::new("nif_export"),
            process_script: ShortString::new(""),
            export_script: ShortString::new(""),
        }),
        block_types: (version >= V5_0_0_1).then(|| BlockTypeTable {
            num_block_types: type_names.len() as u16,
            block_types: type_names.iter().map(|n| SizedString::new(n)).collect(),
            block_type_index: type_index,
        }),
        block_sizes: (version >= V20_2_0_7)
            .then(|| bodies.iter().map(|b| b.len() as u32).collect()),
        strings: (version >= V20_1_0_3).then(|| HeaderStrings {
            num_strings: strings.len() as u32,
            max_string_length: strings
                .strings
                .iter()
                .map(|s| encode_text(s).len() as u32)
                .max()
                .unwrap_or(0),
            strings: strings.strings.iter().map(|s| SizedString::new(s)).collect(),
        }),
        num_groups: (version >= V5_0_0_6).then_some(0),
    };

    let roots = ctx.roots().unwrap_or_default();
    let footer = NifFooter {
        num_roots: roots.len() as u32,
        roots: roots
            .iter()
            .map(|r| indices.get(*r).copied().unwrap_or(-1))
            .collect(),
    };

    let mut out = Cursor::new(Vec::new());
    header.write(&mut out)?;
    for (block_ref, body) in order.iter().zip(&bodies) {
        if version < V5_0_0_1 {
            SizedString::new(session.registry[*block_ref].kind.name()).write(&mut out)?;
        }
        out.write_all(body)?;
    }
    footer.write(&mut out)?;
    Ok(out.into_inner())
}

/// Writes the session's graph to `sink`.
pub fn write_nif(session: &ExportSession, sink: &mut impl Write) -> Result<()> {
    let bytes = encode(session)?;
    sink.write_all(&bytes)?;
    Ok(())
}

/// Encodes the whole file first so a failed export never leaves a
/// truncated file behind.
pub fn save_to_path(session: &ExportSession, path: &Path) -> Result<()> {
    let bytes = encode(session)?;
    std::fs::write(path, &bytes).map_err(|e| ExportError::io(path, e))?;
    info!(
        "Wrote {} ({} bytes, version {})",
        path.display(),
        bytes.len(),
        version_string(session.version())
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nif::types::BlockKind;
    use crate::nif::version::Game;

    #[test]
    fn header_line_names_the_engine_family() {
        assert_eq!(
            header_line(V4_0_0_2),
            "NetImmerse File Format, Version 4.0.0.2\n"
        );
        assert_eq!(
            header_line(V20_0_0_5),
            "Gamebryo File Format, Version 20.0.0.5\n"
        );
    }

    #[test]
    fn string_table_shares_repeated_strings() {
        let mut table = StringTable::default();
        assert_eq!(table.add("Scene Root"), 0);
        assert_eq!(table.add("Cube"), 1);
        assert_eq!(table.add("Scene Root"), 0);
        assert_eq!(table.add(""), -1);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn writing_without_roots_fails() {
        let mut session = ExportSession::for_game(Game::Oblivion);
        session.create(BlockKind::NiNode, None).unwrap();
        assert!(matches!(encode(&session), Err(ExportError::RootsNotSet)));
    }

    #[test]
    fn unwired_links_are_reported() {
        let mut session = ExportSession::for_game(Game::Oblivion);
        let root = session.create(BlockKind::NiNode, None).unwrap();
        let shape = session.create(BlockKind::NiTriShape, None).unwrap();
        session.registry.add_child(root, shape).unwrap();
        session.ctx.set_roots(vec![root]).unwrap();
        assert!(matches!(
            encode(&session),
            Err(ExportError::UnwiredLink { field: "data", .. })
        ));
    }

    #[test]
    fn back_referenced_blocks_follow_the_tree() {
        let mut session = ExportSession::for_game(Game::Oblivion);
        let root = session.create(BlockKind::NiNode, None).unwrap();
        let orphan = session.create(BlockKind::NiNode, None).unwrap();
        let bone = session.create(BlockKind::NiNode, None).unwrap();
        let ctrl = session.create(BlockKind::NiPSysUpdateCtlr, None).unwrap();
        session.registry.add_controller(root, ctrl).unwrap();
        // Only a back reference reaches `bone`.
        if let Some(tc) = session.registry[ctrl].time_controller_mut() {
            tc.target = Some(bone);
        }
        session.ctx.set_roots(vec![root]).unwrap();

        let order = linearize(&session);
        assert_eq!(order, vec![root, ctrl, bone]);
        assert!(!order.contains(&orphan));
    }
}
