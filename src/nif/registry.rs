//! Block arena plus the source-object correspondence maps.

use std::collections::HashMap;
use std::fmt;
use std::ops::{Index, IndexMut};

use slotmap::{DenseSlotMap, SecondaryMap};
use tracing::debug;

use super::dedup::{find_duplicate, DedupPolicy};
use super::error::{ExportError, Result};
use super::session::DocumentContext;
use super::types::{Block, BlockData, BlockKind, BlockRef, ExtraDataLinks, HasProperties};
use super::version::version_string;

/// Identity of a host scene object. Only ever used as a lookup key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceKey {
    category: &'static str,
    name: String,
}

impl SourceKey {
    pub fn object(name: impl Into<String>) -> Self {
        SourceKey {
            category: "object",
            name: name.into(),
        }
    }

    pub fn bone(armature: &str, bone: &str) -> Self {
        SourceKey {
            category: "bone",
            name: format!("{armature}/{bone}"),
        }
    }

    pub fn material(name: impl Into<String>) -> Self {
        SourceKey {
            category: "material",
            name: name.into(),
        }
    }

    /// The texturing property of an animated material.
    pub fn texturing(material: impl Into<String>) -> Self {
        SourceKey {
            category: "texturing",
            name: material.into(),
        }
    }

    pub fn collision(name: impl Into<String>) -> Self {
        SourceKey {
            category: "collision",
            name: name.into(),
        }
    }

    pub fn constraint(name: impl Into<String>) -> Self {
        SourceKey {
            category: "constraint",
            name: name.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for SourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} '{}'", self.category, self.name)
    }
}

#[derive(Debug, Default)]
pub struct BlockRegistry {
    blocks: DenseSlotMap<BlockRef, Block>,
    order: Vec<BlockRef>,
    key_to_block: HashMap<SourceKey, BlockRef>,
    block_to_key: SecondaryMap<BlockRef, SourceKey>,
}

impl BlockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.blocks.clear();
        self.order.clear();
        self.key_to_block.clear();
        self.block_to_key.clear();
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Builds a default block for the context's version without registering it.
    pub fn instantiate(&self, kind: BlockKind, ctx: &DocumentContext) -> Result<Block> {
        if !kind.is_available(ctx.version) {
            return Err(ExportError::unsupported(
                kind.name(),
                format!("block type for version {}", version_string(ctx.version)),
            ));
        }
        Ok(Block::new(kind, ctx.version))
    }

    pub fn create(
        &mut self,
        kind: BlockKind,
        ctx: &DocumentContext,
        key: Option<SourceKey>,
    ) -> Result<BlockRef> {
        let block = self.instantiate(kind, ctx)?;
        Ok(self.insert(block, key))
    }

    /// Same as [`create`](Self::create) with the class name as the format spells it.
    pub fn create_named(
        &mut self,
        type_tag: &str,
        ctx: &DocumentContext,
        key: Option<SourceKey>,
    ) -> Result<BlockRef> {
        let kind: BlockKind = type_tag.parse()?;
        self.create(kind, ctx, key)
    }

    /// Registers a fully built block.
    pub fn insert(&mut self, block: Block, key: Option<SourceKey>) -> BlockRef {
        match &key {
            Some(key) => debug!("Exporting {} as {} block", key.name(), block.kind),
            None => debug!("Exporting {} block", block.kind),
        }
        let block_ref = self.blocks.insert(block);
        self.order.push(block_ref);
        if let Some(key) = key {
            self.bind_key(key, block_ref);
        }
        block_ref
    }

    /// Returns an existing content-identical block if there is one,
    /// otherwise registers the candidate.
    pub fn intern(
        &mut self,
        candidate: Block,
        key: Option<SourceKey>,
        policy: &DedupPolicy,
    ) -> BlockRef {
        let pool = self.iter_kind(candidate.kind);
        match find_duplicate(&candidate, pool, policy) {
            Some(existing) => {
                debug!(
                    "Reusing {} block '{}'",
                    candidate.kind,
                    self.blocks[existing].name()
                );
                if let Some(key) = key {
                    self.bind_key(key, existing);
                }
                existing
            }
            None => self.insert(candidate, key),
        }
    }

    /// Points `key` at `block`. The block keeps the first key it was given.
    pub fn bind_key(&mut self, key: SourceKey, block: BlockRef) {
        if !self.block_to_key.contains_key(block) {
            self.block_to_key.insert(block, key.clone());
        }
        self.key_to_block.insert(key, block);
    }

    pub fn lookup_block_for(&self, key: &SourceKey) -> Result<BlockRef> {
        self.key_to_block
            .get(key)
            .copied()
            .ok_or_else(|| ExportError::MissingMapping { key: key.clone() })
    }

    pub fn try_lookup_block_for(&self, key: &SourceKey) -> Option<BlockRef> {
        self.key_to_block.get(key).copied()
    }

    pub fn lookup_key_for(&self, block: BlockRef) -> Option<&SourceKey> {
        self.block_to_key.get(block)
    }

    pub fn get(&self, block: BlockRef) -> Option<&Block> {
        self.blocks.get(block)
    }

    pub fn get_mut(&mut self, block: BlockRef) -> Option<&mut Block> {
        self.blocks.get_mut(block)
    }

    pub fn contains(&self, block: BlockRef) -> bool {
        self.blocks.contains_key(block)
    }

    /// All blocks in creation order.
    pub fn iter(&self) -> impl Iterator<Item = (BlockRef, &Block)> + '_ {
        self.order.iter().map(|r| (*r, &self.blocks[*r]))
    }

    pub fn iter_kind(&self, kind: BlockKind) -> impl Iterator<Item = (BlockRef, &Block)> + '_ {
        self.iter().filter(move |(_, block)| block.kind == kind)
    }

    /// First block, in creation order, carrying `name`.
    pub fn find_by_name(&self, name: &str) -> Option<BlockRef> {
        self.iter()
            .find(|(_, block)| block.name() == name)
            .map(|(r, _)| r)
    }

    pub fn set_name(&mut self, block: BlockRef, name: impl Into<String>) {
        let name = name.into();
        let Some(block) = self.blocks.get_mut(block) else {
            return;
        };
        match &mut block.data {
            BlockData::ControllerSequence(seq) => seq.name = name,
            BlockData::Modifier(modifier) => modifier.name = name,
            _ => {
                if let Some(net) = block.net_mut() {
                    net.name = name;
                } else if let Some(extra) = block.extra_fields_mut() {
                    extra.name = name;
                }
            }
        }
    }

    // --- Wiring ---

    /// Appends `ctrl` to the end of the owner's controller chain and
    /// points its target back at the owner.
    pub fn add_controller(&mut self, owner: BlockRef, ctrl: BlockRef) -> Result<()> {
        let head = match self.blocks.get(owner).and_then(Block::net) {
            Some(net) => net.controller,
            None => return Err(self.unwired(owner, "controller")),
        };
        if self.blocks.get(ctrl).and_then(Block::time_controller).is_none() {
            return Err(self.unwired(ctrl, "target"));
        }
        match head {
            None => {
                if let Some(net) = self.blocks.get_mut(owner).and_then(Block::as_controllable_mut) {
                    net.set_controller(Some(ctrl));
                }
            }
            Some(head) => {
                let last = self.last_in_chain(head, |b| {
                    b.time_controller().and_then(|c| c.next_controller)
                });
                match self.blocks.get_mut(last).and_then(Block::time_controller_mut) {
                    Some(last_ctrl) => last_ctrl.next_controller = Some(ctrl),
                    None => return Err(self.unwired(last, "next_controller")),
                }
            }
        }
        if let Some(ctrl) = self.blocks.get_mut(ctrl).and_then(Block::time_controller_mut) {
            ctrl.target = Some(owner);
        }
        Ok(())
    }

    /// Attaches extra data: chained through `next_extra_data` on old
    /// versions, appended to the owner's list on new ones.
    pub fn add_extra_data(&mut self, owner: BlockRef, extra: BlockRef) -> Result<()> {
        let head = match self.blocks.get_mut(owner).and_then(Block::net_mut) {
            Some(net) => match &mut net.extra_data {
                ExtraDataLinks::List(list) => {
                    list.push(extra);
                    return Ok(());
                }
                ExtraDataLinks::Chain(head) => match *head {
                    None => {
                        *head = Some(extra);
                        return Ok(());
                    }
                    Some(first) => first,
                },
            },
            None => return Err(self.unwired(owner, "extra_data")),
        };
        let last = self.last_in_chain(head, |b| b.extra_fields().and_then(|e| e.next_extra_data));
        match self.blocks.get_mut(last).and_then(Block::extra_fields_mut) {
            Some(fields) => {
                fields.next_extra_data = Some(extra);
                Ok(())
            }
            None => Err(self.unwired(last, "next_extra_data")),
        }
    }

    pub fn add_child(&mut self, parent: BlockRef, child: BlockRef) -> Result<()> {
        match self.blocks.get_mut(parent).and_then(Block::as_parent_mut) {
            Some(node) => {
                node.push_child(child);
                Ok(())
            }
            None => Err(self.unwired(parent, "children")),
        }
    }

    pub fn add_effect(&mut self, parent: BlockRef, effect: BlockRef) -> Result<()> {
        match self.blocks.get_mut(parent).and_then(Block::as_parent_mut) {
            Some(node) => {
                node.push_effect(effect);
                Ok(())
            }
            None => Err(self.unwired(parent, "effects")),
        }
    }

    pub fn add_property(&mut self, owner: BlockRef, property: BlockRef) -> Result<()> {
        match self.blocks.get_mut(owner).and_then(Block::av_object_mut) {
            Some(av) => {
                av.push_property(property);
                Ok(())
            }
            None => Err(self.unwired(owner, "properties")),
        }
    }

    /// Shader-era geometry has one slot for its shader and one for its
    /// alpha property instead of a property list.
    pub fn set_geometry_property(&mut self, shape: BlockRef, property: BlockRef) -> Result<()> {
        let is_alpha = self
            .blocks
            .get(property)
            .is_some_and(|block| block.kind == BlockKind::NiAlphaProperty);
        let geometry = match self.blocks.get_mut(shape).map(|block| &mut block.data) {
            Some(BlockData::TriShape(g)) => g,
            Some(BlockData::ParticleSystem(p)) => &mut p.geom_base,
            _ => return Err(self.unwired(shape, "shader_property")),
        };
        if is_alpha {
            geometry.alpha_property = Some(property);
        } else {
            geometry.shader_property = Some(property);
        }
        Ok(())
    }

    /// Follows a singly linked chain to its tail. Stops after visiting every
    /// block once so a malformed cycle cannot spin.
    fn last_in_chain(&self, head: BlockRef, next: impl Fn(&Block) -> Option<BlockRef>) -> BlockRef {
        let mut last = head;
        for _ in 0..self.blocks.len() {
            match self.blocks.get(last).and_then(&next) {
                Some(following) => last = following,
                None => break,
            }
        }
        last
    }

    fn unwired(&self, block: BlockRef, field: &'static str) -> ExportError {
        match self.blocks.get(block) {
            Some(b) => ExportError::UnwiredLink {
                block: b.name().to_string(),
                kind: b.kind.name(),
                field,
            },
            None => ExportError::UnwiredLink {
                block: format!("{block:?}"),
                kind: "<removed>",
                field,
            },
        }
    }
}

impl Index<BlockRef> for BlockRegistry {
    type Output = Block;

    fn index(&self, block: BlockRef) -> &Block {
        &self.blocks[block]
    }
}

impl IndexMut<BlockRef> for BlockRegistry {
    fn index_mut(&mut self, block: BlockRef) -> &mut Block {
        &mut self.blocks[block]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nif::version::Game;

    fn morrowind() -> DocumentContext {
        DocumentContext::for_game(Game::Morrowind)
    }

    fn oblivion() -> DocumentContext {
        DocumentContext::for_game(Game::Oblivion)
    }

    #[test]
    fn unknown_type_tags_are_rejected() {
        let mut registry = BlockRegistry::new();
        let err = registry
            .create_named("NiTeapot", &oblivion(), None)
            .unwrap_err();
        assert!(matches!(err, ExportError::UnknownBlockType(tag) if tag == "NiTeapot"));
        assert!(registry.is_empty());
    }

    #[test]
    fn kinds_missing_from_the_version_are_unsupported() {
        let mut registry = BlockRegistry::new();
        let err = registry
            .create(BlockKind::NiControllerSequence, &morrowind(), None)
            .unwrap_err();
        assert!(err.is_recoverable());
    }

    #[test]
    fn controllers_chain_in_call_order() {
        let ctx = morrowind();
        let mut registry = BlockRegistry::new();
        let node = registry.create(BlockKind::NiNode, &ctx, None).unwrap();
        let first = registry
            .create(BlockKind::NiKeyframeController, &ctx, None)
            .unwrap();
        let second = registry
            .create(BlockKind::NiVisController, &ctx, None)
            .unwrap();
        registry.add_controller(node, first).unwrap();
        registry.add_controller(node, second).unwrap();

        assert_eq!(registry[node].net().unwrap().controller, Some(first));
        let first_ctrl = registry[first].time_controller().unwrap();
        assert_eq!(first_ctrl.next_controller, Some(second));
        assert_eq!(first_ctrl.target, Some(node));
        assert_eq!(registry[second].time_controller().unwrap().target, Some(node));
    }

    #[test]
    fn old_versions_chain_extra_data() {
        let ctx = morrowind();
        let mut registry = BlockRegistry::new();
        let node = registry.create(BlockKind::NiNode, &ctx, None).unwrap();
        let keys = registry
            .create(BlockKind::NiTextKeyExtraData, &ctx, None)
            .unwrap();
        let target = registry
            .create(BlockKind::NiStringExtraData, &ctx, None)
            .unwrap();
        registry.add_extra_data(node, keys).unwrap();
        registry.add_extra_data(node, target).unwrap();

        let net = registry[node].net().unwrap();
        assert_eq!(net.extra_data, ExtraDataLinks::Chain(Some(keys)));
        assert_eq!(
            registry[keys].extra_fields().unwrap().next_extra_data,
            Some(target)
        );
    }

    #[test]
    fn new_versions_list_extra_data() {
        let ctx = oblivion();
        let mut registry = BlockRegistry::new();
        let node = registry.create(BlockKind::NiNode, &ctx, None).unwrap();
        let bound = registry.create(BlockKind::BSBound, &ctx, None).unwrap();
        registry.add_extra_data(node, bound).unwrap();
        assert_eq!(
            registry[node].net().unwrap().extra_data,
            ExtraDataLinks::List(vec![bound])
        );
    }

    #[test]
    fn children_need_a_node_parent() {
        let ctx = oblivion();
        let mut registry = BlockRegistry::new();
        let shape = registry.create(BlockKind::NiTriShape, &ctx, None).unwrap();
        let node = registry.create(BlockKind::NiNode, &ctx, None).unwrap();
        assert!(matches!(
            registry.add_child(shape, node),
            Err(ExportError::UnwiredLink { field: "children", .. })
        ));
        registry.add_child(node, shape).unwrap();
        let BlockData::Node(parent) = &registry[node].data else {
            panic!("expected a node");
        };
        assert_eq!(parent.children, vec![shape]);
    }

    #[test]
    fn find_by_name_returns_the_first_created() {
        let ctx = oblivion();
        let mut registry = BlockRegistry::new();
        let a = registry.create(BlockKind::NiNode, &ctx, None).unwrap();
        let b = registry.create(BlockKind::NiNode, &ctx, None).unwrap();
        registry.set_name(a, "Bip01");
        registry.set_name(b, "Bip01");
        assert_eq!(registry.find_by_name("Bip01"), Some(a));
        assert_eq!(registry.find_by_name("Bip02"), None);
    }
}
