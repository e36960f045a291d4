use std::collections::HashSet;

use tracing::info;

use super::session::ExportSession;
use super::types::BlockRef;

/// Every block reachable from the roots, through refs and back references.
fn reachable(session: &ExportSession) -> Vec<BlockRef> {
    let mut seen = HashSet::new();
    let mut order = Vec::new();
    let mut stack: Vec<BlockRef> = session
        .ctx
        .roots()
        .map(|roots| roots.iter().rev().copied().collect())
        .unwrap_or_default();
    while let Some(block_ref) = stack.pop() {
        if !seen.insert(block_ref) {
            continue;
        }
        let Some(block) = session.registry.get(block_ref) else {
            continue;
        };
        order.push(block_ref);
        block.visit_refs(&mut |r| stack.push(r));
        block.visit_ptrs(&mut |r| stack.push(r));
    }
    order
}

/// Multiplies every spatial field of every block reachable from the roots.
/// Each block is scaled exactly once however many blocks share it.
pub fn scale_graph(session: &mut ExportSession, factor: f32) {
    for block_ref in reachable(session) {
        session.registry[block_ref].scale_spatial(factor);
    }
}

/// Undoes the configured unit correction. A no-op when the correction is
/// within epsilon of one.
pub fn apply_scale_correction(session: &mut ExportSession) {
    if !session.config.needs_scale_correction() {
        return;
    }
    let factor = 1.0 / session.config.scale_correction;
    info!("Applying scale correction {}", factor);
    scale_graph(session, factor);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nif::types::{BlockData, BlockKind, Vector3};
    use crate::nif::version::Game;

    #[test]
    fn shared_data_is_scaled_once() {
        let mut session = ExportSession::for_game(Game::Oblivion);
        let root = session.create(BlockKind::NiNode, None).unwrap();
        let a = session.create(BlockKind::NiTriShape, None).unwrap();
        let b = session.create(BlockKind::NiTriShape, None).unwrap();
        let data = session.create(BlockKind::NiTriShapeData, None).unwrap();
        if let BlockData::TriShapeData(d) = &mut session.registry[data].data {
            d.vertices.push(Vector3([1.0, 2.0, 3.0]));
        }
        for shape in [a, b] {
            session.registry.add_child(root, shape).unwrap();
            if let BlockData::TriShape(g) = &mut session.registry[shape].data {
                g.data = Some(data);
            }
        }
        session.ctx.set_roots(vec![root]).unwrap();

        scale_graph(&mut session, 2.0);
        let BlockData::TriShapeData(d) = &session.registry[data].data else {
            panic!("expected shape data");
        };
        assert_eq!(d.vertices[0], Vector3([2.0, 4.0, 6.0]));
    }
}
