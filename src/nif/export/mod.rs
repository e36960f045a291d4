//! Graph assembly: the walkers that turn a host scene into blocks, and the
//! entry point that runs them, fixes the roots and writes the files.

pub mod animation;
pub mod armature;
pub mod collision;
pub mod constraint;
pub mod geometry;
pub mod kf;
pub mod material;
pub mod material_animation;
pub mod object;
pub mod particle;
pub mod texture;

use std::path::{Path, PathBuf};

use tracing::{error, info};

use super::config::{AnimationTarget, ExportConfig};
use super::error::Result;
use super::host::HostScene;
use super::registry::SourceKey;
use super::scale::apply_scale_correction;
use super::session::ExportSession;
use super::types::{Block, BlockKind, BlockRef};
use super::writer::save_to_path;

/// How an export run ended. A cancelled run never leaves a file that
/// should be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportStatus {
    Finished,
    Cancelled,
}

/// One export invocation over a host scene.
#[derive(Debug)]
pub struct NifExport {
    pub session: ExportSession,
}

impl NifExport {
    pub fn new(config: ExportConfig) -> Result<Self> {
        Ok(NifExport {
            session: ExportSession::new(config)?,
        })
    }

    /// Resets the session and assembles the whole graph. Returns the root.
    pub fn build(&mut self, scene: &HostScene) -> Result<BlockRef> {
        let session = &mut self.session;
        session.reset()?;
        info!(
            "Exporting '{}' for {} ({} objects)",
            scene.name,
            session.game(),
            scene.objects.len()
        );

        let root = object::export_hierarchy(session, scene)?;
        object::export_bounding_boxes(session, scene, root)?;
        collision::export_collisions(session, scene)?;
        constraint::export_constraints(session, scene)?;
        particle::export_particles(session, scene)?;
        if session.config.animation != AnimationTarget::GeometryOnly {
            animation::export_animation(session, scene, root)?;
            material_animation::export_material_animations(session, scene)?;
        }

        session.ctx.set_roots(vec![root])?;
        apply_scale_correction(session);
        Ok(root)
    }

    /// Builds and writes the scene file, and the keyframe file when the
    /// configuration asks for one.
    pub fn run(&mut self, scene: &HostScene, path: &Path) -> Result<()> {
        self.build(scene)?;
        // Nothing reaches the disk until both documents are built.
        let kf_session = if self.session.config.export_kf {
            Some(kf::export_kf(&self.session.config, scene)?)
        } else {
            None
        };
        save_to_path(&self.session, path)?;
        if let Some(kf_session) = kf_session {
            save_to_path(&kf_session, &kf::kf_path(path, self.session.game()))?;
        }
        Ok(())
    }

    /// [`run`](Self::run) with every failure reported and turned into a
    /// cancelled status.
    pub fn execute(&mut self, scene: &HostScene, path: &Path) -> ExportStatus {
        match self.run(scene, path) {
            Ok(()) => {
                info!("Finished exporting {}", path.display());
                ExportStatus::Finished
            }
            Err(err) => {
                error!("Export cancelled: {}", err);
                ExportStatus::Cancelled
            }
        }
    }
}

/// Output path of the scene file: `.nif` next to the input unless given.
pub fn default_output_path(input: &Path) -> PathBuf {
    input.with_extension("nif")
}

// --- Shared helpers for the walkers ---

/// Instantiates `kind`, lets `fill` set its fields and registers it.
pub(crate) fn create_with(
    session: &mut ExportSession,
    kind: BlockKind,
    key: Option<SourceKey>,
    fill: impl FnOnce(&mut Block),
) -> Result<BlockRef> {
    let mut block = session.instantiate(kind)?;
    fill(&mut block);
    Ok(session.registry.insert(block, key))
}
