//! Per-run export state: the document context and the block registry.

use tracing::debug;

use super::config::ExportConfig;
use super::dedup::DedupPolicy;
use super::error::{ExportError, Result};
use super::registry::{BlockRegistry, SourceKey};
use super::types::{Block, BlockKind, BlockRef};
use super::version::{version_string, Game};

/// Target format settings every block is created against.
#[derive(Debug, Clone)]
pub struct DocumentContext {
    pub version: u32,
    pub user_version: u32,
    pub bs_version: u32,
    pub game: Game,
    pub scale_correction: f32,
    roots: Option<Vec<BlockRef>>,
}

impl DocumentContext {
    pub fn new(game: Game, version: u32, user_version: u32, bs_version: u32) -> Self {
        DocumentContext {
            version,
            user_version,
            bs_version,
            game,
            scale_correction: 1.0,
            roots: None,
        }
    }

    pub fn for_game(game: Game) -> Self {
        let (version, user_version, bs_version) = game.versions();
        Self::new(game, version, user_version, bs_version)
    }

    pub fn from_config(config: &ExportConfig) -> Result<Self> {
        if config.game == Game::Unknown {
            return Err(ExportError::Configuration(
                "You have not selected a game. Please select a game and NIF version in the export settings.".to_string(),
            ));
        }
        if !config.scale_correction.is_finite() || config.scale_correction <= 0.0 {
            return Err(ExportError::Configuration(format!(
                "Scale correction must be a positive number, got {}.",
                config.scale_correction
            )));
        }
        let mut ctx = Self::for_game(config.game);
        if let Some(version) = config.version_override {
            ctx.version = version;
        }
        ctx.scale_correction = config.scale_correction;
        Ok(ctx)
    }

    /// Declares the document roots. Only one root list may be set per run.
    pub fn set_roots(&mut self, roots: Vec<BlockRef>) -> Result<()> {
        if self.roots.is_some() {
            return Err(ExportError::RootsAlreadySet);
        }
        self.roots = Some(roots);
        Ok(())
    }

    pub fn roots(&self) -> Option<&[BlockRef]> {
        self.roots.as_deref()
    }

    pub fn clear_roots(&mut self) {
        self.roots = None;
    }

    pub fn is_bethesda(&self) -> bool {
        self.game.is_bethesda()
    }
}

/// Owns everything one export run mutates. A run takes `&mut ExportSession`,
/// so two runs can never share a session at the same time.
#[derive(Debug)]
pub struct ExportSession {
    pub config: ExportConfig,
    pub ctx: DocumentContext,
    pub registry: BlockRegistry,
}

impl ExportSession {
    pub fn new(config: ExportConfig) -> Result<Self> {
        let ctx = DocumentContext::from_config(&config)?;
        Ok(ExportSession {
            config,
            ctx,
            registry: BlockRegistry::new(),
        })
    }

    pub fn for_game(game: Game) -> Self {
        let config = ExportConfig::for_game(game);
        ExportSession {
            ctx: DocumentContext::for_game(game),
            config,
            registry: BlockRegistry::new(),
        }
    }

    /// Clears the registry and the root list before a new run.
    pub fn reset(&mut self) -> Result<()> {
        self.registry.clear();
        self.ctx = DocumentContext::from_config(&self.config)?;
        debug!(
            "Export session reset for {} (version {})",
            self.ctx.game,
            version_string(self.ctx.version)
        );
        Ok(())
    }

    pub fn version(&self) -> u32 {
        self.ctx.version
    }

    pub fn game(&self) -> Game {
        self.ctx.game
    }

    pub fn create(&mut self, kind: BlockKind, key: Option<SourceKey>) -> Result<BlockRef> {
        self.registry.create(kind, &self.ctx, key)
    }

    pub fn create_named(&mut self, type_tag: &str, key: Option<SourceKey>) -> Result<BlockRef> {
        self.registry.create_named(type_tag, &self.ctx, key)
    }

    pub fn instantiate(&self, kind: BlockKind) -> Result<Block> {
        self.registry.instantiate(kind, &self.ctx)
    }

    pub fn intern(
        &mut self,
        candidate: Block,
        key: Option<SourceKey>,
        policy: &DedupPolicy,
    ) -> BlockRef {
        self.registry.intern(candidate, key, policy)
    }
}
