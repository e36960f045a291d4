pub mod nif;

pub use nif::config::{AnimationTarget, ExportConfig};
pub use nif::error::{ExportError, Result};
pub use nif::export::{ExportStatus, NifExport};
pub use nif::host::HostScene;
pub use nif::session::ExportSession;
pub use nif::types::*;
pub use nif::version::Game;
