use std::io::Error as IoError;
use std::path::PathBuf;

use thiserror::Error;
use tracing::warn;

use super::registry::SourceKey;

// --- Error Type ---
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("'{0}': Unknown block type")]
    UnknownBlockType(String),

    #[error("No block was registered for {key}")]
    MissingMapping { key: SourceKey },

    #[error("{object}: {message}")]
    MissingDependency { object: String, message: String },

    #[error("{object}: {feature} is not supported for this target")]
    UnsupportedFeature { object: String, feature: String },

    #[error("{object}: {message}")]
    MalformedSourceData { object: String, message: String },

    #[error("Block {block} ({kind}) has an unwired '{field}' link")]
    UnwiredLink {
        block: String,
        kind: &'static str,
        field: &'static str,
    },

    #[error("The document roots were already set for this run")]
    RootsAlreadySet,

    #[error("No document roots were set for this run")]
    RootsNotSet,

    #[error("IO Error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: IoError,
    },

    #[error("Write Error: {0}")]
    Write(#[from] binrw::Error),
}

/// Coarse classification used by the export entry points to decide whether
/// a failure cancels the run or only skips a feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    MissingDependency,
    UnsupportedFeature,
    MalformedSourceData,
    Io,
    Internal,
}

impl ExportError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ExportError::Configuration(_) => ErrorKind::Configuration,
            ExportError::MissingMapping { .. } | ExportError::MissingDependency { .. } => {
                ErrorKind::MissingDependency
            }
            ExportError::UnsupportedFeature { .. } => ErrorKind::UnsupportedFeature,
            ExportError::MalformedSourceData { .. } => ErrorKind::MalformedSourceData,
            ExportError::Io { .. } | ExportError::Write(_) => ErrorKind::Io,
            ExportError::UnknownBlockType(_)
            | ExportError::UnwiredLink { .. }
            | ExportError::RootsAlreadySet
            | ExportError::RootsNotSet => ErrorKind::Internal,
        }
    }

    pub fn is_recoverable(&self) -> bool {
        self.kind() == ErrorKind::UnsupportedFeature
    }

    pub fn unsupported(object: impl Into<String>, feature: impl Into<String>) -> Self {
        ExportError::UnsupportedFeature {
            object: object.into(),
            feature: feature.into(),
        }
    }

    pub fn malformed(object: impl Into<String>, message: impl Into<String>) -> Self {
        ExportError::MalformedSourceData {
            object: object.into(),
            message: message.into(),
        }
    }

    pub fn missing(object: impl Into<String>, message: impl Into<String>) -> Self {
        ExportError::MissingDependency {
            object: object.into(),
            message: message.into(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: IoError) -> Self {
        ExportError::Io {
            path: path.into(),
            source,
        }
    }
}

// Encoding into memory buffers only fails through binrw's error type.
impl From<IoError> for ExportError {
    fn from(err: IoError) -> Self {
        ExportError::Write(binrw::Error::Io(err))
    }
}

/// Walker boundary: an unsupported feature becomes a warning and `None`,
/// every other error keeps propagating.
pub fn skip_unsupported<T>(result: Result<T>) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(err) if err.is_recoverable() => {
            warn!("{}, skipping", err);
            Ok(None)
        }
        Err(err) => Err(err),
    }
}

// Define a crate-wide Result type alias
pub type Result<T> = std::result::Result<T, ExportError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_unsupported_features_are_recoverable() {
        let skipped = skip_unsupported::<()>(Err(ExportError::unsupported("Cube", "NiCollisionData")));
        assert!(matches!(skipped, Ok(None)));

        let fatal = skip_unsupported::<()>(Err(ExportError::malformed("Cube", "bad keys")));
        assert!(matches!(fatal, Err(ExportError::MalformedSourceData { .. })));

        let missing = ExportError::MissingMapping {
            key: SourceKey::object("Cube"),
        };
        assert_eq!(missing.kind(), ErrorKind::MissingDependency);
        assert!(!missing.is_recoverable());
    }

    #[test]
    fn messages_carry_the_object_name() {
        let err = ExportError::malformed("Armature", "Incomplete key set rotation for action Walk");
        assert!(err.to_string().contains("Armature"));
    }
}
