use std::path::PathBuf;

use convoy_cache::CacheError;
use convoy_core::{CoreError, StorePath};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, InstructionError>;

#[derive(Error, Debug)]
pub enum InstructionError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("instruction is invalid: {reason}")]
    InvalidInstruction { reason: String },

    #[error("instruction contains an unknown command kind: {kind:?}")]
    UnknownCommandKind { kind: String },

    #[error("missing narinfo for dependency {path} needed to complete a partial-narinfo import")]
    MissingDependencyMetadata { path: StorePath },

    #[error("import of {path} failed: {reason}")]
    ImportFailed { path: StorePath, reason: String },

    #[error("activation of {path} failed: {reason}")]
    ActivationFailed { path: StorePath, reason: String },

    #[error("store operation failed: {0}")]
    StoreBackend(String),

    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to (de)serialize {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to compress instruction directory into {path}: {source}")]
    Compression {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl InstructionError {
    /// Exit-code category per the error taxonomy: bad input vs. external
    /// collaborator failure vs. generic failure.
    pub fn exit_category(&self) -> ExitCategory {
        match self {
            InstructionError::InvalidInstruction { .. }
            | InstructionError::UnknownCommandKind { .. } => ExitCategory::InvalidInput,
            InstructionError::ImportFailed { .. }
            | InstructionError::ActivationFailed { .. }
            | InstructionError::StoreBackend(_) => ExitCategory::ExternalFailure,
            InstructionError::Cache(CacheError::CacheLocked { .. }) => ExitCategory::ExternalFailure,
            InstructionError::Core(CoreError::ArchiveIncomplete { .. }) => ExitCategory::InvalidInput,
            _ => ExitCategory::Generic,
        }
    }
}

pub(crate) trait IoContext<T> {
    fn io_context(self, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> IoContext<T> for std::io::Result<T> {
    fn io_context(self, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|source| InstructionError::Io {
            path: path.into(),
            source,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCategory {
    Generic,
    InvalidInput,
    ExternalFailure,
}
