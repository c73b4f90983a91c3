use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CacheError>;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("client-state cache at {path} is held by another run")]
    CacheLocked { path: PathBuf },

    #[error("generation history at {path} is corrupt: {source}")]
    CorruptHistory {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

pub(crate) trait IoContext<T> {
    fn io_context(self, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> IoContext<T> for std::io::Result<T> {
    fn io_context(self, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|source| CacheError::Io {
            path: path.into(),
            source,
        })
    }
}
