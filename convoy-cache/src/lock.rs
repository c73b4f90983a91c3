//! A simple advisory lock for the client-state cache directory.
//!
//! The source this crate replaces does no locking at all - concurrent
//! executor runs on one target could corrupt the cache. This resolves that
//! by taking an exclusive lock file for the duration of one
//! `apply-instruction` run; a second run finding the lock held fails fast
//! with `CacheLocked` rather than racing the first.

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

use crate::error::{CacheError, Result};

const LOCK_FILE_NAME: &str = ".lock";

/// Holds the cache directory's advisory lock; releases it on drop.
#[derive(Debug)]
pub struct CacheLock {
    path: PathBuf,
}

impl CacheLock {
    /// Attempts to acquire the lock, failing immediately if it is already
    /// held rather than blocking - the executor is meant to fail fast and
    /// let the operator retry, not queue up.
    pub fn acquire(cache_dir: &Path) -> Result<Self> {
        let path = cache_dir.join(LOCK_FILE_NAME);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(_) => Ok(Self { path }),
            Err(source) if source.kind() == std::io::ErrorKind::AlreadyExists => {
                Err(CacheError::CacheLocked { path })
            }
            Err(source) => Err(CacheError::Io { path, source }),
        }
    }
}

impl Drop for CacheLock {
    fn drop(&mut self) {
        if let Err(err) = fs::remove_file(&self.path) {
            tracing::warn!(path = %self.path.display(), %err, "failed to release cache lock");
        }
    }
}
