//! The client-state cache: a flat directory of `<hash>.narinfo` files this
//! target has successfully imported, so future deltas can reference them as
//! delta dependencies without re-shipping their metadata.

use std::fs;
use std::path::{Path, PathBuf};

use convoy_core::StorePath;

use crate::error::{IoContext, Result};
use crate::lock::CacheLock;

pub struct ClientStateStore {
    cache_dir: PathBuf,
    _lock: CacheLock,
}

impl ClientStateStore {
    /// Opens the cache directory, creating it (and any parents) if this is
    /// the first run against this target, and takes its advisory lock for
    /// the lifetime of the returned store. A second concurrent `open` on the
    /// same directory fails with `CacheLocked` instead of racing this one.
    pub fn open(cache_dir: impl Into<PathBuf>) -> Result<Self> {
        let cache_dir = cache_dir.into();
        fs::create_dir_all(&cache_dir).io_context(&cache_dir)?;
        let lock = CacheLock::acquire(&cache_dir)?;
        Ok(Self {
            cache_dir,
            _lock: lock,
        })
    }

    pub fn path(&self) -> &Path {
        &self.cache_dir
    }

    fn info_file_path(&self, path: &StorePath) -> PathBuf {
        self.cache_dir.join(format!("{}.narinfo", path.hash_prefix()))
    }

    /// Returns the absolute path of every locally cached info file whose
    /// store-hash prefix matches one of `nix_paths`, in the same order.
    /// A path with no cached info file is simply omitted.
    pub fn list_info_files(&self, nix_paths: &[StorePath]) -> Result<Vec<PathBuf>> {
        let mut found = Vec::new();
        for path in nix_paths {
            let candidate = self.info_file_path(path);
            if candidate.exists() {
                found.push(candidate);
            }
        }
        Ok(found)
    }

    /// Copies `files` into the cache by basename, overwriting any existing
    /// entry with the same name.
    pub fn import_info_files(&self, files: &[PathBuf]) -> Result<()> {
        for file in files {
            let Some(name) = file.file_name() else {
                continue;
            };
            let dest = self.cache_dir.join(name);
            fs::copy(file, &dest).io_context(&dest)?;
        }
        Ok(())
    }
}
