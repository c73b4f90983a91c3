//! The capability interface the rest of this workspace consumes instead of
//! shelling out directly. `convoy-store` implements it against the real
//! store toolchain; `convoy-test-support` implements it in memory.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::types::{GitRevision, PathInfo, StorePath};

/// When to switch the running system to a newly-activated generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActivationMode {
    Immediate,
    NextReboot,
}

/// Result of building a flake's toplevel output for one host at one
/// revision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOutput {
    pub derivation: StorePath,
    pub output: StorePath,
    pub revision: GitRevision,
}

/// The five operations the store I/O adapter exposes, per the external
/// toolchain contract. Every method either succeeds with a typed value or
/// fails with `Self::Error`; implementations are expected to attach the
/// external command, exit status, and captured stderr to that error.
#[async_trait::async_trait]
pub trait StoreBackend: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Resolves `reference` (or the flake's default branch, if `None`) to a
    /// full commit id.
    async fn resolve_revision(
        &self,
        flake_uri: &str,
        reference: Option<&str>,
    ) -> Result<GitRevision, Self::Error>;

    /// Builds `…configurations.<hostname>….toplevel` at `revision`, into
    /// `store_dir`.
    async fn build_toplevel(
        &self,
        flake_uri: &str,
        revision: &GitRevision,
        hostname: &str,
        store_dir: &Path,
    ) -> Result<BuildOutput, Self::Error>;

    /// Returns path info covering the union of the closures of `roots`.
    async fn query_path_info(
        &self,
        store_dir: &Path,
        roots: &[StorePath],
    ) -> Result<Vec<PathInfo>, Self::Error>;

    /// Populates `archive_dir` with data for every path in the closure of
    /// `root`.
    async fn export_to_archive(
        &self,
        store_dir: &Path,
        archive_dir: &Path,
        root: &StorePath,
    ) -> Result<(), Self::Error>;

    /// Imports the closure of `root` from `archive_dir` into
    /// `target_store_dir`.
    async fn import_from_archive(
        &self,
        archive_dir: &Path,
        root: &StorePath,
        target_store_dir: &Path,
    ) -> Result<(), Self::Error>;

    /// Activates `path` as a new generation under `target_store_root`
    /// (conventionally `/`).
    async fn activate_generation(
        &self,
        target_store_root: &Path,
        path: &StorePath,
        mode: ActivationMode,
    ) -> Result<(), Self::Error>;
}
