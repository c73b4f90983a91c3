//! The store-update data model: store paths, roots, path metadata.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// An absolute path identifying one object in a content-addressed store.
///
/// Opaque to this crate: equality is string equality, nothing here parses
/// or validates the structure of the path.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StorePath(String);

impl StorePath {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The store-hash prefix used to name info and data files in an
    /// archive, e.g. `/nix/store/abc123-foo` -> `abc123-foo`.
    pub fn archive_basename(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    /// The hash component of [`archive_basename`](Self::archive_basename),
    /// e.g. `/nix/store/abc123-foo` -> `abc123`. Info files are named
    /// `<hash_prefix>.narinfo`.
    pub fn hash_prefix(&self) -> &str {
        self.archive_basename()
            .split('-')
            .next()
            .unwrap_or(self.archive_basename())
    }
}

impl fmt::Display for StorePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for StorePath {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for StorePath {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

/// A full 40-character hex git commit id.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GitRevision(String);

impl GitRevision {
    /// Builds a `GitRevision`, rejecting anything that isn't a 40-char hex
    /// string up front rather than letting a malformed revision travel
    /// silently through the rest of the pipeline.
    pub fn new(revision: impl Into<String>) -> Result<Self, InvalidRevision> {
        let revision = revision.into();
        let is_valid = revision.len() == 40 && revision.bytes().all(|b| b.is_ascii_hexdigit());
        if is_valid {
            Ok(Self(revision))
        } else {
            Err(InvalidRevision(revision))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GitRevision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("{0:?} is not a 40-character hex git revision")]
pub struct InvalidRevision(String);

/// The top-level system-configuration output built from one revision.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StoreRoot {
    #[serde(rename = "nixPath")]
    pub nix_path: StorePath,
    #[serde(rename = "gitRevision")]
    pub git_revision: GitRevision,
}

impl StoreRoot {
    pub fn new(nix_path: StorePath, git_revision: GitRevision) -> Self {
        Self {
            nix_path,
            git_revision,
        }
    }
}

/// Metadata for one store object: its content hash, size, and the other
/// store paths it references.
///
/// The transitive closure of a root is the fixpoint of `references`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathInfo {
    pub path: StorePath,
    #[serde(rename = "narHash")]
    pub nar_hash: String,
    #[serde(rename = "narSize")]
    pub nar_size: u64,
    pub references: BTreeSet<StorePath>,
}

impl PathInfo {
    pub fn new(
        path: StorePath,
        nar_hash: impl Into<String>,
        nar_size: u64,
        references: BTreeSet<StorePath>,
    ) -> Self {
        Self {
            path,
            nar_hash: nar_hash.into(),
            nar_size,
            references,
        }
    }
}
