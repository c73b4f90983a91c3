//! An in-memory store, standing in for the real external store toolchain in
//! tests of everything layered on top of `StoreBackend`.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;

use convoy_core::{ActivationMode, BuildOutput, GitRevision, PathInfo, StoreBackend, StorePath};

use crate::error::{FakeStoreError, Result};

/// One host's toplevel output at one revision, along with the full
/// transitive closure of `PathInfo` backing it.
#[derive(Debug, Clone)]
pub struct ToplevelFixture {
    pub hostname: String,
    pub revision: GitRevision,
    pub root: StorePath,
    pub closure: Vec<PathInfo>,
}

impl ToplevelFixture {
    pub fn new(
        hostname: impl Into<String>,
        revision: GitRevision,
        root: StorePath,
        closure: Vec<PathInfo>,
    ) -> Self {
        Self {
            hostname: hostname.into(),
            revision,
            root,
            closure,
        }
    }
}

#[derive(Default)]
struct FakeState {
    /// Which store paths are considered present in a given store directory,
    /// keyed by that directory's path.
    materialized: HashMap<PathBuf, HashSet<StorePath>>,
    activations: Vec<(StorePath, ActivationMode)>,
}

/// An in-memory `StoreBackend`: a fixed universe of declared hosts and
/// pre-baked toplevel fixtures, with `build_toplevel`/`export_to_archive`/
/// `import_from_archive` performing real filesystem writes against whatever
/// temp directories the test passes in, so the rest of the pipeline (archive
/// subsetting, compression) can be exercised unmodified.
pub struct FakeStoreBackend {
    hostnames: Vec<String>,
    graph: BTreeMap<StorePath, PathInfo>,
    by_basename: HashMap<String, StorePath>,
    toplevels: BTreeMap<(String, String), StorePath>,
    default_revision: GitRevision,
    state: Mutex<FakeState>,
}

impl FakeStoreBackend {
    /// Builds a backend declaring `hostnames` and backing each fixture's
    /// `(hostname, revision)` pair. `default_revision` is returned by
    /// `resolve_revision` regardless of the requested ref, matching the
    /// common test shape of a single revision under test at a time.
    pub fn new(
        hostnames: Vec<String>,
        fixtures: Vec<ToplevelFixture>,
        default_revision: GitRevision,
    ) -> Self {
        let mut graph = BTreeMap::new();
        let mut toplevels = BTreeMap::new();
        for fixture in fixtures {
            for info in &fixture.closure {
                graph.insert(info.path.clone(), info.clone());
            }
            toplevels.insert(
                (fixture.hostname.clone(), fixture.revision.to_string()),
                fixture.root.clone(),
            );
        }
        let by_basename = graph
            .keys()
            .map(|path| (path.archive_basename().to_string(), path.clone()))
            .collect();

        Self {
            hostnames,
            graph,
            by_basename,
            toplevels,
            default_revision,
            state: Mutex::new(FakeState::default()),
        }
    }

    /// Every generation activation requested so far, oldest first.
    pub fn activations(&self) -> Vec<(StorePath, ActivationMode)> {
        self.state.lock().unwrap().activations.clone()
    }

    fn closure_of(&self, root: &StorePath) -> Vec<PathInfo> {
        let mut seen = HashSet::new();
        let mut stack = vec![root.clone()];
        let mut out = Vec::new();
        while let Some(path) = stack.pop() {
            if !seen.insert(path.clone()) {
                continue;
            }
            if let Some(info) = self.graph.get(&path) {
                out.push(info.clone());
                for reference in &info.references {
                    if !seen.contains(reference) {
                        stack.push(reference.clone());
                    }
                }
            }
        }
        out
    }

    fn materialize(&self, store_dir: &Path, infos: &[PathInfo]) -> Result<()> {
        std::fs::create_dir_all(store_dir)?;
        let mut state = self.state.lock().unwrap();
        let present = state.materialized.entry(store_dir.to_path_buf()).or_default();
        for info in infos {
            let data_path = store_dir.join(info.path.archive_basename());
            if !data_path.exists() {
                std::fs::write(&data_path, info.path.as_str().as_bytes())?;
            }
            present.insert(info.path.clone());
        }
        Ok(())
    }
}

#[async_trait]
impl StoreBackend for FakeStoreBackend {
    type Error = FakeStoreError;

    async fn resolve_revision(
        &self,
        _flake_uri: &str,
        _reference: Option<&str>,
    ) -> Result<GitRevision> {
        Ok(self.default_revision.clone())
    }

    async fn build_toplevel(
        &self,
        _flake_uri: &str,
        revision: &GitRevision,
        hostname: &str,
        store_dir: &Path,
    ) -> Result<BuildOutput> {
        if !self.hostnames.iter().any(|h| h == hostname) {
            return Err(FakeStoreError::UnknownHostname {
                requested: hostname.to_string(),
                available: self.hostnames.clone(),
            });
        }
        let root = self
            .toplevels
            .get(&(hostname.to_string(), revision.to_string()))
            .cloned()
            .ok_or_else(|| FakeStoreError::NoFixture {
                hostname: hostname.to_string(),
                revision: revision.to_string(),
            })?;

        let closure = self.closure_of(&root);
        self.materialize(store_dir, &closure)?;

        Ok(BuildOutput {
            derivation: StorePath::new(format!("{root}.drv")),
            output: root,
            revision: revision.clone(),
        })
    }

    async fn query_path_info(
        &self,
        _store_dir: &Path,
        roots: &[StorePath],
    ) -> Result<Vec<PathInfo>> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for root in roots {
            for info in self.closure_of(root) {
                if seen.insert(info.path.clone()) {
                    out.push(info);
                }
            }
        }
        Ok(out)
    }

    async fn export_to_archive(
        &self,
        _store_dir: &Path,
        archive_dir: &Path,
        root: &StorePath,
    ) -> Result<()> {
        std::fs::create_dir_all(archive_dir)?;
        for info in self.closure_of(root) {
            let data_path = archive_dir.join(info.path.archive_basename());
            std::fs::write(&data_path, info.path.as_str().as_bytes())?;
            let narinfo_path = archive_dir.join(format!("{}.narinfo", info.path.hash_prefix()));
            let serialized = serde_json::to_vec(&info).expect("PathInfo always serializes");
            std::fs::write(&narinfo_path, serialized)?;
        }
        Ok(())
    }

    async fn import_from_archive(
        &self,
        archive_dir: &Path,
        _root: &StorePath,
        target_store_dir: &Path,
    ) -> Result<()> {
        std::fs::create_dir_all(target_store_dir)?;
        let mut state = self.state.lock().unwrap();
        let present = state
            .materialized
            .entry(target_store_dir.to_path_buf())
            .or_default();
        for entry in std::fs::read_dir(archive_dir)? {
            let entry = entry?;
            let file_name = entry.file_name();
            let name = file_name.to_string_lossy();
            if name.ends_with(".narinfo") {
                continue;
            }
            let path = self
                .by_basename
                .get(name.as_ref())
                .ok_or_else(|| FakeStoreError::UnknownArchiveEntry {
                    name: name.to_string(),
                })?;
            std::fs::copy(entry.path(), target_store_dir.join(name.as_ref()))?;
            present.insert(path.clone());
        }
        Ok(())
    }

    async fn activate_generation(
        &self,
        _target_store_root: &Path,
        path: &StorePath,
        mode: ActivationMode,
    ) -> Result<()> {
        self.state.lock().unwrap().activations.push((path.clone(), mode));
        Ok(())
    }
}
