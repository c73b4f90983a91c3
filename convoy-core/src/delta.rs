//! The delta engine: computes which store paths are new in a "to" closure
//! relative to a set of "from" closures. Pure function over `PathInfo` data
//! already retrieved by the store I/O adapter.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::{ArchiveEntryKind, CoreError};
use crate::types::{PathInfo, StorePath};

/// The result of a delta computation.
///
/// Both lists are deduplicated by `path` and ordered topologically: a path
/// appears after everything it references, ties broken lexicographically by
/// `path` to make the output deterministic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delta {
    pub added: Vec<PathInfo>,
    #[serde(rename = "allResultingItems")]
    pub all_resulting_items: Vec<PathInfo>,
}

impl Delta {
    pub fn added_paths(&self) -> Vec<StorePath> {
        self.added.iter().map(|info| info.path.clone()).collect()
    }

    pub fn all_paths(&self) -> Vec<StorePath> {
        self.all_resulting_items
            .iter()
            .map(|info| info.path.clone())
            .collect()
    }
}

/// Computes the delta given the already-materialized path info for every
/// "from" root's closure and for the "to" root's closure.
///
/// Membership is by `path` string identity; the engine trusts the supplied
/// `PathInfo` as authoritative and does not re-hash content. A path present
/// in `from_closures` with a different `narHash` than in `to_closure` is
/// still treated as the same entry for delta purposes - only its presence
/// as a path matters here.
pub fn compute_delta(
    from_closures: &[Vec<PathInfo>],
    to_closure: Vec<PathInfo>,
) -> Result<Delta, CoreError> {
    let from_paths: HashSet<&StorePath> = from_closures
        .iter()
        .flatten()
        .map(|info| &info.path)
        .collect();

    let all_resulting_items = topological_order(to_closure)?;

    let added = all_resulting_items
        .iter()
        .filter(|info| !from_paths.contains(&info.path))
        .cloned()
        .collect();

    Ok(Delta {
        added,
        all_resulting_items,
    })
}

/// Orders `infos` so that every path appears after everything it
/// references, with ties broken lexicographically by `path`.
///
/// Deduplicates by `path`; duplicates should only arise from overlapping
/// roots contributing the same path, which is expected to carry identical
/// metadata either way.
fn topological_order(infos: Vec<PathInfo>) -> Result<Vec<PathInfo>, CoreError> {
    let by_path: BTreeMap<StorePath, PathInfo> = infos
        .into_iter()
        .map(|info| (info.path.clone(), info))
        .collect();

    let mut marks: BTreeMap<StorePath, VisitMark> = BTreeMap::new();
    let mut ordered = Vec::with_capacity(by_path.len());

    // Sorted keys give deterministic visitation order at the top level and
    // at every level of recursion, since `references` is a `BTreeSet`.
    let roots: Vec<StorePath> = by_path.keys().cloned().collect();

    for root in roots {
        visit(&root, &by_path, &mut marks, &mut ordered)?;
    }

    Ok(ordered)
}

fn visit(
    path: &StorePath,
    by_path: &BTreeMap<StorePath, PathInfo>,
    marks: &mut BTreeMap<StorePath, VisitMark>,
    ordered: &mut Vec<PathInfo>,
) -> Result<(), CoreError> {
    match marks.get(path) {
        Some(VisitMark::Done) => return Ok(()),
        Some(VisitMark::InProgress) => {
            return Err(CoreError::ClosureCycle { path: path.clone() });
        }
        None => {}
    }

    let Some(info) = by_path.get(path) else {
        // A reference pointing outside the supplied closure; nothing to
        // order (the adapter is trusted to supply a complete closure for
        // anything we're asked to order), so just skip it.
        return Ok(());
    };

    marks.insert(path.clone(), VisitMark::InProgress);
    for reference in &info.references {
        if reference != path {
            visit(reference, by_path, marks, ordered)?;
        }
    }
    marks.insert(path.clone(), VisitMark::Done);
    ordered.push(info.clone());

    Ok(())
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum VisitMark {
    InProgress,
    Done,
}

/// Fails with `ArchiveIncomplete` unless every path in `needed` is present
/// in `available`. Shared by the archive subsetter, which must not
/// silently drop a requested entry.
pub fn require_all_present<'a>(
    kind: ArchiveEntryKind,
    needed: impl IntoIterator<Item = &'a StorePath>,
    available: &HashSet<StorePath>,
) -> Result<(), CoreError> {
    for path in needed {
        if !available.contains(path) {
            return Err(CoreError::ArchiveIncomplete {
                kind,
                path: path.clone(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use rstest::rstest;

    use super::*;

    fn info(path: &str, refs: &[&str]) -> PathInfo {
        PathInfo::new(
            StorePath::new(path),
            format!("sha256:{path}"),
            1024,
            refs.iter().map(|r| StorePath::new(*r)).collect(),
        )
    }

    #[rstest]
    fn delta_against_self_is_empty() {
        let to = vec![info("a", &[]), info("b", &["a"])];
        let delta = compute_delta(&[to.clone()], to.clone()).unwrap();
        assert!(delta.added.is_empty());
        assert_eq!(delta.all_resulting_items.len(), to.len());
    }

    #[rstest]
    fn empty_from_roots_means_everything_is_added() {
        let to = vec![info("a", &[]), info("b", &["a"])];
        let delta = compute_delta(&[], to.clone()).unwrap();
        assert_eq!(delta.added.len(), to.len());
    }

    #[rstest]
    fn added_excludes_paths_present_in_any_from_closure() {
        let from = vec![info("a", &[])];
        let to = vec![info("a", &[]), info("b", &["a"]), info("c", &["b"])];
        let delta = compute_delta(&[from], to).unwrap();
        let added_names: BTreeSet<_> = delta.added.iter().map(|i| i.path.as_str()).collect();
        assert_eq!(added_names, BTreeSet::from(["b", "c"]));
    }

    #[rstest]
    fn topological_order_places_references_first() {
        let to = vec![info("c", &["a", "b"]), info("b", &["a"]), info("a", &[])];
        let delta = compute_delta(&[], to).unwrap();
        let order: Vec<&str> = delta
            .all_resulting_items
            .iter()
            .map(|i| i.path.as_str())
            .collect();
        assert_eq!(order, vec!["a", "b", "c"]);
    }

    #[rstest]
    fn self_reference_does_not_loop_forever() {
        let to = vec![info("a", &["a"])];
        let delta = compute_delta(&[], to).unwrap();
        assert_eq!(delta.all_resulting_items.len(), 1);
    }

    #[rstest]
    fn cycle_is_rejected() {
        let to = vec![info("a", &["b"]), info("b", &["a"])];
        let err = compute_delta(&[], to).unwrap_err();
        assert!(matches!(err, CoreError::ClosureCycle { .. }));
    }

    #[rstest]
    fn missing_entry_is_archive_incomplete() {
        let available: HashSet<StorePath> = [StorePath::new("a")].into_iter().collect();
        let err = require_all_present(
            ArchiveEntryKind::Data,
            [&StorePath::new("a"), &StorePath::new("missing")],
            &available,
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::ArchiveIncomplete { .. }));
    }
}
