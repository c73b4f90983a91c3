//! Archive subsetter: rebuilds a destination archive directory from exactly
//! the requested slice of a source archive's data and info entries.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use convoy_core::{require_all_present, ArchiveEntryKind, StorePath};

use crate::error::{IoContext, Result};

/// Rebuilds `dest_dir` so it holds exactly the info entries for
/// `info_item_paths` and the data entries for `data_item_paths`, copied out
/// of `source_archive`. Neither list needs to be a subset of the other.
/// Prior contents of `dest_dir` are discarded first. Fails with
/// `ArchiveIncomplete` if `source_archive` is missing a requested entry.
pub fn make_archive_subset(
    source_archive: &Path,
    dest_dir: &Path,
    info_item_paths: &[StorePath],
    data_item_paths: &[StorePath],
) -> Result<()> {
    if dest_dir.exists() {
        fs::remove_dir_all(dest_dir).io_context(dest_dir)?;
    }
    fs::create_dir_all(dest_dir).io_context(dest_dir)?;

    let data_available: HashSet<StorePath> = data_item_paths
        .iter()
        .filter(|path| data_file(source_archive, path).exists())
        .cloned()
        .collect();
    require_all_present(ArchiveEntryKind::Data, data_item_paths, &data_available)?;

    let info_available: HashSet<StorePath> = info_item_paths
        .iter()
        .filter(|path| info_file(source_archive, path).exists())
        .cloned()
        .collect();
    require_all_present(ArchiveEntryKind::Info, info_item_paths, &info_available)?;

    for path in data_item_paths {
        let to = data_file(dest_dir, path);
        fs::copy(data_file(source_archive, path), &to).io_context(&to)?;
    }
    for path in info_item_paths {
        let to = info_file(dest_dir, path);
        fs::copy(info_file(source_archive, path), &to).io_context(&to)?;
    }

    Ok(())
}

fn data_file(archive_dir: &Path, path: &StorePath) -> PathBuf {
    archive_dir.join(path.archive_basename())
}

fn info_file(archive_dir: &Path, path: &StorePath) -> PathBuf {
    archive_dir.join(format!("{}.narinfo", path.hash_prefix()))
}
