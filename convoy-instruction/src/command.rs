//! The command model: `Load` and `Switch`, the two tagged variants an
//! instruction's command list is built from, plus their build (build host)
//! and execute (target host) functions.
//!
//! There is no dynamic dispatch across variants: [`Command`] is a closed sum
//! type and `execute_command` is a plain match on the discriminator.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use convoy_cache::{ClientStateStore, GenerationHistory};
use convoy_core::{
    compute_delta, ActivationMode, GitRevision, StoreBackend, StorePath, StoreRoot,
};

use crate::archive::make_archive_subset;
use crate::error::{InstructionError, IoContext, Result};

/// One unit of work inside an instruction. The `kind` field is the
/// discriminator an instruction reader matches on; an unrecognized value is
/// rejected during validation with `UnknownCommandKind`, never reaching this
/// type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Command {
    Load {
        #[serde(rename = "archivePath")]
        archive_path: String,
        item: StoreRoot,
        #[serde(rename = "deltaDependencies")]
        delta_dependencies: Vec<StoreRoot>,
        #[serde(rename = "partialNarinfos")]
        partial_narinfos: bool,
    },
    Switch {
        item: StoreRoot,
        mode: ActivationMode,
    },
}

impl Command {
    /// The `item` every variant carries, used by instruction validation to
    /// check `deltaDependencies` references against earlier `Load`s.
    pub fn item(&self) -> &StoreRoot {
        match self {
            Command::Load { item, .. } => item,
            Command::Switch { item, .. } => item,
        }
    }
}

/// Shared build-host context threaded through every command's build
/// function: where to build, where the working archive lives, and where the
/// instruction is being assembled.
pub struct BuildContext<'a, B: StoreBackend> {
    pub backend: &'a B,
    pub flake_uri: &'a str,
    pub hostname: &'a str,
    pub store_dir: &'a Path,
    pub archive_dir: &'a Path,
    pub instruction_dir: &'a Path,
}

/// Shared execute-host context threaded through every command's execute
/// function: where the target store and client-state cache live.
pub struct ExecuteContext<'a, B: StoreBackend> {
    pub backend: &'a B,
    pub target_store_root: &'a Path,
    pub client_state: &'a ClientStateStore,
    pub generation_history: &'a GenerationHistory,
    pub instruction_dir: &'a Path,
}

fn wrap_backend_error<E: std::error::Error>(err: E) -> InstructionError {
    InstructionError::StoreBackend(err.to_string())
}

/// Builds a `Load` command: builds every delta-dependency revision plus the
/// new revision, exports the new revision's closure, computes the delta
/// against the dependencies' closures, and subsets the working archive down
/// to exactly the delta's data and (depending on `partial_narinfos`) info
/// entries.
pub async fn build_load<B: StoreBackend>(
    ctx: &BuildContext<'_, B>,
    new_rev: &GitRevision,
    delta_dep_revs: &[GitRevision],
    archive_folder_name: &str,
    partial_narinfos: bool,
) -> Result<Command> {
    let old_builds = futures::future::try_join_all(delta_dep_revs.iter().map(|rev| {
        ctx.backend
            .build_toplevel(ctx.flake_uri, rev, ctx.hostname, ctx.store_dir)
    }))
    .await
    .map_err(wrap_backend_error)?;
    let old_roots: Vec<StoreRoot> = old_builds
        .into_iter()
        .map(|built| StoreRoot::new(built.output, built.revision))
        .collect();

    let new_built = ctx
        .backend
        .build_toplevel(ctx.flake_uri, new_rev, ctx.hostname, ctx.store_dir)
        .await
        .map_err(wrap_backend_error)?;
    let new_root = StoreRoot::new(new_built.output.clone(), new_built.revision.clone());

    ctx.backend
        .export_to_archive(ctx.store_dir, ctx.archive_dir, &new_built.output)
        .await
        .map_err(wrap_backend_error)?;

    let old_root_paths: Vec<StorePath> = old_roots.iter().map(|r| r.nix_path.clone()).collect();
    let from_closure = if old_root_paths.is_empty() {
        Vec::new()
    } else {
        ctx.backend
            .query_path_info(ctx.store_dir, &old_root_paths)
            .await
            .map_err(wrap_backend_error)?
    };
    let to_closure = ctx
        .backend
        .query_path_info(ctx.store_dir, std::slice::from_ref(&new_built.output))
        .await
        .map_err(wrap_backend_error)?;
    let delta = compute_delta(&[from_closure], to_closure)?;

    let data_item_paths = delta.added_paths();
    let info_item_paths = if partial_narinfos {
        delta.added_paths()
    } else {
        delta.all_paths()
    };

    let dest_dir = ctx.instruction_dir.join(archive_folder_name);
    make_archive_subset(ctx.archive_dir, &dest_dir, &info_item_paths, &data_item_paths)?;

    Ok(Command::Load {
        archive_path: archive_folder_name.to_string(),
        item: new_root,
        delta_dependencies: old_roots,
        partial_narinfos,
    })
}

/// Builds a `Switch` command: builds the new revision's toplevel and emits
/// the activation request. Does not itself touch the archive.
pub async fn build_switch<B: StoreBackend>(
    ctx: &BuildContext<'_, B>,
    new_rev: &GitRevision,
    mode: ActivationMode,
) -> Result<Command> {
    let built = ctx
        .backend
        .build_toplevel(ctx.flake_uri, new_rev, ctx.hostname, ctx.store_dir)
        .await
        .map_err(wrap_backend_error)?;
    Ok(Command::Switch {
        item: StoreRoot::new(built.output, built.revision),
        mode,
    })
}

/// Runs one command against the target. A plain match on the
/// discriminator, per the command model's "no dynamic dispatch" design.
pub async fn execute_command<B: StoreBackend>(ctx: &ExecuteContext<'_, B>, command: &Command) -> Result<()> {
    match command {
        Command::Load {
            archive_path,
            item,
            delta_dependencies,
            partial_narinfos,
        } => execute_load(ctx, archive_path, item, delta_dependencies, *partial_narinfos).await,
        Command::Switch { item, mode } => execute_switch(ctx, item, *mode).await,
    }
}

async fn execute_load<B: StoreBackend>(
    ctx: &ExecuteContext<'_, B>,
    archive_path: &str,
    item: &StoreRoot,
    delta_dependencies: &[StoreRoot],
    partial_narinfos: bool,
) -> Result<()> {
    let absolute_archive = ctx.instruction_dir.join(archive_path);

    // Snapshot the archive's own info files before any dependency
    // enrichment; only this snapshot enters the client-state cache below.
    let e_before = list_narinfo_files(&absolute_archive)?;

    enrich_with_dependency_metadata(ctx, &absolute_archive, delta_dependencies, partial_narinfos)
        .await?;

    ctx.backend
        .import_from_archive(&absolute_archive, &item.nix_path, ctx.target_store_root)
        .await
        .map_err(|err| InstructionError::ImportFailed {
            path: item.nix_path.clone(),
            reason: err.to_string(),
        })?;

    ctx.client_state.import_info_files(&e_before)?;

    Ok(())
}

async fn enrich_with_dependency_metadata<B: StoreBackend>(
    ctx: &ExecuteContext<'_, B>,
    absolute_archive: &Path,
    delta_dependencies: &[StoreRoot],
    partial_narinfos: bool,
) -> Result<()> {
    if delta_dependencies.is_empty() {
        return Ok(());
    }

    let dep_roots: Vec<StorePath> = delta_dependencies
        .iter()
        .map(|root| root.nix_path.clone())
        .collect();
    let closure: Vec<StorePath> = ctx
        .backend
        .query_path_info(ctx.target_store_root, &dep_roots)
        .await
        .map_err(wrap_backend_error)?
        .into_iter()
        .map(|info| info.path)
        .collect();

    for path in &closure {
        let found = ctx.client_state.list_info_files(std::slice::from_ref(path))?;
        let Some(info_file) = found.into_iter().next() else {
            if partial_narinfos {
                return Err(InstructionError::MissingDependencyMetadata { path: path.clone() });
            }
            continue;
        };
        let dest = absolute_archive.join(info_file.file_name().expect("narinfo file has a name"));
        fs::copy(&info_file, &dest).io_context(&dest)?;
    }

    Ok(())
}

async fn execute_switch<B: StoreBackend>(
    ctx: &ExecuteContext<'_, B>,
    item: &StoreRoot,
    mode: ActivationMode,
) -> Result<()> {
    // The reference contract hard-codes activation at "/"; `target_store_root`
    // only governs where imports land, not where a generation is activated.
    ctx.backend
        .activate_generation(Path::new("/"), &item.nix_path, mode)
        .await
        .map_err(|err| InstructionError::ActivationFailed {
            path: item.nix_path.clone(),
            reason: err.to_string(),
        })?;

    ctx.generation_history
        .append(item.clone(), mode, time::OffsetDateTime::now_utc())
        .map_err(InstructionError::from)
}

fn list_narinfo_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    if !dir.exists() {
        return Ok(out);
    }
    for entry in fs::read_dir(dir).io_context(dir)? {
        let entry = entry.io_context(dir)?;
        let path = entry.path();
        if path.extension().map(|ext| ext == "narinfo").unwrap_or(false) {
            out.push(path);
        }
    }
    out.sort();
    Ok(out)
}
