//! The instruction: an ordered command list plus top-level metadata, and the
//! build/validate/execute pipelines that produce and consume it.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tempfile::TempDir;

use convoy_cache::{ClientStateStore, GenerationHistory};
use convoy_core::{ActivationMode, GitRevision, StoreBackend};

use crate::command::{build_load, build_switch, execute_command, BuildContext, Command, ExecuteContext};
use crate::compress::{compress_dir_to_file, decompress_file_to_dir};
use crate::error::{InstructionError, IoContext, Result};

const INSTRUCTION_FILE_NAME: &str = "instruction.json";
const ARCHIVE_FOLDER_NAME: &str = "archive";

/// The top-level document written to `instruction.json`: an ordered command
/// list plus a `kind` discriminator fixed to `"switch"`, matching the
/// instruction-level wire shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instruction {
    pub kind: InstructionKind,
    pub commands: Vec<Command>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstructionKind {
    Switch,
}

/// Inputs to [`build_instruction`].
pub struct BuildRequest<'a> {
    pub flake_uri: &'a str,
    pub hostname: &'a str,
    pub past_revs: &'a [GitRevision],
    pub new_rev: &'a GitRevision,
    pub partial_narinfos: bool,
    pub mode: ActivationMode,
}

/// Builds a complete instruction for `request` and writes the compressed
/// result to `destination_path`.
///
/// Creates a temporary workdir holding an empty store directory and an
/// empty working archive directory, builds one `Load` plus one `Switch`
/// command into it, writes `instruction.json`, compresses the workdir, and
/// removes it.
pub async fn build_instruction<B: StoreBackend>(
    backend: &B,
    request: &BuildRequest<'_>,
    destination_path: &Path,
) -> Result<()> {
    let workdir = TempDir::new().io_context(std::env::temp_dir())?;
    let store_dir = workdir.path().join("store");
    let archive_dir = workdir.path().join("archive-work");
    let instruction_dir = workdir.path().join("instruction");
    fs::create_dir_all(&store_dir).io_context(&store_dir)?;
    fs::create_dir_all(&archive_dir).io_context(&archive_dir)?;
    fs::create_dir_all(&instruction_dir).io_context(&instruction_dir)?;

    let ctx = BuildContext {
        backend,
        flake_uri: request.flake_uri,
        hostname: request.hostname,
        store_dir: &store_dir,
        archive_dir: &archive_dir,
        instruction_dir: &instruction_dir,
    };

    let load = build_load(
        &ctx,
        request.new_rev,
        request.past_revs,
        ARCHIVE_FOLDER_NAME,
        request.partial_narinfos,
    )
    .await?;
    let switch = build_switch(&ctx, request.new_rev, request.mode).await?;

    let instruction = Instruction {
        kind: InstructionKind::Switch,
        commands: vec![load, switch],
    };
    let instruction_json_path = instruction_dir.join(INSTRUCTION_FILE_NAME);
    let serialized = serde_json::to_string_pretty(&instruction).map_err(|source| InstructionError::Json {
        path: instruction_json_path.clone(),
        source,
    })?;
    fs::write(&instruction_json_path, serialized).io_context(&instruction_json_path)?;

    compress_dir_to_file(&instruction_dir, destination_path)?;

    Ok(())
}

/// Parses `instruction.json` and checks structural invariants:
/// - every command's `kind` discriminator is one this crate recognizes;
/// - at most one `Switch` command, and it must be last;
/// - every `Load.archivePath` is a single path segment, unique across the
///   instruction's `Load`s, and exists as a directory under
///   `instruction_dir`;
/// - every `StoreRoot` that this instruction itself also produces as the
///   `item` of some `Load` must, wherever referenced elsewhere in the same
///   instruction (as a later `Load`'s delta dependency or as the `Switch`'s
///   item), be referenced only by a *later* position - i.e. the producing
///   `Load` must come first. A reference to a `StoreRoot` this instruction
///   never produces is presumed already present on the target and is not
///   rejected here; that presumption is checked operationally at execute
///   time (`MissingDependencyMetadata`, `ImportFailed`, `ActivationFailed`).
pub fn assert_instruction_dir_valid(instruction_dir: &Path) -> Result<Instruction> {
    let instruction_json_path = instruction_dir.join(INSTRUCTION_FILE_NAME);
    let raw = fs::read_to_string(&instruction_json_path).io_context(&instruction_json_path)?;

    // `Command` is an internally-tagged enum: an unrecognized `kind` fails
    // inside the typed parse below and would surface as a generic `Json`
    // error, never as `UnknownCommandKind`. Check the discriminator against
    // a raw `Value` first so an unknown kind gets its documented variant.
    let value: serde_json::Value = serde_json::from_str(&raw).map_err(|source| InstructionError::Json {
        path: instruction_json_path.clone(),
        source,
    })?;
    if let Some(commands) = value.get("commands").and_then(serde_json::Value::as_array) {
        for command in commands {
            if let Some(kind) = command.get("kind").and_then(serde_json::Value::as_str) {
                if kind != "load" && kind != "switch" {
                    return Err(InstructionError::UnknownCommandKind {
                        kind: kind.to_string(),
                    });
                }
            }
        }
    }

    let instruction: Instruction = serde_json::from_value(value).map_err(|source| InstructionError::Json {
        path: instruction_json_path.clone(),
        source,
    })?;

    let switch_positions: Vec<usize> = instruction
        .commands
        .iter()
        .enumerate()
        .filter(|(_, c)| matches!(c, Command::Switch { .. }))
        .map(|(i, _)| i)
        .collect();
    if switch_positions.len() > 1 {
        return Err(InstructionError::InvalidInstruction {
            reason: "at most one switch command is allowed".to_string(),
        });
    }
    if let Some(&position) = switch_positions.first() {
        if position != instruction.commands.len() - 1 {
            return Err(InstructionError::InvalidInstruction {
                reason: "switch must be last".to_string(),
            });
        }
    }

    let mut seen_archive_paths = HashSet::new();
    for command in &instruction.commands {
        if let Command::Load { archive_path, .. } = command {
            if !is_single_path_segment(archive_path) {
                return Err(InstructionError::InvalidInstruction {
                    reason: format!("load archivePath {archive_path:?} must be a single path segment"),
                });
            }
            if !seen_archive_paths.insert(archive_path.as_str()) {
                return Err(InstructionError::InvalidInstruction {
                    reason: format!("load archivePath {archive_path:?} is used by more than one load"),
                });
            }
            let path = instruction_dir.join(archive_path);
            if !path.is_dir() {
                return Err(InstructionError::InvalidInstruction {
                    reason: format!("load archivePath {archive_path:?} is not a directory"),
                });
            }
        }
    }

    let produced_at: std::collections::HashMap<_, usize> = instruction
        .commands
        .iter()
        .enumerate()
        .filter_map(|(i, c)| match c {
            Command::Load { item, .. } => Some((item.clone(), i)),
            Command::Switch { .. } => None,
        })
        .collect();

    for (position, command) in instruction.commands.iter().enumerate() {
        let references = match command {
            Command::Load {
                delta_dependencies, ..
            } => delta_dependencies.clone(),
            Command::Switch { item, .. } => vec![item.clone()],
        };
        for reference in references {
            if let Some(&produced_position) = produced_at.get(&reference) {
                if produced_position >= position {
                    return Err(InstructionError::InvalidInstruction {
                        reason: format!(
                            "{:?} is referenced before the load that produces it",
                            reference.nix_path
                        ),
                    });
                }
            }
        }
    }

    Ok(instruction)
}

/// True if `archive_path` is exactly one path segment: no separator of
/// either flavor and not a `.`/`..` traversal component. Rejects anything
/// that could resolve outside `instruction_dir` when joined to it.
fn is_single_path_segment(archive_path: &str) -> bool {
    !archive_path.is_empty()
        && !archive_path.contains('/')
        && !archive_path.contains('\\')
        && archive_path != "."
        && archive_path != ".."
}

/// Inputs to [`execute_instruction`].
pub struct ExecuteRequest<'a> {
    pub instruction_file: &'a Path,
    pub target_store_root: &'a Path,
    pub client_state_dir: &'a Path,
    /// Directory the scratch decompression workdir is created under.
    /// `None` uses the system temp directory.
    pub workdir_base: Option<&'a Path>,
}

/// Decompresses `request.instruction_file` into a scratch directory,
/// validates it, then runs its commands against `backend` in order,
/// aborting on the first failure. The scratch directory is removed on
/// success and preserved (for forensic inspection) on failure.
pub async fn execute_instruction<B: StoreBackend>(backend: &B, request: &ExecuteRequest<'_>) -> Result<()> {
    let workdir = match request.workdir_base {
        Some(base) => {
            fs::create_dir_all(base).io_context(base)?;
            tempfile::Builder::new()
                .prefix("convoy-apply-")
                .tempdir_in(base)
                .io_context(base)?
        }
        None => TempDir::new().io_context(std::env::temp_dir())?,
    };
    decompress_file_to_dir(request.instruction_file, workdir.path())?;

    match run_instruction(backend, request, workdir.path()).await {
        Ok(()) => {
            // `TempDir`'s drop removes the directory; nothing else to do.
            Ok(())
        }
        Err(err) => {
            let path = workdir.keep();
            tracing::warn!(workdir = %path.display(), %err, "instruction execution failed; workdir preserved");
            Err(err)
        }
    }
}

async fn run_instruction<B: StoreBackend>(
    backend: &B,
    request: &ExecuteRequest<'_>,
    workdir: &Path,
) -> Result<()> {
    let instruction = assert_instruction_dir_valid(workdir)?;
    let client_state = ClientStateStore::open(request.client_state_dir)?;
    let generation_history = GenerationHistory::new(request.client_state_dir);

    let ctx = ExecuteContext {
        backend,
        target_store_root: request.target_store_root,
        client_state: &client_state,
        generation_history: &generation_history,
        instruction_dir: workdir,
    };

    for command in &instruction.commands {
        execute_command(&ctx, command).await?;
    }

    Ok(())
}
