use std::path::PathBuf;

use convoy_cache::GenerationHistory;
use convoy_core::{ActivationMode, GitRevision, StoreBackend};
use convoy_instruction::{build_instruction, execute_instruction, BuildRequest, ExecuteRequest};
use convoy_store::ProcessStoreBackend;

use crate::cli::{ApplyInstructionArgs, BuildInstructionArgs, ListGenerationsArgs};
use crate::config::{resolve, FileConfig};
use crate::error::{CliError, Result};

const DEFAULT_STORE_ROOT: &str = "/";
const DEFAULT_CLIENT_STATE: &str = "/var/lib/convoy/client-state";

async fn resolved_revision(
    backend: &ProcessStoreBackend,
    flake_uri: &str,
    reference: Option<&str>,
) -> Result<GitRevision> {
    let resolved = backend
        .resolve_revision(flake_uri, reference)
        .await
        .map_err(|err| CliError::Instruction(convoy_instruction::InstructionError::StoreBackend(err.to_string())))?;
    Ok(resolved)
}

pub async fn run_build_instruction(args: BuildInstructionArgs, config: &FileConfig) -> Result<()> {
    let flake_uri = args
        .flake_uri
        .or_else(|| config.flake_uri.clone())
        .ok_or(CliError::MissingValue { flag: "--flake-uri" })?;
    let hostname = args
        .hostname
        .or_else(|| config.hostname.clone())
        .ok_or(CliError::MissingValue { flag: "--hostname" })?;

    let backend = ProcessStoreBackend::new();

    let mut past_revs = Vec::with_capacity(args.past_rev.len());
    for reference in &args.past_rev {
        past_revs.push(resolved_revision(&backend, &flake_uri, Some(reference)).await?);
    }
    let new_rev = resolved_revision(&backend, &flake_uri, args.new_rev.as_deref()).await?;

    build_instruction(
        &backend,
        &BuildRequest {
            flake_uri: &flake_uri,
            hostname: &hostname,
            past_revs: &past_revs,
            new_rev: &new_rev,
            partial_narinfos: args.partial_narinfos,
            mode: ActivationMode::from(args.mode),
        },
        &args.out,
    )
    .await
    .map_err(CliError::from)?;

    tracing::info!(out = %args.out.display(), "instruction written");
    Ok(())
}

pub async fn run_apply_instruction(args: ApplyInstructionArgs, config: &FileConfig) -> Result<()> {
    let store: PathBuf = resolve(
        args.store,
        config.store_dir.clone(),
        PathBuf::from(DEFAULT_STORE_ROOT),
    );
    let client_state: PathBuf = resolve(
        args.client_state,
        config.client_state.clone(),
        PathBuf::from(DEFAULT_CLIENT_STATE),
    );

    let backend = ProcessStoreBackend::new();
    execute_instruction(
        &backend,
        &ExecuteRequest {
            instruction_file: &args.instruction,
            target_store_root: &store,
            client_state_dir: &client_state,
            workdir_base: args.workdir.as_deref(),
        },
    )
    .await
    .map_err(CliError::from)?;

    tracing::info!("instruction applied");
    Ok(())
}

pub fn run_list_generations(args: ListGenerationsArgs, config: &FileConfig) -> Result<()> {
    let client_state: PathBuf = resolve(
        args.client_state,
        config.client_state.clone(),
        PathBuf::from(DEFAULT_CLIENT_STATE),
    );

    let history = GenerationHistory::new(&client_state);
    for record in history.list().map_err(CliError::from)? {
        println!(
            "{}\t{}\t{}",
            record.applied_at,
            record.item.nix_path.as_str(),
            activation_mode_label(record.mode),
        );
    }
    Ok(())
}

fn activation_mode_label(mode: ActivationMode) -> &'static str {
    match mode {
        ActivationMode::Immediate => "immediate",
        ActivationMode::NextReboot => "next-reboot",
    }
}
