use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Debug, Parser)]
#[command(name = "convoy", about = "Build and apply store-update instructions", version)]
pub struct Cli {
    /// Increase log verbosity; repeat for more (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: SubCommand,
}

#[derive(Debug, Subcommand)]
pub enum SubCommand {
    /// Build a compressed instruction for one flake output at one revision.
    BuildInstruction(BuildInstructionArgs),
    /// Decompress, validate, and run an instruction against a target store.
    ApplyInstruction(ApplyInstructionArgs),
    /// List the generations recorded in a client-state cache.
    ListGenerations(ListGenerationsArgs),
}

#[derive(Debug, clap::Args)]
pub struct BuildInstructionArgs {
    /// Flake URI the toplevel configuration is built from.
    #[arg(long)]
    pub flake_uri: Option<String>,

    /// `nixosConfigurations` key the toplevel is built for.
    #[arg(long)]
    pub hostname: Option<String>,

    /// Revision(s) assumed already present on the target, oldest first.
    /// May be repeated; pass a bare ref (e.g. `main`) or a full commit id.
    #[arg(long = "past-rev")]
    pub past_rev: Vec<String>,

    /// Revision to build and switch to. Defaults to the flake's default
    /// branch if omitted.
    #[arg(long = "new-rev")]
    pub new_rev: Option<String>,

    /// Whether this instruction's `Load` ships only the added paths'
    /// `.narinfo` files (true) or the full closure's (false).
    #[arg(long, default_value_t = true)]
    pub partial_narinfos: bool,

    /// When the target should switch to the new generation.
    #[arg(long, value_enum, default_value = "immediate")]
    pub mode: ActivationModeArg,

    /// Where to write the compressed instruction.
    #[arg(long)]
    pub out: PathBuf,
}

#[derive(Debug, clap::Args)]
pub struct ApplyInstructionArgs {
    /// Path to the compressed instruction to apply.
    #[arg(long)]
    pub instruction: PathBuf,

    /// Scratch directory the instruction is decompressed under. Defaults to
    /// the system temp directory.
    #[arg(long)]
    pub workdir: Option<PathBuf>,

    /// Root the instruction's store operations are applied under.
    #[arg(long)]
    pub store: Option<PathBuf>,

    /// Client-state cache directory.
    #[arg(long)]
    pub client_state: Option<PathBuf>,
}

#[derive(Debug, clap::Args)]
pub struct ListGenerationsArgs {
    /// Client-state cache directory to read generation history from.
    #[arg(long)]
    pub client_state: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "kebab-case")]
pub enum ActivationModeArg {
    Immediate,
    NextReboot,
}

impl From<ActivationModeArg> for convoy_core::ActivationMode {
    fn from(mode: ActivationModeArg) -> Self {
        match mode {
            ActivationModeArg::Immediate => convoy_core::ActivationMode::Immediate,
            ActivationModeArg::NextReboot => convoy_core::ActivationMode::NextReboot,
        }
    }
}
