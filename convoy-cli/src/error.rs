use thiserror::Error;

use convoy_cache::CacheError;
use convoy_instruction::{ExitCategory, InstructionError};

use crate::config::ConfigError;

pub type Result<T> = std::result::Result<T, CliError>;

#[derive(Error, Debug)]
pub enum CliError {
    #[error(transparent)]
    Instruction(#[from] InstructionError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("{flag} is required (pass it as a flag or set it in convoy.toml)")]
    MissingValue { flag: &'static str },
}

impl CliError {
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Instruction(err) => match err.exit_category() {
                ExitCategory::Generic => 1,
                ExitCategory::InvalidInput => 2,
                ExitCategory::ExternalFailure => 3,
            },
            CliError::MissingValue { .. } => 2,
            CliError::Cache(_) | CliError::Config(_) => 1,
        }
    }
}
