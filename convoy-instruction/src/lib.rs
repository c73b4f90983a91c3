//! Command model, archive subsetting, and the build/execute pipelines for
//! store-update instructions: everything between "two revisions of a flake"
//! and "a generation switched on a target host".

mod archive;
mod command;
mod compress;
mod error;
mod instruction;

pub use archive::make_archive_subset;
pub use command::{
    build_load, build_switch, execute_command, BuildContext, Command, ExecuteContext,
};
pub use compress::{compress_dir_to_file, decompress_file_to_dir};
pub use error::{ExitCategory, InstructionError, Result};
pub use instruction::{
    assert_instruction_dir_valid, build_instruction, execute_instruction, BuildRequest,
    ExecuteRequest, Instruction, InstructionKind,
};
