mod cli;
mod commands;
mod config;
mod error;
mod logging;

use clap::Parser;

use cli::{Cli, SubCommand};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let file_config = match config::load() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        SubCommand::BuildInstruction(args) => commands::run_build_instruction(args, &file_config).await,
        SubCommand::ApplyInstruction(args) => commands::run_apply_instruction(args, &file_config).await,
        SubCommand::ListGenerations(args) => commands::run_list_generations(args, &file_config),
    };

    if let Err(err) = result {
        eprintln!("error: {err}");
        std::process::exit(err.exit_code());
    }
}
