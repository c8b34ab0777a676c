#![doc = include_str!("../README.md")]

mod cli;
mod commands;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};
use commands::generate::GenerateFlags;

fn main() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Generate {
            file,
            output,
            timestamp,
            embed_library,
            library_path,
            untimed,
            definitions_module,
            definitions_file,
        } => commands::generate::run_generate_command(
            file,
            output,
            GenerateFlags {
                timestamp,
                embed_library,
                library_path,
                untimed,
                definitions_module,
                definitions_file,
            },
        ),
        Commands::Library { output, names } => {
            commands::library::run_library_command(output, names)
        }
    }
}
