//! CLI argument definitions: top-level `Cli` struct and `Commands` enum.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use tockcert_csp::LIBRARY_FILE;

#[derive(Parser)]
#[command(name = "tockcert")]
#[command(about = "Compile interaction contracts to CSP-M for refinement checking")]
#[command(version)]
pub(crate) struct Cli {
    #[command(subcommand)]
    pub(crate) command: Commands,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Generate CSP-M for a contract package
    Generate {
        /// JSON document holding `components` and `package`
        file: PathBuf,

        /// Output file (defaults to stdout)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,

        /// Fixed timestamp for the provenance header
        #[arg(long)]
        timestamp: Option<String>,

        /// Copy the combinator library into the output instead of including it
        #[arg(long, default_value_t = false)]
        embed_library: bool,

        /// Path generated files include the combinator library by
        #[arg(long, default_value = LIBRARY_FILE)]
        library_path: String,

        /// Emit plain CSP (`STOP`) instead of tock-CSP
        #[arg(long, default_value_t = false)]
        untimed: bool,

        /// Module that qualifies constants no instantiation fixes
        #[arg(long, default_value = "instantiations")]
        definitions_module: String,

        /// File included to bring the definitions module into scope
        #[arg(long, default_value = "instantiations.csp")]
        definitions_file: String,
    },

    /// Write the combinator library generated files rely on
    Library {
        /// Output file (defaults to stdout)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,

        /// List the defined names instead of the library text
        #[arg(long, default_value_t = false)]
        names: bool,
    },
}
