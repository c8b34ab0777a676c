// Command handler for: Generate
//
// Reads a JSON document holding a component model and a contract package and
// writes the CSP-M file of the package.

use std::fs;
use std::path::{Path, PathBuf};

use miette::{IntoDiagnostic, WrapErr};
use serde::Deserialize;
use tracing::debug;

use tockcert_csp::{ExternalUnit, GeneratorOptions, LibraryMode};
use tockcert_model::{ComponentGraph, Package};

use super::write_output;

/// Input accepted by `tockcert generate`.
#[derive(Debug, Deserialize)]
pub(crate) struct Document {
    pub(crate) components: ComponentGraph,
    pub(crate) package: Package,
}

/// Flags of the `generate` subcommand that shape the output.
#[derive(Debug, Clone)]
pub(crate) struct GenerateFlags {
    pub(crate) timestamp: Option<String>,
    pub(crate) embed_library: bool,
    pub(crate) library_path: String,
    pub(crate) untimed: bool,
    pub(crate) definitions_module: String,
    pub(crate) definitions_file: String,
}

pub(crate) fn options_from_flags(flags: GenerateFlags) -> GeneratorOptions {
    let library = if flags.embed_library {
        LibraryMode::Embed
    } else {
        LibraryMode::Include(flags.library_path)
    };
    GeneratorOptions {
        timestamp: flags.timestamp,
        library,
        external_definitions: ExternalUnit {
            module: flags.definitions_module,
            file: flags.definitions_file,
        },
        timed: !flags.untimed,
        ..GeneratorOptions::default()
    }
}

pub(crate) fn read_document(file: &Path) -> miette::Result<Document> {
    let source = fs::read_to_string(file)
        .into_diagnostic()
        .wrap_err_with(|| format!("reading {}", file.display()))?;
    serde_json::from_str(&source)
        .into_diagnostic()
        .wrap_err_with(|| format!("{} is not a valid contract document", file.display()))
}

/// Run the `generate` CLI command.
pub(crate) fn run_generate_command(
    file: PathBuf,
    output: Option<PathBuf>,
    flags: GenerateFlags,
) -> miette::Result<()> {
    let mut document = read_document(&file)?;
    debug!(
        nodes = document.components.nodes.len(),
        groups = document.package.groups.len(),
        "Loaded contract document"
    );
    let options = options_from_flags(flags);
    let csp = tockcert_csp::generate(&mut document.package, &document.components, &options)?;
    write_output(output.as_deref(), &csp)
}
