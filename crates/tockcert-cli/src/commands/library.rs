// Command handler for: Library

use std::path::PathBuf;

use tockcert_csp::library::defined_names;
use tockcert_csp::LIBRARY;

use super::write_output;

/// Run the `library` CLI command.
pub(crate) fn run_library_command(output: Option<PathBuf>, names: bool) -> miette::Result<()> {
    if names {
        let mut text = defined_names().join("\n");
        text.push('\n');
        write_output(output.as_deref(), &text)
    } else {
        write_output(output.as_deref(), LIBRARY)
    }
}
