pub(crate) mod generate;
pub(crate) mod library;

use std::fs;
use std::path::Path;

use miette::{IntoDiagnostic, WrapErr};

/// Write `text` to `output`, or to stdout when no path is given.
pub(crate) fn write_output(output: Option<&Path>, text: &str) -> miette::Result<()> {
    match output {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)
                    .into_diagnostic()
                    .wrap_err_with(|| format!("creating {}", parent.display()))?;
            }
            fs::write(path, text)
                .into_diagnostic()
                .wrap_err_with(|| format!("writing {}", path.display()))?;
            tracing::info!(path = %path.display(), bytes = text.len(), "Wrote output");
        }
        None => print!("{text}"),
    }
    Ok(())
}
