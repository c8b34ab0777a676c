#![doc = include_str!("../README.md")]

//! Compilation pipeline from interaction contracts to CSP-M.
//!
//! [`generate`] is the entry point: it optimises every message set of the
//! package in place, then renders one CSP-M file holding a module per group,
//! the named message sets and the package assertions.

pub mod actors;
pub mod algebra;
pub mod bindings;
pub mod errors;
pub mod fragments;
pub mod instantiation;
pub mod library;
mod package;
pub mod render;

#[cfg(any(test, feature = "proptest"))]
pub mod proptest_generators;

pub use errors::{CompileError, CompileResult, Site};
pub use library::{LIBRARY, LIBRARY_FILE};

use tockcert_model::{ComponentModel, Package};

/// How generated files obtain the combinator library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LibraryMode {
    /// `include` the library file at this path.
    Include(String),
    /// Copy the library text into the output.
    Embed,
}

/// The externally supplied unit defining constants no instantiation fixes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalUnit {
    /// Module name unfixed constants are qualified with.
    pub module: String,
    /// File included to bring the module into scope.
    pub file: String,
}

impl Default for ExternalUnit {
    fn default() -> Self {
        Self {
            module: "instantiations".to_string(),
            file: "instantiations.csp".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GeneratorOptions {
    /// Tool name written into the provenance header.
    pub tool_name: String,
    /// Fixed generation timestamp; the current time when absent.
    pub timestamp: Option<String>,
    pub library: LibraryMode,
    pub external_definitions: ExternalUnit,
    /// Emit tock-CSP (`TSTOP`, `TockUniverse`); plain CSP `STOP` otherwise.
    pub timed: bool,
}

impl Default for GeneratorOptions {
    fn default() -> Self {
        Self {
            tool_name: "tockcert".to_string(),
            timestamp: None,
            library: LibraryMode::Include(LIBRARY_FILE.to_string()),
            external_definitions: ExternalUnit::default(),
            timed: true,
        }
    }
}

/// Provenance metadata written as the two-line header of generated files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Provenance {
    pub tool: String,
    pub version: String,
    pub timestamp: String,
}

impl Provenance {
    pub fn for_options(options: &GeneratorOptions) -> Self {
        Self {
            tool: options.tool_name.clone(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: options
                .timestamp
                .clone()
                .unwrap_or_else(|| chrono::Utc::now().to_rfc3339()),
        }
    }
}

/// Generate the CSP-M file of a package.
///
/// # Parameters
/// - `package`: Contract package; its message sets are optimised in place.
/// - `model`: Component model the package's targets live in.
/// - `options`: Output configuration.
///
/// # Returns
/// CSP-M text including the provenance header, or the first compile error.
pub fn generate<M: ComponentModel + ?Sized>(
    package: &mut Package,
    model: &M,
    options: &GeneratorOptions,
) -> CompileResult<String> {
    let provenance = Provenance::for_options(options);
    generate_with_provenance(package, model, options, &provenance)
}

/// Like [`generate`], with explicit provenance metadata.
pub fn generate_with_provenance<M: ComponentModel + ?Sized>(
    package: &mut Package,
    model: &M,
    options: &GeneratorOptions,
    provenance: &Provenance,
) -> CompileResult<String> {
    package::generate_package(package, model, options, provenance)
}
