//! Error types for the fob-ejs CLI.

use fob_plugin_ejs::EjsError;
use miette::Diagnostic;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, CliError>;

/// Top-level CLI error
#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    /// Errors from the plugin itself keep their diagnostic codes and help
    #[error(transparent)]
    #[diagnostic(transparent)]
    Ejs(#[from] EjsError),

    #[error("Template not found: {}", .path.display())]
    #[diagnostic(code(fob::ejs::cli::not_found))]
    TemplateNotFound {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The template does not match the configured include/exclude patterns
    #[error("{} is not matched by the configured include/exclude patterns", .0.display())]
    #[diagnostic(
        code(fob::ejs::cli::filtered),
        help("Templates must match `include` (default `**/*.ejs`) and no `exclude` pattern")
    )]
    Filtered(PathBuf),

    #[error("Invalid render data in {}: {source}", .path.display())]
    #[diagnostic(
        code(fob::ejs::cli::data),
        help("--data expects a JSON file")
    )]
    Data {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid argument: {0}")]
    #[diagnostic(code(fob::ejs::cli::argument))]
    InvalidArgument(String),

    #[error("I/O error on {}: {source}", .path.display())]
    #[diagnostic(code(fob::ejs::cli::io))]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
