//! Error types for EJS template transformation

use miette::Diagnostic;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, EjsError>;

/// Errors that can occur while transforming an EJS template
///
/// None of these are recovered from inside the plugin. They propagate to the
/// bundler, which fails the build for the offending template.
#[derive(Error, Debug, Diagnostic)]
pub enum EjsError {
    /// A `<link rel="stylesheet">` points at a file that does not exist
    #[error("Stylesheet '{href}' referenced from {template} not found at {}", path.display())]
    #[diagnostic(
        code(fob::ejs::style_not_found),
        help("Stylesheet hrefs are resolved relative to the template's directory")
    )]
    StyleNotFound {
        template: String,
        href: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The stylesheet exists but could not be read
    #[error("Failed to read stylesheet {}: {source}", path.display())]
    #[diagnostic(code(fob::ejs::style_read))]
    StyleRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// No loader is registered for the stylesheet's extension
    #[error("No style loader registered for '.{extension}' files ({})", path.display())]
    #[diagnostic(
        code(fob::ejs::unsupported_style),
        help("Supported stylesheet extensions: .css, .scss, .sass")
    )]
    UnsupportedStyle { extension: String, path: PathBuf },

    /// The Sass compiler rejected a stylesheet
    #[error("Failed to compile stylesheet {}: {message}", path.display())]
    #[diagnostic(code(fob::ejs::style_compile))]
    StyleCompile { path: PathBuf, message: String },

    /// The template could not be compiled
    #[error("Template syntax error in {filename}: {message}")]
    #[diagnostic(code(fob::ejs::syntax))]
    TemplateSyntax { filename: String, message: String },

    /// Executing the compiled template with render data failed
    #[error("Failed to render {filename}: {message}")]
    #[diagnostic(
        code(fob::ejs::render),
        help("Check that every variable used by the template is present in render.data")
    )]
    Render { filename: String, message: String },

    /// The HTML minifier produced output that is not valid UTF-8
    #[error("Failed to minify rendered HTML of {filename}: {message}")]
    #[diagnostic(code(fob::ejs::minify))]
    Minify { filename: String, message: String },

    /// A compiler option has an unusable value
    #[error("Invalid compiler option `{option}`: {reason}")]
    #[diagnostic(code(fob::ejs::invalid_option))]
    InvalidOption { option: &'static str, reason: String },

    /// An include/exclude pattern is not a valid glob
    #[error("Invalid file pattern '{pattern}': {source}")]
    #[diagnostic(code(fob::ejs::invalid_pattern))]
    InvalidPattern {
        pattern: String,
        #[source]
        source: globset::Error,
    },

    /// Plugin options could not be loaded
    #[error("Invalid EJS plugin configuration: {message}")]
    #[diagnostic(code(fob::ejs::config))]
    Config {
        message: String,
        #[help]
        hint: Option<String>,
    },
}

impl EjsError {
    pub fn template_syntax(filename: impl Into<String>, message: impl Into<String>) -> Self {
        Self::TemplateSyntax {
            filename: filename.into(),
            message: message.into(),
        }
    }

    pub fn render(filename: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Render {
            filename: filename.into(),
            message: message.into(),
        }
    }

    pub fn invalid_option(option: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidOption {
            option,
            reason: reason.into(),
        }
    }

    pub fn config(message: impl Into<String>, hint: Option<String>) -> Self {
        Self::Config {
            message: message.into(),
            hint,
        }
    }

    /// Whether this error came from a missing stylesheet
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::StyleNotFound { .. })
    }
}
