//! EJS template compilation
//!
//! Templates are compiled in three steps:
//!
//! ```text
//! template text → scanner (tags → nodes) → codegen (JS function source) → oxc parse check
//! ```
//!
//! The parse check catches malformed scriptlets (`<% if (x { %>`) at build
//! time, where EJS itself would throw a `SyntaxError` while compiling.

mod codegen;
mod scanner;

use once_cell::sync::Lazy;
use oxc_allocator::Allocator;
use oxc_parser::Parser;
use oxc_span::SourceType;
use regex::Regex;
use serde_json::Value;
use tracing::trace;

use crate::config::ResolvedCompilerOptions;
use crate::error::{EjsError, Result};

pub(crate) use codegen::{ESCAPE_FN, RETHROW_FN};

static JS_IDENTIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z_$][0-9a-zA-Z_$]*$").unwrap());

/// Whether `name` can be used as a plain JS identifier
pub(crate) fn is_identifier(name: &str) -> bool {
    JS_IDENTIFIER.is_match(name)
}

/// A compiled template
///
/// Holds the generated function source. It can be exported as is (client
/// mode) or executed immediately with [`CompiledTemplate::render`].
///
/// # Example
///
/// ```rust
/// use fob_plugin_ejs::{CompiledTemplate, CompilerOptions};
///
/// let options = CompilerOptions::new().resolve();
/// let template = CompiledTemplate::compile("<p><%= locals.name %></p>", "hello.ejs", &options)?;
/// assert!(template.source().starts_with("function anonymous(locals"));
/// # Ok::<(), fob_plugin_ejs::EjsError>(())
/// ```
#[derive(Debug, Clone)]
pub struct CompiledTemplate {
    source: String,
    filename: String,
}

impl CompiledTemplate {
    /// Compile template text
    ///
    /// # Errors
    ///
    /// - [`EjsError::TemplateSyntax`] for unclosed tags or generated code that
    ///   does not parse
    /// - [`EjsError::InvalidOption`] for unusable identifiers or delimiters
    pub fn compile(
        template: &str,
        filename: &str,
        options: &ResolvedCompilerOptions,
    ) -> Result<Self> {
        let nodes = scanner::scan(template, options, filename)?;
        let source = codegen::generate(&nodes, options, template, filename)?;

        validate_source(&source, filename)?;

        trace!(
            "[fob-ejs] Compiled {} ({} nodes, {} bytes of JS)",
            filename,
            nodes.len(),
            source.len()
        );

        Ok(Self {
            source,
            filename: filename.to_string(),
        })
    }

    /// The generated `function anonymous(...) { ... }` source
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn into_source(self) -> String {
        self.source
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Execute the template with `data` as its locals
    pub fn render(&self, data: &Value) -> Result<String> {
        crate::render::execute(self, data)
    }
}

/// Parse the generated function to surface scriptlet syntax errors
fn validate_source(source: &str, filename: &str) -> Result<()> {
    let allocator = Allocator::default();
    let wrapped = format!("({})", source);
    let ret = Parser::new(&allocator, &wrapped, SourceType::cjs()).parse();

    if let Some(error) = ret.errors.first() {
        return Err(EjsError::template_syntax(
            filename,
            format!("{} while compiling ejs", error),
        ));
    }
    if ret.panicked {
        return Err(EjsError::template_syntax(
            filename,
            "Unrecoverable parse error while compiling ejs",
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CompilerOptions;

    #[test]
    fn test_is_identifier() {
        assert!(is_identifier("locals"));
        assert!(is_identifier("_x$1"));
        assert!(!is_identifier("1x"));
        assert!(!is_identifier("a-b"));
        assert!(!is_identifier(""));
    }

    #[test]
    fn test_compile_valid_template() {
        let options = CompilerOptions::new().resolve();
        let template =
            CompiledTemplate::compile("<ul><% for (const i of locals.items) { %><li><%= i %></li><% } %></ul>", "list.ejs", &options)
                .unwrap();
        assert_eq!(template.filename(), "list.ejs");
        assert!(template.source().contains("for (const i of locals.items) {"));
    }

    #[test]
    fn test_compile_non_strict_with_block_parses() {
        let options = CompilerOptions::new().with_strict(false).resolve();
        assert!(CompiledTemplate::compile("<%= name %>", "t.ejs", &options).is_ok());
    }

    #[test]
    fn test_malformed_scriptlet_is_syntax_error() {
        let options = CompilerOptions::new().resolve();
        let err = CompiledTemplate::compile("<% if (a { %>x<% } %>", "bad.ejs", &options).unwrap_err();
        match err {
            EjsError::TemplateSyntax { filename, message } => {
                assert_eq!(filename, "bad.ejs");
                assert!(message.contains("while compiling ejs"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_trailing_line_comment_does_not_break_output() {
        let options = CompilerOptions::new().resolve();
        assert!(CompiledTemplate::compile("<%= 1 // one %>", "t.ejs", &options).is_ok());
    }
}
