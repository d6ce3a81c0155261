//! EJS plugin configuration types
//!
//! Options are accepted either through the builder methods or deserialized from
//! JSON/TOML. Keys use the camelCase spelling of the JavaScript plugin
//! (`inlineStyles`, `compilerOptions`, `render.minifierOptions`); the historical
//! `loadStyles` and `loadCss` names are accepted as aliases of `inlineStyles`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{EjsError, Result};

/// Include pattern used when none is configured
pub const DEFAULT_INCLUDE: &str = "**/*.ejs";

/// Configuration for the EJS plugin
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EjsPluginOptions {
    /// Glob patterns of templates to transform
    ///
    /// `None` means [`DEFAULT_INCLUDE`]. An explicitly empty list matches
    /// every file.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub include: Option<Vec<String>>,

    /// Glob patterns of files to leave alone. Exclusion wins over inclusion.
    pub exclude: Vec<String>,

    /// Replace `<link rel="stylesheet">` tags with the stylesheet contents
    #[serde(alias = "loadStyles", alias = "loadCss")]
    pub inline_styles: bool,

    /// Template compiler options, merged over [`CompilerOptions::defaults`]
    pub compiler_options: CompilerOptions,

    /// Render templates at build time instead of exporting a function
    #[serde(skip_serializing_if = "Option::is_none")]
    pub render: Option<RenderOptions>,

    /// Extra directories searched by the Sass compiler for `@import`/`@use`
    pub style_load_paths: Vec<PathBuf>,

    /// Directory relative include/exclude patterns are resolved against
    ///
    /// Defaults to the current directory when the plugin is created.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolve_base: Option<PathBuf>,
}

impl EjsPluginOptions {
    /// Create options with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an inclusion pattern (replaces the default `**/*.ejs`)
    pub fn include(mut self, pattern: impl Into<String>) -> Self {
        self.include.get_or_insert_with(Vec::new).push(pattern.into());
        self
    }

    /// Add an exclusion pattern
    pub fn exclude(mut self, pattern: impl Into<String>) -> Self {
        self.exclude.push(pattern.into());
        self
    }

    /// Enable or disable stylesheet inlining
    pub fn with_inline_styles(mut self, enabled: bool) -> Self {
        self.inline_styles = enabled;
        self
    }

    /// Set compiler options
    pub fn with_compiler_options(mut self, options: CompilerOptions) -> Self {
        self.compiler_options = options;
        self
    }

    /// Render templates at build time
    pub fn with_render(mut self, render: RenderOptions) -> Self {
        self.render = Some(render);
        self
    }

    /// Add a Sass load path
    pub fn with_style_load_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.style_load_paths.push(path.into());
        self
    }

    /// Set the base directory for relative patterns
    pub fn with_resolve_base(mut self, base: impl Into<PathBuf>) -> Self {
        self.resolve_base = Some(base.into());
        self
    }

    /// Include patterns in effect
    pub fn effective_include(&self) -> Vec<String> {
        match &self.include {
            Some(patterns) => patterns.clone(),
            None => vec![DEFAULT_INCLUDE.to_string()],
        }
    }

    /// Create from a `serde_json::Value`
    ///
    /// # Example
    ///
    /// ```
    /// use fob_plugin_ejs::EjsPluginOptions;
    /// use serde_json::json;
    ///
    /// let options = EjsPluginOptions::from_value(json!({
    ///     "loadStyles": true,
    ///     "compilerOptions": { "strict": false }
    /// }))
    /// .unwrap();
    ///
    /// assert!(options.inline_styles);
    /// assert_eq!(options.compiler_options.strict, Some(false));
    /// ```
    pub fn from_value(value: Value) -> Result<Self> {
        serde_json::from_value(value).map_err(|e| {
            EjsError::config(
                e.to_string(),
                Some("See EjsPluginOptions for the accepted keys".to_string()),
            )
        })
    }

    /// Parse options from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let toml_val: toml::Value = toml::from_str(content)
            .map_err(|e| EjsError::config(format!("Invalid TOML syntax: {}", e), None))?;

        let value = serde_json::to_value(toml_val).map_err(|e| {
            EjsError::config(format!("TOML to JSON conversion failed: {}", e), None)
        })?;

        Self::from_value(value)
    }

    /// Load options from a file
    ///
    /// `.json` files are read as JSON, `package.json` is read from its `ejs`
    /// field, anything else is parsed as TOML.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            EjsError::config(format!("Failed to read {}: {}", path.display(), e), None)
        })?;

        if path.file_name() == Some(OsStr::new("package.json")) {
            let parsed: Value = serde_json::from_str(&content)
                .map_err(|e| EjsError::config(format!("Invalid JSON: {}", e), None))?;
            return match parsed.get("ejs") {
                Some(value) if !value.is_null() => Self::from_value(value.clone()),
                _ => Err(EjsError::config(
                    "package.json has no 'ejs' field",
                    Some("Add an 'ejs' field to your package.json".to_string()),
                )),
            };
        }

        if path.extension() == Some(OsStr::new("json")) {
            let parsed: Value = serde_json::from_str(&content)
                .map_err(|e| EjsError::config(format!("Invalid JSON: {}", e), None))?;
            return Self::from_value(parsed);
        }

        Self::from_toml_str(&content)
    }
}

/// Template compiler options
///
/// Every field is optional; unset fields fall back to
/// [`CompilerOptions::defaults`] and then to the built-in EJS defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CompilerOptions {
    /// Embed runtime helpers so the generated function runs standalone
    #[serde(alias = "clientMode", skip_serializing_if = "Option::is_none")]
    pub client: Option<bool>,

    /// Emit `"use strict"` and never wrap the body in `with (locals)`
    #[serde(alias = "strictMode", skip_serializing_if = "Option::is_none")]
    pub strict: Option<bool>,

    /// Name of the data parameter (`locals`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locals_name: Option<String>,

    /// Strip all leading/trailing line whitespace and blank lines
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rm_whitespace: Option<bool>,

    /// Track template line numbers and annotate runtime errors
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compile_debug: Option<bool>,

    /// Expose the append function to scriptlets under this name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_function_name: Option<String>,

    /// Keys of `locals` bound as local variables
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destructured_locals: Option<Vec<String>>,

    /// Tag delimiter character (`%`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delimiter: Option<String>,

    /// Opening delimiter (`<`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub open_delimiter: Option<String>,

    /// Closing delimiter (`>`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub close_delimiter: Option<String>,
}

impl CompilerOptions {
    /// Create empty options
    pub fn new() -> Self {
        Self::default()
    }

    /// Plugin defaults: client mode and strict mode on
    pub fn defaults() -> Self {
        Self {
            client: Some(true),
            strict: Some(true),
            ..Self::default()
        }
    }

    pub fn with_client(mut self, enabled: bool) -> Self {
        self.client = Some(enabled);
        self
    }

    pub fn with_strict(mut self, enabled: bool) -> Self {
        self.strict = Some(enabled);
        self
    }

    pub fn with_locals_name(mut self, name: impl Into<String>) -> Self {
        self.locals_name = Some(name.into());
        self
    }

    pub fn with_rm_whitespace(mut self, enabled: bool) -> Self {
        self.rm_whitespace = Some(enabled);
        self
    }

    pub fn with_compile_debug(mut self, enabled: bool) -> Self {
        self.compile_debug = Some(enabled);
        self
    }

    pub fn with_output_function_name(mut self, name: impl Into<String>) -> Self {
        self.output_function_name = Some(name.into());
        self
    }

    pub fn with_destructured_locals(mut self, names: Vec<String>) -> Self {
        self.destructured_locals = Some(names);
        self
    }

    pub fn with_delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.delimiter = Some(delimiter.into());
        self
    }

    /// Overlay `other` on top of `self`; fields set in `other` win
    pub fn merged_with(&self, other: &CompilerOptions) -> CompilerOptions {
        CompilerOptions {
            client: other.client.or(self.client),
            strict: other.strict.or(self.strict),
            locals_name: other.locals_name.clone().or_else(|| self.locals_name.clone()),
            rm_whitespace: other.rm_whitespace.or(self.rm_whitespace),
            compile_debug: other.compile_debug.or(self.compile_debug),
            output_function_name: other
                .output_function_name
                .clone()
                .or_else(|| self.output_function_name.clone()),
            destructured_locals: other
                .destructured_locals
                .clone()
                .or_else(|| self.destructured_locals.clone()),
            delimiter: other.delimiter.clone().or_else(|| self.delimiter.clone()),
            open_delimiter: other
                .open_delimiter
                .clone()
                .or_else(|| self.open_delimiter.clone()),
            close_delimiter: other
                .close_delimiter
                .clone()
                .or_else(|| self.close_delimiter.clone()),
        }
    }

    /// Merge over [`CompilerOptions::defaults`] and fill in the remaining
    /// EJS defaults
    pub fn resolve(&self) -> ResolvedCompilerOptions {
        let merged = Self::defaults().merged_with(self);
        ResolvedCompilerOptions {
            client: merged.client.unwrap_or(false),
            strict: merged.strict.unwrap_or(false),
            locals_name: merged.locals_name.unwrap_or_else(|| "locals".to_string()),
            rm_whitespace: merged.rm_whitespace.unwrap_or(false),
            compile_debug: merged.compile_debug.unwrap_or(false),
            output_function_name: merged.output_function_name,
            destructured_locals: merged.destructured_locals,
            delimiter: merged.delimiter.unwrap_or_else(|| "%".to_string()),
            open_delimiter: merged.open_delimiter.unwrap_or_else(|| "<".to_string()),
            close_delimiter: merged.close_delimiter.unwrap_or_else(|| ">".to_string()),
        }
    }
}

/// Compiler options with every default applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedCompilerOptions {
    pub client: bool,
    pub strict: bool,
    pub locals_name: String,
    pub rm_whitespace: bool,
    pub compile_debug: bool,
    pub output_function_name: Option<String>,
    pub destructured_locals: Option<Vec<String>>,
    pub delimiter: String,
    pub open_delimiter: String,
    pub close_delimiter: String,
}

impl ResolvedCompilerOptions {
    /// Whether the template body is wrapped in `with (locals || {})`
    pub fn uses_with(&self) -> bool {
        !self.strict
    }
}

impl Default for ResolvedCompilerOptions {
    fn default() -> Self {
        CompilerOptions::default().resolve()
    }
}

/// Build-time rendering configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RenderOptions {
    /// Data passed to the template as `locals`. `null` renders with `{}`.
    pub data: Value,

    /// Minify the rendered HTML
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minifier_options: Option<MinifierOptions>,
}

impl RenderOptions {
    pub fn new(data: Value) -> Self {
        Self {
            data,
            minifier_options: None,
        }
    }

    pub fn with_minifier(mut self, options: MinifierOptions) -> Self {
        self.minifier_options = Some(options);
        self
    }
}

/// HTML minifier options for rendered output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MinifierOptions {
    /// Collapse whitespace between and inside tags. The minifier only runs
    /// when this is set.
    pub collapse_whitespace: bool,

    /// Drop HTML comments
    pub remove_comments: bool,

    /// Minify `<style>` contents
    #[serde(alias = "minifyCSS")]
    pub minify_css: bool,

    /// Minify `<script>` contents
    #[serde(alias = "minifyJS")]
    pub minify_js: bool,

    /// Keep optional closing tags such as `</p>` and `</li>`
    pub keep_closing_tags: bool,
}

impl Default for MinifierOptions {
    fn default() -> Self {
        Self {
            collapse_whitespace: false,
            remove_comments: false,
            minify_css: false,
            minify_js: false,
            keep_closing_tags: true,
        }
    }
}

impl MinifierOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_collapse_whitespace(mut self, enabled: bool) -> Self {
        self.collapse_whitespace = enabled;
        self
    }

    pub fn with_remove_comments(mut self, enabled: bool) -> Self {
        self.remove_comments = enabled;
        self
    }

    pub fn with_minify_css(mut self, enabled: bool) -> Self {
        self.minify_css = enabled;
        self
    }

    pub fn with_minify_js(mut self, enabled: bool) -> Self {
        self.minify_js = enabled;
        self
    }
}
