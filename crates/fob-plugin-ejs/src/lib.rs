//! Rolldown plugin for EJS templates
//!
//! This plugin compiles `.ejs` files into JavaScript modules. By default a
//! template becomes a module whose default export is the compiled template
//! function; with render options it becomes a precomputed HTML string.
//!
//! ## Architecture
//!
//! ```text
//! .ejs file → transform() → filter → inline <link> styles → compile → render/minify → export default …
//! ```
//!
//! ## Why the `transform` hook?
//!
//! The plugin only rewrites file contents and never needs to read the
//! template itself, so it runs after Rolldown has loaded the file. The output
//! is marked as JavaScript so Rolldown parses the generated module.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use fob_plugin_ejs::{EjsPluginOptions, FobEjsPlugin, RenderOptions};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let options = EjsPluginOptions::new()
//!     .with_inline_styles(true)
//!     .with_render(RenderOptions::new(json!({ "title": "Home" })));
//!
//! let plugin = Arc::new(FobEjsPlugin::with_options(options)?);
//! // Add to your Rolldown bundler configuration
//! # Ok(())
//! # }
//! ```

use anyhow::Context;
use rolldown_common::ModuleType;
use rolldown_plugin::{
    HookTransformArgs, HookTransformOutput, HookTransformReturn, HookUsage, Plugin,
    SharedTransformPluginContext,
};
use serde::Serialize;
use std::borrow::Cow;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, trace};

mod config;
mod error;
mod filter;
mod render;
mod styles;
mod template;

pub use config::{
    CompilerOptions, EjsPluginOptions, MinifierOptions, RenderOptions, ResolvedCompilerOptions,
    DEFAULT_INCLUDE,
};
pub use error::{EjsError, Result};
pub use filter::PathFilter;
pub use render::{locals_from_data, minify};
pub use styles::{CssLoader, ScssLoader, StyleInliner, StyleLoader, StyleReference};
pub use template::CompiledTemplate;

/// Source map returned with every transformed template
///
/// The generated module has no meaningful mapping back to the template, so
/// the mappings are always empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EmptySourceMap {
    pub mappings: String,
}

/// What a template compiles to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Artifact {
    /// Source of the compiled template function
    Function(String),
    /// Rendered (and possibly minified) HTML
    Rendered(String),
}

impl Artifact {
    /// JavaScript expression for the module's default export
    pub fn to_js(&self) -> String {
        match self {
            Artifact::Function(source) => source.clone(),
            Artifact::Rendered(html) => serde_json::Value::String(html.clone()).to_string(),
        }
    }
}

/// Result of transforming one template
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransformOutput {
    /// Generated module code
    pub code: String,
    /// Always-empty source map
    pub map: EmptySourceMap,
}

impl TransformOutput {
    /// Wrap an artifact in a default export
    pub fn from_artifact(artifact: &Artifact) -> Self {
        Self {
            code: format!("export default {}", artifact.to_js()),
            map: EmptySourceMap::default(),
        }
    }
}

#[derive(Debug)]
struct PluginState {
    options: EjsPluginOptions,
    compiler: ResolvedCompilerOptions,
    filter: PathFilter,
    inliner: StyleInliner,
}

/// Rolldown plugin that compiles EJS templates into JavaScript modules
///
/// # Features
///
/// - Include/exclude glob filtering (default `**/*.ejs`)
/// - Optional inlining of `<link rel="stylesheet">` tags (CSS, SCSS, Sass)
/// - Client-mode compilation to a standalone template function
/// - Optional build-time rendering with data, and HTML minification
///
/// Cloning is cheap; clones share the same immutable configuration.
#[derive(Debug, Clone)]
pub struct FobEjsPlugin {
    state: Arc<PluginState>,
}

impl FobEjsPlugin {
    /// Create a new FobEjsPlugin with default options
    ///
    /// # Example
    ///
    /// ```rust
    /// use fob_plugin_ejs::FobEjsPlugin;
    ///
    /// let plugin = FobEjsPlugin::new();
    /// ```
    pub fn new() -> Self {
        Self::with_options(EjsPluginOptions::default())
            .expect("default include pattern is a valid glob")
    }

    /// Create a new FobEjsPlugin with custom options
    ///
    /// # Errors
    ///
    /// Returns [`EjsError::InvalidPattern`] if an include or exclude pattern
    /// is not a valid glob.
    ///
    /// # Example
    ///
    /// ```rust
    /// use fob_plugin_ejs::{EjsPluginOptions, FobEjsPlugin};
    ///
    /// let options = EjsPluginOptions::new()
    ///     .include("views/**/*.ejs")
    ///     .exclude("**/partials/**");
    ///
    /// let plugin = FobEjsPlugin::with_options(options).unwrap();
    /// ```
    pub fn with_options(options: EjsPluginOptions) -> Result<Self> {
        let inliner = StyleInliner::new(options.style_load_paths.clone());
        Self::build(options, inliner)
    }

    /// Create a plugin with a custom stylesheet inliner (extra loaders)
    pub fn with_inliner(options: EjsPluginOptions, inliner: StyleInliner) -> Result<Self> {
        Self::build(options, inliner)
    }

    fn build(options: EjsPluginOptions, inliner: StyleInliner) -> Result<Self> {
        let base = match &options.resolve_base {
            Some(base) => base.clone(),
            None => std::env::current_dir().unwrap_or_else(|e| {
                debug!(
                    "[fob-ejs] Current directory unavailable ({}), resolving patterns against '.'",
                    e
                );
                PathBuf::from(".")
            }),
        };
        let filter = PathFilter::new(&options.effective_include(), &options.exclude, &base)?;
        let compiler = options.compiler_options.resolve();
        let inliner = inliner.with_template_tag(format!(
            "{}{}",
            compiler.open_delimiter, compiler.delimiter
        ));

        Ok(Self {
            state: Arc::new(PluginState {
                options,
                compiler,
                filter,
                inliner,
            }),
        })
    }

    /// The options this plugin was built with
    pub fn options(&self) -> &EjsPluginOptions {
        &self.state.options
    }

    /// Whether a module id is a template this plugin transforms
    pub fn is_candidate(&self, id: &str) -> bool {
        self.state.filter.matches(id)
    }

    /// Local stylesheets the template links to, as the inliner sees them
    pub fn style_references(&self, code: &str, id: &str) -> Vec<StyleReference> {
        self.state.inliner.find_references(code, Path::new(id))
    }

    /// Transform a template's source into a JavaScript module
    ///
    /// Returns `Ok(None)` when `id` is not a candidate, leaving the file to
    /// Rolldown.
    ///
    /// # Errors
    ///
    /// Missing or unsupported stylesheets, template syntax errors and render
    /// failures are all returned unchanged; nothing is retried.
    pub async fn transform_source(&self, code: &str, id: &str) -> Result<Option<TransformOutput>> {
        if !self.is_candidate(id) {
            trace!("[fob-ejs] Skipping non-candidate: {}", id);
            return Ok(None);
        }

        let state = &self.state;
        let source = if state.options.inline_styles {
            Cow::Owned(state.inliner.inline(code, Path::new(id)).await?)
        } else {
            Cow::Borrowed(code)
        };

        let artifact = self.compile_artifact(&source, id)?;
        let output = TransformOutput::from_artifact(&artifact);

        debug!(
            "[fob-ejs] Transformed {} ({} → {} bytes, rendered: {})",
            id,
            code.len(),
            output.code.len(),
            matches!(artifact, Artifact::Rendered(_))
        );

        Ok(Some(output))
    }

    /// Compile, and render when configured to
    pub fn compile_artifact(&self, source: &str, id: &str) -> Result<Artifact> {
        let state = &self.state;

        let Some(render) = &state.options.render else {
            let template = CompiledTemplate::compile(source, id, &state.compiler)?;
            return Ok(Artifact::Function(template.into_source()));
        };

        let mut compiler = state.compiler.clone();
        if compiler.strict && compiler.destructured_locals.is_none() {
            compiler.destructured_locals = Some(locals_from_data(&render.data, &compiler));
        }

        let template = CompiledTemplate::compile(source, id, &compiler)?;
        let html = template.render(&render.data)?;
        let html = match &render.minifier_options {
            Some(minifier) => minify(&html, minifier, id)?,
            None => html,
        };

        Ok(Artifact::Rendered(html))
    }
}

impl Default for FobEjsPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl Plugin for FobEjsPlugin {
    /// Returns the plugin name for debugging and logging
    fn name(&self) -> Cow<'static, str> {
        "fob-ejs".into()
    }

    /// Declare which hooks this plugin uses
    ///
    /// This allows Rolldown to optimize by skipping unused hooks.
    fn register_hook_usage(&self) -> HookUsage {
        HookUsage::Transform
    }

    /// Transform hook - compiles candidate templates
    ///
    /// # Returns
    ///
    /// - `Ok(Some(output))` - Template compiled into a JavaScript module
    /// - `Ok(None)` - Not a candidate, let Rolldown handle it
    /// - `Err(e)` - Stylesheet, syntax or render error; fails the build
    fn transform(
        &self,
        _ctx: SharedTransformPluginContext,
        args: &HookTransformArgs<'_>,
    ) -> impl std::future::Future<Output = HookTransformReturn> + Send {
        let id = args.id.to_string();
        let code = args.code.to_string();
        let plugin = self.clone();

        async move {
            let output = plugin
                .transform_source(&code, &id)
                .await
                .with_context(|| format!("Failed to transform EJS template: {}", id))?;

            Ok(output.map(|output| HookTransformOutput {
                code: Some(output.code),
                map: None,
                side_effects: None,
                module_type: Some(ModuleType::Js),
            }))
        }
    }
}
