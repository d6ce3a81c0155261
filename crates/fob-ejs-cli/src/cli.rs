//! Command-line interface definition for fob-ejs.
//!
//! A single command: compile (or render) one template and print the module
//! the bundler plugin would emit for it.

use clap::Parser;
use std::path::PathBuf;

/// fob-ejs - Compile EJS templates into JavaScript modules
#[derive(Parser, Debug)]
#[command(
    name = "fob-ejs",
    version,
    about = "Compile an EJS template into a JavaScript module",
    long_about = "Runs the fob EJS plugin transform on a single template and prints the\n\
                  emitted module. Useful for debugging templates outside a bundler run."
)]
pub struct Cli {
    /// Template to transform
    #[arg(value_name = "TEMPLATE")]
    pub template: PathBuf,

    /// Plugin options file
    ///
    /// TOML by default, JSON for `.json` files. A `package.json` is read
    /// from its `ejs` field.
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// JSON file with render data
    ///
    /// Renders the template at build time instead of exporting the template
    /// function. Overrides `render.data` from the config file.
    #[arg(short, long, value_name = "JSON_FILE")]
    pub data: Option<PathBuf>,

    /// Inline `<link rel="stylesheet">` tags
    #[arg(long)]
    pub inline_styles: bool,

    /// Collapse whitespace in rendered HTML
    ///
    /// Only applies when rendering (`--data` or `render` in the config).
    #[arg(long)]
    pub collapse_whitespace: bool,

    /// Remove HTML comments from rendered HTML
    #[arg(long)]
    pub remove_comments: bool,

    /// Minify `<style>` contents (requires --collapse-whitespace)
    #[arg(long)]
    pub minify_css: bool,

    /// Minify `<script>` contents (requires --collapse-whitespace)
    #[arg(long)]
    pub minify_js: bool,

    /// Write the module to a file instead of stdout
    #[arg(short, long, value_name = "OUT")]
    pub output: Option<PathBuf>,

    /// Enable verbose logging (debug level)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}
