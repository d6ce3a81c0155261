//! fob-ejs CLI - run the EJS plugin transform on a single template.
//!
//! # Architecture
//!
//! - [`cli`] - Argument parsing (clap derive)
//! - [`error`] - CLI errors, reported through miette
//! - [`logger`] - tracing subscriber setup
//!
//! [`run`] builds [`EjsPluginOptions`] from the config file and flags, then
//! calls [`FobEjsPlugin::transform_source`] exactly as the bundler would.

pub mod cli;
pub mod error;
pub mod logger;

use fob_plugin_ejs::{EjsPluginOptions, FobEjsPlugin, RenderOptions};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub use error::{CliError, Result};

/// Build plugin options from the config file and command-line flags
///
/// Flags take precedence over the config file.
pub async fn build_options(args: &cli::Cli) -> Result<EjsPluginOptions> {
    let mut options = match &args.config {
        Some(path) => {
            debug!("Loading options from {}", path.display());
            EjsPluginOptions::load(path)?
        }
        None => EjsPluginOptions::default(),
    };

    if args.inline_styles {
        options.inline_styles = true;
    }

    if let Some(path) = &args.data {
        let data = read_data(path).await?;
        let render = options.render.take().unwrap_or_default();
        options.render = Some(RenderOptions { data, ..render });
    }

    let minify_flags = [
        args.collapse_whitespace,
        args.remove_comments,
        args.minify_css,
        args.minify_js,
    ];
    if minify_flags.iter().any(|enabled| *enabled) {
        let render = options.render.as_mut().ok_or_else(|| {
            CliError::InvalidArgument(
                "minifier flags only apply when rendering; pass --data".to_string(),
            )
        })?;
        let mut minifier = render.minifier_options.take().unwrap_or_default();
        if args.collapse_whitespace {
            minifier = minifier.with_collapse_whitespace(true);
        }
        if args.remove_comments {
            minifier = minifier.with_remove_comments(true);
        }
        if args.minify_css {
            minifier = minifier.with_minify_css(true);
        }
        if args.minify_js {
            minifier = minifier.with_minify_js(true);
        }
        render.minifier_options = Some(minifier);
    }

    Ok(options)
}

/// Transform one template and return the emitted module code
pub async fn transform_file(args: &cli::Cli) -> Result<String> {
    let template = tokio::fs::canonicalize(&args.template)
        .await
        .map_err(|source| CliError::TemplateNotFound {
            path: args.template.clone(),
            source,
        })?;

    let options = build_options(args).await?;
    let plugin = FobEjsPlugin::with_options(options)?;

    let code = tokio::fs::read_to_string(&template)
        .await
        .map_err(|source| CliError::Io {
            path: template.clone(),
            source,
        })?;

    let id = template.to_string_lossy();
    if plugin.options().inline_styles {
        for reference in plugin.style_references(&code, &id) {
            debug!("Stylesheet {} → {}", reference.href, reference.resolve().display());
        }
    }

    match plugin.transform_source(&code, &id).await? {
        Some(output) => Ok(output.code),
        None => Err(CliError::Filtered(args.template.clone())),
    }
}

/// Run the CLI: transform the template and print or write the module
pub async fn run(args: cli::Cli) -> Result<()> {
    let code = transform_file(&args).await?;

    match &args.output {
        Some(path) => {
            write_output(path, &code).await?;
            info!("Wrote {} ({} bytes)", path.display(), code.len());
        }
        None => println!("{}", code),
    }

    Ok(())
}

async fn read_data(path: &Path) -> Result<Value> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| CliError::Io {
            path: path.to_path_buf(),
            source,
        })?;

    serde_json::from_str(&content).map_err(|source| CliError::Data {
        path: path.to_path_buf(),
        source,
    })
}

async fn write_output(path: &Path, code: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|source| CliError::Io {
                path: PathBuf::from(parent),
                source,
            })?;
    }

    tokio::fs::write(path, code)
        .await
        .map_err(|source| CliError::Io {
            path: path.to_path_buf(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::fs;
    use tempfile::TempDir;

    fn args(argv: &[&str]) -> cli::Cli {
        cli::Cli::try_parse_from(std::iter::once("fob-ejs").chain(argv.iter().copied())).unwrap()
    }

    #[tokio::test]
    async fn test_build_options_defaults() {
        let options = build_options(&args(&["a.ejs"])).await.unwrap();
        assert!(!options.inline_styles);
        assert!(options.render.is_none());
    }

    #[tokio::test]
    async fn test_data_overrides_config() {
        let temp = TempDir::new().unwrap();
        let config = temp.path().join("ejs.json");
        let data = temp.path().join("data.json");
        fs::write(
            &config,
            r#"{ "render": { "data": { "a": 1 }, "minifierOptions": { "removeComments": true } } }"#,
        )
        .unwrap();
        fs::write(&data, r#"{ "b": 2 }"#).unwrap();

        let options = build_options(&args(&[
            "a.ejs",
            "--config",
            config.to_str().unwrap(),
            "--data",
            data.to_str().unwrap(),
            "--collapse-whitespace",
        ]))
        .await
        .unwrap();

        let render = options.render.unwrap();
        assert_eq!(render.data, serde_json::json!({ "b": 2 }));
        let minifier = render.minifier_options.unwrap();
        assert!(minifier.collapse_whitespace);
        assert!(minifier.remove_comments);
    }

    #[tokio::test]
    async fn test_collapse_without_render_is_rejected() {
        let err = build_options(&args(&["a.ejs", "--collapse-whitespace"]))
            .await
            .unwrap_err();
        assert!(matches!(err, CliError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_minifier_flags() {
        let temp = TempDir::new().unwrap();
        let data = temp.path().join("data.json");
        fs::write(&data, "{}").unwrap();

        let options = build_options(&args(&[
            "a.ejs",
            "--data",
            data.to_str().unwrap(),
            "--remove-comments",
            "--minify-js",
        ]))
        .await
        .unwrap();

        let minifier = options.render.unwrap().minifier_options.unwrap();
        assert!(!minifier.collapse_whitespace);
        assert!(minifier.remove_comments);
        assert!(!minifier.minify_css);
        assert!(minifier.minify_js);
    }

    #[tokio::test]
    async fn test_invalid_data_file() {
        let temp = TempDir::new().unwrap();
        let data = temp.path().join("data.json");
        fs::write(&data, "{ nope").unwrap();

        let err = build_options(&args(&["a.ejs", "--data", data.to_str().unwrap()]))
            .await
            .unwrap_err();
        assert!(matches!(err, CliError::Data { .. }));
    }
}
