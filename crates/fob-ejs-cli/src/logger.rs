//! Logging setup for the fob-ejs CLI.
//!
//! The plugin library only emits `tracing` events; this module installs the
//! subscriber that prints them.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const VERBOSE_FILTER: &str = "fob_plugin_ejs=debug,fob_ejs_cli=debug";
const QUIET_FILTER: &str = "fob_plugin_ejs=error,fob_ejs_cli=error";
const DEFAULT_FILTER: &str = "fob_plugin_ejs=info,fob_ejs_cli=info";

/// Initialize the tracing subscriber.
///
/// The level is chosen in this order:
/// 1. `--verbose`: DEBUG for the plugin and CLI
/// 2. `--quiet`: ERROR only
/// 3. `RUST_LOG` environment variable
/// 4. INFO
///
/// Logs go to stderr so the emitted module can be piped from stdout.
pub fn init_logger(verbose: bool, quiet: bool, no_color: bool) {
    let filter = if verbose {
        EnvFilter::new(VERBOSE_FILTER)
    } else if quiet {
        EnvFilter::new(QUIET_FILTER)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
    };

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_level(true)
        .with_ansi(!no_color)
        .compact();

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .init();
}
