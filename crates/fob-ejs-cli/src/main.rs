//! fob-ejs - compile an EJS template into a JavaScript module.
//!
//! Parses arguments, initializes logging, and reports failures as miette
//! diagnostics.

use clap::Parser;
use fob_ejs_cli::{cli, logger};
use miette::Result;

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();

    logger::init_logger(args.verbose, args.quiet, args.no_color);

    fob_ejs_cli::run(args).await.map_err(miette::Report::new)
}
