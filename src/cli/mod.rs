//! cli
//!
//! Command-line interface layer for sftools.
//!
//! # Responsibilities
//!
//! - Parse command-line arguments and global flags
//! - Set up logging
//! - Delegate to command handlers
//!
//! # Architecture
//!
//! The CLI layer is thin. Handlers translate flags into library calls on
//! [`crate::client::Sf`] and print what comes back. Failures surface as
//! `anyhow` errors wrapping [`crate::SfError`]; `main` prints the error kind
//! and message and exits non-zero.

pub mod args;
pub mod commands;

pub use args::{Cli, Shell};

use anyhow::Result;

use crate::ui::output::Verbosity;

/// Run the CLI application.
///
/// This is the main entry point called from `main.rs`.
pub fn run() -> Result<()> {
    let cli = Cli::parse_args();
    init_logging(cli.verbose);

    let ctx = commands::Context {
        profile: cli.profile(),
        options: cli.options(),
        verbosity: Verbosity::from_flags(cli.quiet, cli.verbose),
    };

    commands::dispatch(cli.command, &ctx)
}

/// Log remote calls at info level with `--verbose`; `RUST_LOG` still wins.
fn init_logging(verbose: bool) {
    let default = if verbose { "sftools=info" } else { "warn" };
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default))
        .format_timestamp(None)
        .format_target(false)
        .try_init();
}
