//! config command - Show the profile configuration
//!
//! # Security
//!
//! Tokens are always redacted.

use anyhow::Result;

use super::Context;
use crate::ui::output;

/// Print the profile configuration as TOML.
pub fn show(ctx: &Context, full: bool) -> Result<()> {
    let config = ctx.load_config()?;
    output::debug(
        format!("profile {} ({})", config.profile().name(), config.path().display()),
        ctx.verbosity,
    );
    print!("{}", config.show(full)?);
    Ok(())
}
