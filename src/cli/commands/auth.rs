//! cli::commands::auth
//!
//! OAuth session commands.
//!
//! # Design
//!
//! - `login` runs the device flow and stores the session in the profile
//! - `refresh` exchanges the refresh token for a new access token
//! - `status` reports whether a session is stored and when it expires
//!
//! When the profile is a custom configuration file, the session is not
//! written; the TOML to paste into the file is printed instead.
//!
//! # Security
//!
//! Tokens are never printed, except inside the refused-save content the
//! user asked to paste into their own file.
//!
//! # Example
//!
//! ```bash
//! sf auth login
//! sf -S auth status
//! ```

use std::sync::Arc;

use anyhow::Result;

use super::Context;
use crate::client::Sf;
use crate::config::SaveOutcome;
use crate::session::{DeviceCodeResponse, SessionManager};
use crate::ui::output::{self, Verbosity};

/// Run the device flow for the selected profile.
pub fn login(ctx: &Context, no_browser: bool) -> Result<()> {
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(login_async(ctx, no_browser))
}

async fn login_async(ctx: &Context, no_browser: bool) -> Result<()> {
    let sf = ctx.connect()?;
    let verbosity = ctx.verbosity;

    let session = sf
        .request_oauth(|code: &DeviceCodeResponse| {
            let url = code.verification_url();
            println!("Open {} and enter the code {}", url, code.user_code);
            if !no_browser {
                if let Err(e) = open::that(&url) {
                    output::debug(format!("could not open a browser: {}", e), verbosity);
                }
            }
        })
        .await?;

    report_save(&sf, verbosity);
    match &session.user_id {
        Some(user) => output::success(format!("Logged in as {}", user), verbosity),
        None => output::success("Logged in", verbosity),
    }
    Ok(())
}

/// Refresh the access token of the selected profile.
pub fn refresh(ctx: &Context) -> Result<()> {
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(refresh_async(ctx))
}

async fn refresh_async(ctx: &Context) -> Result<()> {
    let sf = ctx.connect()?;
    sf.refresh_oauth().await?;
    report_save(&sf, ctx.verbosity);
    output::success("Session refreshed", ctx.verbosity);
    Ok(())
}

/// Show the stored session of the selected profile.
pub fn status(ctx: &Context) -> Result<()> {
    let config = ctx.load_config()?;
    let manager = SessionManager::from_config(&config);
    let profile = manager.profile().to_string();

    match manager.session()? {
        None => output::print(format!("{}: not logged in", profile), ctx.verbosity),
        Some(session) => {
            let state = if session.is_expired() {
                if session.can_refresh() {
                    "expired, refreshable"
                } else {
                    "expired"
                }
            } else {
                "valid"
            };
            let expiry = session
                .expires_at
                .map(|at| format!(" until {}", at.format("%Y-%m-%d %H:%M:%S UTC")))
                .unwrap_or_default();
            output::print(
                format!("{}: logged in to {} ({}{})", profile, config.instance(), state, expiry),
                ctx.verbosity,
            );
        }
    }
    Ok(())
}

/// Print the TOML to paste when the profile file was not written.
fn report_save(sf: &Sf, verbosity: Verbosity) {
    let outcome = sf
        .session_manager()
        .map(Arc::as_ref)
        .and_then(SessionManager::take_save_outcome);
    match outcome {
        Some(SaveOutcome::Refused { path, content }) => {
            output::warn(
                format!("add the following to {}:", path.display()),
                verbosity,
            );
            println!("{}", content);
        }
        Some(SaveOutcome::Written(path)) => {
            output::debug(format!("session saved to {}", path.display()), verbosity);
        }
        None => {}
    }
}
