//! cli::commands
//!
//! Command dispatch and handlers.
//!
//! # Architecture
//!
//! Each command handler:
//! 1. Loads the profile configuration
//! 2. Calls the library through [`Sf`]
//! 3. Formats and displays output
//!
//! # Async Commands
//!
//! Commands that talk to Salesforce are async. Each handler is a synchronous
//! wrapper that runs its async implementation on a fresh tokio runtime.

mod auth;
mod completion;
mod config_cmd;
mod delete;
mod get;
mod query;
mod related;
mod types;

pub use auth::{login, refresh, status};
pub use completion::completion;
pub use config_cmd::show as config_show;
pub use delete::delete;
pub use get::get;
pub use query::query;
pub use related::related;
pub use types::types;

use anyhow::{Context as _, Result};

use crate::cli::args::{AuthAction, Command, DisplayArgs};
use crate::client::{Sf, SfOptions};
use crate::config::{Config, Profile};
use crate::record::RecordProxy;
use crate::ui::output::{self, Verbosity};

/// Settings shared by every handler.
#[derive(Debug, Clone)]
pub struct Context {
    /// Profile chosen on the command line; `None` uses the default profile.
    pub profile: Option<Profile>,
    pub options: SfOptions,
    pub verbosity: Verbosity,
}

impl Context {
    pub fn load_config(&self) -> Result<Config> {
        Config::load(self.profile.clone()).context("failed to load configuration")
    }

    pub fn connect(&self) -> Result<Sf> {
        let config = self.load_config()?;
        Ok(Sf::connect(&config, self.options)?)
    }
}

/// Dispatch a command to its handler.
pub fn dispatch(command: Command, ctx: &Context) -> Result<()> {
    match command {
        Command::Config { full } => config_cmd::show(ctx, full),
        Command::Auth { action } => match action {
            AuthAction::Login { no_browser } => auth::login(ctx, no_browser),
            AuthAction::Refresh => auth::refresh(ctx),
            AuthAction::Status => auth::status(ctx),
        },
        Command::Types => types::types(ctx),
        Command::Get {
            object_type,
            id,
            display,
        } => get::get(ctx, &object_type, &id, &display),
        Command::Query {
            object_type,
            filters,
            display,
        } => query::query(ctx, &object_type, &filters.to_options(), &display),
        Command::Related {
            object_type,
            id,
            relation,
            filters,
            display,
        } => related::related(ctx, &object_type, &id, &relation, &filters.to_options(), &display),
        Command::Delete { object_type, id } => delete::delete(ctx, &object_type, &id),
        Command::Completion { shell } => completion::completion(shell),
    }
}

/// Print records, separated by a blank line when several fields are shown.
pub(crate) async fn print_records(
    records: &[RecordProxy],
    display: &DisplayArgs,
    verbosity: Verbosity,
) -> Result<()> {
    let all_names: Vec<String>;
    let fields: Option<&[String]> = match records.first() {
        Some(first) if display.all_fields => {
            all_names = first.context().schema.field_names(first.object_type()).await?;
            Some(all_names.as_slice())
        }
        _ if display.fields.is_empty() => None,
        _ => Some(display.fields.as_slice()),
    };

    let mut first = true;
    for record in records {
        if display.all_fields {
            record.populate_all().await?;
        }
        let dump = record.dump_fields(fields, display.label()).await?;
        if !first && dump.contains('\n') {
            output::print("", verbosity);
        }
        first = false;
        println!("{}", dump);
    }
    Ok(())
}
