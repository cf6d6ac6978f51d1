//! cli::args
//!
//! Command-line argument definitions using clap derive.
//!
//! # Global Flags
//!
//! These flags are available on all commands:
//! - `--verbose` / `-v`: Log every remote call
//! - `--quiet` / `-q`: Minimal output
//! - `--config <path>`, `--production` / `-P`, `--sandbox` / `-S`: Profile
//! - `--lazy-fields` / `--preload-fields`: Field loading mode
//! - `--dry-run`: Log deletions instead of performing them

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::client::SfOptions;
use crate::config::Profile;
use crate::query::{parse_assignment, parse_datetime, FilterOptions};

/// sf - Query and inspect Salesforce CRM records
#[derive(Parser, Debug)]
#[command(name = "sf")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Log every remote call
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Minimal output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Use this configuration file (never written)
    #[arg(long, global = true, value_name = "PATH", conflicts_with_all = ["production", "sandbox"])]
    pub config: Option<PathBuf>,

    /// Use the production profile
    #[arg(short = 'P', long, global = true, conflicts_with = "sandbox")]
    pub production: bool,

    /// Use the sandbox profile
    #[arg(short = 'S', long, global = true)]
    pub sandbox: bool,

    /// Fetch fields on first access (default)
    #[arg(long, global = true, conflicts_with = "preload_fields")]
    pub lazy_fields: bool,

    /// Fetch every field whenever a record is loaded
    #[arg(long, global = true)]
    pub preload_fields: bool,

    /// Log deletions instead of performing them
    #[arg(long, global = true)]
    pub dry_run: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Parser::parse()
    }

    /// Profile chosen on the command line, if any.
    pub fn profile(&self) -> Option<Profile> {
        if let Some(path) = &self.config {
            Some(Profile::Custom(path.clone()))
        } else if self.production {
            Some(Profile::Production)
        } else if self.sandbox {
            Some(Profile::Sandbox)
        } else {
            None
        }
    }

    pub fn options(&self) -> SfOptions {
        SfOptions {
            preload_fields: self.preload_fields && !self.lazy_fields,
            verbose: self.verbose,
            dry_run: self.dry_run,
        }
    }
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Show the effective configuration
    Config {
        /// Include built-in defaults
        #[arg(long)]
        full: bool,
    },

    /// Manage the OAuth session
    Auth {
        #[command(subcommand)]
        action: AuthAction,
    },

    /// List queryable object types
    Types,

    /// Show one record
    #[command(after_help = "\
EXAMPLES:
    # Case by number (zero padding optional)
    sf get Case 1234

    # User by alias, printing two fields
    sf get User jdoe -f Name -f Email")]
    Get {
        /// Object type, e.g. Case
        object_type: String,

        /// Record id, case number or user alias
        id: String,

        #[command(flatten)]
        display: DisplayArgs,
    },

    /// List records matching filters
    #[command(after_help = "\
EXAMPLES:
    # My open cases mentioning a printer
    sf query Case --mine --contains printer

    # Time cards in January
    sf query TimeCard__c --after 2024-01-01 --before 2024-02-01")]
    Query {
        /// Object type, e.g. Case
        object_type: String,

        #[command(flatten)]
        filters: FilterArgs,

        #[command(flatten)]
        display: DisplayArgs,
    },

    /// List records related to one record
    Related {
        /// Object type of the source record
        object_type: String,

        /// Source record id, case number or user alias
        id: String,

        /// Relation name, e.g. comments
        relation: String,

        #[command(flatten)]
        filters: FilterArgs,

        #[command(flatten)]
        display: DisplayArgs,
    },

    /// Delete one record
    Delete {
        /// Object type, e.g. CaseComment
        object_type: String,

        /// Record id
        id: String,
    },

    /// Generate shell completion scripts
    Completion {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Auth subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum AuthAction {
    /// Authorize through the OAuth device flow
    Login {
        /// Do not open the verification URL in a browser
        #[arg(long)]
        no_browser: bool,
    },
    /// Exchange the refresh token for a new access token
    Refresh,
    /// Show whether a session is stored and still valid
    Status,
}

/// Filter flags shared by `query` and `related`.
#[derive(Args, Debug, Clone, Default)]
pub struct FilterArgs {
    /// Only these record ids
    #[arg(long = "id", value_name = "ID")]
    pub ids: Vec<String>,

    /// Field equals value
    #[arg(long = "eq", value_name = "FIELD=VALUE", value_parser = parse_assignment)]
    pub eq: Vec<(String, String)>,

    /// Text field contains value
    #[arg(long, value_name = "TEXT")]
    pub contains: Option<String>,

    /// Field searched by --contains
    #[arg(long, value_name = "FIELD")]
    pub contains_field: Option<String>,

    /// On or after this date (YYYY-MM-DD[THH:MM:SS])
    #[arg(long, value_name = "DATE", value_parser = parse_datetime)]
    pub after: Option<chrono::NaiveDateTime>,

    /// On or before this date (YYYY-MM-DD[THH:MM:SS])
    #[arg(long, value_name = "DATE", value_parser = parse_datetime)]
    pub before: Option<chrono::NaiveDateTime>,

    /// Field filtered by --after/--before
    #[arg(long, value_name = "FIELD")]
    pub date_field: Option<String>,

    /// At least this number
    #[arg(long, value_name = "N")]
    pub min: Option<f64>,

    /// At most this number
    #[arg(long, value_name = "N")]
    pub max: Option<f64>,

    /// Field filtered by --min/--max
    #[arg(long, value_name = "FIELD")]
    pub number_field: Option<String>,

    /// Owned by the authenticated user
    #[arg(long, conflicts_with = "owner")]
    pub mine: bool,

    /// Owned by this user id or alias
    #[arg(long, value_name = "USER")]
    pub owner: Option<String>,

    /// Field matched by --mine/--owner
    #[arg(long, value_name = "FIELD")]
    pub owner_field: Option<String>,

    /// Raw SOQL condition, ANDed with the other filters
    #[arg(long = "where", value_name = "SOQL")]
    pub where_raw: Option<String>,

    /// Include closed records
    #[arg(long)]
    pub closed: bool,

    /// Maximum number of records
    #[arg(long, short = 'n', value_name = "N")]
    pub limit: Option<usize>,
}

impl FilterArgs {
    pub fn to_options(&self) -> FilterOptions {
        FilterOptions {
            ids: self.ids.clone(),
            eq: self.eq.clone(),
            contains: self.contains.clone(),
            contains_field: self.contains_field.clone(),
            after: self.after,
            before: self.before,
            date_field: self.date_field.clone(),
            min: self.min,
            max: self.max,
            number_field: self.number_field.clone(),
            mine: self.mine,
            owner: self.owner.clone(),
            owner_field: self.owner_field.clone(),
            where_raw: self.where_raw.clone(),
            include_closed: self.closed,
            limit: self.limit,
        }
    }
}

/// How records are printed.
#[derive(Args, Debug, Clone, Default)]
pub struct DisplayArgs {
    /// Print this field (repeatable)
    #[arg(long = "field", short = 'f', value_name = "FIELD")]
    pub fields: Vec<String>,

    /// Print every field
    #[arg(long, conflicts_with = "fields")]
    pub all_fields: bool,

    /// Prefix values with field names
    #[arg(long, conflicts_with = "no_label")]
    pub label: bool,

    /// Print bare values
    #[arg(long)]
    pub no_label: bool,
}

impl DisplayArgs {
    /// Explicit label choice; `None` leaves it to the field count.
    pub fn label(&self) -> Option<bool> {
        match (self.label, self.no_label) {
            (true, _) => Some(true),
            (_, true) => Some(false),
            _ => None,
        }
    }
}

/// Supported shells for completion
#[derive(clap::ValueEnum, Debug, Clone, Copy)]
#[allow(clippy::enum_variant_names)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn query_flags() {
        let cli = Cli::try_parse_from([
            "sf", "query", "TimeCard__c", "--after", "2024-01-01", "--before", "2024-02-01",
            "--eq", "Status=New", "-n", "5",
        ])
        .unwrap();
        let Command::Query { filters, .. } = cli.command else {
            panic!("expected query");
        };
        let options = filters.to_options();
        assert_eq!(options.eq, vec![("Status".to_string(), "New".to_string())]);
        assert_eq!(options.limit, Some(5));
        assert!(options.after.is_some() && options.before.is_some());
    }

    #[test]
    fn bad_date_is_rejected() {
        assert!(Cli::try_parse_from(["sf", "query", "Case", "--after", "yesterday"]).is_err());
    }

    #[test]
    fn profile_flags() {
        let cli = Cli::try_parse_from(["sf", "-P", "types"]).unwrap();
        assert_eq!(cli.profile(), Some(Profile::Production));

        let cli = Cli::try_parse_from(["sf", "--config", "/tmp/x.toml", "types"]).unwrap();
        assert_eq!(cli.profile(), Some(Profile::Custom("/tmp/x.toml".into())));

        assert!(Cli::try_parse_from(["sf", "-P", "-S", "types"]).is_err());
    }

    #[test]
    fn global_options() {
        let cli = Cli::try_parse_from(["sf", "get", "Case", "1", "--preload-fields", "--dry-run"]).unwrap();
        let options = cli.options();
        assert!(options.preload_fields && options.dry_run && !options.verbose);
    }

    #[test]
    fn label_choice() {
        let cli = Cli::try_parse_from(["sf", "get", "Case", "1", "--no-label"]).unwrap();
        let Command::Get { display, .. } = cli.command else {
            panic!("expected get");
        };
        assert_eq!(display.label(), Some(false));
    }
}
