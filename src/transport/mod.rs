//! transport
//!
//! The remote CRM store behind a trait.
//!
//! # Modules
//!
//! - `traits`: Core [`Transport`] trait, [`Row`] and [`QueryResponse`]
//! - `rest`: Salesforce REST implementation signed by the session manager
//! - [`mock`]: In-memory implementation for deterministic testing
//!
//! Collaborators receive an `Arc<dyn Transport>` from the process entry
//! point; nothing in the crate reaches for a global client.

mod eval;
pub mod mock;
mod rest;
mod traits;

pub use rest::RestTransport;
pub use traits::{QueryResponse, Row, Transport};

use log::{log, Level};

/// Log a remote call as `SF: op(arg)`; at info level when verbose.
pub(crate) fn trace(verbose: bool, operation: &str, argument: &str) {
    let level = if verbose { Level::Info } else { Level::Debug };
    log!(level, "SF: {}({})", operation, argument);
}
