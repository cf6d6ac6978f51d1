//! sftools - Query and inspect Salesforce CRM records
//!
//! sftools is a library and single-binary CLI (`sf`) over the Salesforce REST
//! API: OAuth device-flow sessions, cached object schemas, structured SOQL
//! filters, lazily populated record proxies and named relations between
//! object types.
//!
//! # Architecture
//!
//! - [`cli`] - Command-line interface layer (parses args, calls the client)
//! - [`client`] - Connected client, per-type handles and per-type behavior
//! - [`record`] - Record proxies and query results
//! - [`relations`] - Named relations between object types
//! - [`query`] - Filter specs, predicate builder and SOQL statements
//! - [`schema`] - Object type schemas and the single-flight schema cache
//! - [`transport`] - REST transport and the in-memory mock
//! - [`session`] - OAuth device flow, tokens and the session manager
//! - [`store`] - Session persistence
//! - [`config`] - Profile configuration files
//! - [`ui`] - Output formatting
//!
//! # Example
//!
//! ```
//! use sftools::client::{Sf, SfOptions};
//! use sftools::transport::mock::MockTransport;
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! let mock = MockTransport::new()
//!     .with_record("Case", json!({"Id": "500A", "CaseNumber": "00001234", "Subject": "Printer on fire"}));
//! let sf = Sf::with_transport(Arc::new(mock), SfOptions::default());
//!
//! let case = sf.get("Case", "00001234").await.unwrap().unwrap();
//! assert_eq!(case.field("Subject").await.unwrap(), json!("Printer on fire"));
//! # });
//! ```

pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod query;
pub mod record;
pub mod relations;
pub mod schema;
pub mod session;
pub mod store;
pub mod transport;
pub mod ui;

pub use error::SfError;
