//! query
//!
//! Filters, predicates and statements.
//!
//! # Modules
//!
//! - `builder`: [`FilterSpec`] and the Query Builder ([`build`])
//! - `soql`: the complete [`Statement`] sent to the query endpoint
//! - `options`: the CLI Option Translator ([`FilterOptions`])
//!
//! Data flows one way: flags become [`FilterOptions`], which become a
//! [`FilterSpec`], which [`build`] renders into a [`Predicate`], which the
//! client wraps in a [`Statement`].

mod builder;
mod options;
mod soql;

pub use builder::{
    build, escape, quote, BuildContext, Clause, FilterSpec, Literal, Owner, Predicate,
    DEFAULT_LIMIT,
};
pub use options::{parse_assignment, parse_datetime, FilterOptions, TypeDefaults};
pub use soql::{Selection, Statement};
