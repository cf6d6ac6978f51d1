//! query::options
//!
//! The CLI Option Translator: recognised filter flags to a FilterSpec.
//!
//! # Clause Order
//!
//! Clauses are emitted in a fixed order regardless of flag order on the
//! command line: ids, equalities, contains, date range, number range, owner,
//! raw `--where`, open-only. Front ends therefore render identical
//! predicates for identical flag sets.
//!
//! # Example
//!
//! ```
//! use sftools::query::{FilterOptions, TypeDefaults, build, BuildContext};
//!
//! let options = FilterOptions {
//!     contains: Some("printer".into()),
//!     limit: Some(10),
//!     ..Default::default()
//! };
//! let defaults = TypeDefaults { contains_field: Some("Subject"), ..Default::default() };
//! let spec = options.to_filter("Case", &defaults, None).unwrap();
//! let predicate = build(&spec, &BuildContext::default()).unwrap();
//! assert_eq!(predicate.where_clause.as_deref(), Some("Subject LIKE '%printer%'"));
//! assert_eq!(predicate.limit, 10);
//! ```

use chrono::{NaiveDate, NaiveDateTime};

use super::builder::{FilterSpec, Literal, Owner};
use crate::error::SfError;
use crate::schema::ObjectTypeSchema;

/// Per-type fields the translator falls back on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TypeDefaults {
    /// Field searched by `--contains`.
    pub contains_field: Option<&'static str>,
    /// Field filtered by `--after` / `--before`.
    pub date_field: Option<&'static str>,
    /// Field filtered by `--min` / `--max`.
    pub number_field: Option<&'static str>,
    /// Field matched by `--mine` / `--owner`.
    pub owner_field: Option<&'static str>,
    /// Boolean field that must be false unless closed records are wanted.
    pub closed_field: Option<&'static str>,
}

/// The recognised filter flags, already parsed from the command line.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterOptions {
    pub ids: Vec<String>,
    /// `FIELD=VALUE` pairs.
    pub eq: Vec<(String, String)>,
    pub contains: Option<String>,
    pub contains_field: Option<String>,
    pub after: Option<NaiveDateTime>,
    pub before: Option<NaiveDateTime>,
    pub date_field: Option<String>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub number_field: Option<String>,
    pub mine: bool,
    /// Owner user id (aliases are resolved by the client).
    pub owner: Option<String>,
    pub owner_field: Option<String>,
    /// Raw SOQL condition.
    pub where_raw: Option<String>,
    pub include_closed: bool,
    pub limit: Option<usize>,
}

/// Parse a `FIELD=VALUE` argument.
pub fn parse_assignment(arg: &str) -> Result<(String, String), String> {
    match arg.split_once('=') {
        Some((field, value)) if !field.trim().is_empty() => {
            Ok((field.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected FIELD=VALUE, got '{}'", arg)),
    }
}

/// Parse `YYYY-MM-DD` (midnight) or `YYYY-MM-DDTHH:MM:SS`.
pub fn parse_datetime(arg: &str) -> Result<NaiveDateTime, String> {
    if let Ok(dt) = NaiveDateTime::parse_from_str(arg, "%Y-%m-%dT%H:%M:%S") {
        return Ok(dt);
    }
    NaiveDate::parse_from_str(arg, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .ok_or_else(|| format!("expected YYYY-MM-DD or YYYY-MM-DDTHH:MM:SS, got '{}'", arg))
}

fn pick<'a>(
    explicit: &'a Option<String>,
    fallback: Option<&'static str>,
    flag: &str,
    object_type: &str,
) -> Result<&'a str, SfError> {
    explicit
        .as_deref()
        .or(fallback)
        .ok_or_else(|| SfError::query(format!("{} needs a field on {}", flag, object_type)))
}

impl FilterOptions {
    /// Whether no filter flag was given.
    pub fn is_empty(&self) -> bool {
        *self
            == FilterOptions {
                include_closed: self.include_closed,
                limit: self.limit,
                ..Default::default()
            }
    }

    /// Translate into a FilterSpec for `object_type`.
    ///
    /// `schema`, when known, types the `--eq` values (numbers and booleans
    /// are written bare).
    ///
    /// # Errors
    ///
    /// [`SfError::Query`] if a flag needs a field the type has no default
    /// for and none was given.
    pub fn to_filter(
        &self,
        object_type: &str,
        defaults: &TypeDefaults,
        schema: Option<&ObjectTypeSchema>,
    ) -> Result<FilterSpec, SfError> {
        let mut spec = FilterSpec::new(object_type);

        if !self.ids.is_empty() {
            spec = spec.is_in("Id", self.ids.iter().map(String::as_str));
        }

        for (field, raw) in &self.eq {
            let field_type = schema.and_then(|s| s.field(field)).map(|f| &f.field_type);
            spec = spec.eq(field.as_str(), Literal::parse_for(raw, field_type));
        }

        if let Some(text) = &self.contains {
            let field = pick(
                &self.contains_field,
                defaults.contains_field,
                "--contains",
                object_type,
            )?;
            spec = spec.like(field, text.as_str());
        }

        if self.after.is_some() || self.before.is_some() {
            let field = pick(
                &self.date_field,
                defaults.date_field,
                "--after/--before",
                object_type,
            )?;
            spec = spec.range(
                field,
                self.after.map(Literal::DateTime),
                self.before.map(Literal::DateTime),
            );
        }

        if self.min.is_some() || self.max.is_some() {
            let field = pick(
                &self.number_field,
                defaults.number_field,
                "--min/--max",
                object_type,
            )?;
            spec = spec.range(
                field,
                self.min.map(Literal::Number),
                self.max.map(Literal::Number),
            );
        }

        if self.mine || self.owner.is_some() {
            let field = pick(
                &self.owner_field,
                defaults.owner_field,
                "--mine/--owner",
                object_type,
            )?;
            let owner = match &self.owner {
                Some(user) => Owner::User(user.clone()),
                None => Owner::Me,
            };
            spec = spec.owned_by(field, owner);
        }

        if let Some(raw) = &self.where_raw {
            spec = spec.raw(raw.as_str());
        }

        if let Some(closed) = defaults.closed_field.filter(|_| !self.include_closed) {
            spec = spec.eq(closed, false);
        }

        if let Some(limit) = self.limit {
            spec = spec.limit(limit);
        }

        Ok(spec)
    }
}
