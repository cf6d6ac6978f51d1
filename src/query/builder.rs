//! query::builder
//!
//! FilterSpec and the Query Builder.
//!
//! # Rendering Rules
//!
//! | Clause   | Rendered as                                   |
//! |----------|-----------------------------------------------|
//! | equality | `field = 'value'` (numbers, booleans, NULL bare) |
//! | contains | `field LIKE '%value%'`                        |
//! | range    | `field >= lower AND field <= upper`, each bound optional |
//! | id set   | `field IN ('a','b')`                          |
//! | owner    | `field = '<user id>'`                         |
//! | raw      | `(text)`                                      |
//!
//! Clauses are joined with `AND` in the order they were added.
//!
//! # Escaping
//!
//! Every string literal goes through [`quote`]: backslashes are doubled, then
//! single quotes are backslash-escaped. It is the only injection defense, so
//! nothing renders a string without it.
//!
//! # Example
//!
//! ```
//! use sftools::query::{build, BuildContext, FilterSpec, Literal};
//! use chrono::NaiveDate;
//!
//! let day = |d| NaiveDate::from_ymd_opt(2024, d, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
//! let spec = FilterSpec::new("TimeCard__c").range(
//!     "StartTime__c",
//!     Some(Literal::DateTime(day(1))),
//!     Some(Literal::DateTime(day(2))),
//! );
//! let predicate = build(&spec, &BuildContext::default()).unwrap();
//! assert_eq!(
//!     predicate.where_clause.as_deref(),
//!     Some("StartTime__c >= '2024-01-01T00:00:00' AND StartTime__c <= '2024-02-01T00:00:00'")
//! );
//! assert_eq!(predicate.limit, 2000);
//! ```

use std::fmt;

use chrono::NaiveDateTime;

use crate::error::SfError;
use crate::schema::FieldType;

/// Row limit used when the caller gives none.
pub const DEFAULT_LIMIT: usize = 2000;

/// Format of datetime literals.
const DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// A value on the right-hand side of a clause.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    /// Quoted and escaped.
    Text(String),
    /// Bare.
    Number(f64),
    /// `TRUE` / `FALSE`.
    Bool(bool),
    /// Quoted, `YYYY-MM-DDTHH:MM:SS`.
    DateTime(NaiveDateTime),
    /// `NULL`.
    Null,
}

impl Literal {
    /// Interpret user input for a field of the given type.
    ///
    /// Without a type, only the keywords `true`, `false` and `null` are
    /// recognised; everything else is text.
    pub fn parse_for(raw: &str, field_type: Option<&FieldType>) -> Literal {
        match raw.to_ascii_lowercase().as_str() {
            "null" => return Literal::Null,
            "true" if field_type.map_or(true, |t| *t == FieldType::Boolean) => {
                return Literal::Bool(true)
            }
            "false" if field_type.map_or(true, |t| *t == FieldType::Boolean) => {
                return Literal::Bool(false)
            }
            _ => {}
        }
        match field_type {
            Some(FieldType::Number) => raw
                .parse::<f64>()
                .ok()
                .filter(|n| n.is_finite())
                .map(Literal::Number)
                .unwrap_or_else(|| Literal::Text(raw.to_string())),
            _ => Literal::Text(raw.to_string()),
        }
    }
}

impl From<&str> for Literal {
    fn from(value: &str) -> Self {
        Literal::Text(value.to_string())
    }
}

impl From<String> for Literal {
    fn from(value: String) -> Self {
        Literal::Text(value)
    }
}

impl From<f64> for Literal {
    fn from(value: f64) -> Self {
        Literal::Number(value)
    }
}

impl From<bool> for Literal {
    fn from(value: bool) -> Self {
        Literal::Bool(value)
    }
}

impl From<NaiveDateTime> for Literal {
    fn from(value: NaiveDateTime) -> Self {
        Literal::DateTime(value)
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Text(s) => f.write_str(&quote(s)),
            Literal::Number(n) => write!(f, "{}", n),
            Literal::Bool(true) => f.write_str("TRUE"),
            Literal::Bool(false) => f.write_str("FALSE"),
            Literal::DateTime(dt) => write!(f, "'{}'", dt.format(DATETIME_FORMAT)),
            Literal::Null => f.write_str("NULL"),
        }
    }
}

/// Escape a string for use inside a quoted literal.
pub fn escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

/// Quote and escape a string literal.
pub fn quote(value: &str) -> String {
    format!("'{}'", escape(value))
}

/// Whose records an ownership clause selects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Owner {
    /// The authenticated user.
    Me,
    /// A user id.
    User(String),
}

/// One predicate clause.
#[derive(Debug, Clone, PartialEq)]
pub enum Clause {
    Eq {
        field: String,
        value: Literal,
    },
    Like {
        field: String,
        value: String,
    },
    Range {
        field: String,
        lower: Option<Literal>,
        upper: Option<Literal>,
    },
    In {
        field: String,
        values: Vec<Literal>,
    },
    Owner {
        field: String,
        owner: Owner,
    },
    /// A caller-written SOQL fragment, wrapped in parentheses.
    Raw(String),
}

/// Structured filter for one query. Built per call, then discarded.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterSpec {
    pub object_type: String,
    pub clauses: Vec<Clause>,
    /// Fields to select besides `Id`. Empty selects only `Id`.
    pub select: Vec<String>,
    pub order_by: Option<String>,
    pub limit: Option<usize>,
}

impl FilterSpec {
    pub fn new(object_type: impl Into<String>) -> Self {
        Self {
            object_type: object_type.into(),
            clauses: Vec::new(),
            select: Vec::new(),
            order_by: None,
            limit: None,
        }
    }

    /// Append a clause.
    pub fn clause(mut self, clause: Clause) -> Self {
        self.clauses.push(clause);
        self
    }

    pub fn eq(self, field: impl Into<String>, value: impl Into<Literal>) -> Self {
        self.clause(Clause::Eq {
            field: field.into(),
            value: value.into(),
        })
    }

    pub fn like(self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.clause(Clause::Like {
            field: field.into(),
            value: value.into(),
        })
    }

    pub fn range(
        self,
        field: impl Into<String>,
        lower: Option<Literal>,
        upper: Option<Literal>,
    ) -> Self {
        self.clause(Clause::Range {
            field: field.into(),
            lower,
            upper,
        })
    }

    pub fn is_in<I, V>(self, field: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Literal>,
    {
        self.clause(Clause::In {
            field: field.into(),
            values: values.into_iter().map(Into::into).collect(),
        })
    }

    pub fn owned_by(self, field: impl Into<String>, owner: Owner) -> Self {
        self.clause(Clause::Owner {
            field: field.into(),
            owner,
        })
    }

    pub fn raw(self, soql: impl Into<String>) -> Self {
        self.clause(Clause::Raw(soql.into()))
    }

    pub fn select<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.select.extend(fields.into_iter().map(Into::into));
        self
    }

    pub fn order_by(mut self, field: impl Into<String>) -> Self {
        self.order_by = Some(field.into());
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Whether any clause needs the current user resolved.
    pub fn needs_current_user(&self) -> bool {
        self.clauses.iter().any(|c| {
            matches!(
                c,
                Clause::Owner {
                    owner: Owner::Me,
                    ..
                }
            )
        })
    }
}

/// What `build` needs to know beyond the filter.
#[derive(Debug, Clone, Default)]
pub struct BuildContext {
    /// User id of the authenticated user, for [`Owner::Me`].
    pub current_user: Option<String>,
}

/// Rendered predicate plus row limit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Predicate {
    /// `None` when the filter has no clauses (all records match).
    pub where_clause: Option<String>,
    pub limit: usize,
}

/// Render a literal, refusing numbers SOQL cannot express.
fn literal(field: &str, value: &Literal) -> Result<String, SfError> {
    match value {
        Literal::Number(n) if !n.is_finite() => {
            Err(SfError::query(format!("{} is not a valid number for {}", n, field)))
        }
        other => Ok(other.to_string()),
    }
}

/// Render one clause. A range without bounds renders nothing.
fn render(clause: &Clause, ctx: &BuildContext) -> Result<Option<String>, SfError> {
    Ok(match clause {
        Clause::Eq { field, value } => Some(format!("{} = {}", field, literal(field, value)?)),
        Clause::Like { field, value } => Some(format!("{} LIKE '%{}%'", field, escape(value))),
        Clause::Range {
            field,
            lower,
            upper,
        } => {
            let mut bounds = Vec::new();
            for (op, bound) in [(">=", lower), ("<=", upper)] {
                if let Some(bound) = bound {
                    bounds.push(format!("{} {} {}", field, op, literal(field, bound)?));
                }
            }
            if bounds.is_empty() {
                None
            } else {
                Some(bounds.join(" AND "))
            }
        }
        Clause::In { field, values } => {
            if values.is_empty() {
                return Err(SfError::query(format!("empty IN set for {}", field)));
            }
            let rendered = values
                .iter()
                .map(|v| literal(field, v))
                .collect::<Result<Vec<_>, _>>()?;
            Some(format!("{} IN ({})", field, rendered.join(",")))
        }
        Clause::Owner { field, owner } => {
            let user = match owner {
                Owner::User(id) => id.as_str(),
                Owner::Me => ctx
                    .current_user
                    .as_deref()
                    .ok_or_else(|| SfError::query("current user is not known"))?,
            };
            Some(format!("{} = {}", field, quote(user)))
        }
        Clause::Raw(soql) => {
            let trimmed = soql.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(format!("({})", trimmed))
            }
        }
    })
}

/// Render a FilterSpec into a predicate and limit.
///
/// # Errors
///
/// [`SfError::Query`] for an empty `IN` set, a NaN or infinite number, or an
/// [`Owner::Me`] clause without a current user in `ctx`.
pub fn build(spec: &FilterSpec, ctx: &BuildContext) -> Result<Predicate, SfError> {
    let mut parts = Vec::with_capacity(spec.clauses.len());
    for clause in &spec.clauses {
        if let Some(rendered) = render(clause, ctx)? {
            parts.push(rendered);
        }
    }

    Ok(Predicate {
        where_clause: if parts.is_empty() {
            None
        } else {
            Some(parts.join(" AND "))
        },
        limit: spec.limit.unwrap_or(DEFAULT_LIMIT),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ctx() -> BuildContext {
        BuildContext::default()
    }

    fn where_of(spec: &FilterSpec) -> String {
        build(spec, &ctx()).unwrap().where_clause.unwrap_or_default()
    }

    #[test]
    fn empty_spec_matches_all_with_default_limit() {
        let predicate = build(&FilterSpec::new("Case"), &ctx()).unwrap();
        assert_eq!(predicate.where_clause, None);
        assert_eq!(predicate.limit, DEFAULT_LIMIT);
    }

    #[test]
    fn equality_quotes_text_only() {
        let spec = FilterSpec::new("Case")
            .eq("Status", "New")
            .eq("Priority__c", 2.0)
            .eq("IsClosed", false)
            .eq("ParentId", Literal::Null);
        assert_eq!(
            where_of(&spec),
            "Status = 'New' AND Priority__c = 2 AND IsClosed = FALSE AND ParentId = NULL"
        );
    }

    #[test]
    fn quotes_are_escaped() {
        let spec = FilterSpec::new("Case")
            .eq("Subject", "it's")
            .like("Description", "O'Brien\\");
        assert_eq!(
            where_of(&spec),
            "Subject = 'it\\'s' AND Description LIKE '%O\\'Brien\\\\%'"
        );
    }

    #[test]
    fn range_bounds_are_optional() {
        let only_lower = FilterSpec::new("TimeCard__c").range(
            "TotalMinutesStatic__c",
            Some(Literal::Number(30.0)),
            None,
        );
        assert_eq!(where_of(&only_lower), "TotalMinutesStatic__c >= 30");

        let only_upper = FilterSpec::new("TimeCard__c").range(
            "TotalMinutesStatic__c",
            None,
            Some(Literal::Number(90.5)),
        );
        assert_eq!(where_of(&only_upper), "TotalMinutesStatic__c <= 90.5");

        let neither = FilterSpec::new("TimeCard__c").range("TotalMinutesStatic__c", None, None);
        assert_eq!(build(&neither, &ctx()).unwrap().where_clause, None);
    }

    #[test]
    fn timecard_month_range() {
        let at = |m| {
            NaiveDate::from_ymd_opt(2024, m, 1)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap()
        };
        let spec = FilterSpec::new("TimeCard__c").range(
            "StartTime__c",
            Some(at(1).into()),
            Some(at(2).into()),
        );
        assert_eq!(
            where_of(&spec),
            "StartTime__c >= '2024-01-01T00:00:00' AND StartTime__c <= '2024-02-01T00:00:00'"
        );
    }

    #[test]
    fn id_set() {
        let spec = FilterSpec::new("Case").is_in("Id", ["500A", "500B"]);
        assert_eq!(where_of(&spec), "Id IN ('500A','500B')");
    }

    #[test]
    fn empty_id_set_is_rejected() {
        let spec = FilterSpec::new("Case").is_in("Id", Vec::<String>::new());
        let err = build(&spec, &ctx()).unwrap_err();
        assert_eq!(err.kind(), "QueryError");
    }

    #[test]
    fn non_finite_numbers_are_rejected() {
        let nan = FilterSpec::new("TimeCard__c").eq("TotalMinutesStatic__c", f64::NAN);
        assert_eq!(build(&nan, &ctx()).unwrap_err().kind(), "QueryError");

        let unbounded = FilterSpec::new("TimeCard__c").range(
            "TotalMinutesStatic__c",
            Some(Literal::Number(30.0)),
            Some(Literal::Number(f64::INFINITY)),
        );
        assert_eq!(build(&unbounded, &ctx()).unwrap_err().kind(), "QueryError");

        let listed = FilterSpec::new("TimeCard__c")
            .is_in("TotalMinutesStatic__c", [30.0, f64::NEG_INFINITY]);
        assert!(build(&listed, &ctx()).is_err());
    }

    #[test]
    fn owner_me_uses_context() {
        let spec = FilterSpec::new("Case").owned_by("OwnerId", Owner::Me);
        assert!(spec.needs_current_user());
        assert!(build(&spec, &ctx()).is_err());

        let ctx = BuildContext {
            current_user: Some("005xx".into()),
        };
        assert_eq!(
            build(&spec, &ctx).unwrap().where_clause.as_deref(),
            Some("OwnerId = '005xx'")
        );
    }

    #[test]
    fn raw_clauses_are_parenthesized() {
        let spec = FilterSpec::new("Case")
            .raw("Status = 'New' OR Status = 'Open'")
            .eq("IsClosed", false)
            .raw("   ");
        assert_eq!(
            where_of(&spec),
            "(Status = 'New' OR Status = 'Open') AND IsClosed = FALSE"
        );
    }

    #[test]
    fn explicit_limit_is_kept() {
        let spec = FilterSpec::new("Case").limit(5);
        assert_eq!(build(&spec, &ctx()).unwrap().limit, 5);
    }

    #[test]
    fn literal_parsing_follows_field_type() {
        assert_eq!(
            Literal::parse_for("30", Some(&FieldType::Number)),
            Literal::Number(30.0)
        );
        assert_eq!(
            Literal::parse_for("00001234", Some(&FieldType::String)),
            Literal::Text("00001234".into())
        );
        assert_eq!(Literal::parse_for("TRUE", None), Literal::Bool(true));
        assert_eq!(
            Literal::parse_for("true", Some(&FieldType::String)),
            Literal::Text("true".into())
        );
        assert_eq!(Literal::parse_for("null", None), Literal::Null);
        assert_eq!(
            Literal::parse_for("NaN", Some(&FieldType::Number)),
            Literal::Text("NaN".into())
        );
        assert_eq!(
            Literal::parse_for("inf", Some(&FieldType::Number)),
            Literal::Text("inf".into())
        );
    }
}
