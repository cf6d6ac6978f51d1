//! query::soql
//!
//! The SELECT statement sent to the query endpoint.

use std::fmt;

/// What a statement selects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// `COUNT()`.
    Count,
    /// `FIELDS(ALL)`.
    AllFields,
    /// `Id` plus these fields.
    Fields(Vec<String>),
}

/// A complete SOQL statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    pub object_type: String,
    pub selection: Selection,
    pub where_clause: Option<String>,
    pub order_by: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl Statement {
    /// `SELECT COUNT() FROM <type> [WHERE ...]`.
    pub fn count(object_type: &str, where_clause: Option<&str>) -> Self {
        Self {
            object_type: object_type.to_string(),
            selection: Selection::Count,
            where_clause: where_clause.map(str::to_string),
            order_by: None,
            limit: None,
            offset: None,
        }
    }

    /// A row statement; `order_by` defaults to `Id`.
    pub fn select(object_type: &str, selection: Selection, where_clause: Option<&str>) -> Self {
        Self {
            object_type: object_type.to_string(),
            selection,
            where_clause: where_clause.map(str::to_string),
            order_by: Some("Id".to_string()),
            limit: None,
            offset: None,
        }
    }

    pub fn order_by(mut self, field: Option<&str>) -> Self {
        if let Some(field) = field {
            self.order_by = Some(field.to_string());
        }
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Set the offset; zero renders no OFFSET.
    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = if offset == 0 { None } else { Some(offset) };
        self
    }
}

/// `Id` first, then the remaining fields without duplicates.
fn field_list(fields: &[String]) -> String {
    let mut list: Vec<&str> = vec!["Id"];
    for field in fields {
        if !list.iter().any(|f| f.eq_ignore_ascii_case(field)) {
            list.push(field);
        }
    }
    list.join(", ")
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let selection = match &self.selection {
            Selection::Count => "COUNT()".to_string(),
            Selection::AllFields => "FIELDS(ALL)".to_string(),
            Selection::Fields(fields) => field_list(fields),
        };
        write!(f, "SELECT {} FROM {}", selection, self.object_type)?;
        if let Some(where_clause) = &self.where_clause {
            write!(f, " WHERE {}", where_clause)?;
        }
        if let Some(order_by) = &self.order_by {
            write!(f, " ORDER BY {}", order_by)?;
        }
        if let Some(limit) = self.limit {
            write!(f, " LIMIT {}", limit)?;
        }
        if let Some(offset) = self.offset {
            write!(f, " OFFSET {}", offset)?;
        }
        Ok(())
    }
}
