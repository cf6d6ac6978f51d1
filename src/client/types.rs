//! client::types
//!
//! Per-type behavior: lookup keys, default filter fields, default dump fields.

use crate::query::TypeDefaults;

/// How `get(id)` interprets its argument before falling back to `Id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdLookup {
    /// Only by record id.
    Id,
    /// Up to eight digits: by zero-padded `CaseNumber`.
    CaseNumber,
    /// Anything not shaped like a record id: by `Alias`.
    Alias,
}

/// Behavior of one object type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeProfile {
    pub defaults: TypeDefaults,
    pub lookup: IdLookup,
    /// Fields printed when the caller names none. Empty prints all fields.
    pub default_fields: &'static [&'static str],
}

const GENERIC: TypeProfile = TypeProfile {
    defaults: TypeDefaults {
        contains_field: Some("Name"),
        date_field: Some("CreatedDate"),
        number_field: None,
        owner_field: Some("OwnerId"),
        closed_field: None,
    },
    lookup: IdLookup::Id,
    default_fields: &[],
};

/// Look up the profile of `object_type`; unknown types get a generic one.
pub fn profile_for(object_type: &str) -> TypeProfile {
    match object_type {
        "Case" => TypeProfile {
            defaults: TypeDefaults {
                contains_field: Some("Subject"),
                closed_field: Some("IsClosed"),
                ..GENERIC.defaults
            },
            lookup: IdLookup::CaseNumber,
            ..GENERIC
        },
        "User" => TypeProfile {
            defaults: TypeDefaults {
                owner_field: None,
                ..GENERIC.defaults
            },
            lookup: IdLookup::Alias,
            ..GENERIC
        },
        "CaseComment" => TypeProfile {
            defaults: TypeDefaults {
                contains_field: Some("CommentBody"),
                owner_field: Some("CreatedById"),
                ..GENERIC.defaults
            },
            default_fields: &["CommentBody"],
            ..GENERIC
        },
        "TimeCard__c" => TypeProfile {
            defaults: TypeDefaults {
                contains_field: None,
                date_field: Some("StartTime__c"),
                number_field: Some("TotalMinutesStatic__c"),
                ..GENERIC.defaults
            },
            ..GENERIC
        },
        _ => GENERIC,
    }
}

/// Whether `value` is shaped like a 15 or 18 character record id.
pub fn is_record_id(value: &str) -> bool {
    matches!(value.len(), 15 | 18) && value.chars().all(|c| c.is_ascii_alphanumeric())
}

/// Zero-padded case number for an argument of at most eight digits.
pub fn case_number(value: &str) -> Option<String> {
    if value.is_empty() || value.len() > 8 || !value.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    Some(format!("{:0>8}", value))
}
