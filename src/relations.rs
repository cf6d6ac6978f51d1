//! relations
//!
//! Named relations between object types.
//!
//! # Design
//!
//! Relations are a static table keyed by source type and name. A child
//! relation queries the target type for records whose reference field holds
//! the source id; a parent relation reads the source's reference field and
//! fetches that one record. Ownership relations query every reference field
//! of the target whose name contains `Owner` and merge the results.
//!
//! Filter flags narrow a child or ownership relation like any query on the
//! target type, with the relation's scope clause first.

use crate::client::ObjectType;
use crate::error::SfError;
use crate::query::{FilterOptions, FilterSpec, DEFAULT_LIMIT};
use crate::record::{QueryResult, RecordProxy};

/// How a relation reaches its target records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Link {
    /// Target records whose `field` holds the source id.
    Child { field: &'static str },
    /// The record referenced by the source's `field`.
    Parent { field: &'static str },
    /// Target records with any reference field containing `fragment` that
    /// holds the source id.
    OwnedBy { fragment: &'static str },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Relation {
    pub source: &'static str,
    pub name: &'static str,
    pub target: &'static str,
    pub link: Link,
}

const RELATIONS: &[Relation] = &[
    Relation {
        source: "Case",
        name: "comments",
        target: "CaseComment",
        link: Link::Child { field: "ParentId" },
    },
    Relation {
        source: "Case",
        name: "timecards",
        target: "TimeCard__c",
        link: Link::Child { field: "CaseId__c" },
    },
    Relation {
        source: "Case",
        name: "owner",
        target: "User",
        link: Link::Parent { field: "OwnerId" },
    },
    Relation {
        source: "CaseComment",
        name: "case",
        target: "Case",
        link: Link::Parent { field: "ParentId" },
    },
    Relation {
        source: "TimeCard__c",
        name: "case",
        target: "Case",
        link: Link::Parent { field: "CaseId__c" },
    },
    Relation {
        source: "User",
        name: "cases",
        target: "Case",
        link: Link::OwnedBy { fragment: "Owner" },
    },
];

/// Relations available from `object_type`.
pub fn relations_of(object_type: &str) -> Vec<&'static Relation> {
    RELATIONS.iter().filter(|r| r.source == object_type).collect()
}

fn relation(object_type: &str, name: &str) -> Result<&'static Relation, SfError> {
    RELATIONS
        .iter()
        .find(|r| r.source == object_type && r.name.eq_ignore_ascii_case(name))
        .ok_or_else(|| {
            let known: Vec<&str> = relations_of(object_type).iter().map(|r| r.name).collect();
            SfError::query(format!(
                "{} has no relation '{}' (known: {})",
                object_type,
                name,
                if known.is_empty() { "none".to_string() } else { known.join(", ") }
            ))
        })
}

/// `scope` first, then the clauses translated from `options`.
async fn scoped(
    target: &ObjectType,
    scope: FilterSpec,
    options: &FilterOptions,
) -> Result<FilterSpec, SfError> {
    let translated = target.filter_for(options).await?;
    let mut spec = scope;
    spec.clauses.extend(translated.clauses);
    spec.select = translated.select;
    spec.limit = translated.limit;
    Ok(spec)
}

/// Records reachable from `record` through the relation `name`.
///
/// # Errors
///
/// [`SfError::Query`] if the type of `record` has no such relation.
pub async fn related_records(
    record: &RecordProxy,
    name: &str,
    options: &FilterOptions,
) -> Result<QueryResult, SfError> {
    let relation = relation(record.object_type(), name)?;
    let ctx = record.context();
    let target = ObjectType::new(ctx.clone(), relation.target);
    ctx.trace("related", &format!("{}/{}.{}", record.object_type(), record.id(), relation.name));

    match relation.link {
        Link::Child { field } => {
            let scope = FilterSpec::new(relation.target).eq(field, record.id());
            target.find(&scoped(&target, scope, options).await?).await
        }
        Link::Parent { field } => {
            let parent = match record.field(field).await?.as_str() {
                Some(id) if !id.is_empty() => target.get(id).await?,
                _ => None,
            };
            Ok(QueryResult::new(
                relation.target,
                parent.into_iter().collect(),
                ctx.clone(),
            ))
        }
        Link::OwnedBy { fragment } => {
            let schema = target.schema().await?;
            let mut merged = QueryResult::new(relation.target, Vec::new(), ctx.clone());
            let mut limit = DEFAULT_LIMIT;
            for reference in schema.reference_fields_containing(fragment) {
                let scope =
                    FilterSpec::new(relation.target).eq(reference.name.as_str(), record.id());
                let spec = scoped(&target, scope, options).await?;
                limit = spec.limit.unwrap_or(DEFAULT_LIMIT);
                merged.extend_unique(target.find(&spec).await?);
                if merged.len() >= limit {
                    break;
                }
            }
            merged.truncate(limit);
            Ok(merged)
        }
    }
}

impl RecordProxy {
    /// Records reachable through the relation `name`.
    pub async fn related(
        &self,
        name: &str,
        options: &FilterOptions,
    ) -> Result<QueryResult, SfError> {
        related_records(self, name, options).await
    }
}
