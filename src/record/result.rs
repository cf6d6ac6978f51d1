//! record::result
//!
//! Ordered proxies returned by a query.

use std::sync::Arc;

use crate::client::context::Context;
use crate::error::SfError;
use crate::query::{Literal, Selection, Statement};
use crate::transport::Row;

use super::proxy::RecordProxy;

/// Ids per batch when loading fields for many records.
const BATCH_SIZE: usize = 200;

/// Records of one type, in query order.
#[derive(Debug, Clone)]
pub struct QueryResult {
    object_type: String,
    records: Vec<RecordProxy>,
    ctx: Arc<Context>,
}

impl QueryResult {
    pub(crate) fn new(object_type: &str, records: Vec<RecordProxy>, ctx: Arc<Context>) -> Self {
        Self {
            object_type: object_type.to_string(),
            records,
            ctx,
        }
    }

    pub fn object_type(&self) -> &str {
        &self.object_type
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, RecordProxy> {
        self.records.iter()
    }

    pub fn first(&self) -> Option<&RecordProxy> {
        self.records.first()
    }

    pub fn ids(&self) -> Vec<&str> {
        self.records.iter().map(RecordProxy::id).collect()
    }

    /// Keep at most `limit` records.
    pub(crate) fn truncate(&mut self, limit: usize) {
        self.records.truncate(limit);
    }

    /// Append the records of `other` not already present.
    pub(crate) fn extend_unique(&mut self, other: QueryResult) {
        for record in other.records {
            if !self.records.contains(&record) {
                self.records.push(record);
            }
        }
    }

    /// Fetch `fields` for every record lacking them, in batches by id.
    ///
    /// # Errors
    ///
    /// [`SfError::FieldNotFound`] if the type has no such field.
    pub async fn load_fields(&self, fields: &[String]) -> Result<(), SfError> {
        if self.records.is_empty() {
            return Ok(());
        }

        let schema = self.ctx.schema.describe(&self.object_type).await?;
        let mut names = Vec::with_capacity(fields.len());
        for field in fields {
            let known = schema.field(field).ok_or_else(|| SfError::FieldNotFound {
                object_type: self.object_type.clone(),
                field: field.clone(),
            })?;
            names.push(known.name.clone());
        }

        let pending: Vec<&RecordProxy> = self
            .records
            .iter()
            .filter(|r| names.iter().any(|n| r.cached(n).is_none()))
            .collect();

        let selection = self.ctx.selection(&names);
        let full = selection == Selection::AllFields;
        for batch in pending.chunks(BATCH_SIZE) {
            let ids: Vec<Literal> = batch.iter().map(|r| Literal::from(r.id())).collect();
            let rendered: Vec<String> = ids.iter().map(ToString::to_string).collect();
            let where_clause = format!("Id IN ({})", rendered.join(","));
            let statement =
                Statement::select(&self.object_type, selection.clone(), Some(&where_clause))
                    .limit(batch.len());

            self.ctx.trace("load_fields", &format!("{} x{}", self.object_type, batch.len()));
            let rows: Vec<Row> = self.ctx.query(&statement).await?.records;
            for row in rows {
                let id = row.get("Id").and_then(|v| v.as_str()).map(str::to_string);
                if let Some(record) = id.and_then(|id| batch.iter().find(|r| r.id() == id)) {
                    record.merge(row, full);
                }
            }
        }
        Ok(())
    }
}

impl IntoIterator for QueryResult {
    type Item = RecordProxy;
    type IntoIter = std::vec::IntoIter<RecordProxy>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.into_iter()
    }
}

impl<'a> IntoIterator for &'a QueryResult {
    type Item = &'a RecordProxy;
    type IntoIter = std::slice::Iter<'a, RecordProxy>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}
