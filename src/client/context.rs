//! client::context
//!
//! State shared by a client and every proxy it hands out: the transport, the
//! schema cache, the options, the identity map and the current user.
//!
//! # Paging
//!
//! A query first counts its matches, then reads pages of 2000 rows (200 with
//! `FIELDS(ALL)`) with OFFSET. The remote caps OFFSET at 2000, so a query
//! wanting more than 2000 plus one page is refused up front rather than
//! returning a silently truncated result.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tokio::sync::OnceCell;

use super::SfOptions;
use crate::error::SfError;
use crate::query::{Selection, Statement};
use crate::record::{ProxyState, RecordProxy};
use crate::schema::SchemaCache;
use crate::transport::{self, QueryResponse, Row, Transport};

/// Rows per page for explicit field lists.
pub(crate) const PAGE_SIZE: usize = 2000;

/// Rows per page for `FIELDS(ALL)`.
pub(crate) const ALL_FIELDS_PAGE_SIZE: usize = 200;

/// Largest OFFSET the remote accepts.
pub(crate) const MAX_OFFSET: usize = 2000;

type Identity = HashMap<String, HashMap<String, Arc<Mutex<ProxyState>>>>;

pub(crate) struct Context {
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) schema: SchemaCache,
    pub(crate) options: SfOptions,
    identity: Mutex<Identity>,
    current_user: OnceCell<String>,
}

impl Context {
    pub(crate) fn new(transport: Arc<dyn Transport>, options: SfOptions) -> Self {
        Self {
            schema: SchemaCache::new(transport.clone()).with_verbose(options.verbose),
            transport,
            options,
            identity: Mutex::new(HashMap::new()),
            current_user: OnceCell::new(),
        }
    }

    /// Log a remote call; at info level when verbose.
    pub(crate) fn trace(&self, operation: &str, argument: &str) {
        transport::trace(self.options.verbose, operation, argument);
    }

    /// Run one statement.
    pub(crate) async fn query(&self, statement: &Statement) -> Result<QueryResponse, SfError> {
        let soql = statement.to_string();
        self.trace("query", &soql);
        self.transport.query(&soql).await
    }

    /// Selection used for row queries given the requested fields.
    pub(crate) fn selection(&self, fields: &[String]) -> Selection {
        if self.options.preload_fields {
            Selection::AllFields
        } else {
            Selection::Fields(fields.to_vec())
        }
    }

    /// Fetch up to `limit` rows matching `where_clause`, page by page.
    ///
    /// # Errors
    ///
    /// [`SfError::Query`] if more rows are wanted than OFFSET paging can reach.
    pub(crate) async fn fetch(
        &self,
        object_type: &str,
        where_clause: Option<&str>,
        selection: Selection,
        order_by: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Row>, SfError> {
        let count = self
            .query(&Statement::count(object_type, where_clause))
            .await?
            .total_size;
        let wanted = count.min(limit);

        let page_size = match selection {
            Selection::AllFields => ALL_FIELDS_PAGE_SIZE,
            _ => PAGE_SIZE,
        };
        if wanted > MAX_OFFSET + page_size {
            return Err(SfError::query(format!(
                "Query matches too many results ({})",
                wanted
            )));
        }

        let mut rows: Vec<Row> = Vec::with_capacity(wanted);
        while rows.len() < wanted {
            let statement = Statement::select(object_type, selection.clone(), where_clause)
                .order_by(order_by)
                .limit(page_size.min(wanted - rows.len()))
                .offset(rows.len());
            let page = self.query(&statement).await?.records;
            if page.is_empty() {
                break;
            }
            rows.extend(page);
        }
        rows.truncate(wanted);
        Ok(rows)
    }

    fn identity(&self) -> std::sync::MutexGuard<'_, Identity> {
        match self.identity.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// The proxy already known for this record, if any.
    pub(crate) fn known(self: &Arc<Self>, object_type: &str, id: &str) -> Option<RecordProxy> {
        let state = self.identity().get(object_type)?.get(id)?.clone();
        Some(RecordProxy::new(object_type, id, state, self.clone()))
    }

    /// Turn a row into a proxy, merging into the known proxy of that record.
    ///
    /// `full` marks rows selected with `FIELDS(ALL)`.
    pub(crate) fn materialize(
        self: &Arc<Self>,
        object_type: &str,
        row: Row,
        full: bool,
    ) -> Result<RecordProxy, SfError> {
        let id = match row.get("Id") {
            Some(Value::String(id)) => id.clone(),
            _ => {
                return Err(SfError::query(format!(
                    "{} row without an Id",
                    object_type
                )))
            }
        };

        let state = self
            .identity()
            .entry(object_type.to_string())
            .or_default()
            .entry(id.clone())
            .or_default()
            .clone();
        if let Ok(mut guard) = state.lock() {
            guard.merge(row, full);
        }

        Ok(RecordProxy::new(object_type, &id, state, self.clone()))
    }

    /// Drop a record from the identity map.
    pub(crate) fn forget(&self, object_type: &str, id: &str) {
        if let Some(records) = self.identity().get_mut(object_type) {
            records.remove(id);
        }
    }

    /// User id of the authenticated user, fetched once.
    pub(crate) async fn current_user_id(&self) -> Result<String, SfError> {
        let id = self
            .current_user
            .get_or_try_init(|| async {
                self.trace("current_user", "");
                self.transport.current_user_id().await
            })
            .await?;
        Ok(id.clone())
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("transport", &self.transport.name())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::MockTransport;
    use serde_json::json;

    fn context_with(count: usize, options: SfOptions) -> (MockTransport, Arc<Context>) {
        let mock = MockTransport::new();
        for i in 0..count {
            mock.add_record("Task", json!({"Id": format!("00T{:05}", i), "Subject": "call"}));
        }
        let ctx = Arc::new(Context::new(Arc::new(mock.clone()), options));
        (mock, ctx)
    }

    #[tokio::test]
    async fn fetch_counts_then_pages() {
        let (mock, ctx) = context_with(2500, SfOptions::default());
        let rows = ctx
            .fetch("Task", None, Selection::Fields(vec![]), None, 2500)
            .await
            .unwrap();

        assert_eq!(rows.len(), 2500);
        assert_eq!(
            mock.statements(),
            vec![
                "SELECT COUNT() FROM Task".to_string(),
                "SELECT Id FROM Task ORDER BY Id LIMIT 2000".to_string(),
                "SELECT Id FROM Task ORDER BY Id LIMIT 500 OFFSET 2000".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn fetch_respects_limit() {
        let (mock, ctx) = context_with(30, SfOptions::default());
        let rows = ctx
            .fetch("Task", Some("Subject = 'call'"), Selection::Fields(vec![]), None, 5)
            .await
            .unwrap();
        assert_eq!(rows.len(), 5);
        assert_eq!(mock.query_count(), 2);
    }

    #[tokio::test]
    async fn fetch_refuses_past_offset_ceiling() {
        let (mock, ctx) = context_with(2201, SfOptions::default());
        let err = ctx
            .fetch("Task", None, Selection::AllFields, None, 5000)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "query failed: Query matches too many results (2201)");
        assert_eq!(mock.query_count(), 1);
    }

    #[tokio::test]
    async fn materialize_merges_into_known_record() {
        let (_mock, ctx) = context_with(0, SfOptions::default());
        let row = |v: Value| match v {
            Value::Object(m) => m,
            _ => unreachable!(),
        };

        let first = ctx
            .materialize("Case", row(json!({"Id": "500A", "Subject": "fire"})), false)
            .unwrap();
        let second = ctx
            .materialize("Case", row(json!({"Id": "500A", "Status": "New"})), false)
            .unwrap();

        assert_eq!(first.cached("Status"), Some(json!("New")));
        assert_eq!(second.cached("Subject"), Some(json!("fire")));
        assert!(ctx.known("Case", "500A").is_some());

        ctx.forget("Case", "500A");
        assert!(ctx.known("Case", "500A").is_none());
    }

    #[tokio::test]
    async fn current_user_is_fetched_once() {
        let mock = MockTransport::new().with_current_user("005ME");
        let ctx = Context::new(Arc::new(mock.clone()), SfOptions::default());

        assert_eq!(ctx.current_user_id().await.unwrap(), "005ME");
        assert_eq!(ctx.current_user_id().await.unwrap(), "005ME");
        assert_eq!(mock.operations().len(), 1);
    }
}
