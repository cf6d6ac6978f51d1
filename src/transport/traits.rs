//! transport::traits
//!
//! The remote protocol seen by the rest of the crate.
//!
//! # Design
//!
//! The trait is async because every operation is network I/O. Rows are
//! plain JSON objects with the remote `attributes` key already removed.
//! Pagination of a single statement (`nextRecordsUrl`) is the transport's
//! business; callers see one complete response per statement.

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::SfError;
use crate::schema::ObjectTypeSchema;

/// One record as returned by the remote.
pub type Row = Map<String, Value>;

/// Result of one query statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResponse {
    /// Rows matched. For `SELECT COUNT()` this is the count and `records`
    /// is empty.
    pub total_size: usize,
    /// Whether all rows were retrieved.
    pub done: bool,
    /// Rows, in remote order.
    pub records: Vec<Row>,
}

/// The remote CRM store.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Short name for logs ("rest", "mock").
    fn name(&self) -> &'static str;

    /// Run a SOQL statement.
    async fn query(&self, soql: &str) -> Result<QueryResponse, SfError>;

    /// Fetch the schema of one object type.
    ///
    /// # Errors
    ///
    /// [`SfError::UnknownType`] if the type does not exist.
    async fn describe(&self, object_type: &str) -> Result<ObjectTypeSchema, SfError>;

    /// Names of the object types that can be queried.
    async fn describe_global(&self) -> Result<Vec<String>, SfError>;

    /// User id of the authenticated user.
    async fn current_user_id(&self) -> Result<String, SfError>;

    /// Delete one record.
    async fn delete(&self, object_type: &str, id: &str) -> Result<(), SfError>;
}
