//! transport::mock
//!
//! Mock transport for deterministic testing.
//!
//! # Design
//!
//! The mock stores records and schemas in memory and answers SOQL with a
//! small evaluator, so the query paths of the client run unchanged against
//! it. Every call is recorded, which lets tests count network round trips.
//! Failures and a describe delay can be injected.
//!
//! # Example
//!
//! ```
//! use sftools::transport::mock::MockTransport;
//! use sftools::transport::Transport;
//! use serde_json::json;
//!
//! # tokio_test::block_on(async {
//! let mock = MockTransport::new();
//! mock.add_record("Case", json!({"Id": "500A", "CaseNumber": "00001234"}));
//!
//! let response = mock
//!     .query("SELECT Id FROM Case WHERE CaseNumber = '00001234'")
//!     .await
//!     .unwrap();
//! assert_eq!(response.records.len(), 1);
//! assert_eq!(mock.query_count(), 1);
//! # });
//! ```

use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::eval::{self, Select};
use super::traits::{QueryResponse, Row, Transport};
use crate::error::SfError;
use crate::schema::{FieldSchema, FieldType, ObjectTypeSchema};
use crate::session::AuthError;

/// Mock transport for testing.
///
/// Thread-safe via internal `Arc<Mutex<...>>` wrapping; clones share state.
#[derive(Debug, Clone)]
pub struct MockTransport {
    /// Internal state shared across clones.
    inner: Arc<Mutex<MockTransportInner>>,
}

/// Internal mutable state.
#[derive(Debug, Default)]
struct MockTransportInner {
    /// Records by object type, in insertion order.
    records: BTreeMap<String, Vec<Row>>,
    /// Schemas by object type.
    schemas: BTreeMap<String, ObjectTypeSchema>,
    /// Types whose schema was set explicitly (not inferred from records).
    explicit: Vec<String>,
    /// User id returned by `current_user_id`.
    current_user: Option<String>,
    /// Delay before answering `describe`.
    describe_delay: Option<Duration>,
    /// Method to fail on (for testing error paths).
    fail_on: Option<FailOn>,
    /// Recorded operations for verification.
    operations: Vec<MockOperation>,
}

/// Configuration for which operation should fail.
#[derive(Debug)]
pub enum FailOn {
    /// Fail every query with the given error.
    Query(SfError),
    /// Fail queries whose text contains the pattern.
    QueryMatching(String, SfError),
    /// Fail describe with the given error.
    Describe(SfError),
    /// Fail describe_global with the given error.
    DescribeGlobal(SfError),
    /// Fail current_user_id with the given error.
    CurrentUser(SfError),
    /// Fail delete with the given error.
    Delete(SfError),
}

/// Recorded operation for test verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockOperation {
    Query { soql: String },
    Describe { object_type: String },
    DescribeGlobal,
    CurrentUser,
    Delete { object_type: String, id: String },
}

impl MockTransport {
    /// Create a new empty mock transport.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(MockTransportInner::default())),
        }
    }

    /// Add a record. `record` must be a JSON object with an `Id`.
    ///
    /// Unless a schema was set for the type, the schema is extended with the
    /// record's fields, typed from their values.
    pub fn add_record(&self, object_type: &str, record: Value) {
        let Value::Object(row) = record else {
            panic!("mock records must be JSON objects");
        };
        let mut inner = self.inner.lock().unwrap();
        if !inner.explicit.iter().any(|t| t == object_type) {
            let schema = inner
                .schemas
                .entry(object_type.to_string())
                .or_insert_with(|| ObjectTypeSchema::new(object_type, Vec::new()));
            for (name, value) in &row {
                if !schema.fields.iter().any(|f| &f.name == name) {
                    schema.fields.push(FieldSchema::new(name.clone(), infer_type(name, value)));
                }
            }
        }
        inner
            .records
            .entry(object_type.to_string())
            .or_default()
            .push(row);
    }

    /// Change one field of a stored record, as another user editing it would.
    pub fn set_field(&self, object_type: &str, id: &str, field: &str, value: Value) {
        let mut inner = self.inner.lock().unwrap();
        let row = inner
            .records
            .get_mut(object_type)
            .and_then(|rows| rows.iter_mut().find(|r| r.get("Id") == Some(&Value::from(id))))
            .unwrap_or_else(|| panic!("no mock {} record {}", object_type, id));
        row.insert(field.to_string(), value);
    }

    /// Builder form of [`MockTransport::add_record`].
    pub fn with_record(self, object_type: &str, record: Value) -> Self {
        self.add_record(object_type, record);
        self
    }

    /// Set the schema of a type explicitly.
    pub fn set_schema(&self, schema: ObjectTypeSchema) {
        let mut inner = self.inner.lock().unwrap();
        inner.explicit.push(schema.name.clone());
        inner.schemas.insert(schema.name.clone(), schema);
    }

    /// Builder form of [`MockTransport::set_schema`].
    pub fn with_schema(self, schema: ObjectTypeSchema) -> Self {
        self.set_schema(schema);
        self
    }

    /// Set the user id of the authenticated user.
    pub fn with_current_user(self, user_id: &str) -> Self {
        self.inner.lock().unwrap().current_user = Some(user_id.to_string());
        self
    }

    /// Delay every describe by `delay`, failing ones included.
    pub fn with_describe_delay(self, delay: Duration) -> Self {
        self.inner.lock().unwrap().describe_delay = Some(delay);
        self
    }

    /// Configure the mock to fail on a specific operation.
    ///
    /// # Example
    ///
    /// ```
    /// use sftools::transport::mock::{MockTransport, FailOn};
    /// use sftools::SfError;
    ///
    /// let mock = MockTransport::new()
    ///     .fail_on(FailOn::Query(SfError::Network("timed out".into())));
    /// ```
    pub fn fail_on(self, fail_on: FailOn) -> Self {
        self.inner.lock().unwrap().fail_on = Some(fail_on);
        self
    }

    /// Clear the failure configuration.
    pub fn clear_fail_on(&self) {
        self.inner.lock().unwrap().fail_on = None;
    }

    /// Get all recorded operations.
    pub fn operations(&self) -> Vec<MockOperation> {
        self.inner.lock().unwrap().operations.clone()
    }

    /// Clear recorded operations.
    pub fn clear_operations(&self) {
        self.inner.lock().unwrap().operations.clear();
    }

    /// SOQL statements received, in order.
    pub fn statements(&self) -> Vec<String> {
        self.operations()
            .into_iter()
            .filter_map(|op| match op {
                MockOperation::Query { soql } => Some(soql),
                _ => None,
            })
            .collect()
    }

    /// Number of queries received.
    pub fn query_count(&self) -> usize {
        self.statements().len()
    }

    /// Number of describe calls received.
    pub fn describe_count(&self) -> usize {
        self.operations()
            .iter()
            .filter(|op| matches!(op, MockOperation::Describe { .. }))
            .count()
    }

    /// Records currently stored for a type.
    pub fn records(&self, object_type: &str) -> Vec<Row> {
        self.inner
            .lock()
            .unwrap()
            .records
            .get(object_type)
            .cloned()
            .unwrap_or_default()
    }

    /// Record an operation.
    fn record(&self, op: MockOperation) {
        self.inner.lock().unwrap().operations.push(op);
    }

    /// Check if we should fail and return the error if so.
    fn check_fail(&self, expected: &str, soql: Option<&str>) -> Option<SfError> {
        let inner = self.inner.lock().unwrap();
        match &inner.fail_on {
            Some(FailOn::Query(e)) if expected == "query" => Some(e.duplicate()),
            Some(FailOn::QueryMatching(pattern, e))
                if expected == "query" && soql.is_some_and(|s| s.contains(pattern.as_str())) =>
            {
                Some(e.duplicate())
            }
            Some(FailOn::Describe(e)) if expected == "describe" => Some(e.duplicate()),
            Some(FailOn::DescribeGlobal(e)) if expected == "describe_global" => {
                Some(e.duplicate())
            }
            Some(FailOn::CurrentUser(e)) if expected == "current_user" => Some(e.duplicate()),
            Some(FailOn::Delete(e)) if expected == "delete" => Some(e.duplicate()),
            _ => None,
        }
    }

    fn run_query(&self, soql: &str) -> Result<QueryResponse, SfError> {
        let statement = eval::parse(soql).map_err(|e| SfError::Query {
            status: Some(400),
            message: format!("MALFORMED_QUERY: {}", e),
        })?;

        let inner = self.inner.lock().unwrap();
        let schema = inner.schemas.get(&statement.from).ok_or_else(|| SfError::Query {
            status: Some(400),
            message: format!(
                "INVALID_TYPE: sObject type '{}' is not supported.",
                statement.from
            ),
        })?;

        let mut referenced: Vec<&str> = statement
            .filter
            .as_ref()
            .map(|f| f.fields())
            .unwrap_or_default();
        if let Select::Fields(fields) = &statement.select {
            referenced.extend(fields.iter().map(String::as_str));
        }
        if let Some(missing) = referenced.iter().find(|f| !schema.has_field(f)) {
            return Err(SfError::Query {
                status: Some(400),
                message: format!(
                    "INVALID_FIELD: No such column '{}' on entity '{}'",
                    missing, statement.from
                ),
            });
        }

        let mut matched: Vec<&Row> = inner
            .records
            .get(&statement.from)
            .map(|rows| {
                rows.iter()
                    .filter(|row| statement.filter.as_ref().map_or(true, |f| f.matches(row)))
                    .collect()
            })
            .unwrap_or_default();

        if statement.select == Select::Count {
            return Ok(QueryResponse {
                total_size: matched.len(),
                done: true,
                records: Vec::new(),
            });
        }

        if let Some((field, descending)) = &statement.order_by {
            matched.sort_by(|a, b| {
                let ordering =
                    eval::order_values(eval::sort_value(a, field), eval::sort_value(b, field));
                if *descending {
                    ordering.reverse()
                } else {
                    ordering
                }
            });
        }

        let records: Vec<Row> = matched
            .into_iter()
            .skip(statement.offset)
            .take(statement.limit.unwrap_or(usize::MAX))
            .map(|row| match &statement.select {
                Select::Fields(fields) => project(row, fields),
                _ => row.clone(),
            })
            .collect();

        Ok(QueryResponse {
            total_size: records.len(),
            done: true,
            records,
        })
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

/// Keep only the selected fields, using the stored spelling of each name.
fn project(row: &Row, fields: &[String]) -> Row {
    let mut projected = Row::new();
    for field in fields {
        match eval::lookup(row, field) {
            Some((name, value)) => {
                projected.insert(name.clone(), value.clone());
            }
            None => {
                projected.insert(field.clone(), Value::Null);
            }
        }
    }
    projected
}

/// Guess a field type from a sample value.
fn infer_type(name: &str, value: &Value) -> FieldType {
    match value {
        Value::Bool(_) => FieldType::Boolean,
        Value::Number(_) => FieldType::Number,
        Value::String(_) if name == "Id" || name.ends_with("Id") || name.ends_with("Id__c") => {
            FieldType::Reference
        }
        Value::String(s) if s.len() >= 19 && s.as_bytes()[10] == b'T' => FieldType::DateTime,
        Value::String(s) if s.len() == 10 && s.as_bytes()[4] == b'-' => FieldType::Date,
        _ => FieldType::String,
    }
}

#[async_trait]
impl Transport for MockTransport {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn query(&self, soql: &str) -> Result<QueryResponse, SfError> {
        self.record(MockOperation::Query {
            soql: soql.to_string(),
        });

        if let Some(err) = self.check_fail("query", Some(soql)) {
            return Err(err);
        }

        self.run_query(soql)
    }

    async fn describe(&self, object_type: &str) -> Result<ObjectTypeSchema, SfError> {
        self.record(MockOperation::Describe {
            object_type: object_type.to_string(),
        });

        let delay = self.inner.lock().unwrap().describe_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(err) = self.check_fail("describe", None) {
            return Err(err);
        }

        let inner = self.inner.lock().unwrap();
        inner
            .schemas
            .get(object_type)
            .cloned()
            .ok_or_else(|| SfError::UnknownType(object_type.to_string()))
    }

    async fn describe_global(&self) -> Result<Vec<String>, SfError> {
        self.record(MockOperation::DescribeGlobal);

        if let Some(err) = self.check_fail("describe_global", None) {
            return Err(err);
        }

        Ok(self.inner.lock().unwrap().schemas.keys().cloned().collect())
    }

    async fn current_user_id(&self) -> Result<String, SfError> {
        self.record(MockOperation::CurrentUser);

        if let Some(err) = self.check_fail("current_user", None) {
            return Err(err);
        }

        self.inner
            .lock()
            .unwrap()
            .current_user
            .clone()
            .ok_or_else(|| AuthError::NotAuthenticated("mock".into()).into())
    }

    async fn delete(&self, object_type: &str, id: &str) -> Result<(), SfError> {
        self.record(MockOperation::Delete {
            object_type: object_type.to_string(),
            id: id.to_string(),
        });

        if let Some(err) = self.check_fail("delete", None) {
            return Err(err);
        }

        let mut inner = self.inner.lock().unwrap();
        let rows = inner.records.entry(object_type.to_string()).or_default();
        let before = rows.len();
        rows.retain(|row| row.get("Id").and_then(Value::as_str) != Some(id));
        if rows.len() == before {
            return Err(SfError::Query {
                status: Some(404),
                message: format!("NOT_FOUND: The requested resource does not exist ({})", id),
            });
        }
        Ok(())
    }
}
