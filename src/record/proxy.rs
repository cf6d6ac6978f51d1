//! record::proxy
//!
//! A lazily populated view of one record.
//!
//! # Design
//!
//! A proxy holds the object type, the id and a shared field map. Field reads
//! are served from the map; a miss checks the schema, then fetches the field
//! by id (or every field, in preload mode) and merges the answer in.
//!
//! Population is monotonic: a fully populated proxy never goes back to
//! partial. A merge replaces the values it carries, so the newest row wins.
//! Proxies of the same record obtained from different queries share one
//! field map.
//!
//! # Example
//!
//! ```
//! use sftools::client::{Sf, SfOptions};
//! use sftools::transport::mock::MockTransport;
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! let mock = MockTransport::new().with_record(
//!     "Case",
//!     json!({"Id": "5001x000000AbcdAAC", "CaseNumber": "00001234", "Subject": "Printer on fire"}),
//! );
//! let sf = Sf::with_transport(Arc::new(mock.clone()), SfOptions::default());
//!
//! let case = sf.get("Case", "1234").await.unwrap().unwrap();
//! assert_eq!(case.field("Subject").await.unwrap(), json!("Printer on fire"));
//! assert_eq!(case.field("Subject").await.unwrap(), json!("Printer on fire"));
//! # });
//! ```

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::Value;

use crate::client::context::Context;
use crate::client::profile_for;
use crate::error::SfError;
use crate::query::{quote, Selection, Statement};
use crate::transport::Row;
use crate::ui::output::format_field;

/// How much of a record a proxy holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Population {
    /// Only the id.
    Unpopulated,
    /// Some fields.
    Partial,
    /// Every field of the type.
    Full,
}

/// Field map shared by every proxy of one record.
#[derive(Debug, Default)]
pub(crate) struct ProxyState {
    fields: Row,
    full: bool,
}

impl ProxyState {
    /// Take every field of `row`, replacing values already held.
    pub(crate) fn merge(&mut self, row: Row, full: bool) {
        for (name, value) in row {
            let key = self
                .fields
                .keys()
                .find(|k| k.eq_ignore_ascii_case(&name))
                .cloned()
                .unwrap_or(name);
            self.fields.insert(key, value);
        }
        self.full |= full;
    }

    fn population(&self) -> Population {
        if self.full {
            Population::Full
        } else if self.fields.keys().any(|k| k != "Id") {
            Population::Partial
        } else {
            Population::Unpopulated
        }
    }
}

/// Exact match first, then case-insensitive.
fn lookup<'a>(row: &'a Row, name: &str) -> Option<&'a Value> {
    row.get(name).or_else(|| {
        row.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v)
    })
}

/// Handle to one record. Clones share the field map.
#[derive(Clone)]
pub struct RecordProxy {
    object_type: String,
    id: String,
    state: Arc<Mutex<ProxyState>>,
    ctx: Arc<Context>,
}

impl RecordProxy {
    pub(crate) fn new(
        object_type: &str,
        id: &str,
        state: Arc<Mutex<ProxyState>>,
        ctx: Arc<Context>,
    ) -> Self {
        Self {
            object_type: object_type.to_string(),
            id: id.to_string(),
            state,
            ctx,
        }
    }

    pub fn object_type(&self) -> &str {
        &self.object_type
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub(crate) fn context(&self) -> &Arc<Context> {
        &self.ctx
    }

    fn state(&self) -> MutexGuard<'_, ProxyState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn population(&self) -> Population {
        self.state().population()
    }

    /// The value of `name` if already held, without any remote call.
    pub fn cached(&self, name: &str) -> Option<Value> {
        lookup(&self.state().fields, name).cloned()
    }

    /// Copy of every field held so far.
    pub fn snapshot(&self) -> Row {
        self.state().fields.clone()
    }

    pub(crate) fn merge(&self, row: Row, full: bool) {
        self.state().merge(row, full);
    }

    /// Canonical spelling of each name, checked against the schema.
    async fn resolve(&self, names: &[String]) -> Result<Vec<String>, SfError> {
        let schema = self.ctx.schema.describe(&self.object_type).await?;
        names
            .iter()
            .map(|name| {
                schema
                    .field(name)
                    .map(|f| f.name.clone())
                    .ok_or_else(|| SfError::FieldNotFound {
                        object_type: self.object_type.clone(),
                        field: name.clone(),
                    })
            })
            .collect()
    }

    /// Fetch `selection` for this record and merge it in.
    async fn load(&self, selection: Selection) -> Result<(), SfError> {
        let full = selection == Selection::AllFields;
        let where_clause = format!("Id = {}", quote(&self.id));
        let statement =
            Statement::select(&self.object_type, selection, Some(&where_clause)).limit(1);

        let row = self
            .ctx
            .query(&statement)
            .await?
            .records
            .into_iter()
            .next()
            .ok_or_else(|| {
                SfError::query(format!("{} {} no longer exists", self.object_type, self.id))
            })?;
        self.merge(row, full);
        Ok(())
    }

    /// Read one field, fetching it on first access.
    ///
    /// # Errors
    ///
    /// - [`SfError::FieldNotFound`] if the type has no such field
    /// - [`SfError::Query`] if the record disappeared remotely
    pub async fn field(&self, name: &str) -> Result<Value, SfError> {
        if let Some(value) = self.cached(name) {
            return Ok(value);
        }
        let names = self.resolve(&[name.to_string()]).await?;
        Ok(self.fields(&names).await?.remove(0))
    }

    /// Read several fields with at most one round trip.
    pub async fn fields(&self, names: &[String]) -> Result<Vec<Value>, SfError> {
        let names = self.resolve(names).await?;
        let missing: Vec<String> = names
            .iter()
            .filter(|name| self.cached(name).is_none())
            .cloned()
            .collect();

        if !missing.is_empty() {
            if self.ctx.options.preload_fields {
                self.populate_all().await?;
            } else {
                self.ctx.trace("fields", &format!("{}/{}", self.object_type, self.id));
                self.load(Selection::Fields(missing)).await?;
            }
        }

        // Null when the remote omitted a selected field.
        Ok(names
            .iter()
            .map(|name| self.cached(name).unwrap_or(Value::Null))
            .collect())
    }

    /// Fetch every field unless already fully populated.
    pub async fn populate_all(&self) -> Result<(), SfError> {
        if self.population() == Population::Full {
            return Ok(());
        }
        self.load(Selection::AllFields).await
    }

    /// Render fields one per line.
    ///
    /// `fields` defaults to the type's default fields, or every field when
    /// it has none. `label` defaults to labelling only when more than one
    /// field is printed.
    pub async fn dump_fields(
        &self,
        fields: Option<&[String]>,
        label: Option<bool>,
    ) -> Result<String, SfError> {
        let names: Vec<String> = match fields {
            Some(fields) if !fields.is_empty() => fields.to_vec(),
            _ => {
                let defaults = profile_for(&self.object_type).default_fields;
                if defaults.is_empty() {
                    self.populate_all().await?;
                    self.ctx.schema.field_names(&self.object_type).await?
                } else {
                    defaults.iter().map(|f| f.to_string()).collect()
                }
            }
        };

        let values = self.fields(&names).await?;
        let label = label.unwrap_or(names.len() > 1);
        Ok(names
            .iter()
            .zip(values.iter())
            .map(|(name, value)| format_field(name, value, label))
            .collect::<Vec<_>>()
            .join("\n"))
    }
}

impl fmt::Debug for RecordProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordProxy")
            .field("object_type", &self.object_type)
            .field("id", &self.id)
            .field("population", &self.population())
            .finish()
    }
}

impl fmt::Display for RecordProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.object_type, self.id)
    }
}

impl PartialEq for RecordProxy {
    fn eq(&self, other: &Self) -> bool {
        self.object_type == other.object_type && self.id == other.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{Sf, SfOptions};
    use crate::transport::mock::MockTransport;
    use serde_json::json;

    const ID: &str = "500000000000001AAA";

    fn sf(options: SfOptions) -> (MockTransport, Sf) {
        let mock = MockTransport::new().with_record(
            "Case",
            json!({
                "Id": ID,
                "CaseNumber": "00000042",
                "Subject": "Printer on fire",
                "Status": "New",
                "Description": null
            }),
        );
        let sf = Sf::with_transport(Arc::new(mock.clone()), options);
        (mock, sf)
    }

    #[tokio::test]
    async fn field_is_fetched_once() {
        let (mock, sf) = sf(SfOptions::default());
        let case = sf.get("Case", ID).await.unwrap().unwrap();
        assert_eq!(case.population(), Population::Unpopulated);

        let before = mock.query_count();
        assert_eq!(case.field("Subject").await.unwrap(), json!("Printer on fire"));
        assert_eq!(case.field("subject").await.unwrap(), json!("Printer on fire"));
        assert_eq!(mock.query_count(), before + 1);
        assert_eq!(
            mock.statements().last().unwrap(),
            &format!("SELECT Id, Subject FROM Case WHERE Id = '{}' ORDER BY Id LIMIT 1", ID)
        );
        assert_eq!(case.population(), Population::Partial);
    }

    #[tokio::test]
    async fn unknown_field_is_field_not_found() {
        let (mock, sf) = sf(SfOptions::default());
        let case = sf.get("Case", ID).await.unwrap().unwrap();
        let before = mock.query_count();

        let err = case.field("Nope__c").await.unwrap_err();
        assert!(matches!(err, SfError::FieldNotFound { .. }));
        assert_eq!(mock.query_count(), before);
    }

    #[tokio::test]
    async fn preload_populates_everything() {
        let (mock, sf) = sf(SfOptions {
            preload_fields: true,
            ..Default::default()
        });
        let case = sf.get("Case", ID).await.unwrap().unwrap();
        assert_eq!(case.population(), Population::Full);

        let before = mock.query_count();
        assert_eq!(case.field("Status").await.unwrap(), json!("New"));
        assert_eq!(mock.query_count(), before);
    }

    #[tokio::test]
    async fn population_never_regresses() {
        let (_mock, sf) = sf(SfOptions::default());
        let case = sf.get("Case", ID).await.unwrap().unwrap();
        case.populate_all().await.unwrap();
        assert_eq!(case.population(), Population::Full);

        case.merge(
            serde_json::from_value(json!({"Id": ID, "Subject": "changed"})).unwrap(),
            false,
        );
        assert_eq!(case.population(), Population::Full);
        assert_eq!(case.cached("Subject"), Some(json!("changed")));
    }

    #[tokio::test]
    async fn merge_replaces_value_under_existing_spelling() {
        let (_mock, sf) = sf(SfOptions::default());
        let case = sf.get("Case", ID).await.unwrap().unwrap();
        case.field("Subject").await.unwrap();

        case.merge(
            serde_json::from_value(json!({"id": ID, "SUBJECT": "changed"})).unwrap(),
            false,
        );
        let snapshot = case.snapshot();
        assert_eq!(snapshot.get("Subject"), Some(&json!("changed")));
        assert!(!snapshot.contains_key("SUBJECT"));
        assert!(!snapshot.contains_key("id"));
    }

    #[tokio::test]
    async fn dump_fields_labels_only_multiple() {
        let (_mock, sf) = sf(SfOptions::default());
        let case = sf.get("Case", ID).await.unwrap().unwrap();

        let one = case
            .dump_fields(Some(&["Subject".to_string()]), None)
            .await
            .unwrap();
        assert_eq!(one, "Printer on fire");

        let two = case
            .dump_fields(Some(&["Subject".to_string(), "Description".to_string()]), None)
            .await
            .unwrap();
        assert_eq!(two, "Subject: Printer on fire\nDescription: ");

        let forced = case
            .dump_fields(Some(&["Status".to_string()]), Some(true))
            .await
            .unwrap();
        assert_eq!(forced, "Status: New");
    }

    #[tokio::test]
    async fn dump_all_fields_in_schema_order() {
        let (_mock, sf) = sf(SfOptions::default());
        let case = sf.get("Case", ID).await.unwrap().unwrap();
        let dump = case.dump_fields(None, None).await.unwrap();
        let names: Vec<&str> = dump
            .lines()
            .map(|l| l.split(':').next().unwrap())
            .collect();
        assert_eq!(names, vec!["Id", "CaseNumber", "Subject", "Status", "Description"]);
    }
}
