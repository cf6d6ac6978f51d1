//! schema - the Schema Cache
//!
//! Process-lifetime cache of object type metadata: the fields each type
//! exposes and their types.
//!
//! # Single-flight
//!
//! Each object type has one slot guarded by an async mutex. The first caller
//! for a cold type fetches while holding it; callers queued behind that fetch
//! receive its outcome, error included, so N concurrent `describe("Case")`
//! calls issue exactly one metadata request. An unknown type is remembered.
//! Any other failure is handed to the callers that were waiting on it, and a
//! caller arriving afterwards fetches again.
//!
//! # Example
//!
//! ```ignore
//! use sftools::schema::SchemaCache;
//!
//! let cache = SchemaCache::new(transport);
//! let schema = cache.describe("Case").await?;
//! assert!(schema.has_field("CaseNumber"));
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::OnceCell;

use crate::error::SfError;
use crate::transport::{self, Transport};

/// Coarse type of a field, as far as query rendering cares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldType {
    String,
    Number,
    Boolean,
    Date,
    DateTime,
    /// An id of this or another record.
    Reference,
    /// Anything else, with the remote type name.
    Other(String),
}

impl FieldType {
    /// Map a Salesforce describe `type` to a field type.
    pub fn from_remote(name: &str) -> FieldType {
        match name {
            "id" | "reference" => FieldType::Reference,
            "int" | "double" | "currency" | "percent" | "long" => FieldType::Number,
            "boolean" => FieldType::Boolean,
            "date" => FieldType::Date,
            "datetime" => FieldType::DateTime,
            "string" | "textarea" | "picklist" | "multipicklist" | "email" | "phone" | "url"
            | "combobox" | "encryptedstring" => FieldType::String,
            other => FieldType::Other(other.to_string()),
        }
    }

    /// Whether values of this type are written unquoted in a predicate.
    pub fn is_numeric(&self) -> bool {
        matches!(self, FieldType::Number)
    }
}

/// One field of an object type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSchema {
    pub name: String,
    pub field_type: FieldType,
    /// Types a reference field may point to.
    pub reference_to: Vec<String>,
}

impl FieldSchema {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            reference_to: Vec::new(),
        }
    }
}

/// The fields of one object type, in remote order. Immutable once fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectTypeSchema {
    pub name: String,
    pub fields: Vec<FieldSchema>,
}

impl ObjectTypeSchema {
    pub fn new(name: impl Into<String>, fields: Vec<FieldSchema>) -> Self {
        Self {
            name: name.into(),
            fields,
        }
    }

    /// Look up a field. Field names are case-insensitive remotely.
    pub fn field(&self, name: &str) -> Option<&FieldSchema> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .or_else(|| self.fields.iter().find(|f| f.name.eq_ignore_ascii_case(name)))
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.field(name).is_some()
    }

    /// Field names in remote order.
    pub fn field_names(&self) -> Vec<String> {
        self.fields.iter().map(|f| f.name.clone()).collect()
    }

    /// Reference fields whose name contains `fragment`.
    pub fn reference_fields_containing(&self, fragment: &str) -> Vec<&FieldSchema> {
        self.fields
            .iter()
            .filter(|f| f.field_type == FieldType::Reference && f.name.contains(fragment))
            .collect()
    }
}

/// Cache entry of one object type.
#[derive(Default)]
struct Slot {
    /// Number of finished fetches; read before queuing for `state`.
    generation: AtomicU64,
    state: tokio::sync::Mutex<SlotState>,
}

#[derive(Default)]
struct SlotState {
    schema: Option<Arc<ObjectTypeSchema>>,
    unknown: bool,
    /// Outcome of the last fetch, if it failed.
    failure: Option<SfError>,
}

/// Cache of object type schemas, keyed by type name.
pub struct SchemaCache {
    transport: Arc<dyn Transport>,
    slots: Mutex<HashMap<String, Arc<Slot>>>,
    types: OnceCell<Vec<String>>,
    verbose: bool,
}

impl SchemaCache {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            slots: Mutex::new(HashMap::new()),
            types: OnceCell::new(),
            verbose: false,
        }
    }

    /// Log metadata requests at info level.
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    fn slot(&self, object_type: &str) -> Arc<Slot> {
        let mut slots = match self.slots.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        slots.entry(object_type.to_string()).or_default().clone()
    }

    /// Return the schema of `object_type`, fetching it on first use.
    ///
    /// # Errors
    ///
    /// - [`SfError::UnknownType`] if the remote has no such type
    /// - any transport error of the metadata request
    pub async fn describe(&self, object_type: &str) -> Result<Arc<ObjectTypeSchema>, SfError> {
        let slot = self.slot(object_type);
        let seen = slot.generation.load(Ordering::Acquire);
        let mut state = slot.state.lock().await;

        if let Some(schema) = &state.schema {
            return Ok(schema.clone());
        }
        if state.unknown {
            return Err(SfError::UnknownType(object_type.to_string()));
        }
        if slot.generation.load(Ordering::Acquire) != seen {
            // A fetch finished while this caller was queued; share its outcome.
            if let Some(failure) = &state.failure {
                return Err(failure.duplicate());
            }
        }

        transport::trace(self.verbose, "describe", object_type);
        let result = match self.transport.describe(object_type).await {
            Ok(schema) => {
                let schema = Arc::new(schema);
                state.schema = Some(schema.clone());
                state.failure = None;
                Ok(schema)
            }
            Err(SfError::UnknownType(name)) => {
                state.unknown = true;
                Err(SfError::UnknownType(name))
            }
            Err(err) => {
                state.failure = Some(err.duplicate());
                Err(err)
            }
        };
        slot.generation.fetch_add(1, Ordering::AcqRel);
        result
    }

    /// Field names of `object_type`, in remote order.
    pub async fn field_names(&self, object_type: &str) -> Result<Vec<String>, SfError> {
        Ok(self.describe(object_type).await?.field_names())
    }

    /// Whether the schema of `object_type` is already cached.
    pub fn is_cached(&self, object_type: &str) -> bool {
        self.slot(object_type)
            .state
            .try_lock()
            .map(|state| state.schema.is_some())
            .unwrap_or(false)
    }

    /// Names of the queryable object types, fetched once.
    pub async fn object_types(&self) -> Result<Vec<String>, SfError> {
        let types = self
            .types
            .get_or_try_init(|| async {
                transport::trace(self.verbose, "describe_global", "");
                self.transport.describe_global().await
            })
            .await?;
        Ok(types.clone())
    }
}

impl std::fmt::Debug for SchemaCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let cached: Vec<String> = self
            .slots
            .lock()
            .map(|s| {
                s.iter()
                    .filter(|(_, slot)| {
                        slot.state
                            .try_lock()
                            .map(|state| state.schema.is_some())
                            .unwrap_or(false)
                    })
                    .map(|(name, _)| name.clone())
                    .collect()
            })
            .unwrap_or_default();
        f.debug_struct("SchemaCache")
            .field("transport", &self.transport.name())
            .field("cached", &cached)
            .finish()
    }
}
