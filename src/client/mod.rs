//! client
//!
//! The entry point of the library: a connected client and per-type handles.
//!
//! # Design
//!
//! [`Sf`] owns a [`Context`] shared with every proxy it hands out. The
//! context carries the transport, the schema cache and an identity map, so a
//! record obtained twice is one proxy with one field map.
//!
//! [`ObjectType`] applies per-type behavior from [`profile_for`]: how ids are
//! looked up, which fields the filter flags default to, and whether closed
//! records are hidden.
//!
//! # Example
//!
//! ```
//! use sftools::client::{Sf, SfOptions};
//! use sftools::query::FilterSpec;
//! use sftools::transport::mock::MockTransport;
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! let mock = MockTransport::new()
//!     .with_record("Case", json!({"Id": "500A", "Subject": "Printer on fire", "IsClosed": false}))
//!     .with_record("Case", json!({"Id": "500B", "Subject": "Lost badge", "IsClosed": false}));
//! let sf = Sf::with_transport(Arc::new(mock), SfOptions::default());
//!
//! let cases = sf
//!     .find(&FilterSpec::new("Case").like("Subject", "fire"))
//!     .await
//!     .unwrap();
//! assert_eq!(cases.ids(), vec!["500A"]);
//! # });
//! ```

pub(crate) mod context;
mod types;

pub use types::{case_number, is_record_id, profile_for, IdLookup, TypeProfile};

use std::sync::Arc;
use std::time::Duration;

use log::info;

use crate::config::Config;
use crate::error::SfError;
use crate::query::{
    build, quote, BuildContext, Clause, FilterOptions, FilterSpec, Owner, Selection, Statement,
};
use crate::record::{QueryResult, RecordProxy};
use crate::relations;
use crate::schema::{ObjectTypeSchema, SchemaCache};
use crate::session::{AuthError, DeviceCodeResponse, Session, SessionManager, TokenProvider};
use crate::transport::{RestTransport, Transport};

use context::Context;

/// Client-wide behavior switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SfOptions {
    /// Select every field whenever a record is fetched.
    pub preload_fields: bool,
    /// Log remote calls at info level.
    pub verbose: bool,
    /// Log deletions instead of performing them.
    pub dry_run: bool,
}

/// A connected client.
pub struct Sf {
    ctx: Arc<Context>,
    session: Option<Arc<SessionManager>>,
}

impl Sf {
    /// Connect using the session stored in `config`.
    ///
    /// No request is made until the first operation.
    pub fn connect(config: &Config, options: SfOptions) -> Result<Self, SfError> {
        let session = Arc::new(SessionManager::from_config(config).with_verbose(options.verbose));
        Self::with_session(session, &config.api_version(), config.timeout(), options)
    }

    /// Connect through an existing session manager.
    pub fn with_session(
        session: Arc<SessionManager>,
        api_version: &str,
        timeout: Duration,
        options: SfOptions,
    ) -> Result<Self, SfError> {
        let provider: Arc<dyn TokenProvider> = session.clone();
        let transport = RestTransport::new(provider, api_version, timeout)?;
        Ok(Self {
            ctx: Arc::new(Context::new(Arc::new(transport), options)),
            session: Some(session),
        })
    }

    /// Use any transport, without a session manager.
    pub fn with_transport(transport: Arc<dyn Transport>, options: SfOptions) -> Self {
        Self {
            ctx: Arc::new(Context::new(transport, options)),
            session: None,
        }
    }

    pub fn options(&self) -> SfOptions {
        self.ctx.options
    }

    pub fn schema(&self) -> &SchemaCache {
        &self.ctx.schema
    }

    pub fn session_manager(&self) -> Option<&Arc<SessionManager>> {
        self.session.as_ref()
    }

    /// Handle for one object type. Does not check the type exists.
    pub fn object(&self, name: &str) -> ObjectType {
        ObjectType::new(self.ctx.clone(), name)
    }

    /// Fetch one record by id (or the type's alternate key).
    pub async fn get(&self, object_type: &str, id: &str) -> Result<Option<RecordProxy>, SfError> {
        self.object(object_type).get(id).await
    }

    /// Records matching a raw SOQL condition.
    pub async fn query(
        &self,
        object_type: &str,
        where_clause: Option<&str>,
        limit: Option<usize>,
    ) -> Result<QueryResult, SfError> {
        self.object(object_type).query(where_clause, limit).await
    }

    /// Records matching a structured filter.
    pub async fn find(&self, spec: &FilterSpec) -> Result<QueryResult, SfError> {
        self.object(&spec.object_type).find(spec).await
    }

    /// The authenticated user.
    pub async fn me(&self) -> Result<RecordProxy, SfError> {
        let id = self.ctx.current_user_id().await?;
        self.get("User", &id)
            .await?
            .ok_or_else(|| SfError::query(format!("current user {} not found", id)))
    }

    /// Names of the queryable object types.
    pub async fn object_types(&self) -> Result<Vec<String>, SfError> {
        self.ctx.schema.object_types().await
    }

    /// Records reachable from `record` through the relation `name`.
    pub async fn related(
        &self,
        record: &RecordProxy,
        name: &str,
        options: &FilterOptions,
    ) -> Result<QueryResult, SfError> {
        relations::related_records(record, name, options).await
    }

    fn session_or_err(&self) -> Result<&Arc<SessionManager>, SfError> {
        self.session
            .as_ref()
            .ok_or_else(|| AuthError::NotAuthenticated("no session manager".into()).into())
    }

    /// Run the device flow; `on_code` shows the verification URL.
    pub async fn request_oauth<F>(&self, on_code: F) -> Result<Session, SfError>
    where
        F: FnOnce(&DeviceCodeResponse) + Send,
    {
        Ok(self.session_or_err()?.acquire(on_code).await?)
    }

    /// Force a token refresh.
    pub async fn refresh_oauth(&self) -> Result<Session, SfError> {
        Ok(self.session_or_err()?.refresh().await?)
    }
}

impl std::fmt::Debug for Sf {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sf")
            .field("ctx", &self.ctx)
            .field("session", &self.session)
            .finish()
    }
}

/// Handle for one object type.
#[derive(Debug, Clone)]
pub struct ObjectType {
    ctx: Arc<Context>,
    name: String,
    profile: TypeProfile,
    include_closed: bool,
}

impl ObjectType {
    pub(crate) fn new(ctx: Arc<Context>, name: &str) -> Self {
        Self {
            ctx,
            name: name.to_string(),
            profile: profile_for(name),
            include_closed: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn profile(&self) -> &TypeProfile {
        &self.profile
    }

    /// Do not hide closed records in [`ObjectType::query`].
    pub fn including_closed(mut self) -> Self {
        self.include_closed = true;
        self
    }

    pub async fn schema(&self) -> Result<Arc<ObjectTypeSchema>, SfError> {
        self.ctx.schema.describe(&self.name).await
    }

    /// First record matching `where_clause`, if any.
    async fn first_where(&self, where_clause: &str) -> Result<Option<RecordProxy>, SfError> {
        let selection = self.ctx.selection(&[]);
        let full = selection == Selection::AllFields;
        let statement = Statement::select(&self.name, selection, Some(where_clause)).limit(1);
        match self.ctx.query(&statement).await?.records.into_iter().next() {
            Some(row) => Ok(Some(self.ctx.materialize(&self.name, row, full)?)),
            None => Ok(None),
        }
    }

    /// Fetch one record.
    ///
    /// Case numbers of up to eight digits are looked up by `CaseNumber`, and
    /// user arguments not shaped like an id by `Alias`, before falling back
    /// to `Id`.
    ///
    /// # Errors
    ///
    /// [`SfError::UnknownType`] if the type does not exist.
    pub async fn get(&self, id: &str) -> Result<Option<RecordProxy>, SfError> {
        if let Some(known) = self.ctx.known(&self.name, id) {
            return Ok(Some(known));
        }
        self.schema().await?;
        self.ctx.trace("get", &format!("{}/{}", self.name, id));

        let alternate = match self.profile.lookup {
            IdLookup::CaseNumber => case_number(id).map(|n| format!("CaseNumber = {}", quote(&n))),
            IdLookup::Alias if !is_record_id(id) => Some(format!("Alias = {}", quote(id))),
            _ => None,
        };
        if let Some(where_clause) = alternate {
            if let Some(found) = self.first_where(&where_clause).await? {
                return Ok(Some(found));
            }
        }

        match self.first_where(&format!("Id = {}", quote(id))).await {
            Err(SfError::Query { message, .. })
                if message.contains("invalid ID")
                    || message.contains("INVALID_QUERY_FILTER_OPERATOR") =>
            {
                Ok(None)
            }
            other => other,
        }
    }

    /// Records matching a raw SOQL condition. Closed records are hidden
    /// unless [`ObjectType::including_closed`] was used.
    pub async fn query(
        &self,
        where_clause: Option<&str>,
        limit: Option<usize>,
    ) -> Result<QueryResult, SfError> {
        let mut spec = FilterSpec::new(self.name.as_str());
        if let Some(where_clause) = where_clause {
            spec = spec.raw(where_clause);
        }
        if let Some(closed) = self.profile.defaults.closed_field.filter(|_| !self.include_closed) {
            spec = spec.eq(closed, false);
        }
        if let Some(limit) = limit {
            spec = spec.limit(limit);
        }
        self.find(&spec).await
    }

    /// Translate filter flags for this type.
    pub async fn filter_for(&self, options: &FilterOptions) -> Result<FilterSpec, SfError> {
        let schema = self.schema().await?;
        options.to_filter(&self.name, &self.profile.defaults, Some(&schema))
    }

    /// Records matching filter flags.
    pub async fn find_options(&self, options: &FilterOptions) -> Result<QueryResult, SfError> {
        let spec = self.filter_for(options).await?;
        self.find(&spec).await
    }

    /// Replace user aliases in owner clauses by user ids.
    async fn resolve_owners(&self, spec: &FilterSpec) -> Result<FilterSpec, SfError> {
        let mut resolved = spec.clone();
        for clause in resolved.clauses.iter_mut() {
            if let Clause::Owner {
                owner: Owner::User(user),
                ..
            } = clause
            {
                if is_record_id(user) {
                    continue;
                }
                let users = ObjectType::new(self.ctx.clone(), "User");
                let found = users
                    .get(user)
                    .await?
                    .ok_or_else(|| SfError::query(format!("no user '{}'", user)))?;
                *user = found.id().to_string();
            }
        }
        Ok(resolved)
    }

    /// Records matching a structured filter.
    ///
    /// # Errors
    ///
    /// - [`SfError::UnknownType`] if the type does not exist
    /// - [`SfError::FieldNotFound`] if a selected field does not exist
    /// - [`SfError::Query`] if the filter cannot be built or the remote
    ///   rejects it
    pub async fn find(&self, spec: &FilterSpec) -> Result<QueryResult, SfError> {
        let schema = self.schema().await?;
        for field in &spec.select {
            if !schema.has_field(field) {
                return Err(SfError::FieldNotFound {
                    object_type: self.name.clone(),
                    field: field.clone(),
                });
            }
        }

        let spec = self.resolve_owners(spec).await?;
        let mut build_ctx = BuildContext::default();
        if spec.needs_current_user() {
            build_ctx.current_user = Some(self.ctx.current_user_id().await?);
        }
        let predicate = build(&spec, &build_ctx)?;

        let selection = self.ctx.selection(&spec.select);
        let full = selection == Selection::AllFields;
        let rows = self
            .ctx
            .fetch(
                &self.name,
                predicate.where_clause.as_deref(),
                selection,
                spec.order_by.as_deref(),
                predicate.limit,
            )
            .await?;

        let records = rows
            .into_iter()
            .map(|row| self.ctx.materialize(&self.name, row, full))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(QueryResult::new(&self.name, records, self.ctx.clone()))
    }

    /// Delete a record. Returns false when only logged (dry run).
    pub async fn delete(&self, id: &str) -> Result<bool, SfError> {
        if self.ctx.options.dry_run {
            info!("SF: delete({}/{}) skipped, dry run", self.name, id);
            return Ok(false);
        }
        self.ctx.trace("delete", &format!("{}/{}", self.name, id));
        self.ctx.transport.delete(&self.name, id).await?;
        self.ctx.forget(&self.name, id);
        Ok(true)
    }
}
