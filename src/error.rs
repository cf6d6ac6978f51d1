//! error
//!
//! The crate-wide error taxonomy.
//!
//! Every library operation that talks to Salesforce returns
//! `Result<T, SfError>`. Front ends print [`SfError::kind`] and the message,
//! then exit non-zero.

use thiserror::Error;

use crate::config::ConfigError;
use crate::session::AuthError;
use crate::store::StoreError;

/// Errors from record, schema and query operations.
#[derive(Debug, Error)]
pub enum SfError {
    /// Token invalid, expired or revoked and could not be recovered.
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// The object type is not in the remote schema.
    #[error("unknown object type '{0}'")]
    UnknownType(String),

    /// The field is not in the object type's schema.
    #[error("{object_type} has no field '{field}'")]
    FieldNotFound { object_type: String, field: String },

    /// Transport failure or timeout.
    #[error("network error: {0}")]
    Network(String),

    /// The remote rejected the query, or the query cannot be built.
    #[error("query failed: {message}")]
    Query {
        /// HTTP status, when the remote answered.
        status: Option<u16>,
        message: String,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl SfError {
    /// A query error not tied to an HTTP response.
    pub fn query(message: impl Into<String>) -> Self {
        SfError::Query {
            status: None,
            message: message.into(),
        }
    }

    /// A copy of this error for handing one outcome to several callers.
    ///
    /// Config and store errors wrap I/O errors and are copied by message.
    pub(crate) fn duplicate(&self) -> SfError {
        match self {
            SfError::Auth(a) => SfError::Auth(a.clone()),
            SfError::UnknownType(t) => SfError::UnknownType(t.clone()),
            SfError::FieldNotFound { object_type, field } => SfError::FieldNotFound {
                object_type: object_type.clone(),
                field: field.clone(),
            },
            SfError::Network(s) => SfError::Network(s.clone()),
            SfError::Query { status, message } => SfError::Query {
                status: *status,
                message: message.clone(),
            },
            other => SfError::Network(other.to_string()),
        }
    }

    /// The taxonomy name of this error.
    pub fn kind(&self) -> &'static str {
        match self {
            SfError::Auth(_) => "AuthError",
            SfError::UnknownType(_) => "UnknownTypeError",
            SfError::FieldNotFound { .. } => "FieldNotFoundError",
            SfError::Network(_) => "NetworkError",
            SfError::Query { .. } => "QueryError",
            SfError::Config(_) => "ConfigError",
            SfError::Store(_) => "StoreError",
        }
    }
}

impl From<reqwest::Error> for SfError {
    fn from(err: reqwest::Error) -> Self {
        SfError::Network(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_follow_taxonomy() {
        assert_eq!(SfError::UnknownType("Foo".into()).kind(), "UnknownTypeError");
        assert_eq!(
            SfError::FieldNotFound {
                object_type: "Case".into(),
                field: "Nope".into()
            }
            .kind(),
            "FieldNotFoundError"
        );
        assert_eq!(SfError::Network("reset".into()).kind(), "NetworkError");
        assert_eq!(SfError::query("bad").kind(), "QueryError");
        assert_eq!(
            SfError::from(AuthError::Rejected).kind(),
            "AuthError"
        );
    }

    #[test]
    fn field_not_found_message() {
        let err = SfError::FieldNotFound {
            object_type: "Case".into(),
            field: "Nope__c".into(),
        };
        assert_eq!(err.to_string(), "Case has no field 'Nope__c'");
    }
}
