//! session::errors
//!
//! Authentication error types for the Salesforce OAuth session.
//!
//! # Design
//!
//! Error messages MUST NOT contain tokens. Every variant carries enough
//! context (profile name, OAuth error code, HTTP status) to act on the
//! failure without exposing the access or refresh token.
//!
//! # Example
//!
//! ```
//! use sftools::session::AuthError;
//!
//! let err = AuthError::NotAuthenticated("production".to_string());
//! assert!(err.to_string().contains("production"));
//! assert!(err.needs_reauth());
//! ```

use thiserror::Error;

/// Errors from session operations.
///
/// # Security
///
/// Error messages intentionally do not include token values.
#[derive(Debug, Clone, Error)]
pub enum AuthError {
    /// No access token exists for the profile.
    #[error("not authenticated for profile '{0}'. Run 'sf auth login'.")]
    NotAuthenticated(String),

    /// The refresh token was rejected or is missing; a new device flow is needed.
    #[error("session expired for profile '{0}'. Run 'sf auth login' again.")]
    Expired(String),

    /// Token refresh failed for a reason other than an expired refresh token.
    #[error("token refresh failed: {0}")]
    RefreshFailed(String),

    /// Device flow error during the OAuth process.
    #[error("device flow error: {0}")]
    DeviceFlowError(String),

    /// User denied access in the browser.
    #[error("user denied access: {0}")]
    Cancelled(String),

    /// Device flow timed out waiting for approval.
    #[error("verification timeout. Please try again.")]
    DeviceFlowExpired,

    /// Failed to acquire the session lock.
    #[error("failed to acquire session lock: {0}")]
    LockError(String),

    /// Lock acquisition timed out.
    #[error("session lock timeout - another process may be refreshing the session")]
    LockTimeout,

    /// The session could not be loaded or persisted.
    #[error("session store error: {0}")]
    Store(String),

    /// Network error while talking to the token endpoint.
    #[error("network error: {0}")]
    Network(String),

    /// Unexpected response from the token endpoint.
    #[error("Salesforce OAuth error: {status} - {message}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Error message from Salesforce
        message: String,
    },

    /// The server rejected the token even after a refresh.
    #[error("access token rejected by Salesforce after refresh")]
    Rejected,
}

impl AuthError {
    /// Check if this error indicates the user needs to re-authenticate.
    ///
    /// Returns true for errors that can be resolved by running `sf auth login`.
    pub fn needs_reauth(&self) -> bool {
        matches!(
            self,
            AuthError::NotAuthenticated(_)
                | AuthError::Expired(_)
                | AuthError::Cancelled(_)
                | AuthError::DeviceFlowExpired
                | AuthError::Rejected
        )
    }

    /// Check if this error indicates a transient failure that might succeed on retry.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AuthError::Network(_) | AuthError::LockTimeout | AuthError::LockError(_)
        )
    }
}

impl From<crate::store::StoreError> for AuthError {
    fn from(err: crate::store::StoreError) -> Self {
        AuthError::Store(err.to_string())
    }
}

impl From<reqwest::Error> for AuthError {
    fn from(err: reqwest::Error) -> Self {
        AuthError::Network(err.to_string())
    }
}
