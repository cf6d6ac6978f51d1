//! session - the Session Manager
//!
//! Owns the authenticated session: token storage, expiry tracking, refresh,
//! and first-time acquisition through the Salesforce OAuth device flow.
//!
//! # Components
//!
//! - [`Session`] - the token pair plus expiry and user id
//! - [`SessionLock`] - file lock guarding refresh across processes
//! - [`TokenProvider`] - trait the transports sign requests through
//! - [`SessionManager`] - implementation of TokenProvider
//! - [`DeviceFlowClient`] - HTTP client for the OAuth endpoints
//!
//! # Security
//!
//! Tokens MUST never appear in:
//! - logs (including `--verbose`)
//! - error messages
//! - debug output
//!
//! All types in this module implement custom Debug to redact token values.

mod device_flow;
mod errors;
mod lock;
mod manager;
mod tokens;

use async_trait::async_trait;
use reqwest::RequestBuilder;

pub use device_flow::{DeviceCodeResponse, DeviceFlowClient, TokenResponse, DEVICE_FLOW_TIMEOUT};
pub use errors::AuthError;
pub use lock::{SessionLock, DEFAULT_LOCK_TIMEOUT};
pub use manager::SessionManager;
pub use tokens::{user_id_from_identity_url, Session, EXPIRY_BUFFER_SECS};

/// A request carrying a bearer token.
///
/// The token is kept so a 401 answer can be reported back through
/// [`TokenProvider::refresh_rejected`].
#[derive(Debug)]
pub struct Signed {
    /// The request with the `Authorization` header set.
    pub request: RequestBuilder,
    /// The access token that was attached.
    pub token: String,
}

/// Trait for providing bearer tokens to transports.
///
/// Implementors must:
/// - Refresh an expired token at most once per call
/// - Re-check if refresh is needed after acquiring the refresh gate
/// - Never log or expose token values
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Get a valid bearer token, refreshing once if it is expired.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError`] if there is no session or the refresh fails.
    async fn bearer_token(&self) -> Result<String, AuthError>;

    /// Report that the remote rejected `rejected`; returns a new token.
    ///
    /// If another caller already replaced the token, that token is returned
    /// without a second refresh.
    async fn refresh_rejected(&self, rejected: &str) -> Result<String, AuthError>;

    /// Base URL of the instance the tokens are valid for.
    fn instance_url(&self) -> &str;

    /// User id of the authenticated user, if the session knows it.
    fn user_id(&self) -> Option<String>;

    /// Attach the current token to an outgoing request.
    async fn authorize(&self, request: RequestBuilder) -> Result<Signed, AuthError> {
        let token = self.bearer_token().await?;
        Ok(Signed {
            request: request.bearer_auth(&token),
            token,
        })
    }
}
