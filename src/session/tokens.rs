//! session::tokens
//!
//! The in-memory session: the access/refresh token pair plus expiry.
//!
//! # Design
//!
//! Salesforce token responses carry an `issued_at` timestamp but no lifetime,
//! so the expiry is computed from the configured session lifetime. A token
//! within [`EXPIRY_BUFFER_SECS`] of its expiry counts as expired so that a
//! request is never signed with a token about to lapse mid-flight.
//!
//! # Security
//!
//! Tokens MUST never appear in logs, error messages or debug output. This
//! module implements a custom `Debug` that redacts both tokens.

use chrono::{DateTime, Duration, Utc};
use std::fmt;

use super::device_flow::TokenResponse;

/// Buffer before expiry that already counts as expired (1 minute).
pub const EXPIRY_BUFFER_SECS: i64 = 60;

/// Authenticated session for one profile.
#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    /// OAuth access token (the Salesforce "session id").
    pub access_token: String,

    /// OAuth refresh token, if the connected app issued one.
    pub refresh_token: Option<String>,

    /// When the access token stops being accepted, if known.
    pub expires_at: Option<DateTime<Utc>>,

    /// Salesforce user id of the authenticated user, if known.
    pub user_id: Option<String>,
}

impl Session {
    /// Create a session from raw values, typically loaded from config.
    pub fn new(access_token: impl Into<String>, refresh_token: Option<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token,
            expires_at: None,
            user_id: None,
        }
    }

    /// Build a session from a device flow token response.
    ///
    /// # Arguments
    ///
    /// * `response` - Successful token endpoint response
    /// * `lifetime` - Configured session lifetime
    pub fn from_token_response(response: &TokenResponse, lifetime: Duration) -> Self {
        Self {
            access_token: response.access_token.clone(),
            refresh_token: response.refresh_token.clone(),
            expires_at: Some(issued_at(response) + lifetime),
            user_id: response.id.as_deref().and_then(user_id_from_identity_url),
        }
    }

    /// Apply a refresh response to this session.
    ///
    /// Salesforce only rotates the refresh token when the connected app is
    /// configured to, so a response without one keeps the current token.
    pub fn with_refreshed(&self, response: &TokenResponse, lifetime: Duration) -> Self {
        let mut refreshed = Self::from_token_response(response, lifetime);
        if refreshed.refresh_token.is_none() {
            refreshed.refresh_token = self.refresh_token.clone();
        }
        if refreshed.user_id.is_none() {
            refreshed.user_id = self.user_id.clone();
        }
        refreshed
    }

    /// Check if the access token is expired (or about to be).
    ///
    /// A session with unknown expiry is treated as valid; the remote will
    /// answer 401 if it is not, which marks it expired.
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(expires_at) => Utc::now() >= expires_at - Duration::seconds(EXPIRY_BUFFER_SECS),
            None => false,
        }
    }

    /// Mark the access token as expired right now.
    pub fn expire(&mut self) {
        self.expires_at = Some(Utc::now() - Duration::seconds(EXPIRY_BUFFER_SECS));
    }

    /// Check if the session can be refreshed without a new device flow.
    pub fn can_refresh(&self) -> bool {
        self.refresh_token.as_deref().is_some_and(|t| !t.is_empty())
    }
}

/// Parse `issued_at` (milliseconds since the epoch, as a string).
fn issued_at(response: &TokenResponse) -> DateTime<Utc> {
    response
        .issued_at
        .as_deref()
        .and_then(|ms| ms.parse::<i64>().ok())
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .unwrap_or_else(Utc::now)
}

/// Extract the user id from an identity URL.
///
/// Identity URLs look like `https://login.salesforce.com/id/<org id>/<user id>`.
pub fn user_id_from_identity_url(url: &str) -> Option<String> {
    let mut parts = url.trim_end_matches('/').rsplit('/');
    let user = parts.next()?;
    let _org = parts.next()?;
    if parts.next()? != "id" || user.is_empty() {
        return None;
    }
    Some(user.to_string())
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("access_token", &"[REDACTED]")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("expires_at", &self.expires_at)
            .field("user_id", &self.user_id)
            .finish()
    }
}
