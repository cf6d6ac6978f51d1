//! config::schema
//!
//! Configuration schema types.
//!
//! A profile file holds a single `[salesforce]` table:
//!
//! ```toml
//! [salesforce]
//! instance = "canonical.my.salesforce.com"
//! domain = "login"
//! client_id = "3MVG9..."
//! production = true
//! api_version = "53.0"
//! timeout_secs = 30
//! session_lifetime_minutes = 120
//!
//! # maintained by `sf auth login` / `sf auth refresh`
//! access_token = "00D..."
//! refresh_token = "5Aep..."
//! expires_at = "2024-01-01T02:00:00Z"
//! user_id = "005..."
//! ```
//!
//! Every key is optional; missing keys fall back to the built-in defaults
//! of the production or sandbox profile.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::ConfigError;

/// Placeholder written instead of token values when showing config.
pub const REDACTED: &str = "[REDACTED]";

/// One profile file.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFile {
    /// The `[salesforce]` table.
    pub salesforce: SalesforceSettings,
}

/// Settings under `[salesforce]`.
#[derive(Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct SalesforceSettings {
    /// Instance host name, without scheme.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance: Option<String>,

    /// Login domain ("login" or "test").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,

    /// Connected app consumer key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,

    /// Whether this profile talks to production.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub production: Option<bool>,

    /// REST API version, e.g. "53.0".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,

    /// HTTP timeout for REST calls.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,

    /// How long an access token is assumed valid after issue.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_lifetime_minutes: Option<i64>,

    /// Persisted access token.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,

    /// Persisted refresh token.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// Persisted access token expiry.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,

    /// Persisted user id of the authenticated user.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

impl SalesforceSettings {
    /// Validate the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if any value is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(instance) = &self.instance {
            if instance.is_empty()
                || instance.contains('/')
                || instance.contains(char::is_whitespace)
            {
                return Err(ConfigError::InvalidValue(format!(
                    "instance must be a bare host name, got '{}'",
                    instance
                )));
            }
        }

        if let Some(version) = &self.api_version {
            let valid = version
                .split_once('.')
                .is_some_and(|(major, minor)| {
                    !major.is_empty()
                        && !minor.is_empty()
                        && major.chars().all(|c| c.is_ascii_digit())
                        && minor.chars().all(|c| c.is_ascii_digit())
                });
            if !valid {
                return Err(ConfigError::InvalidValue(format!(
                    "api_version must look like '53.0', got '{}'",
                    version
                )));
            }
        }

        if self.timeout_secs == Some(0) {
            return Err(ConfigError::InvalidValue(
                "timeout_secs must be greater than 0".into(),
            ));
        }

        if let Some(minutes) = self.session_lifetime_minutes {
            if minutes <= 0 {
                return Err(ConfigError::InvalidValue(
                    "session_lifetime_minutes must be greater than 0".into(),
                ));
            }
        }

        Ok(())
    }

    /// Overlay `self` on top of `base`: keys set here win.
    pub fn merged_over(&self, base: &SalesforceSettings) -> SalesforceSettings {
        SalesforceSettings {
            instance: self.instance.clone().or_else(|| base.instance.clone()),
            domain: self.domain.clone().or_else(|| base.domain.clone()),
            client_id: self.client_id.clone().or_else(|| base.client_id.clone()),
            production: self.production.or(base.production),
            api_version: self.api_version.clone().or_else(|| base.api_version.clone()),
            timeout_secs: self.timeout_secs.or(base.timeout_secs),
            session_lifetime_minutes: self
                .session_lifetime_minutes
                .or(base.session_lifetime_minutes),
            access_token: self.access_token.clone().or_else(|| base.access_token.clone()),
            refresh_token: self.refresh_token.clone().or_else(|| base.refresh_token.clone()),
            expires_at: self.expires_at.or(base.expires_at),
            user_id: self.user_id.clone().or_else(|| base.user_id.clone()),
        }
    }

    /// Copy with token values replaced by [`REDACTED`].
    pub fn redacted(&self) -> SalesforceSettings {
        let mut copy = self.clone();
        if copy.access_token.is_some() {
            copy.access_token = Some(REDACTED.to_string());
        }
        if copy.refresh_token.is_some() {
            copy.refresh_token = Some(REDACTED.to_string());
        }
        copy
    }
}

impl fmt::Debug for SalesforceSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SalesforceSettings")
            .field("instance", &self.instance)
            .field("domain", &self.domain)
            .field("production", &self.production)
            .field("api_version", &self.api_version)
            .field("has_access_token", &self.access_token.is_some())
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}
