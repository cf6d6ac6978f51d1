//! session::device_flow
//!
//! OAuth device flow client for the Salesforce token endpoint.
//!
//! # Device Flow Overview
//!
//! 1. Client requests a device code from `/services/oauth2/token`
//! 2. User visits the verification URL (with the user code filled in)
//! 3. Client polls the same endpoint until the user approves
//! 4. Client receives access and refresh tokens
//!
//! No client secret is required and no callback server is needed, so the
//! flow works from a terminal.
//!
//! # Polling States
//!
//! While the user has not approved yet, Salesforce answers HTTP 400 with:
//! - `authorization_pending` - Continue polling
//! - `slow_down` - Increase the polling interval by one second
//! - `access_denied` - User denied authorization
//! - `server_error` / `invalid_request` / `invalid_grant` - Give up
//!
//! # Example
//!
//! ```ignore
//! use sftools::session::DeviceFlowClient;
//!
//! let client = DeviceFlowClient::new("https://canonical.my.salesforce.com", client_id);
//! let code = client.request_device_code().await?;
//! println!("Please approve access: {}", code.verification_url());
//! let tokens = client.poll_for_token(&code, DEVICE_FLOW_TIMEOUT).await?;
//! let refreshed = client.refresh_token(tokens.refresh_token.as_deref().unwrap()).await?;
//! ```

use log::debug;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE};
use reqwest::{Client, StatusCode, Url};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tokio::time::sleep;

use super::errors::AuthError;

/// Scopes requested for the connected app.
const DEFAULT_SCOPES: &str = "full refresh_token";

/// User-Agent header for OAuth requests.
const USER_AGENT: &str = "sftools";

/// How long to wait for the user to approve access.
pub const DEVICE_FLOW_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Polling interval when the device code response does not suggest one.
const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;

/// Response from the device code request.
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceCodeResponse {
    /// The device verification code.
    pub device_code: String,

    /// The user verification code to display.
    pub user_code: String,

    /// The verification URL the user should visit.
    pub verification_uri: String,

    /// Minimum polling interval in seconds.
    #[serde(default)]
    pub interval: Option<u64>,
}

impl DeviceCodeResponse {
    /// The verification URL with the user code pre-filled.
    pub fn verification_url(&self) -> String {
        match Url::parse_with_params(&self.verification_uri, &[("user_code", &self.user_code)]) {
            Ok(url) => url.to_string(),
            Err(_) => format!("{}?user_code={}", self.verification_uri, self.user_code),
        }
    }
}

/// Successful token response from Salesforce.
///
/// Fields other than the access token are optional because refresh
/// responses omit the refresh token unless rotation is enabled.
#[derive(Clone, Deserialize)]
pub struct TokenResponse {
    /// The access token.
    pub access_token: String,

    /// The refresh token (device flow, or rotated on refresh).
    #[serde(default)]
    pub refresh_token: Option<String>,

    /// Instance URL the token is valid for.
    #[serde(default)]
    pub instance_url: Option<String>,

    /// Identity URL, ending in the user id.
    #[serde(default)]
    pub id: Option<String>,

    /// Issue time in milliseconds since the epoch.
    #[serde(default)]
    pub issued_at: Option<String>,

    /// Token type (always "Bearer").
    #[serde(default)]
    pub token_type: Option<String>,
}

impl std::fmt::Debug for TokenResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenResponse")
            .field("access_token", &"[REDACTED]")
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("instance_url", &self.instance_url)
            .field("issued_at", &self.issued_at)
            .finish_non_exhaustive()
    }
}

/// Error response from the OAuth endpoint.
#[derive(Debug, Clone, Deserialize)]
struct OAuthError {
    /// Error code.
    error: String,

    /// Human-readable description.
    #[serde(default)]
    error_description: Option<String>,
}

/// Request body for the device code request.
#[derive(Serialize)]
struct DeviceCodeRequest<'a> {
    response_type: &'a str,
    scope: &'a str,
    client_id: &'a str,
}

/// Request body for polling.
#[derive(Serialize)]
struct PollRequest<'a> {
    grant_type: &'a str,
    client_id: &'a str,
    code: &'a str,
}

/// Request body for refresh.
#[derive(Serialize)]
struct RefreshRequest<'a> {
    grant_type: &'a str,
    client_id: &'a str,
    refresh_token: &'a str,
}

/// Client for the Salesforce OAuth device flow.
#[derive(Debug, Clone)]
pub struct DeviceFlowClient {
    /// HTTP client.
    client: Client,

    /// Instance base URL (e.g., "https://canonical.my.salesforce.com").
    instance_url: String,

    /// Connected app consumer key.
    client_id: String,
}

impl DeviceFlowClient {
    /// Create a new device flow client.
    ///
    /// # Arguments
    ///
    /// * `instance_url` - Base URL of the Salesforce instance
    /// * `client_id` - Connected app consumer key
    pub fn new(instance_url: &str, client_id: &str) -> Self {
        Self {
            client: Client::new(),
            instance_url: instance_url.trim_end_matches('/').to_string(),
            client_id: client_id.to_string(),
        }
    }

    /// Get the token endpoint URL.
    fn token_url(&self) -> String {
        format!("{}/services/oauth2/token", self.instance_url)
    }

    /// Build headers for OAuth requests.
    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/x-www-form-urlencoded"),
        );
        headers.insert(
            reqwest::header::USER_AGENT,
            HeaderValue::from_static(USER_AGENT),
        );
        headers
    }

    /// Request a device code to begin the authorization flow.
    ///
    /// # Errors
    ///
    /// - [`AuthError::DeviceFlowError`] if Salesforce rejects the request
    /// - [`AuthError::Network`] if there's a network error
    pub async fn request_device_code(&self) -> Result<DeviceCodeResponse, AuthError> {
        let request = DeviceCodeRequest {
            response_type: "device_code",
            scope: DEFAULT_SCOPES,
            client_id: &self.client_id,
        };

        debug!("OAuth: request device code from {}", self.token_url());
        let response = self
            .client
            .post(self.token_url())
            .headers(self.headers())
            .form(&request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if status.is_success() {
            serde_json::from_str(&body).map_err(|e| {
                AuthError::DeviceFlowError(format!("failed to parse device code response: {}", e))
            })
        } else if let Ok(err) = serde_json::from_str::<OAuthError>(&body) {
            Err(AuthError::DeviceFlowError(format!(
                "{}: {}",
                err.error,
                err.error_description.unwrap_or_default()
            )))
        } else {
            Err(AuthError::Api {
                status: status.as_u16(),
                message: body,
            })
        }
    }

    /// Poll for token completion after the user approves.
    ///
    /// Polls immediately, then waits the suggested interval between polls
    /// until approval, denial, an error, or `timeout` elapses.
    ///
    /// # Errors
    ///
    /// - [`AuthError::Cancelled`] if the user denies access
    /// - [`AuthError::DeviceFlowExpired`] if `timeout` elapses
    /// - [`AuthError::DeviceFlowError`] for any other OAuth error
    pub async fn poll_for_token(
        &self,
        device_code: &DeviceCodeResponse,
        timeout: Duration,
    ) -> Result<TokenResponse, AuthError> {
        let deadline = Instant::now() + timeout;
        let mut interval =
            Duration::from_secs(device_code.interval.unwrap_or(DEFAULT_POLL_INTERVAL_SECS));

        while Instant::now() < deadline {
            match self.poll_once(&device_code.device_code).await {
                Ok(tokens) => return Ok(tokens),
                Err(PollResult::Pending) => {}
                Err(PollResult::SlowDown) => {
                    interval += Duration::from_secs(1);
                }
                Err(PollResult::Error(e)) => return Err(e),
            }

            sleep(interval).await;
        }

        Err(AuthError::DeviceFlowExpired)
    }

    /// Internal: Single poll attempt.
    async fn poll_once(&self, device_code: &str) -> Result<TokenResponse, PollResult> {
        let request = PollRequest {
            grant_type: "device",
            client_id: &self.client_id,
            code: device_code,
        };

        let response = self
            .client
            .post(self.token_url())
            .headers(self.headers())
            .form(&request)
            .send()
            .await
            .map_err(|e| PollResult::Error(AuthError::Network(e.to_string())))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| PollResult::Error(AuthError::Network(e.to_string())))?;

        if status == StatusCode::OK {
            return serde_json::from_str::<TokenResponse>(&body).map_err(|e| {
                PollResult::Error(AuthError::DeviceFlowError(format!(
                    "failed to parse token response: {}",
                    e
                )))
            });
        }

        if status != StatusCode::BAD_REQUEST {
            return Err(PollResult::Error(AuthError::Api {
                status: status.as_u16(),
                message: format!("unexpected response status: {}", status.as_u16()),
            }));
        }

        let err = serde_json::from_str::<OAuthError>(&body).map_err(|_| {
            PollResult::Error(AuthError::DeviceFlowError(format!(
                "unexpected response: {}",
                body
            )))
        })?;
        let description = err.error_description.unwrap_or_default();

        Err(match err.error.as_str() {
            "authorization_pending" => PollResult::Pending,
            "slow_down" => PollResult::SlowDown,
            "access_denied" => PollResult::Error(AuthError::Cancelled(description)),
            "server_error" | "invalid_request" => PollResult::Error(AuthError::DeviceFlowError(
                format!("error waiting for authorization: {}", description),
            )),
            "invalid_grant" => PollResult::Error(AuthError::DeviceFlowError(format!(
                "invalid grant for this app: {}",
                description
            ))),
            other => PollResult::Error(AuthError::DeviceFlowError(format!(
                "unknown error: {} ({})",
                other, description
            ))),
        })
    }

    /// Exchange a refresh token for a new access token.
    ///
    /// # Errors
    ///
    /// - [`AuthError::RefreshFailed`] if Salesforce rejects the refresh for a
    ///   reason other than an invalid grant
    /// - [`AuthError::Expired`] (with an empty profile name, filled in by the
    ///   caller) if the refresh token is expired or revoked
    /// - [`AuthError::Network`] if there's a network error
    pub async fn refresh_token(&self, refresh_token: &str) -> Result<TokenResponse, AuthError> {
        let request = RefreshRequest {
            grant_type: "refresh_token",
            client_id: &self.client_id,
            refresh_token,
        };

        debug!("OAuth: refresh access token at {}", self.token_url());
        let response = self
            .client
            .post(self.token_url())
            .headers(self.headers())
            .form(&request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if status.is_success() {
            return serde_json::from_str::<TokenResponse>(&body).map_err(|e| {
                AuthError::RefreshFailed(format!("failed to parse token response: {}", e))
            });
        }

        if let Ok(err) = serde_json::from_str::<OAuthError>(&body) {
            match err.error.as_str() {
                "invalid_grant" => Err(AuthError::Expired(String::new())),
                _ => Err(AuthError::RefreshFailed(format!(
                    "{}: {}",
                    err.error,
                    err.error_description.unwrap_or_default()
                ))),
            }
        } else {
            Err(AuthError::Api {
                status: status.as_u16(),
                message: body,
            })
        }
    }
}

/// Internal polling result states.
enum PollResult {
    /// Authorization pending, continue polling.
    Pending,
    /// Slow down, increase polling interval.
    SlowDown,
    /// Terminal error.
    Error(AuthError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_url_format() {
        let client = DeviceFlowClient::new("https://canonical.my.salesforce.com/", "cid");
        assert_eq!(
            client.token_url(),
            "https://canonical.my.salesforce.com/services/oauth2/token"
        );
    }

    #[test]
    fn headers_request_form_encoding() {
        let client = DeviceFlowClient::new("https://example.my.salesforce.com", "cid");
        let headers = client.headers();
        assert_eq!(
            headers.get(CONTENT_TYPE).map(|v| v.to_str().ok()),
            Some(Some("application/x-www-form-urlencoded"))
        );
    }

    #[test]
    fn verification_url_includes_user_code() {
        let code = DeviceCodeResponse {
            device_code: "dev".to_string(),
            user_code: "ABCD1234".to_string(),
            verification_uri: "https://canonical.my.salesforce.com/setup/connect".to_string(),
            interval: Some(5),
        };
        assert_eq!(
            code.verification_url(),
            "https://canonical.my.salesforce.com/setup/connect?user_code=ABCD1234"
        );
    }

    #[test]
    fn device_code_response_deserialize_without_interval() {
        let json = r#"{
            "device_code": "abc123",
            "user_code": "XYZW9876",
            "verification_uri": "https://canonical.my.salesforce.com/setup/connect"
        }"#;

        let response: DeviceCodeResponse = serde_json::from_str(json).expect("parse");
        assert_eq!(response.device_code, "abc123");
        assert_eq!(response.interval, None);
    }

    #[test]
    fn refresh_response_without_refresh_token() {
        let json = r#"{
            "access_token": "00D!new",
            "instance_url": "https://canonical.my.salesforce.com",
            "id": "https://login.salesforce.com/id/00D/005",
            "issued_at": "1704067200000",
            "signature": "sig",
            "token_type": "Bearer"
        }"#;

        let response: TokenResponse = serde_json::from_str(json).expect("parse");
        assert_eq!(response.access_token, "00D!new");
        assert!(response.refresh_token.is_none());
        assert_eq!(response.issued_at.as_deref(), Some("1704067200000"));
    }

    #[test]
    fn token_response_debug_redacts() {
        let json = r#"{"access_token": "00D!secret", "refresh_token": "5Aep-secret"}"#;
        let response: TokenResponse = serde_json::from_str(json).expect("parse");
        let debug = format!("{:?}", response);
        assert!(!debug.contains("secret"));
    }

    #[test]
    fn oauth_error_deserialize() {
        let json = r#"{
            "error": "authorization_pending",
            "error_description": "authorization pending"
        }"#;

        let error: OAuthError = serde_json::from_str(json).expect("parse");
        assert_eq!(error.error, "authorization_pending");
        assert_eq!(error.error_description.as_deref(), Some("authorization pending"));
    }

    #[test]
    fn default_scopes_include_refresh_token() {
        assert!(DEFAULT_SCOPES.contains("refresh_token"));
    }
}
