//! session::manager
//!
//! SessionManager - owns the authenticated session of one client.
//!
//! # Concurrency
//!
//! Token refresh is single-flight. Inside one process an async mutex gates
//! refresh; across processes sharing a profile the [`SessionLock`] does. The
//! pattern is:
//!
//! 1. Check if refresh is needed
//! 2. If so, take the gate and the profile lock
//! 3. Re-check after acquiring them (another caller may have refreshed)
//! 4. Perform refresh if still needed and persist the result
//! 5. Release both
//!
//! A failed refresh is remembered with the access token it tried to replace.
//! Callers that were queued behind it for the same token get that error
//! instead of sending the rejected refresh token again; a caller arriving
//! after it finished tries again.
//!
//! # Example
//!
//! ```ignore
//! use sftools::config::Config;
//! use sftools::session::{SessionManager, TokenProvider};
//!
//! let config = Config::load(None)?;
//! let manager = SessionManager::from_config(&config);
//!
//! // Get bearer token (refreshes once if expired)
//! let token = manager.bearer_token().await?;
//! ```

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, warn};

use super::device_flow::{DeviceCodeResponse, DeviceFlowClient, DEVICE_FLOW_TIMEOUT};
use super::errors::AuthError;
use super::lock::{SessionLock, DEFAULT_LOCK_TIMEOUT};
use super::tokens::Session;
use super::TokenProvider;
use crate::config::{Config, SaveOutcome, DEFAULT_SESSION_LIFETIME_MINUTES};
use crate::store::{ConfigSessionStore, SessionStore};
use crate::transport;

/// Session manager for one profile.
///
/// Implements [`TokenProvider`] so transports can sign requests.
pub struct SessionManager {
    /// Profile name used in messages.
    profile: String,

    /// Instance base URL.
    instance_url: String,

    /// OAuth client for the instance.
    oauth: DeviceFlowClient,

    /// Where the session is persisted.
    store: Box<dyn SessionStore>,

    /// Cached session (loaded on demand).
    cache: RwLock<Option<Session>>,

    /// Serializes refresh and acquire within this process.
    gate: tokio::sync::Mutex<()>,

    /// Assumed lifetime of freshly issued tokens.
    lifetime: chrono::Duration,

    /// How long to wait for device flow approval.
    device_timeout: Duration,

    /// How long to wait for the profile lock.
    lock_timeout: Duration,

    /// Outcome of the most recent persist.
    last_save: Mutex<Option<SaveOutcome>>,

    /// Number of finished refresh attempts; read before queuing at the gate.
    refreshes: AtomicU64,

    /// Last failed refresh and the access token it was meant to replace.
    failed_refresh: Mutex<Option<(String, AuthError)>>,

    /// Log token requests at info level.
    verbose: bool,
}

impl SessionManager {
    /// Create a session manager.
    ///
    /// # Arguments
    ///
    /// * `instance_url` - Base URL of the Salesforce instance
    /// * `client_id` - Connected app consumer key
    /// * `store` - Session persistence
    pub fn new(instance_url: &str, client_id: &str, store: Box<dyn SessionStore>) -> Self {
        Self {
            profile: store.profile_name(),
            instance_url: instance_url.trim_end_matches('/').to_string(),
            oauth: DeviceFlowClient::new(instance_url, client_id),
            store,
            cache: RwLock::new(None),
            gate: tokio::sync::Mutex::new(()),
            lifetime: chrono::Duration::minutes(DEFAULT_SESSION_LIFETIME_MINUTES),
            device_timeout: DEVICE_FLOW_TIMEOUT,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            last_save: Mutex::new(None),
            refreshes: AtomicU64::new(0),
            failed_refresh: Mutex::new(None),
            verbose: false,
        }
    }

    /// Create a session manager persisting into the profile config file.
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            &config.instance_url(),
            &config.client_id(),
            Box::new(ConfigSessionStore::new(config.clone())),
        )
        .with_lifetime(config.session_lifetime())
    }

    /// Override the assumed token lifetime.
    pub fn with_lifetime(mut self, lifetime: chrono::Duration) -> Self {
        self.lifetime = lifetime;
        self
    }

    /// Log token requests at info level.
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Override how long `acquire` waits for approval.
    pub fn with_device_timeout(mut self, timeout: Duration) -> Self {
        self.device_timeout = timeout;
        self
    }

    /// Profile name.
    pub fn profile(&self) -> &str {
        &self.profile
    }

    fn cached(&self) -> Option<Session> {
        self.cache.read().ok().and_then(|c| c.clone())
    }

    fn update_cache(&self, session: Session) {
        if let Ok(mut cache) = self.cache.write() {
            *cache = Some(session);
        }
    }

    /// The current session, loading it from the store if needed.
    ///
    /// Does not refresh.
    pub fn session(&self) -> Result<Option<Session>, AuthError> {
        if let Some(session) = self.cached() {
            return Ok(Some(session));
        }
        let loaded = self.store.load()?;
        if let Some(ref session) = loaded {
            self.update_cache(session.clone());
        }
        Ok(loaded)
    }

    fn require_session(&self) -> Result<Session, AuthError> {
        self.session()?
            .ok_or_else(|| AuthError::NotAuthenticated(self.profile.clone()))
    }

    /// Persist a session and remember the outcome.
    fn persist(&self, session: &Session) -> Result<(), AuthError> {
        let outcome = self.store.save(session)?;
        if let SaveOutcome::Refused { path, .. } = &outcome {
            warn!(
                "Refusing to save config to file {}, please update it manually",
                path.display()
            );
        }
        if let Ok(mut last) = self.last_save.lock() {
            *last = Some(outcome);
        }
        Ok(())
    }

    /// Take the outcome of the most recent persist.
    ///
    /// The CLI uses this to show the content of a refused save.
    pub fn take_save_outcome(&self) -> Option<SaveOutcome> {
        self.last_save.lock().ok().and_then(|mut l| l.take())
    }

    /// Run the device flow and store the new session.
    ///
    /// `on_code` is called once with the device code so the caller can show
    /// the verification URL.
    ///
    /// # Errors
    ///
    /// - [`AuthError::Cancelled`] if the user denies access
    /// - [`AuthError::DeviceFlowExpired`] if approval does not arrive in time
    /// - [`AuthError::DeviceFlowError`] if Salesforce rejects the flow
    pub async fn acquire<F>(&self, on_code: F) -> Result<Session, AuthError>
    where
        F: FnOnce(&DeviceCodeResponse) + Send,
    {
        let _gate = self.gate.lock().await;

        transport::trace(self.verbose, "acquire", &self.profile);
        let code = self.oauth.request_device_code().await?;
        on_code(&code);

        let tokens = self.oauth.poll_for_token(&code, self.device_timeout).await?;
        let session = Session::from_token_response(&tokens, self.lifetime);

        self.persist(&session)?;
        self.update_cache(session.clone());
        self.set_failed_refresh(None);
        Ok(session)
    }

    /// Exchange the refresh token for a new access token.
    ///
    /// Always refreshes, even if the current token is still valid.
    ///
    /// # Errors
    ///
    /// - [`AuthError::NotAuthenticated`] if there is no session
    /// - [`AuthError::Expired`] if there is no refresh token or it was
    ///   rejected; the caller must fall back to [`SessionManager::acquire`]
    pub async fn refresh(&self) -> Result<Session, AuthError> {
        self.refresh_single_flight(None).await
    }

    /// Refresh unless another caller already replaced `stale`.
    async fn refresh_single_flight(&self, stale: Option<&str>) -> Result<Session, AuthError> {
        let seen = self.refreshes.load(Ordering::Acquire);
        let _gate = self.gate.lock().await;
        let finished_while_queued = self.refreshes.load(Ordering::Acquire) != seen;

        if let (Some(stale), Some(current)) = (stale, self.cached()) {
            if current.access_token != stale && !current.is_expired() {
                debug!("SF: refresh({}) already done by another caller", self.profile);
                return Ok(current);
            }
        }
        if let Some(err) = stale
            .filter(|_| finished_while_queued)
            .and_then(|stale| self.failed_refresh_for(stale))
        {
            debug!("SF: refresh({}) already failed for this token", self.profile);
            return Err(err);
        }

        let _lock = match self.store.lock_path() {
            Some(path) => Some(self.lock_profile(path)?),
            None => None,
        };

        let cached = self.cached();
        let stored = self.store.load()?;

        if let (Some(stale), Some(stored)) = (stale, stored.as_ref()) {
            if stored.access_token != stale && !stored.is_expired() {
                debug!("SF: refresh({}) already done by another process", self.profile);
                self.update_cache(stored.clone());
                return Ok(stored.clone());
            }
        }

        let current = cached
            .or(stored)
            .ok_or_else(|| AuthError::NotAuthenticated(self.profile.clone()))?;
        let refresh_token = current
            .refresh_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AuthError::Expired(self.profile.clone()))?;

        transport::trace(self.verbose, "refresh", &self.profile);
        let tokens = match self.oauth.refresh_token(refresh_token).await {
            Ok(tokens) => tokens,
            Err(err) => {
                let err = match err {
                    AuthError::Expired(_) => AuthError::Expired(self.profile.clone()),
                    other => other,
                };
                if let Some(stale) = stale {
                    self.set_failed_refresh(Some((stale.to_string(), err.clone())));
                }
                self.refreshes.fetch_add(1, Ordering::AcqRel);
                return Err(err);
            }
        };

        let refreshed = current.with_refreshed(&tokens, self.lifetime);
        self.persist(&refreshed)?;
        self.update_cache(refreshed.clone());
        self.set_failed_refresh(None);
        self.refreshes.fetch_add(1, Ordering::AcqRel);
        Ok(refreshed)
    }

    fn failed_refresh_for(&self, stale: &str) -> Option<AuthError> {
        let failed = self.failed_refresh.lock().ok()?;
        failed
            .as_ref()
            .filter(|(token, _)| token == stale)
            .map(|(_, err)| err.clone())
    }

    fn set_failed_refresh(&self, failed: Option<(String, AuthError)>) {
        if let Ok(mut slot) = self.failed_refresh.lock() {
            *slot = failed;
        }
    }

    fn lock_profile(&self, path: PathBuf) -> Result<SessionLock, AuthError> {
        SessionLock::acquire(&path, self.lock_timeout)
    }
}

#[async_trait]
impl TokenProvider for SessionManager {
    async fn bearer_token(&self) -> Result<String, AuthError> {
        let session = self.require_session()?;

        if session.is_expired() {
            if !session.can_refresh() {
                return Err(AuthError::Expired(self.profile.clone()));
            }
            let refreshed = self
                .refresh_single_flight(Some(&session.access_token))
                .await?;
            return Ok(refreshed.access_token);
        }

        Ok(session.access_token)
    }

    async fn refresh_rejected(&self, rejected: &str) -> Result<String, AuthError> {
        if let Ok(mut cache) = self.cache.write() {
            if let Some(session) = cache.as_mut().filter(|s| s.access_token == rejected) {
                session.expire();
            }
        }
        let refreshed = self.refresh_single_flight(Some(rejected)).await?;
        Ok(refreshed.access_token)
    }

    fn instance_url(&self) -> &str {
        &self.instance_url
    }

    fn user_id(&self) -> Option<String> {
        self.session().ok().flatten().and_then(|s| s.user_id)
    }
}

// Custom Debug to avoid exposing tokens
impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("profile", &self.profile)
            .field("instance_url", &self.instance_url)
            .field("session", &self.cached())
            .finish_non_exhaustive()
    }
}
