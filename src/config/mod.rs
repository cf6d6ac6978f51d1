//! config
//!
//! Profile configuration: which org to talk to, and the persisted session.
//!
//! # Overview
//!
//! There are two built-in profiles, each with its own file in the config
//! directory:
//! - **production**: `production.toml` (default)
//! - **sandbox**: `sandbox.toml`
//!
//! A custom file may be given instead. Custom files are read-only: saving
//! one is refused and the caller gets the content to paste by hand.
//!
//! # Precedence
//!
//! Values are resolved in this order (later overrides earlier):
//! 1. Built-in defaults for production or sandbox
//! 2. The profile file
//!
//! # Config Directory
//!
//! Searched in order:
//! 1. `$SFTOOLS_CONFIG_DIR` if set
//! 2. `$XDG_CONFIG_HOME/sftools`
//! 3. The platform config dir (`~/.config/sftools` on Linux)
//!
//! `default.toml` in that directory may set `production = false` under
//! `[salesforce]` to make sandbox the default profile.
//!
//! # Example
//!
//! ```no_run
//! use sftools::config::{Config, Profile};
//!
//! let config = Config::load(Some(Profile::Sandbox)).unwrap();
//! println!("Instance: {}", config.instance_url());
//! println!("API version: {}", config.api_version());
//! ```

pub mod schema;

pub use schema::{ConfigFile, SalesforceSettings};

use chrono::Duration as ChronoDuration;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

use crate::session::Session;

/// Production org host.
pub const PRODUCTION_INSTANCE: &str = "canonical.my.salesforce.com";
/// Production login domain.
pub const PRODUCTION_DOMAIN: &str = "login";
/// Consumer key of the production connected app.
pub const PRODUCTION_CLIENT_ID: &str =
    "3MVG9WtWSKUDG.x4DRiupfwgvo8QIUtDtf9GkzuGiGN_YJlFmGEvF9E3OtcrLNDVx21_EUQC_nafPFePs._0l";

/// Sandbox org host.
pub const SANDBOX_INSTANCE: &str = "canonical--obiwan.my.salesforce.com";
/// Sandbox login domain.
pub const SANDBOX_DOMAIN: &str = "test";
/// Consumer key of the sandbox connected app.
pub const SANDBOX_CLIENT_ID: &str =
    "3MVG9rKhT8ocoxGkPdSEUBFzU_WubXBhhzjwCCg3pOMYzbt6.FngYpJWSfgfKS9C67kKo5a8KpW.vKDbtVAQ_";

/// REST API version used when the profile does not set one.
pub const DEFAULT_API_VERSION: &str = "53.0";

/// HTTP timeout used when the profile does not set one.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Session lifetime used when the profile does not set one.
pub const DEFAULT_SESSION_LIFETIME_MINUTES: i64 = 120;

/// Errors from configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file '{path}': {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("failed to write config file '{path}': {source}")]
    WriteError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config value: {0}")]
    InvalidValue(String),

    #[error("config directory not found")]
    NoConfigDir,
}

/// Which profile file to use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Profile {
    /// `production.toml`, read-write.
    Production,
    /// `sandbox.toml`, read-write.
    Sandbox,
    /// A user-supplied file, read-only.
    Custom(PathBuf),
}

impl Profile {
    /// Short name used in messages.
    pub fn name(&self) -> String {
        match self {
            Profile::Production => "production".to_string(),
            Profile::Sandbox => "sandbox".to_string(),
            Profile::Custom(path) => path.display().to_string(),
        }
    }

    /// Resolve the file path of this profile inside `dir`.
    ///
    /// Absolute custom paths are used as-is.
    pub fn path_in(&self, dir: &Path) -> PathBuf {
        match self {
            Profile::Production => dir.join("production.toml"),
            Profile::Sandbox => dir.join("sandbox.toml"),
            Profile::Custom(path) if path.is_absolute() => path.clone(),
            Profile::Custom(path) => dir.join(path),
        }
    }

    /// Custom files are never written.
    pub fn is_readonly(&self) -> bool {
        matches!(self, Profile::Custom(_))
    }
}

/// Result of [`Config::save`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    /// Written atomically to the path.
    Written(PathBuf),
    /// The profile is read-only; `content` is what should have been written.
    Refused { path: PathBuf, content: String },
}

/// Loaded profile configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// The selected profile.
    profile: Profile,
    /// Resolved path of the profile file.
    path: PathBuf,
    /// Values present in the profile file.
    user: SalesforceSettings,
    /// Built-in defaults for the profile's environment.
    defaults: SalesforceSettings,
}

impl Config {
    /// Load a profile from the default config directory.
    ///
    /// With `None`, the default profile is used (see [`Config::default_profile`]).
    ///
    /// # Errors
    ///
    /// Returns an error if the profile file exists but cannot be parsed.
    /// A missing file is not an error (defaults are used).
    pub fn load(profile: Option<Profile>) -> Result<Config, ConfigError> {
        let dir = Self::config_dir()?;
        Self::load_from(&dir, profile)
    }

    /// Load a profile from an explicit config directory.
    pub fn load_from(dir: &Path, profile: Option<Profile>) -> Result<Config, ConfigError> {
        let profile = match profile {
            Some(p) => p,
            None => Self::default_profile(dir)?,
        };
        let path = profile.path_in(dir);
        let user = Self::read_file(&path)?.salesforce;
        user.validate()?;

        let production = match profile {
            Profile::Production => true,
            Profile::Sandbox => false,
            Profile::Custom(_) => user.production.unwrap_or(true),
        };

        Ok(Config {
            profile,
            path,
            user,
            defaults: Self::defaults_for(production),
        })
    }

    /// Re-read the profile file from disk.
    pub fn reload(&self) -> Result<Config, ConfigError> {
        let user = Self::read_file(&self.path)?.salesforce;
        user.validate()?;
        Ok(Config {
            profile: self.profile.clone(),
            path: self.path.clone(),
            user,
            defaults: self.defaults.clone(),
        })
    }

    /// Determine the default profile from `default.toml` in `dir`.
    pub fn default_profile(dir: &Path) -> Result<Profile, ConfigError> {
        let defaults = Self::read_file(&dir.join("default.toml"))?;
        if defaults.salesforce.production.unwrap_or(true) {
            Ok(Profile::Production)
        } else {
            Ok(Profile::Sandbox)
        }
    }

    /// Built-in defaults for production or sandbox.
    pub fn defaults_for(production: bool) -> SalesforceSettings {
        let (instance, domain, client_id) = if production {
            (PRODUCTION_INSTANCE, PRODUCTION_DOMAIN, PRODUCTION_CLIENT_ID)
        } else {
            (SANDBOX_INSTANCE, SANDBOX_DOMAIN, SANDBOX_CLIENT_ID)
        };
        SalesforceSettings {
            instance: Some(instance.to_string()),
            domain: Some(domain.to_string()),
            client_id: Some(client_id.to_string()),
            production: Some(production),
            api_version: Some(DEFAULT_API_VERSION.to_string()),
            timeout_secs: Some(DEFAULT_TIMEOUT_SECS),
            session_lifetime_minutes: Some(DEFAULT_SESSION_LIFETIME_MINUTES),
            ..Default::default()
        }
    }

    /// Locate the config directory.
    pub fn config_dir() -> Result<PathBuf, ConfigError> {
        if let Ok(dir) = std::env::var("SFTOOLS_CONFIG_DIR") {
            return Ok(PathBuf::from(dir));
        }
        if let Ok(xdg_home) = std::env::var("XDG_CONFIG_HOME") {
            if !xdg_home.is_empty() {
                return Ok(PathBuf::from(xdg_home).join("sftools"));
            }
        }
        dirs::config_dir()
            .map(|d| d.join("sftools"))
            .ok_or(ConfigError::NoConfigDir)
    }

    /// Read and parse a profile file; a missing file yields defaults.
    fn read_file(path: &Path) -> Result<ConfigFile, ConfigError> {
        if !path.exists() {
            return Ok(ConfigFile::default());
        }

        let contents = fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&contents).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Save the profile file.
    ///
    /// Built-in profiles are written atomically (temp file, then rename) with
    /// owner-only permissions. Custom profiles are refused.
    pub fn save(&self) -> Result<SaveOutcome, ConfigError> {
        let contents = self.render_user()?;

        if self.profile.is_readonly() {
            return Ok(SaveOutcome::Refused {
                path: self.path.clone(),
                content: contents,
            });
        }

        Self::write_atomic(&self.path, &contents)?;
        Ok(SaveOutcome::Written(self.path.clone()))
    }

    /// Write a file atomically.
    fn write_atomic(path: &Path, contents: &str) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| ConfigError::WriteError {
                path: path.to_path_buf(),
                source: e,
            })?;
        }

        let temp_path = path.with_extension("toml.tmp");
        {
            let mut file = fs::File::create(&temp_path).map_err(|e| ConfigError::WriteError {
                path: temp_path.clone(),
                source: e,
            })?;

            #[cfg(unix)]
            file.set_permissions(fs::Permissions::from_mode(0o600))
                .map_err(|e| ConfigError::WriteError {
                    path: temp_path.clone(),
                    source: e,
                })?;

            file.write_all(contents.as_bytes())
                .map_err(|e| ConfigError::WriteError {
                    path: temp_path.clone(),
                    source: e,
                })?;

            file.sync_all().map_err(|e| ConfigError::WriteError {
                path: temp_path.clone(),
                source: e,
            })?;
        }

        fs::rename(&temp_path, path).map_err(|e| ConfigError::WriteError {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// The user file content as it would be saved (tokens included).
    fn render_user(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(&ConfigFile {
            salesforce: self.user.clone(),
        })
        .map_err(|e| ConfigError::InvalidValue(e.to_string()))
    }

    /// Render the config for display, with tokens redacted.
    ///
    /// With `full`, built-in defaults are merged in.
    pub fn show(&self, full: bool) -> Result<String, ConfigError> {
        let settings = if full { self.effective() } else { self.user.clone() };
        toml::to_string_pretty(&ConfigFile {
            salesforce: settings.redacted(),
        })
        .map_err(|e| ConfigError::InvalidValue(e.to_string()))
    }

    /// Profile values merged over defaults.
    pub fn effective(&self) -> SalesforceSettings {
        self.user.merged_over(&self.defaults)
    }

    // =========================================================================
    // Session persistence
    // =========================================================================

    /// The persisted session, if the profile holds an access token.
    pub fn session(&self) -> Option<Session> {
        let access_token = self.user.access_token.clone().filter(|t| !t.is_empty())?;
        Some(Session {
            access_token,
            refresh_token: self.user.refresh_token.clone(),
            expires_at: self.user.expires_at,
            user_id: self.user.user_id.clone(),
        })
    }

    /// Replace the persisted session in memory. Call [`Config::save`] to persist.
    pub fn set_session(&mut self, session: &Session) {
        self.user.access_token = Some(session.access_token.clone());
        self.user.refresh_token = session.refresh_token.clone();
        self.user.expires_at = session.expires_at;
        self.user.user_id = session.user_id.clone();
    }

    // =========================================================================
    // Accessor methods with precedence
    // =========================================================================

    /// The selected profile.
    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    /// Path of the profile file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether saves are refused.
    pub fn is_readonly(&self) -> bool {
        self.profile.is_readonly()
    }

    /// Whether this profile talks to production.
    pub fn is_production(&self) -> bool {
        self.effective().production.unwrap_or(true)
    }

    /// Instance host name.
    pub fn instance(&self) -> String {
        self.user
            .instance
            .clone()
            .or_else(|| self.defaults.instance.clone())
            .unwrap_or_else(|| PRODUCTION_INSTANCE.to_string())
    }

    /// Instance base URL (`https://<instance>`).
    pub fn instance_url(&self) -> String {
        format!("https://{}", self.instance())
    }

    /// Login domain ("login" or "test").
    pub fn domain(&self) -> String {
        self.user
            .domain
            .clone()
            .or_else(|| self.defaults.domain.clone())
            .unwrap_or_else(|| PRODUCTION_DOMAIN.to_string())
    }

    /// Connected app consumer key.
    pub fn client_id(&self) -> String {
        self.user
            .client_id
            .clone()
            .or_else(|| self.defaults.client_id.clone())
            .unwrap_or_else(|| PRODUCTION_CLIENT_ID.to_string())
    }

    /// REST API version.
    pub fn api_version(&self) -> String {
        self.user
            .api_version
            .clone()
            .unwrap_or_else(|| DEFAULT_API_VERSION.to_string())
    }

    /// HTTP timeout for REST calls.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.user.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS))
    }

    /// Assumed lifetime of a freshly issued access token.
    pub fn session_lifetime(&self) -> ChronoDuration {
        ChronoDuration::minutes(
            self.user
                .session_lifetime_minutes
                .unwrap_or(DEFAULT_SESSION_LIFETIME_MINUTES),
        )
    }
}
