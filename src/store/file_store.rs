//! store::file_store
//!
//! Session storage in the profile config file.
//!
//! # Security
//!
//! - The session lives under `[salesforce]` next to the other profile keys
//! - Writes go through [`Config::save`], which is atomic with 0600 permissions
//! - Custom profiles are read-only; saving one yields [`SaveOutcome::Refused`]

use std::path::PathBuf;
use std::sync::Mutex;

use super::traits::{SessionStore, StoreError};
use crate::config::{Config, SaveOutcome};
use crate::session::Session;

/// Session store backed by a profile config file.
#[derive(Debug)]
pub struct ConfigSessionStore {
    config: Mutex<Config>,
}

impl ConfigSessionStore {
    /// Wrap a loaded profile config.
    pub fn new(config: Config) -> Self {
        Self {
            config: Mutex::new(config),
        }
    }

    fn snapshot(&self) -> Result<Config, StoreError> {
        self.config
            .lock()
            .map(|c| c.clone())
            .map_err(|_| StoreError::ReadError("config poisoned".into()))
    }
}

impl SessionStore for ConfigSessionStore {
    fn load(&self) -> Result<Option<Session>, StoreError> {
        let fresh = self.snapshot()?.reload()?;
        let session = fresh.session();
        if let Ok(mut config) = self.config.lock() {
            *config = fresh;
        }
        Ok(session)
    }

    fn save(&self, session: &Session) -> Result<SaveOutcome, StoreError> {
        let mut config = self
            .config
            .lock()
            .map_err(|_| StoreError::WriteError("config poisoned".into()))?;
        config.set_session(session);
        Ok(config.save()?)
    }

    fn lock_path(&self) -> Option<PathBuf> {
        let config = self.config.lock().ok()?;
        if config.is_readonly() {
            return None;
        }
        let mut name = config.path().as_os_str().to_owned();
        name.push(".lock");
        Some(PathBuf::from(name))
    }

    fn profile_name(&self) -> String {
        self.config
            .lock()
            .map(|c| c.profile().name())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Profile;
    use tempfile::TempDir;

    #[test]
    fn save_then_load_round_trips_through_file() {
        let temp = TempDir::new().unwrap();
        let config = Config::load_from(temp.path(), Some(Profile::Sandbox)).unwrap();
        let store = ConfigSessionStore::new(config);

        assert!(store.load().unwrap().is_none());

        let session = Session::new("00D!abc", Some("5Aep".into()));
        let outcome = store.save(&session).unwrap();
        assert!(matches!(outcome, SaveOutcome::Written(_)));

        let other = ConfigSessionStore::new(
            Config::load_from(temp.path(), Some(Profile::Sandbox)).unwrap(),
        );
        assert_eq!(other.load().unwrap(), Some(session));
    }

    #[test]
    fn lock_path_sits_next_to_config() {
        let temp = TempDir::new().unwrap();
        let config = Config::load_from(temp.path(), Some(Profile::Production)).unwrap();
        let store = ConfigSessionStore::new(config);

        assert_eq!(
            store.lock_path(),
            Some(temp.path().join("production.toml.lock"))
        );
        assert_eq!(store.profile_name(), "production");
    }

    #[test]
    fn custom_profile_refuses_and_has_no_lock() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("custom.toml");
        let config = Config::load_from(temp.path(), Some(Profile::Custom(path))).unwrap();
        let store = ConfigSessionStore::new(config);

        assert!(store.lock_path().is_none());
        let outcome = store.save(&Session::new("tok", None)).unwrap();
        assert!(matches!(outcome, SaveOutcome::Refused { .. }));
    }
}
