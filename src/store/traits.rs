//! store::traits
//!
//! Session storage trait definition.
//!
//! # Design
//!
//! The session manager persists the session after every acquire and
//! refresh. Where it goes is behind [`SessionStore`] so the manager can be
//! driven by an in-memory store in tests and by the profile config file in
//! the CLI.
//!
//! # Security
//!
//! Implementations MUST:
//! - Never log, print, or include tokens in error messages
//! - Be thread-safe (Send + Sync)

use std::path::PathBuf;

use thiserror::Error;

use crate::config::{ConfigError, SaveOutcome};
use crate::session::Session;

/// Errors from session storage operations.
///
/// Note: Error messages intentionally do not include token values.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Failed to read the stored session.
    #[error("failed to read session: {0}")]
    ReadError(String),

    /// Failed to write the session.
    #[error("failed to write session: {0}")]
    WriteError(String),

    /// The backing config is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Trait for session storage providers.
pub trait SessionStore: Send + Sync {
    /// Load the stored session.
    ///
    /// Returns `Ok(None)` if no session has been stored yet. Always reads
    /// the backing storage, so a session written by another process is seen.
    fn load(&self) -> Result<Option<Session>, StoreError>;

    /// Persist a session, replacing any previous one.
    ///
    /// A read-only store reports [`SaveOutcome::Refused`] instead of failing.
    fn save(&self, session: &Session) -> Result<SaveOutcome, StoreError>;

    /// Path of the lock file guarding refresh across processes.
    ///
    /// Stores without a shared backing file return `None`.
    fn lock_path(&self) -> Option<PathBuf> {
        None
    }

    /// Name used in messages (the profile name).
    fn profile_name(&self) -> String;
}
