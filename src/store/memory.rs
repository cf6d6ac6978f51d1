//! store::memory
//!
//! In-memory session store, used by tests and embedders that manage
//! persistence themselves.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use super::traits::{SessionStore, StoreError};
use crate::config::SaveOutcome;
use crate::session::Session;

/// A session store held in memory.
///
/// Clones share the same slot, so a test can keep one handle and inspect
/// what the session manager saved through another.
#[derive(Debug, Clone, Default)]
pub struct MemorySessionStore {
    slot: Arc<Mutex<Slot>>,
}

#[derive(Debug, Default)]
struct Slot {
    session: Option<Session>,
    saves: usize,
}

impl MemorySessionStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store already holding `session`.
    pub fn with_session(session: Session) -> Self {
        let store = Self::new();
        if let Ok(mut slot) = store.slot.lock() {
            slot.session = Some(session);
        }
        store
    }

    /// The currently stored session.
    pub fn current(&self) -> Option<Session> {
        self.slot.lock().ok().and_then(|s| s.session.clone())
    }

    /// How many times `save` was called.
    pub fn save_count(&self) -> usize {
        self.slot.lock().map(|s| s.saves).unwrap_or(0)
    }
}

impl SessionStore for MemorySessionStore {
    fn load(&self) -> Result<Option<Session>, StoreError> {
        self.slot
            .lock()
            .map(|s| s.session.clone())
            .map_err(|_| StoreError::ReadError("session slot poisoned".into()))
    }

    fn save(&self, session: &Session) -> Result<SaveOutcome, StoreError> {
        let mut slot = self
            .slot
            .lock()
            .map_err(|_| StoreError::WriteError("session slot poisoned".into()))?;
        slot.session = Some(session.clone());
        slot.saves += 1;
        Ok(SaveOutcome::Written(PathBuf::from("memory")))
    }

    fn profile_name(&self) -> String {
        "memory".to_string()
    }
}
