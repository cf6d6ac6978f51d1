//! session::lock
//!
//! Profile-scoped lock for concurrent session refresh protection.
//!
//! # Architecture
//!
//! Two `sf` processes sharing one profile must not both refresh and then
//! race to write the config file. The lock file lives next to the profile's
//! config file (`<config>.lock`) and is held with an OS-level exclusive lock.
//!
//! # Invariants
//!
//! - Lock must be held while refreshing and persisting the session
//! - After acquiring the lock, the caller must reload the stored session and
//!   re-check whether a refresh is still needed
//! - Lock is automatically released on drop

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use fs2::FileExt;

use super::errors::AuthError;

/// Default timeout for lock acquisition (10 seconds).
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(10);

/// Polling interval when waiting for lock (100ms).
const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// An exclusive lock around a session refresh.
///
/// Released when dropped, even if the refresh fails.
#[derive(Debug)]
pub struct SessionLock {
    /// Path to the lock file.
    path: PathBuf,
    /// The open file handle with the lock held.
    file: Option<File>,
}

impl SessionLock {
    /// Acquire the lock at `path`, polling until `timeout` expires.
    ///
    /// # Errors
    ///
    /// - [`AuthError::LockTimeout`] if the timeout expires before acquiring
    /// - [`AuthError::LockError`] if there's an I/O error
    pub fn acquire(path: &Path, timeout: Duration) -> Result<Self, AuthError> {
        let deadline = Instant::now() + timeout;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                AuthError::LockError(format!("cannot create {}: {}", parent.display(), e))
            })?;
        }

        loop {
            match Self::try_acquire(path)? {
                Some(lock) => return Ok(lock),
                None if Instant::now() >= deadline => return Err(AuthError::LockTimeout),
                None => thread::sleep(LOCK_POLL_INTERVAL),
            }
        }
    }

    /// Try to acquire the lock without blocking.
    ///
    /// Returns `Ok(None)` if another process holds it.
    pub fn try_acquire(path: &Path) -> Result<Option<Self>, AuthError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|e| AuthError::LockError(format!("cannot open {}: {}", path.display(), e)))?;

        match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(Self {
                path: path.to_path_buf(),
                file: Some(file),
            })),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(AuthError::LockError(format!("lock failed: {}", e))),
        }
    }

    /// Check if the lock is currently held.
    pub fn is_held(&self) -> bool {
        self.file.is_some()
    }

    /// Get the path to the lock file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for SessionLock {
    fn drop(&mut self) {
        if let Some(file) = self.file.take() {
            let _ = FileExt::unlock(&file);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn acquire_creates_lock_file() {
        let temp = TempDir::new().expect("create temp dir");
        let path = temp.path().join("nested").join("production.toml.lock");

        let lock = SessionLock::acquire(&path, DEFAULT_LOCK_TIMEOUT).expect("acquire");
        assert!(lock.is_held());
        assert!(path.exists());
        assert_eq!(lock.path(), path.as_path());
    }

    #[test]
    fn second_acquire_times_out_while_held() {
        let temp = TempDir::new().expect("create temp dir");
        let path = temp.path().join("sandbox.toml.lock");

        let _held = SessionLock::acquire(&path, DEFAULT_LOCK_TIMEOUT).expect("first acquire");
        let second = SessionLock::acquire(&path, Duration::from_millis(250));
        assert!(matches!(second, Err(AuthError::LockTimeout)));
    }

    #[test]
    fn released_on_drop() {
        let temp = TempDir::new().expect("create temp dir");
        let path = temp.path().join("custom.toml.lock");

        {
            let _lock = SessionLock::acquire(&path, DEFAULT_LOCK_TIMEOUT).expect("acquire");
        }

        let again = SessionLock::try_acquire(&path).expect("try acquire");
        assert!(again.is_some());
    }
}
