//! Directory-scoped exclusive lock for the single-writer discipline.
//!
//! The repository root carries one `LOCK` file. A writer takes an advisory
//! exclusive lock on it before mutating anything; readers never touch it.
//! The lock is held by an RAII guard, so it is released on every exit path:
//! success, error, or unwind.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use fs2::FileExt;
use parking_lot::Mutex;
use thiserror::Error;
use tracing::debug;

/// How long to sleep between lock attempts while waiting.
const RETRY_INTERVAL: Duration = Duration::from_millis(25);

/// Errors that can occur acquiring or checking the repository lock.
#[derive(Debug, Error)]
pub enum LockError {
    /// The lock could not be acquired within the configured wait.
    ///
    /// Expected under contention; the caller may retry.
    #[error("timed out after {waited:?} waiting for the repository lock")]
    Timeout {
        /// How long acquisition was attempted.
        waited: Duration,
    },

    /// A mutating operation was invoked outside an active lock scope.
    #[error("repository must be locked for this operation")]
    Required,

    /// IO error touching the lock file.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// The repository's directory-level lock.
pub struct RepoLock {
    path: PathBuf,
    held: Mutex<Option<File>>,
}

impl RepoLock {
    /// Creates a lock handle for the repository rooted at `root`.
    ///
    /// The lock file itself is created lazily on first acquisition.
    pub fn new(root: &Path) -> Self {
        RepoLock {
            path: root.join("LOCK"),
            held: Mutex::new(None),
        }
    }

    /// Acquires the exclusive lock, waiting up to `timeout`.
    ///
    /// Blocks the calling thread, retrying until the lock is free or the
    /// timeout elapses. The returned guard releases the lock when dropped.
    pub fn acquire(&self, timeout: Duration) -> Result<LockGuard<'_>, LockError> {
        let started = Instant::now();

        loop {
            {
                let mut held = self.held.lock();

                if held.is_none() {
                    let file = OpenOptions::new()
                        .create(true)
                        .write(true)
                        .open(&self.path)?;

                    match file.try_lock_exclusive() {
                        Ok(()) => {
                            debug!(path = %self.path.display(), "acquired repository lock");
                            *held = Some(file);
                            return Ok(LockGuard { lock: self });
                        }
                        Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
                        Err(e) => return Err(e.into()),
                    }
                }
            }

            if started.elapsed() >= timeout {
                return Err(LockError::Timeout {
                    waited: started.elapsed(),
                });
            }

            std::thread::sleep(RETRY_INTERVAL);
        }
    }

    /// Returns true while a guard from this handle is live.
    pub fn is_held(&self) -> bool {
        self.held.lock().is_some()
    }

    /// Fails with [`LockError::Required`] unless a guard is live.
    pub fn ensure_held(&self) -> Result<(), LockError> {
        if self.is_held() {
            Ok(())
        } else {
            Err(LockError::Required)
        }
    }

    fn release(&self) {
        if let Some(file) = self.held.lock().take() {
            if let Err(error) = file.unlock() {
                // The OS drops the lock when the handle closes anyway.
                debug!(path = %self.path.display(), %error, "explicit unlock failed");
            }
            debug!(path = %self.path.display(), "released repository lock");
        }
    }
}

/// A live exclusive lock on the repository.
///
/// Dropping the guard releases the lock.
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct LockGuard<'a> {
    lock: &'a RepoLock,
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        self.lock.release();
    }
}
