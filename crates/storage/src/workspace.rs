//! Workspace ownership and write serialization
//!
//! There is exactly one local checkout per store. Everything that mutates
//! it (writes, pulls, re-clones, the refresher) runs inside
//! [`WorkspaceProvider::synchronized_operation`], which holds:
//!
//! 1. an in-process mutex, acquired with a timeout, and
//! 2. an advisory `fs2` lock on `<root>.lock`, so two processes sharing
//!    a checkout also take turns.
//!
//! Locking is not re-entrant. Code already inside a synchronized section
//! receives the root path and uses [`clean_directory`] and friends directly.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use fs2::FileExt;
use parking_lot::Mutex;
use proctor_core::{StoreError, StoreResult, UpdateResult};
use tracing::{debug, warn};

const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Owner of the local checkout directory
pub struct WorkspaceProvider {
    root: PathBuf,
    lock_path: PathBuf,
    lock_timeout: Duration,
    mutex: Mutex<()>,
}

impl WorkspaceProvider {
    /// Take ownership of `root`, creating it if missing
    ///
    /// # Errors
    ///
    /// Returns an error if `root` exists and is not a directory, or cannot
    /// be created.
    pub fn new(root: impl Into<PathBuf>, lock_timeout: Duration) -> StoreResult<Self> {
        let root = root.into();
        if root.exists() && !root.is_dir() {
            return Err(StoreError::Config(format!(
                "workspace root '{}' exists and is not a directory",
                root.display()
            )));
        }
        fs::create_dir_all(&root)?;

        let mut lock_name = root.as_os_str().to_owned();
        lock_name.push(".lock");

        Ok(Self {
            lock_path: PathBuf::from(lock_name),
            root,
            lock_timeout,
            mutex: Mutex::new(()),
        })
    }

    /// Path of the checkout
    pub fn root_directory(&self) -> &Path {
        &self.root
    }

    /// Path of the cross-process lock file
    pub fn lock_file_path(&self) -> &Path {
        &self.lock_path
    }

    /// Run `f` while holding the workspace lock
    ///
    /// # Errors
    ///
    /// Returns `StoreError::LockTimeout` if the lock is not acquired within
    /// the configured timeout, or whatever `f` returns.
    pub fn synchronized_operation<T, F>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&Path) -> StoreResult<T>,
    {
        self.with_lock(f)?
    }

    /// Run a write transaction while holding the workspace lock
    ///
    /// Lock failures surface as update failures.
    pub fn synchronized_update_operation<T, F>(&self, f: F) -> UpdateResult<T>
    where
        F: FnOnce(&Path) -> UpdateResult<T>,
    {
        self.with_lock(f).map_err(StoreError::into_update_error)?
    }

    fn with_lock<T, F>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&Path) -> T,
    {
        let started = Instant::now();
        let _guard = self
            .mutex
            .try_lock_for(self.lock_timeout)
            .ok_or_else(|| self.timeout_error(started))?;
        let lock_file = self.acquire_file_lock(started)?;

        debug!(target: "proctor::workspace", root = %self.root.display(), waited_ms = started.elapsed().as_millis() as u64, "Workspace lock acquired");
        let result = f(&self.root);

        if let Err(e) = FileExt::unlock(&lock_file) {
            warn!(target: "proctor::workspace", error = %e, "Failed to release workspace lock file");
        }
        Ok(result)
    }

    /// Delete everything inside the checkout, keeping the directory
    ///
    /// # Errors
    ///
    /// Returns an error if the lock times out or a file cannot be removed.
    pub fn clean_working_directory(&self) -> StoreResult<()> {
        self.synchronized_operation(|root| clean_directory(root).map_err(StoreError::from))
    }

    fn acquire_file_lock(&self, started: Instant) -> StoreResult<File> {
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&self.lock_path)?;
        loop {
            match file.try_lock_exclusive() {
                Ok(()) => return Ok(file),
                Err(e) if e.kind() == fs2::lock_contended_error().kind() => {
                    if started.elapsed() >= self.lock_timeout {
                        return Err(self.timeout_error(started));
                    }
                    thread::sleep(LOCK_POLL_INTERVAL);
                }
                Err(e) => return Err(StoreError::Io(e)),
            }
        }
    }

    fn timeout_error(&self, started: Instant) -> StoreError {
        warn!(target: "proctor::workspace", root = %self.root.display(), "Timed out waiting for workspace lock");
        StoreError::LockTimeout {
            path: self.root.clone(),
            waited: started.elapsed(),
        }
    }
}

/// Remove every entry of `root`, leaving `root` itself in place
///
/// Callers must already hold the workspace lock.
pub fn clean_directory(root: &Path) -> io::Result<()> {
    if !root.exists() {
        return fs::create_dir_all(root);
    }
    for entry in fs::read_dir(root)? {
        let path = entry?.path();
        if path.is_dir() && !path.is_symlink() {
            fs::remove_dir_all(&path)?;
        } else {
            fs::remove_file(&path)?;
        }
    }
    Ok(())
}
