//! Pooled read-only repository handles
//!
//! `git2::Repository` is `Send` but not `Sync`, so concurrent readers each
//! check a handle out of this pool instead of sharing one. Handles only read
//! the object database and refs; they never touch the working tree, so they
//! never need the workspace lock.
//!
//! [`RepoPool::invalidate`] is called whenever the checkout is replaced
//! (re-clone, close). Handles checked out before that are dropped on return
//! instead of going back to the pool.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use git2::Repository;
use parking_lot::Mutex;
use proctor_core::{ReadError, ReadResult};
use tracing::trace;

/// Bounded pool of repository handles for one checkout
pub struct RepoPool {
    path: PathBuf,
    capacity: usize,
    generation: AtomicU64,
    closed: AtomicBool,
    idle: Mutex<Vec<(u64, Repository)>>,
}

impl RepoPool {
    /// Pool for the repository at `path`, keeping at most `capacity` idle handles
    pub fn new(path: impl Into<PathBuf>, capacity: usize) -> Self {
        Self {
            path: path.into(),
            capacity: capacity.max(1),
            generation: AtomicU64::new(0),
            closed: AtomicBool::new(false),
            idle: Mutex::new(Vec::new()),
        }
    }

    /// Repository path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run `f` with a handle, opening one if none is idle
    ///
    /// # Errors
    ///
    /// Returns `ReadError::NotInitialized` if the pool is closed or no
    /// repository exists at the path yet.
    pub fn with_repo<T, F>(&self, f: F) -> ReadResult<T>
    where
        F: FnOnce(&Repository) -> T,
    {
        if self.closed.load(Ordering::Acquire) {
            return Err(ReadError::NotInitialized);
        }
        let generation = self.generation.load(Ordering::Acquire);
        let pooled = {
            let mut idle = self.idle.lock();
            idle.iter()
                .rposition(|(g, _)| *g == generation)
                .map(|i| idle.swap_remove(i).1)
        };
        let repo = match pooled {
            Some(repo) => repo,
            None => self.open()?,
        };

        let result = f(&repo);

        if !self.closed.load(Ordering::Acquire)
            && self.generation.load(Ordering::Acquire) == generation
        {
            let mut idle = self.idle.lock();
            if idle.len() < self.capacity {
                idle.push((generation, repo));
            }
        }
        Ok(result)
    }

    /// Drop idle handles; handles in use are dropped when returned
    pub fn invalidate(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.idle.lock().clear();
        trace!(target: "proctor::git", path = %self.path.display(), "Repository handles invalidated");
    }

    /// Refuse further checkouts and drop idle handles
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.invalidate();
    }

    /// Allow checkouts again after [`RepoPool::close`]
    pub fn reopen(&self) {
        self.closed.store(false, Ordering::Release);
    }

    /// Number of idle handles
    pub fn idle_count(&self) -> usize {
        self.idle.lock().len()
    }

    fn open(&self) -> ReadResult<Repository> {
        if !self.path.join(".git").exists() {
            return Err(ReadError::NotInitialized);
        }
        Repository::open(&self.path).map_err(|e| ReadError::repository("opening repository", e))
    }
}
