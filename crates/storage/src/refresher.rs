//! Periodic checkout refresh
//!
//! Keeps a read-mostly store close to the remote by calling
//! [`ProctorReader::refresh`] on a fixed interval from a background thread.
//! Refreshes take the workspace lock like any other mutation, so they
//! serialize with writes.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use proctor_core::ProctorReader;
use tracing::{debug, warn};

/// Background refresh task
///
/// # Example
///
/// ```ignore
/// let store: Arc<dyn ProctorReader> = Arc::new(GitProctorStore::open(config)?);
/// let refresher = GitDirectoryRefresher::new(Arc::clone(&store), Duration::from_secs(300));
/// let handle = refresher.start();
///
/// // ... serve reads ...
///
/// refresher.stop(handle);
/// ```
pub struct GitDirectoryRefresher {
    store: Arc<dyn ProctorReader>,
    interval: Duration,
    shutdown: Arc<AtomicBool>,
    runs: Arc<AtomicU64>,
}

impl GitDirectoryRefresher {
    /// Refresh `store` every `interval`
    pub fn new(store: Arc<dyn ProctorReader>, interval: Duration) -> Self {
        Self {
            store,
            interval,
            shutdown: Arc::new(AtomicBool::new(false)),
            runs: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Start the background thread
    ///
    /// The first refresh happens one interval after start. The thread exits
    /// within about 100ms of [`GitDirectoryRefresher::shutdown`].
    pub fn start(&self) -> JoinHandle<()> {
        let store = Arc::clone(&self.store);
        let shutdown = Arc::clone(&self.shutdown);
        let runs = Arc::clone(&self.runs);
        let interval = self.interval;

        thread::spawn(move || {
            let slice = Duration::from_millis(100).min(interval);
            while !shutdown.load(Ordering::Relaxed) {
                let mut elapsed = Duration::ZERO;
                while elapsed < interval {
                    if shutdown.load(Ordering::Relaxed) {
                        return;
                    }
                    thread::sleep(slice);
                    elapsed += slice;
                }

                match store.refresh() {
                    Ok(()) => debug!(target: "proctor::refresh", "Refreshed local checkout"),
                    Err(e) => warn!(target: "proctor::refresh", error = %e, "Failed to refresh local checkout"),
                }
                runs.fetch_add(1, Ordering::Relaxed);
            }
        })
    }

    /// Signal the thread to stop
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }

    /// Signal the thread started by [`GitDirectoryRefresher::start`] and wait for it
    pub fn stop(&self, handle: JoinHandle<()>) {
        self.shutdown();
        if handle.join().is_err() {
            warn!(target: "proctor::refresh", "Refresher thread panicked");
        }
    }

    /// Check if shutdown has been signaled
    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }

    /// Number of refresh attempts so far, successful or not
    pub fn runs(&self) -> u64 {
        self.runs.load(Ordering::Relaxed)
    }
}

impl Drop for GitDirectoryRefresher {
    fn drop(&mut self) {
        self.shutdown();
    }
}
