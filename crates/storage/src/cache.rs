//! Revision-keyed content cache
//!
//! Content at a full object id never changes, so entries never go stale;
//! they are only dropped after sitting unused for the expire-after-access
//! window, or evicted (least recently accessed first) when the cache is full.
//!
//! Only found values are cached. A missing path yields `None` every time and
//! goes back to the inner source.

use std::any::{Any, TypeId};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use proctor_core::ReadResult;
use serde::de::DeserializeOwned;
use tracing::trace;

use crate::layout;

/// Anything that resolves JSON content at a revision
pub trait ContentSource: Send + Sync {
    /// Parse the file at `path` (repository-relative segments) as of `revision`
    ///
    /// `revision` is a commit id (the path is looked up in its tree) or a
    /// blob id (the blob is parsed directly). Returns `None` when the path
    /// does not exist at that commit.
    ///
    /// # Errors
    ///
    /// Returns an error for a malformed or unknown id, an object that is
    /// neither a commit nor a blob, or content that does not parse as `T`.
    fn file_contents<T>(&self, path: &[&str], revision: &str) -> ReadResult<Option<T>>
    where
        T: DeserializeOwned + Clone + Send + Sync + 'static;
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    type_id: TypeId,
    path: Vec<String>,
    revision: String,
}

struct CacheEntry {
    value: Arc<dyn Any + Send + Sync>,
    last_access_ms: AtomicU64,
}

/// Hit/miss/eviction counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups answered from the cache
    pub hits: u64,
    /// Lookups forwarded to the inner source
    pub misses: u64,
    /// Entries dropped for capacity or expiry
    pub evictions: u64,
    /// Entries currently held
    pub entries: usize,
}

/// Caching decorator over a [`ContentSource`]
pub struct CachingDecorator<S> {
    inner: S,
    entries: DashMap<CacheKey, CacheEntry>,
    max_entries: usize,
    expire_after_access: Duration,
    epoch: Instant,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl<S: ContentSource> CachingDecorator<S> {
    /// Wrap `inner`, holding at most `max_entries` values
    pub fn new(inner: S, max_entries: usize, expire_after_access: Duration) -> Self {
        Self {
            inner,
            entries: DashMap::new(),
            max_entries: max_entries.max(1),
            expire_after_access,
            epoch: Instant::now(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// The wrapped source
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Current counters
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            entries: self.entries.len(),
        }
    }

    /// Drop every entry
    pub fn clear(&self) {
        self.entries.clear();
    }

    fn now_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }

    fn is_expired(&self, entry: &CacheEntry, now_ms: u64) -> bool {
        let last = entry.last_access_ms.load(Ordering::Relaxed);
        now_ms.saturating_sub(last) > self.expire_after_access.as_millis() as u64
    }

    fn lookup<T: Clone + 'static>(&self, key: &CacheKey) -> Option<T> {
        let now = self.now_ms();
        let expired = {
            let entry = self.entries.get(key)?;
            if self.is_expired(&entry, now) {
                true
            } else {
                entry.last_access_ms.store(now, Ordering::Relaxed);
                return entry.value.downcast_ref::<T>().cloned();
            }
        };
        if expired && self.entries.remove(key).is_some() {
            self.evictions.fetch_add(1, Ordering::Relaxed);
        }
        None
    }

    fn store<T: Send + Sync + 'static>(&self, key: CacheKey, value: T) {
        if self.entries.len() >= self.max_entries && !self.entries.contains_key(&key) {
            self.make_room();
        }
        self.entries.insert(
            key,
            CacheEntry {
                value: Arc::new(value),
                last_access_ms: AtomicU64::new(self.now_ms()),
            },
        );
    }

    fn make_room(&self) {
        let now = self.now_ms();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !self.is_expired(entry, now));
        let purged = before.saturating_sub(self.entries.len());
        self.evictions.fetch_add(purged as u64, Ordering::Relaxed);

        while self.entries.len() >= self.max_entries {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|e| e.value().last_access_ms.load(Ordering::Relaxed))
                .map(|e| e.key().clone());
            match oldest {
                Some(key) => {
                    if self.entries.remove(&key).is_some() {
                        self.evictions.fetch_add(1, Ordering::Relaxed);
                    }
                }
                None => break,
            }
        }
    }
}

impl<S: ContentSource> ContentSource for CachingDecorator<S> {
    fn file_contents<T>(&self, path: &[&str], revision: &str) -> ReadResult<Option<T>>
    where
        T: DeserializeOwned + Clone + Send + Sync + 'static,
    {
        layout::validate_object_id(revision)?;
        let key = CacheKey {
            type_id: TypeId::of::<T>(),
            path: path.iter().map(|s| s.to_string()).collect(),
            revision: revision.to_string(),
        };
        if let Some(value) = self.lookup::<T>(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(Some(value));
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        trace!(target: "proctor::cache", path = ?path, revision, "Cache miss");
        let value = self.inner.file_contents::<T>(path, revision)?;
        if let Some(found) = &value {
            self.store(key, found.clone());
        }
        Ok(value)
    }
}
