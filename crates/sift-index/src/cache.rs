//! Content-digest cache keyed by file path and filesystem metadata.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};

/// Cache key: a file version as observed on disk.
///
/// Any change to size or modification time produces a different key, so a
/// lookup after metadata drift misses instead of returning a stale digest.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HashCacheKey {
    pub path: String,
    pub modified_ns: i64,
    pub size: u64,
}

impl HashCacheKey {
    #[must_use]
    pub fn new(path: impl Into<String>, modified_ns: i64, size: u64) -> Self {
        Self {
            path: path.into(),
            modified_ns,
            size,
        }
    }
}

/// Lookup counters. `misses` equals the number of digests the caller had to
/// compute.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

/// Shared `(path, mtime, size) → SHA-256 hex` cache.
///
/// Owned by the caller and passed to the change detector by handle; it can
/// live for one run or be kept across runs. Concurrent fills of the same key
/// store identical digests, so last writer wins.
#[derive(Debug, Default)]
pub struct HashCache {
    entries: RwLock<HashMap<HashCacheKey, String>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl HashCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a digest, counting the hit or miss.
    #[must_use]
    pub fn lookup(&self, key: &HashCacheKey) -> Option<String> {
        let found = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned();
        if found.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        found
    }

    /// Look up a digest without touching the counters.
    #[must_use]
    pub fn peek(&self, key: &HashCacheKey) -> Option<String> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    pub fn insert(&self, key: HashCacheKey, digest: String) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, digest);
    }

    /// Drop every cached digest for `path`, whatever its metadata.
    pub fn forget(&self, path: &str) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|k, _| k.path != path);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}
