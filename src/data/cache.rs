//! Memoization of pure pipeline stages keyed by input fingerprints.

use lru::LruCache;
use std::collections::hash_map::DefaultHasher;
use std::fs::Metadata;
use std::hash::{Hash, Hasher};
use std::num::NonZeroUsize;
use std::path::Path;
use std::time::UNIX_EPOCH;

/// Identity of a data source. Equal fingerprints mean equal stage output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint(u64);

impl Fingerprint {
    /// Fingerprint a file on disk by path, size and modification time.
    pub fn of_file(path: &Path, metadata: &Metadata) -> Self {
        let mut hasher = DefaultHasher::new();
        "file".hash(&mut hasher);
        path.hash(&mut hasher);
        metadata.len().hash(&mut hasher);
        if let Some(modified) = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        {
            modified.as_nanos().hash(&mut hasher);
        }
        Self(hasher.finish())
    }

    /// Fingerprint an upload by name and content.
    pub fn of_upload(file_name: &str, bytes: &[u8]) -> Self {
        let mut hasher = DefaultHasher::new();
        "upload".hash(&mut hasher);
        file_name.hash(&mut hasher);
        bytes.hash(&mut hasher);
        Self(hasher.finish())
    }
}

pub const DEFAULT_CACHE_CAPACITY: usize = 4;

/// Bounded LRU memo over fingerprinted inputs.
#[derive(Debug)]
pub struct MemoCache<V> {
    lru: LruCache<Fingerprint, V>,
}

impl<V: Clone> Default for MemoCache<V> {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}

impl<V: Clone> MemoCache<V> {
    pub fn new(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            lru: LruCache::new(cap),
        }
    }

    pub fn len(&self) -> usize {
        self.lru.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.lru.is_empty()
    }

    #[cfg(test)]
    pub fn contains(&self, key: Fingerprint) -> bool {
        self.lru.contains(&key)
    }

    /// Look up `key`, marking it as most recently used.
    pub fn get(&mut self, key: Fingerprint) -> Option<V> {
        self.lru.get(&key).cloned()
    }

    pub fn insert(&mut self, key: Fingerprint, value: V) {
        if let Some((evicted, _)) = self.lru.push(key, value) {
            if evicted != key {
                tracing::debug!(key = ?evicted, "memo evicted");
            }
        }
    }

    /// Return the cached value for `key` or compute and store it.
    /// Errors are returned as-is and leave the cache untouched.
    pub fn get_or_try_insert_with<E, F>(&mut self, key: Fingerprint, compute: F) -> Result<V, E>
    where
        F: FnOnce() -> Result<V, E>,
    {
        if let Some(value) = self.get(key) {
            tracing::debug!(?key, "memo hit");
            return Ok(value);
        }
        tracing::debug!(?key, "memo miss");
        let value = compute()?;
        self.insert(key, value.clone());
        Ok(value)
    }
}
