//! Shared Key-Value Store with Lazy Expiry
//!
//! One map, one lock, shared by every connection through an `Arc`.
//!
//! ## Design Decisions
//!
//! 1. **Single RwLock**: SET and GET on a key are linearizable; a reader sees
//!    either the old entry or the new one, never a mix.
//! 2. **Lazy Expiry**: an entry whose deadline has passed is invisible to
//!    GET. It is removed when a GET trips over it; nothing sweeps in the
//!    background.
//! 3. **Upsert Only**: SET replaces the whole entry, deadline included.
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │              StorageEngine               │
//! │   RwLock<HashMap<Bytes, Entry>>          │
//! │        Entry { value, expires_at }       │
//! └──────────────────────────────────────────┘
//!        ▲            ▲             ▲
//!   connection    connection    connection
//! ```

use bytes::Bytes;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

/// A stored value with an optional absolute deadline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// The actual value stored
    pub value: Bytes,
    /// When this entry stops being visible (None = never)
    pub expires_at: Option<Instant>,
}

impl Entry {
    /// Creates a new entry without expiry.
    pub fn new(value: Bytes) -> Self {
        Self {
            value,
            expires_at: None,
        }
    }

    /// Creates an entry that expires `ttl` after `now`.
    ///
    /// A deadline past what `Instant` can represent never fires.
    pub fn with_ttl(value: Bytes, ttl: Duration, now: Instant) -> Self {
        Self {
            value,
            expires_at: now.checked_add(ttl),
        }
    }

    /// An entry is live only while its deadline is strictly in the future.
    #[inline]
    pub fn is_expired_at(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|exp| now >= exp)
    }
}

/// Point-in-time counters for the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StorageStats {
    /// Entries physically held, including expired ones not yet evicted
    pub keys: usize,
    pub gets: u64,
    pub sets: u64,
    /// Entries removed by lazy expiry
    pub expired: u64,
}

/// The key-value store shared by all connections.
///
/// # Example
///
/// ```
/// use respkv::storage::StorageEngine;
/// use bytes::Bytes;
/// use std::time::Duration;
///
/// let engine = StorageEngine::new();
///
/// engine.set(Bytes::from("name"), Bytes::from("Ariz"));
/// assert_eq!(engine.get(b"name"), Some(Bytes::from("Ariz")));
///
/// engine.set_with_ttl(Bytes::from("session"), Bytes::from("abc123"), Duration::from_secs(60));
/// assert!(engine.get(b"session").is_some());
/// ```
#[derive(Default)]
pub struct StorageEngine {
    data: RwLock<HashMap<Bytes, Entry>>,
    get_count: AtomicU64,
    set_count: AtomicU64,
    expired_count: AtomicU64,
}

impl std::fmt::Debug for StorageEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageEngine")
            .field("keys", &self.len())
            .field("get_count", &self.get_count.load(Ordering::Relaxed))
            .field("set_count", &self.set_count.load(Ordering::Relaxed))
            .finish()
    }
}

impl StorageEngine {
    pub fn new() -> Self {
        Self::default()
    }

    // Entries are replaced whole; a poisoned lock never guards a half-written value.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<Bytes, Entry>> {
        self.data.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<Bytes, Entry>> {
        self.data.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sets a key-value pair without expiry, replacing any previous entry
    /// and its deadline.
    ///
    /// Returns `true` if the key was not present before.
    pub fn set(&self, key: Bytes, value: Bytes) -> bool {
        self.insert(key, Entry::new(value))
    }

    /// Sets a key-value pair that becomes invisible once `ttl` has elapsed.
    pub fn set_with_ttl(&self, key: Bytes, value: Bytes, ttl: Duration) -> bool {
        self.insert(key, Entry::with_ttl(value, ttl, Instant::now()))
    }

    /// Unconditional upsert of a prepared entry.
    pub fn insert(&self, key: Bytes, entry: Entry) -> bool {
        self.set_count.fetch_add(1, Ordering::Relaxed);
        self.write().insert(key, entry).is_none()
    }

    /// Gets the value for a key, treating expired entries as absent.
    pub fn get(&self, key: &[u8]) -> Option<Bytes> {
        self.get_at(key, Instant::now())
    }

    /// Gets the value for a key as seen at `now`.
    ///
    /// An expired hit is evicted before returning `None`.
    pub fn get_at(&self, key: &[u8], now: Instant) -> Option<Bytes> {
        self.get_count.fetch_add(1, Ordering::Relaxed);

        // Fast path under the read lock
        {
            let data = self.read();
            match data.get(key) {
                Some(entry) if !entry.is_expired_at(now) => return Some(entry.value.clone()),
                Some(_) => {}
                None => return None,
            }
        }

        // Expired: re-check under the write lock, a SET may have raced us
        let mut data = self.write();
        match data.get(key) {
            Some(entry) if entry.is_expired_at(now) => {
                data.remove(key);
                self.expired_count.fetch_add(1, Ordering::Relaxed);
                None
            }
            Some(entry) => Some(entry.value.clone()),
            None => None,
        }
    }

    /// Number of entries physically held (expired ones included until evicted).
    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> StorageStats {
        StorageStats {
            keys: self.len(),
            gets: self.get_count.load(Ordering::Relaxed),
            sets: self.set_count.load(Ordering::Relaxed),
            expired: self.expired_count.load(Ordering::Relaxed),
        }
    }
}
