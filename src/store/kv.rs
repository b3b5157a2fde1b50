//! Versioned key-value store with conditional writes and key watching
//!
//! This is the coordination substrate every server instance shares: leases,
//! match metadata, inputs and snapshots all live here. The surface is the
//! contract — get-with-version, atomic compare-and-set commits, TTLs, and a
//! watch primitive with at-least-once (possibly coalesced) delivery. This
//! implementation keeps the data in process memory; instances under test
//! share one handle, and a deployment swaps in a network-backed store behind
//! the same calls.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::broadcast;

use crate::util::time::unix_millis;

use super::keys::Key;

/// Store failures. Lost compare-and-set races are *not* errors — `commit`
/// reports them as `Ok(false)`.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Transient backend failure; retry with backoff
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("failed to encode value: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("failed to decode value: {0}")]
    Decode(#[source] serde_json::Error),
}

/// A value read together with its version. Version 0 means "absent"; every
/// write stamps a fresh, strictly increasing version.
#[derive(Debug, Clone)]
pub struct Versioned<T> {
    pub value: Option<T>,
    pub version: u64,
}

/// Raw entry delivered by a watch batch
#[derive(Debug, Clone)]
pub struct WatchEntry {
    pub bytes: Option<Vec<u8>>,
    pub version: u64,
}

impl WatchEntry {
    pub fn decode<T: DeserializeOwned>(&self) -> Result<Option<T>, StoreError> {
        match &self.bytes {
            Some(bytes) => serde_json::from_slice(bytes)
                .map(Some)
                .map_err(StoreError::Decode),
            None => Ok(None),
        }
    }
}

struct Entry {
    bytes: Vec<u8>,
    version: u64,
    expires_at: Option<u64>,
}

struct Shared {
    entries: HashMap<Key, Entry>,
    next_version: u64,
}

struct Inner {
    shared: Mutex<Shared>,
    events: broadcast::Sender<Key>,
}

/// Cloneable handle to the shared store
#[derive(Clone)]
pub struct KvStore {
    inner: Arc<Inner>,
}

impl Default for KvStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KvStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            inner: Arc::new(Inner {
                shared: Mutex::new(Shared {
                    entries: HashMap::new(),
                    next_version: 1,
                }),
                events,
            }),
        }
    }

    /// Read a key together with its current version
    pub async fn get<T: DeserializeOwned>(&self, key: &Key) -> Result<Versioned<T>, StoreError> {
        self.purge_if_expired(key);
        let shared = self.inner.shared.lock();
        match shared.entries.get(key) {
            Some(entry) => Ok(Versioned {
                value: Some(serde_json::from_slice(&entry.bytes).map_err(StoreError::Decode)?),
                version: entry.version,
            }),
            None => Ok(Versioned { value: None, version: 0 }),
        }
    }

    /// Unconditional write
    pub async fn set<T: Serialize>(&self, key: &Key, value: &T) -> Result<(), StoreError> {
        self.write(key, value, None)
    }

    /// Unconditional write that expires after `ttl_ms`
    pub async fn set_with_ttl<T: Serialize>(
        &self,
        key: &Key,
        value: &T,
        ttl_ms: u64,
    ) -> Result<(), StoreError> {
        self.write(key, value, Some(unix_millis() + ttl_ms))
    }

    pub async fn delete(&self, key: &Key) {
        let removed = {
            let mut shared = self.inner.shared.lock();
            shared.entries.remove(key).is_some()
        };
        if removed {
            let _ = self.inner.events.send(key.clone());
        }
    }

    /// Start an atomic commit: all checks verified and all writes applied
    /// under one lock, or nothing happens
    pub fn atomic(&self) -> Atomic<'_> {
        Atomic {
            store: self,
            checks: Vec::new(),
            sets: Vec::new(),
        }
    }

    /// Subscribe to a fixed key set. The first `next()` resolves immediately
    /// with current values; later batches arrive whenever any watched key
    /// changes (at-least-once, possibly coalesced).
    pub fn watch(&self, keys: Vec<Key>) -> KvWatch {
        KvWatch {
            store: self.clone(),
            rx: self.inner.events.subscribe(),
            keys,
            initial: true,
        }
    }

    fn write<T: Serialize>(
        &self,
        key: &Key,
        value: &T,
        expires_at: Option<u64>,
    ) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(value).map_err(StoreError::Encode)?;
        {
            let mut shared = self.inner.shared.lock();
            let version = shared.next_version;
            shared.next_version += 1;
            shared.entries.insert(key.clone(), Entry { bytes, version, expires_at });
        }
        let _ = self.inner.events.send(key.clone());
        Ok(())
    }

    /// Lazily expire a key, notifying watchers as if it had been deleted
    fn purge_if_expired(&self, key: &Key) {
        let now = unix_millis();
        let expired = {
            let mut shared = self.inner.shared.lock();
            match shared.entries.get(key) {
                Some(entry) if entry.expires_at.is_some_and(|at| at <= now) => {
                    shared.entries.remove(key);
                    true
                }
                _ => false,
            }
        };
        if expired {
            let _ = self.inner.events.send(key.clone());
        }
    }
}

/// Builder for an atomic check-and-write commit
pub struct Atomic<'a> {
    store: &'a KvStore,
    checks: Vec<(Key, u64)>,
    sets: Vec<(Key, Vec<u8>, Option<u64>)>,
}

impl Atomic<'_> {
    /// Require `key` to still be at `version` (0 = absent) at commit time
    pub fn check(mut self, key: &Key, version: u64) -> Self {
        self.checks.push((key.clone(), version));
        self
    }

    pub fn set<T: Serialize>(mut self, key: &Key, value: &T) -> Result<Self, StoreError> {
        let bytes = serde_json::to_vec(value).map_err(StoreError::Encode)?;
        self.sets.push((key.clone(), bytes, None));
        Ok(self)
    }

    pub fn set_with_ttl<T: Serialize>(
        mut self,
        key: &Key,
        value: &T,
        ttl_ms: u64,
    ) -> Result<Self, StoreError> {
        let bytes = serde_json::to_vec(value).map_err(StoreError::Encode)?;
        self.sets.push((key.clone(), bytes, Some(unix_millis() + ttl_ms)));
        Ok(self)
    }

    /// Commit. `Ok(false)` means a check failed — a lost race, not an error.
    pub async fn commit(self) -> Result<bool, StoreError> {
        let now = unix_millis();
        let written: Vec<Key> = {
            let mut shared = self.store.inner.shared.lock();

            for (key, expected) in &self.checks {
                let current = match shared.entries.get(key) {
                    Some(entry) if entry.expires_at.is_some_and(|at| at <= now) => 0,
                    Some(entry) => entry.version,
                    None => 0,
                };
                if current != *expected {
                    return Ok(false);
                }
            }

            self.sets
                .into_iter()
                .map(|(key, bytes, expires_at)| {
                    let version = shared.next_version;
                    shared.next_version += 1;
                    shared
                        .entries
                        .insert(key.clone(), Entry { bytes, version, expires_at });
                    key
                })
                .collect()
        };

        for key in written {
            let _ = self.store.inner.events.send(key);
        }
        Ok(true)
    }
}

/// Live subscription created by [`KvStore::watch`]
pub struct KvWatch {
    store: KvStore,
    rx: broadcast::Receiver<Key>,
    keys: Vec<Key>,
    initial: bool,
}

impl KvWatch {
    /// Wait for the next batch of current values for the watched key set.
    /// `None` means the store is gone.
    pub async fn next(&mut self) -> Option<Vec<WatchEntry>> {
        if self.initial {
            self.initial = false;
            return Some(self.read_all());
        }
        loop {
            match self.rx.recv().await {
                Ok(key) => {
                    if self.keys.contains(&key) {
                        return Some(self.read_all());
                    }
                }
                // Dropped events only coalesce: current values still cover them.
                Err(broadcast::error::RecvError::Lagged(_)) => return Some(self.read_all()),
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    fn read_all(&self) -> Vec<WatchEntry> {
        let now = unix_millis();
        let shared = self.store.inner.shared.lock();
        self.keys
            .iter()
            .map(|key| match shared.entries.get(key) {
                Some(entry) if entry.expires_at.is_some_and(|at| at <= now) => {
                    WatchEntry { bytes: None, version: 0 }
                }
                Some(entry) => WatchEntry {
                    bytes: Some(entry.bytes.clone()),
                    version: entry.version,
                },
                None => WatchEntry { bytes: None, version: 0 },
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::keys::meta_key;

    #[tokio::test]
    async fn absent_key_reads_as_version_zero() {
        let store = KvStore::new();
        let read = store.get::<String>(&meta_key("m1")).await.unwrap();
        assert!(read.value.is_none());
        assert_eq!(read.version, 0);
    }

    #[tokio::test]
    async fn versions_advance_on_every_write() {
        let store = KvStore::new();
        let key = meta_key("m1");

        store.set(&key, &"a").await.unwrap();
        let first = store.get::<String>(&key).await.unwrap();
        store.set(&key, &"b").await.unwrap();
        let second = store.get::<String>(&key).await.unwrap();

        assert_eq!(first.value.as_deref(), Some("a"));
        assert_eq!(second.value.as_deref(), Some("b"));
        assert!(second.version > first.version);
    }

    #[tokio::test]
    async fn commit_fails_on_stale_version() {
        let store = KvStore::new();
        let key = meta_key("m1");
        store.set(&key, &1u32).await.unwrap();
        let read = store.get::<u32>(&key).await.unwrap();

        // Concurrent writer sneaks in.
        store.set(&key, &2u32).await.unwrap();

        let won = store
            .atomic()
            .check(&key, read.version)
            .set(&key, &3u32)
            .unwrap()
            .commit()
            .await
            .unwrap();
        assert!(!won, "stale check must lose");
        assert_eq!(store.get::<u32>(&key).await.unwrap().value, Some(2));
    }

    #[tokio::test]
    async fn commit_against_absent_key_uses_version_zero() {
        let store = KvStore::new();
        let key = meta_key("m1");

        let won = store
            .atomic()
            .check(&key, 0)
            .set(&key, &"claimed")
            .unwrap()
            .commit()
            .await
            .unwrap();
        assert!(won);

        let again = store
            .atomic()
            .check(&key, 0)
            .set(&key, &"second")
            .unwrap()
            .commit()
            .await
            .unwrap();
        assert!(!again, "key now exists, version-0 check must fail");
    }

    #[tokio::test]
    async fn expired_entry_reads_as_absent() {
        let store = KvStore::new();
        let key = meta_key("m1");
        // Already-expired TTL.
        store.set_with_ttl(&key, &"gone", 0).await.unwrap();

        let read = store.get::<String>(&key).await.unwrap();
        assert!(read.value.is_none());
        assert_eq!(read.version, 0);
    }

    #[tokio::test]
    async fn watch_delivers_initial_then_changes() {
        let store = KvStore::new();
        let key = meta_key("m1");
        let mut watch = store.watch(vec![key.clone()]);

        let initial = watch.next().await.unwrap();
        assert!(initial[0].bytes.is_none());

        store.set(&key, &42u32).await.unwrap();
        let batch = watch.next().await.unwrap();
        assert_eq!(batch[0].decode::<u32>().unwrap(), Some(42));
    }

    #[tokio::test]
    async fn watch_ignores_unrelated_keys() {
        let store = KvStore::new();
        let watched = meta_key("m1");
        let other = meta_key("m2");
        let mut watch = store.watch(vec![watched.clone()]);
        let _ = watch.next().await;

        store.set(&other, &1u32).await.unwrap();
        store.set(&watched, &2u32).await.unwrap();

        let batch = watch.next().await.unwrap();
        assert_eq!(batch[0].decode::<u32>().unwrap(), Some(2));
    }
}
