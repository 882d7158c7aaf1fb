//! In-memory OrderedStore implementation.
//!
//! Backs tests and single-process embedders. Keyspaces are `BTreeMap`s, so
//! scans come back in key order for free. The store also exposes two test
//! hooks: a close flag (puts and scans fail with `Closed` afterwards) and
//! per-keyspace put fault injection for exercising checkpoint-failure paths.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::ops::Bound;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;

use crate::error::{Result, StoreError};
use crate::traits::OrderedStore;

type Keyspace = BTreeMap<Vec<u8>, Bytes>;

/// In-memory implementation of [`OrderedStore`].
pub struct MemoryStore {
    keyspaces: tokio::sync::RwLock<HashMap<String, Keyspace>>,
    failing_keyspaces: tokio::sync::RwLock<HashSet<String>>,
    closed: AtomicBool,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            keyspaces: tokio::sync::RwLock::new(HashMap::new()),
            failing_keyspaces: tokio::sync::RwLock::new(HashSet::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// Mark the store closed. Subsequent operations fail with
    /// [`StoreError::Closed`]. Existing data is retained so reopening
    /// scenarios can be simulated by building a fresh handle instead.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        debug!("memory store closed");
    }

    /// Whether [`MemoryStore::close`] has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Make every `put` into `keyspace` fail with `Unavailable` until
    /// [`MemoryStore::clear_put_failures`] is called.
    pub async fn fail_puts_in(&self, keyspace: &str) {
        self.failing_keyspaces
            .write()
            .await
            .insert(keyspace.to_string());
    }

    /// Clear all put fault injection.
    pub async fn clear_put_failures(&self) {
        self.failing_keyspaces.write().await.clear();
    }

    /// Number of entries in a keyspace.
    pub async fn keyspace_len(&self, keyspace: &str) -> usize {
        self.keyspaces
            .read()
            .await
            .get(keyspace)
            .map_or(0, BTreeMap::len)
    }

    fn check_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(StoreError::Closed);
        }
        Ok(())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

/// A `BTreeMap::range` over arbitrary bounds panics on inverted or
/// doubly-excluded-equal bounds; an empty range is the sane answer here.
fn range_is_empty(start: &Bound<Vec<u8>>, end: &Bound<Vec<u8>>) -> bool {
    let s = match start {
        Bound::Included(k) | Bound::Excluded(k) => k,
        Bound::Unbounded => return false,
    };
    let e = match end {
        Bound::Included(k) | Bound::Excluded(k) => k,
        Bound::Unbounded => return false,
    };
    if s > e {
        return true;
    }
    s == e && (matches!(start, Bound::Excluded(_)) || matches!(end, Bound::Excluded(_)))
}

#[async_trait]
impl OrderedStore for MemoryStore {
    async fn put(&self, keyspace: &str, key: Vec<u8>, value: Bytes) -> Result<()> {
        self.check_open()?;
        if self.failing_keyspaces.read().await.contains(keyspace) {
            return Err(StoreError::Unavailable(format!(
                "injected put failure for keyspace '{keyspace}'"
            )));
        }
        let mut keyspaces = self.keyspaces.write().await;
        keyspaces
            .entry(keyspace.to_string())
            .or_default()
            .insert(key, value);
        Ok(())
    }

    async fn get(&self, keyspace: &str, key: &[u8]) -> Result<Option<Bytes>> {
        self.check_open()?;
        let keyspaces = self.keyspaces.read().await;
        Ok(keyspaces
            .get(keyspace)
            .and_then(|ks| ks.get(key))
            .cloned())
    }

    async fn scan(
        &self,
        keyspace: &str,
        start: Bound<Vec<u8>>,
        end: Bound<Vec<u8>>,
    ) -> Result<Vec<(Vec<u8>, Bytes)>> {
        self.check_open()?;
        if range_is_empty(&start, &end) {
            return Ok(Vec::new());
        }
        let keyspaces = self.keyspaces.read().await;
        let Some(ks) = keyspaces.get(keyspace) else {
            return Ok(Vec::new());
        };
        Ok(ks
            .range((start, end))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn b(s: &str) -> Bytes {
        Bytes::copy_from_slice(s.as_bytes())
    }

    #[tokio::test]
    async fn put_then_get_roundtrips() {
        let store = MemoryStore::new();
        store.put("ks", vec![1, 2], b("hello")).await.unwrap();

        let value = store.get("ks", &[1, 2]).await.unwrap();
        assert_eq!(value, Some(b("hello")));
    }

    #[tokio::test]
    async fn get_missing_key_is_none() {
        let store = MemoryStore::new();
        assert_eq!(store.get("ks", &[9]).await.unwrap(), None);
    }

    #[tokio::test]
    async fn scan_returns_entries_in_key_order() {
        let store = MemoryStore::new();
        store.put("ks", vec![3], b("c")).await.unwrap();
        store.put("ks", vec![1], b("a")).await.unwrap();
        store.put("ks", vec![2], b("b")).await.unwrap();

        let entries = store
            .scan("ks", Bound::Unbounded, Bound::Unbounded)
            .await
            .unwrap();

        let keys: Vec<_> = entries.iter().map(|(k, _)| k.clone()).collect();
        assert_eq!(keys, vec![vec![1], vec![2], vec![3]]);
    }

    #[tokio::test]
    async fn scan_respects_bounds() {
        let store = MemoryStore::new();
        for k in 1..=5u8 {
            store.put("ks", vec![k], b("v")).await.unwrap();
        }

        let entries = store
            .scan("ks", Bound::Excluded(vec![1]), Bound::Included(vec![3]))
            .await
            .unwrap();

        let keys: Vec<_> = entries.iter().map(|(k, _)| k.clone()).collect();
        assert_eq!(keys, vec![vec![2], vec![3]]);
    }

    #[tokio::test]
    async fn scan_inverted_range_is_empty() {
        let store = MemoryStore::new();
        store.put("ks", vec![1], b("a")).await.unwrap();

        let entries = store
            .scan("ks", Bound::Included(vec![9]), Bound::Included(vec![1]))
            .await
            .unwrap();
        assert!(entries.is_empty());

        let entries = store
            .scan("ks", Bound::Excluded(vec![1]), Bound::Excluded(vec![1]))
            .await
            .unwrap();
        assert!(entries.is_empty());
    }

    #[tokio::test]
    async fn scan_unknown_keyspace_is_empty() {
        let store = MemoryStore::new();
        let entries = store
            .scan("nope", Bound::Unbounded, Bound::Unbounded)
            .await
            .unwrap();
        assert!(entries.is_empty());
    }

    #[tokio::test]
    async fn keyspaces_are_independent() {
        let store = MemoryStore::new();
        store.put("a", vec![1], b("in-a")).await.unwrap();
        store.put("b", vec![1], b("in-b")).await.unwrap();

        assert_eq!(store.get("a", &[1]).await.unwrap(), Some(b("in-a")));
        assert_eq!(store.get("b", &[1]).await.unwrap(), Some(b("in-b")));
        assert_eq!(store.keyspace_len("a").await, 1);
    }

    #[tokio::test]
    async fn overwrite_replaces_value() {
        let store = MemoryStore::new();
        store.put("ks", vec![1], b("old")).await.unwrap();
        store.put("ks", vec![1], b("new")).await.unwrap();

        assert_eq!(store.get("ks", &[1]).await.unwrap(), Some(b("new")));
        assert_eq!(store.keyspace_len("ks").await, 1);
    }

    #[tokio::test]
    async fn closed_store_rejects_operations() {
        let store = MemoryStore::new();
        store.put("ks", vec![1], b("a")).await.unwrap();
        store.close();

        assert!(matches!(
            store.put("ks", vec![2], b("b")).await,
            Err(StoreError::Closed)
        ));
        assert!(matches!(store.get("ks", &[1]).await, Err(StoreError::Closed)));
        assert!(matches!(
            store.scan("ks", Bound::Unbounded, Bound::Unbounded).await,
            Err(StoreError::Closed)
        ));
    }

    #[tokio::test]
    async fn injected_put_failures_are_scoped_to_keyspace() {
        let store = MemoryStore::new();
        store.fail_puts_in("bad").await;

        assert!(matches!(
            store.put("bad", vec![1], b("x")).await,
            Err(StoreError::Unavailable(_))
        ));
        store.put("good", vec![1], b("x")).await.unwrap();

        store.clear_put_failures().await;
        store.put("bad", vec![1], b("x")).await.unwrap();
    }
}
