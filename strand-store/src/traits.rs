//! Core trait for ordered keyspace storage.

use std::ops::Bound;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;

/// A store of independent, sorted keyspaces.
///
/// Each keyspace is a sorted map from byte keys to byte values. The log
/// subsystem requires exactly two capabilities: an atomic single-key write
/// and an ordered range scan. Nothing here implies transactions across keys
/// or keyspaces.
#[async_trait]
pub trait OrderedStore: Send + Sync {
    /// Durably write a single key. Atomic with respect to concurrent scans:
    /// a scan observes either the old or the new value, never a partial one.
    async fn put(&self, keyspace: &str, key: Vec<u8>, value: Bytes) -> Result<()>;

    /// Read a single key, if present.
    async fn get(&self, keyspace: &str, key: &[u8]) -> Result<Option<Bytes>>;

    /// Scan a key range in ascending key order.
    ///
    /// An empty or unknown keyspace yields an empty result, not an error.
    async fn scan(
        &self,
        keyspace: &str,
        start: Bound<Vec<u8>>,
        end: Bound<Vec<u8>>,
    ) -> Result<Vec<(Vec<u8>, Bytes)>>;
}
