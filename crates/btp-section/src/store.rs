//! Bucket-addressable byte store interface and in-memory implementation.
//!
//! Every key written by this crate is content-addressed (key = hash of
//! value), so writes are idempotent and a failed flush can simply be retried.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use thiserror::Error;

/// Bucket holding blobs keyed by their outer digest hash.
pub const BYTES_BY_HASH: &str = "BytesByHash";

/// Bucket holding message bodies of one network type family, keyed by their
/// module hash.
pub fn bytes_by_hash_for(uid: &str) -> String {
    format!("{}_{}", BYTES_BY_HASH, uid)
}

/// Bucket holding packed message-hash lists keyed by their Merkle root.
pub fn list_by_merkle_root_for(uid: &str) -> String {
    format!("ListByMerkleRoot_{}", uid)
}

/// Store error type
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("store error: {0}")]
    Other(String),
}

/// Bucket-addressable byte store.
///
/// Buckets are namespaces; distinct keys may be written concurrently.
/// Durability is the implementation's concern, not the caller's.
#[async_trait]
pub trait SectionStore: Send + Sync {
    async fn put(&self, bucket: &str, key: &[u8], value: &[u8]) -> Result<(), StoreError>;

    /// Returns the value or `None` if the key is absent.
    async fn get(&self, bucket: &str, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError>;
}

/// Bucket name to key/value map, as cloned out by [`MemoryStore::snapshot`].
pub type Buckets = HashMap<String, HashMap<Vec<u8>, Vec<u8>>>;

/// In-memory bucket store for tests and temporary data.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    buckets: Arc<RwLock<Buckets>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of keys across all buckets.
    pub fn size(&self) -> usize {
        self.buckets.read().unwrap().values().map(|b| b.len()).sum()
    }

    /// Deep copy of the whole store, for state comparisons in tests.
    pub fn snapshot(&self) -> Buckets {
        self.buckets.read().unwrap().clone()
    }
}

#[async_trait]
impl SectionStore for MemoryStore {
    async fn put(&self, bucket: &str, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        self.buckets
            .write()
            .unwrap()
            .entry(bucket.to_string())
            .or_default()
            .insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    async fn get(&self, bucket: &str, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self
            .buckets
            .read()
            .unwrap()
            .get(bucket)
            .and_then(|b| b.get(key).cloned()))
    }
}
