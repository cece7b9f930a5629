//! Read path for persisted message lists.

use std::sync::Arc;

use tracing::trace;

use crate::crypto::NetworkTypeModule;
use crate::hashes::HashesCat;
use crate::section::SectionError;
use crate::store::{bytes_by_hash_for, list_by_merkle_root_for, SectionStore};

/// Message hash list of one flushed network section.
///
/// The packed list is loaded by its Merkle root; individual payloads are
/// fetched on demand from the UID-scoped body bucket.
#[derive(Debug)]
pub struct MessageList<S: SectionStore> {
    store: Arc<S>,
    module: Arc<dyn NetworkTypeModule>,
    hashes: HashesCat,
}

impl<S: SectionStore> MessageList<S> {
    pub(crate) async fn load(
        store: Arc<S>,
        module: Arc<dyn NetworkTypeModule>,
        messages_root: &[u8],
    ) -> Result<Option<Self>, SectionError> {
        let bytes = store
            .get(&list_by_merkle_root_for(module.uid()), messages_root)
            .await?;
        let Some(bytes) = bytes else {
            trace!(root = %hex::encode(messages_root), "message list not flushed");
            return Ok(None);
        };
        let hashes = HashesCat::from_bytes(bytes, module.hash_len())?;
        Ok(Some(Self {
            store,
            module,
            hashes,
        }))
    }

    pub fn len(&self) -> usize {
        self.hashes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }

    /// Module hash of message `i`.
    pub fn hash(&self, i: usize) -> Option<&[u8]> {
        if i < self.hashes.len() {
            Some(self.hashes.get(i))
        } else {
            None
        }
    }

    /// Loads the body of message `i`; `None` for an out-of-range index or a
    /// body missing from the store.
    pub async fn get(&self, i: usize) -> Result<Option<Vec<u8>>, SectionError> {
        let Some(hash) = self.hash(i) else {
            return Ok(None);
        };
        Ok(self
            .store
            .get(&bytes_by_hash_for(self.module.uid()), hash)
            .await?)
    }
}
