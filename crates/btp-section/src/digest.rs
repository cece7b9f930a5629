//! The consensus-visible digest of a BTP section.
//!
//! The digest hash is SHA3-256 over the canonical digest bytes regardless of
//! which modules hashed the inner sections; the two hash domains are
//! intentionally separate. All derived products are computed at most once —
//! the section tree underneath never changes.

use std::sync::{Arc, OnceLock};

use tracing::debug;

use crate::codec::{Decoder, ListEncoder};
use crate::crypto::{sha3_256, NetworkTypeModule};
use crate::filter::BitSetFilter;
use crate::messages::MessageList;
use crate::section::{BtpSection, NetworkSection, NetworkTypeSection, SectionError};
use crate::store::{SectionStore, BYTES_BY_HASH};
use crate::types::NID_FILTER_BYTES;

/// Digest view of one network section: the triple that goes into the digest
/// bytes.
pub trait NetworkDigest {
    fn network_id(&self) -> i64;
    fn network_section_hash(&self) -> &[u8];
    fn messages_root(&self) -> &[u8];
}

/// Digest view of one network type section.
pub trait NetworkTypeDigest {
    fn network_type_id(&self) -> i64;
    fn network_type_section_hash(&self) -> &[u8];
    fn network_digests(&self) -> Vec<&dyn NetworkDigest>;
    fn network_digest_for(&self, network_id: i64) -> Option<&dyn NetworkDigest>;
}

impl NetworkDigest for NetworkSection {
    fn network_id(&self) -> i64 {
        NetworkSection::network_id(self)
    }

    fn network_section_hash(&self) -> &[u8] {
        self.hash()
    }

    fn messages_root(&self) -> &[u8] {
        NetworkSection::messages_root(self)
    }
}

impl NetworkTypeDigest for NetworkTypeSection {
    fn network_type_id(&self) -> i64 {
        NetworkTypeSection::network_type_id(self)
    }

    fn network_type_section_hash(&self) -> &[u8] {
        self.hash()
    }

    fn network_digests(&self) -> Vec<&dyn NetworkDigest> {
        self.network_sections()
            .iter()
            .map(|ns| ns as &dyn NetworkDigest)
            .collect()
    }

    fn network_digest_for(&self, network_id: i64) -> Option<&dyn NetworkDigest> {
        self.network_section_for(network_id)
            .map(|ns| ns as &dyn NetworkDigest)
    }
}

/// Lazy digest over a live [`BtpSection`].
#[derive(Debug)]
pub struct BtpSectionDigest {
    sections: Arc<Vec<NetworkTypeSection>>,
    bytes: OnceLock<Vec<u8>>,
    hash: OnceLock<Vec<u8>>,
    filter: OnceLock<BitSetFilter>,
}

impl BtpSectionDigest {
    pub(crate) fn new(sections: Arc<Vec<NetworkTypeSection>>) -> Self {
        Self {
            sections,
            bytes: OnceLock::new(),
            hash: OnceLock::new(),
            filter: OnceLock::new(),
        }
    }

    /// Canonical serialization: outer list of per-type lists, each holding
    /// `[type id, type section hash, per-network triples...]`.
    pub fn bytes(&self) -> &[u8] {
        self.bytes.get_or_init(|| {
            let mut outer = ListEncoder::new();
            for nts in self.sections.iter() {
                nts.encode_digest(&mut outer);
            }
            outer.encode()
        })
    }

    /// SHA3-256 of [`BtpSectionDigest::bytes`], fixed for every module mix.
    pub fn hash(&self) -> &[u8] {
        self.hash.get_or_init(|| sha3_256(self.bytes()))
    }

    pub fn network_type_digests(&self) -> Vec<&dyn NetworkTypeDigest> {
        self.sections
            .iter()
            .map(|nts| nts as &dyn NetworkTypeDigest)
            .collect()
    }

    pub fn network_type_digest_for(&self, network_type_id: i64) -> Option<&dyn NetworkTypeDigest> {
        self.sections
            .binary_search_by_key(&network_type_id, NetworkTypeSection::network_type_id)
            .ok()
            .map(|i| &self.sections[i] as &dyn NetworkTypeDigest)
    }

    /// Bit set over network ids that produced a section this block.
    pub fn network_section_filter(&self) -> &BitSetFilter {
        self.filter.get_or_init(|| {
            let mut filter = BitSetFilter::new(NID_FILTER_BYTES);
            for nts in self.sections.iter() {
                for ns in nts.network_sections() {
                    filter.set(ns.network_id());
                }
            }
            filter
        })
    }

    /// Persists the digest and every message body, content-addressed.
    ///
    /// Write order: digest blob, then per network section its hash list and
    /// message bodies. All keys are hashes of their values, so a partial
    /// write is repaired by retrying.
    pub async fn flush<S: SectionStore + ?Sized>(&self, store: &S) -> Result<(), SectionError> {
        store.put(BYTES_BY_HASH, self.hash(), self.bytes()).await?;
        for nts in self.sections.iter() {
            nts.flush_messages(store).await?;
        }
        debug!(
            digest = %hex::encode(self.hash()),
            network_types = self.sections.len(),
            "flushed btp section"
        );
        Ok(())
    }
}

impl BtpSection {
    /// Convenience forwarder to [`BtpSectionDigest::flush`].
    pub async fn flush<S: SectionStore + ?Sized>(&self, store: &S) -> Result<(), SectionError> {
        self.digest().flush(store).await
    }
}

/// Digest views reconstructed from persisted digest bytes.
///
/// Together with the content-addressed buckets this makes a committed
/// section fully readable after the in-memory tree is gone.
#[derive(Debug)]
pub struct DecodedBtpDigest {
    bytes: Vec<u8>,
    hash: OnceLock<Vec<u8>>,
    network_type_digests: Vec<DecodedNetworkTypeDigest>,
}

#[derive(Debug)]
pub struct DecodedNetworkTypeDigest {
    network_type_id: i64,
    network_type_section_hash: Vec<u8>,
    network_digests: Vec<DecodedNetworkDigest>,
}

#[derive(Debug)]
pub struct DecodedNetworkDigest {
    network_id: i64,
    network_section_hash: Vec<u8>,
    messages_root: Vec<u8>,
}

impl DecodedBtpDigest {
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, SectionError> {
        let mut top = Decoder::new(&bytes);
        let mut outer = top.read_list()?;
        top.expect_end()?;

        let mut network_type_digests = Vec::new();
        while outer.has_more() {
            let mut type_list = outer.read_list()?;
            let network_type_id = type_list.read_int()?;
            let network_type_section_hash = type_list.read_bytes()?.to_vec();
            let mut network_digests = Vec::new();
            while type_list.has_more() {
                let mut network_list = type_list.read_list()?;
                let network_id = network_list.read_int()?;
                let network_section_hash = network_list.read_bytes()?.to_vec();
                let messages_root = network_list.read_bytes()?.to_vec();
                network_list.expect_end()?;
                network_digests.push(DecodedNetworkDigest {
                    network_id,
                    network_section_hash,
                    messages_root,
                });
            }
            if network_digests
                .windows(2)
                .any(|p| p[0].network_id >= p[1].network_id)
            {
                return Err(SectionError::InvariantViolation(format!(
                    "digest network ids of type {} not sorted",
                    network_type_id
                )));
            }
            network_type_digests.push(DecodedNetworkTypeDigest {
                network_type_id,
                network_type_section_hash,
                network_digests,
            });
        }
        if network_type_digests
            .windows(2)
            .any(|p| p[0].network_type_id >= p[1].network_type_id)
        {
            return Err(SectionError::InvariantViolation(
                "digest network type ids not sorted".into(),
            ));
        }

        Ok(Self {
            bytes,
            hash: OnceLock::new(),
            network_type_digests,
        })
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn hash(&self) -> &[u8] {
        self.hash.get_or_init(|| sha3_256(&self.bytes))
    }

    pub fn network_type_digests(&self) -> &[DecodedNetworkTypeDigest] {
        &self.network_type_digests
    }

    pub fn network_type_digest_for(
        &self,
        network_type_id: i64,
    ) -> Option<&DecodedNetworkTypeDigest> {
        self.network_type_digests
            .binary_search_by_key(&network_type_id, |ntd| ntd.network_type_id)
            .ok()
            .map(|i| &self.network_type_digests[i])
    }
}

impl DecodedNetworkTypeDigest {
    pub fn network_digests(&self) -> &[DecodedNetworkDigest] {
        &self.network_digests
    }

    pub fn network_digest_for(&self, network_id: i64) -> Option<&DecodedNetworkDigest> {
        self.network_digests
            .binary_search_by_key(&network_id, |nd| nd.network_id)
            .ok()
            .map(|i| &self.network_digests[i])
    }
}

impl DecodedNetworkDigest {
    /// Loads this network's persisted message list. The caller resolves the
    /// owning type's module from state; the wire digest does not carry UIDs.
    pub async fn message_list<S: SectionStore>(
        &self,
        store: Arc<S>,
        module: Arc<dyn NetworkTypeModule>,
    ) -> Result<Option<MessageList<S>>, SectionError> {
        MessageList::load(store, module, &self.messages_root).await
    }
}

impl NetworkDigest for DecodedNetworkDigest {
    fn network_id(&self) -> i64 {
        self.network_id
    }

    fn network_section_hash(&self) -> &[u8] {
        &self.network_section_hash
    }

    fn messages_root(&self) -> &[u8] {
        &self.messages_root
    }
}

impl NetworkTypeDigest for DecodedNetworkTypeDigest {
    fn network_type_id(&self) -> i64 {
        self.network_type_id
    }

    fn network_type_section_hash(&self) -> &[u8] {
        &self.network_type_section_hash
    }

    fn network_digests(&self) -> Vec<&dyn NetworkDigest> {
        self.network_digests
            .iter()
            .map(|nd| nd as &dyn NetworkDigest)
            .collect()
    }

    fn network_digest_for(&self, network_id: i64) -> Option<&dyn NetworkDigest> {
        self.network_digests
            .binary_search_by_key(&network_id, |nd| nd.network_id)
            .ok()
            .map(|i| &self.network_digests[i] as &dyn NetworkDigest)
    }
}
